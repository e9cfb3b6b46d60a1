// src/classifier.rs
//
// Vision-language classifier adapter. Sends the photo (base64 JPEG)
// plus optional detector hints to a remote vision model service and
// parses its free-text reply into structured candidates.
//
// The model's reply is not trusted to be clean JSON: parsing is strict
// first, then falls back to extracting the outermost JSON object, and
// finally reports an explicit unparsable result instead of guessing.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::StageError;
use crate::geometry::NormalizedBox;
use crate::types::{ClassificationStrategy, ClassifierConfig, DetectionCandidate, DetectionSource};

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    request_id: String,
    image_base64: &'a str,
    prompt_variant: &'static str,
    min_confidence: f32,
    hints: Vec<HintBox>,
}

/// A detector region forwarded to bias the classifier toward
/// already-found objects.
#[derive(Debug, Serialize)]
struct HintBox {
    label: String,
    confidence: f32,
    /// [y_min, x_min, y_max, x_max] in the 0-1000 space
    bbox_2d: [i32; 4],
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    /// Raw model output; may be a JSON envelope, may be prose around one.
    content: String,
}

#[derive(Debug, Deserialize)]
struct ItemsEnvelope {
    #[serde(default)]
    items: Vec<RawClassifiedItem>,
}

#[derive(Debug, Deserialize)]
pub struct RawClassifiedItem {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub freshness: Option<String>,
    #[serde(default)]
    pub packaging: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
    /// [y_min, x_min, y_max, x_max] in the 0-1000 space
    #[serde(default)]
    pub bbox_2d: Option<[f32; 4]>,
    #[serde(default)]
    pub expiry_date_text: Option<String>,
}

/// Outcome of parsing a model reply.
#[derive(Debug)]
pub enum ClassifierParse {
    Items(Vec<RawClassifiedItem>),
    Unparsable,
}

/// Strict-then-fallback extraction of the `{"items": [...]}` envelope.
pub fn parse_classifier_content(content: &str) -> ClassifierParse {
    if let Ok(envelope) = serde_json::from_str::<ItemsEnvelope>(content) {
        return ClassifierParse::Items(envelope.items);
    }

    // Models like to wrap JSON in fences or commentary; retry on the
    // outermost object.
    if let (Some(start), Some(end)) = (content.find('{'), content.rfind('}')) {
        if start < end {
            if let Ok(envelope) = serde_json::from_str::<ItemsEnvelope>(&content[start..=end]) {
                return ClassifierParse::Items(envelope.items);
            }
        }
    }

    ClassifierParse::Unparsable
}

/// Convert raw items to candidates. Invalid boxes degrade to "no box"
/// rather than rejecting the whole item.
pub fn to_candidates(items: Vec<RawClassifiedItem>) -> Vec<DetectionCandidate> {
    items
        .into_iter()
        .map(|item| {
            let bounding_box = item.bbox_2d.and_then(|b| {
                let bbox = NormalizedBox::new(b[0], b[1], b[2], b[3]);
                if bbox.is_valid() {
                    Some(bbox)
                } else {
                    debug!("classifier item {:?} has invalid bbox {:?}", item.name, b);
                    None
                }
            });

            DetectionCandidate {
                label: item.name,
                bounding_box,
                confidence: item.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
                source: DetectionSource::Classifier,
                category: item.category,
                quantity: item.quantity,
                unit: item.unit,
                freshness: item.freshness,
                packaging: item.packaging,
                expiry_text: item.expiry_date_text,
            }
        })
        .collect()
}

pub struct VisionClassifier {
    http_client: reqwest::Client,
    endpoint: String,
    strategy: ClassificationStrategy,
    timeout_ms: u64,
}

impl VisionClassifier {
    pub fn new(config: &ClassifierConfig) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint.clone(),
            strategy: config.strategy.clone(),
            timeout_ms: config.timeout_secs * 1000,
        })
    }

    /// Classify the photo. `hints` may be empty; the service must
    /// tolerate that.
    pub async fn classify(
        &self,
        image_base64: &str,
        hints: &[DetectionCandidate],
    ) -> Result<Vec<DetectionCandidate>, StageError> {
        let request = ClassifyRequest {
            request_id: uuid::Uuid::new_v4().to_string(),
            image_base64,
            prompt_variant: self.strategy.prompt_variant.as_str(),
            min_confidence: self.strategy.min_confidence,
            hints: build_hints(hints),
        };

        info!(
            "🌐 classifier request {} ({} hints, variant={})",
            request.request_id,
            request.hints.len(),
            request.prompt_variant
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StageError::AdapterTimeout {
                        adapter: "classifier",
                        timeout_ms: self.timeout_ms,
                    }
                } else {
                    StageError::AdapterUnavailable {
                        adapter: "classifier",
                        reason: e.to_string(),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("🌐 classifier service error {}: {}", status, body);
            return Err(StageError::AdapterUnavailable {
                adapter: "classifier",
                reason: format!("HTTP {}", status),
            });
        }

        let payload: ClassifyResponse = response
            .json()
            .await
            .map_err(|_| StageError::MalformedResponse)?;

        match parse_classifier_content(&payload.content) {
            ClassifierParse::Items(items) => {
                let candidates = to_candidates(items);
                info!("✓ classifier returned {} candidates", candidates.len());
                Ok(candidates)
            }
            ClassifierParse::Unparsable => {
                warn!("🌐 classifier reply carried no parsable item list");
                Err(StageError::MalformedResponse)
            }
        }
    }
}

fn build_hints(candidates: &[DetectionCandidate]) -> Vec<HintBox> {
    candidates
        .iter()
        .filter_map(|c| {
            c.bounding_box.map(|bbox| HintBox {
                label: c.label.clone(),
                confidence: c.confidence,
                bbox_2d: [
                    bbox.y_min as i32,
                    bbox.x_min as i32,
                    bbox.y_max as i32,
                    bbox.x_max as i32,
                ],
            })
        })
        .collect()
}

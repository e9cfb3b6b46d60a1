use serde::{Deserialize, Serialize};

use crate::geometry::NormalizedBox;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    pub classifier: ClassifierConfig,
    pub fusion: FusionConfig,
    pub pipeline: PipelineConfig,
    pub services: ServicesConfig,
    pub io: IoConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub path: String,
    pub input_size: usize,
    pub num_threads: usize,
    pub confidence_threshold: f32,
    pub nms_iou_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
    pub strategy: ClassificationStrategy,
}

/// One classification code path, tuned by configuration instead of
/// parallel client implementations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationStrategy {
    pub prompt_variant: PromptVariant,
    /// Asks the service to keep low-confidence guesses above this floor
    /// instead of silently dropping them.
    pub min_confidence: f32,
    /// When true, detector output is computed first and sent along as
    /// region hints; when false both adapters run concurrently.
    pub use_hints: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptVariant {
    Standard,
    Exhaustive,
    Brief,
}

impl PromptVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptVariant::Standard => "standard",
            PromptVariant::Exhaustive => "exhaustive",
            PromptVariant::Brief => "brief",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    #[serde(default = "FusionConfig::default_non_food_keywords")]
    pub non_food_keywords: Vec<String>,
}

impl FusionConfig {
    pub fn default_non_food_keywords() -> Vec<String> {
        [
            "refrigerator",
            "fridge",
            "freezer",
            "shelf",
            "drawer",
            "tray",
            "basket",
            "container",
            "bowl",
            "plate",
            "cup",
            "box",
            "bag",
            "plastic",
            "wrap",
            "foil",
            "appliance",
            "door",
            "wall",
            "floor",
            "ceiling",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.3,
            iou_threshold: 0.1,
            non_food_keywords: Self::default_non_food_keywords(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub detector_timeout_secs: u64,
    pub deadline_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    pub recipe_endpoint: String,
    pub discussion_endpoint: String,
    pub video_endpoint: String,
    pub timeout_secs: u64,
    pub diet_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoConfig {
    pub input_dir: String,
    pub output_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// Which adapter produced a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionSource {
    Detector,
    Classifier,
}

/// One object observation from a single detection source, in the
/// 0-1000 normalized box space.
///
/// The semantic attribute fields are only populated by the classifier;
/// the detector contributes a terse class label and a precise box.
#[derive(Debug, Clone)]
pub struct DetectionCandidate {
    pub label: String,
    pub bounding_box: Option<NormalizedBox>,
    pub confidence: f32,
    pub source: DetectionSource,
    pub category: Option<String>,
    pub quantity: Option<u32>,
    pub unit: Option<String>,
    pub freshness: Option<String>,
    pub packaging: Option<String>,
    pub expiry_text: Option<String>,
}

impl DetectionCandidate {
    /// A detector-side candidate: box and confidence only.
    pub fn from_detector(label: String, bounding_box: NormalizedBox, confidence: f32) -> Self {
        Self {
            label,
            bounding_box: Some(bounding_box),
            confidence,
            source: DetectionSource::Detector,
            category: None,
            quantity: None,
            unit: None,
            freshness: None,
            packaging: None,
            expiry_text: None,
        }
    }
}

pub const DEFAULT_CATEGORY: &str = "other";
pub const DEFAULT_UNIT: &str = "piece";
pub const DEFAULT_FRESHNESS: &str = "fair";
pub const DEFAULT_PACKAGING: &str = "none";

/// The reconciled inventory record, one per physical object.
///
/// Immutable once fusion completes; every downstream stage consumes the
/// same snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct FusedItem {
    pub name: String,
    pub category: String,
    pub quantity: u32,
    pub unit: String,
    pub freshness: String,
    pub packaging: String,
    pub confidence: f32,
    pub bounding_box: Option<NormalizedBox>,
    pub expiry_text: Option<String>,
    /// True when the box came from (or the whole item is) the detector.
    pub matched_with_detector: bool,
}

impl FusedItem {
    /// Build from a classifier candidate, filling unreported attributes
    /// with neutral defaults.
    pub fn from_classifier(candidate: &DetectionCandidate) -> Self {
        Self {
            name: candidate.label.clone(),
            category: candidate
                .category
                .clone()
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            quantity: candidate.quantity.unwrap_or(1),
            unit: candidate
                .unit
                .clone()
                .unwrap_or_else(|| DEFAULT_UNIT.to_string()),
            freshness: candidate
                .freshness
                .clone()
                .unwrap_or_else(|| DEFAULT_FRESHNESS.to_string()),
            packaging: candidate
                .packaging
                .clone()
                .unwrap_or_else(|| DEFAULT_PACKAGING.to_string()),
            confidence: candidate.confidence,
            bounding_box: candidate.bounding_box,
            expiry_text: candidate.expiry_text.clone(),
            matched_with_detector: false,
        }
    }

    /// Fallback record for a detector box the classifier never claimed.
    /// Recovers objects the classifier missed entirely.
    pub fn from_unmatched_detector(candidate: &DetectionCandidate) -> Self {
        Self {
            name: candidate.label.clone(),
            category: DEFAULT_CATEGORY.to_string(),
            quantity: 1,
            unit: DEFAULT_UNIT.to_string(),
            freshness: DEFAULT_FRESHNESS.to_string(),
            packaging: DEFAULT_PACKAGING.to_string(),
            confidence: candidate.confidence,
            bounding_box: candidate.bounding_box,
            expiry_text: None,
            matched_with_detector: true,
        }
    }
}

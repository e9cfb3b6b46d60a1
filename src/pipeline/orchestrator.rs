// src/pipeline/orchestrator.rs
//
// Fixed-order stage chain over one PipelineState:
//
//   validate -> detect+classify -> fuse -> expiry -> inventory
//            -> recipes -> discussion -> video search -> recommend -> done
//
// Soft-fail policy: a failing stage records its error, leaves its
// outputs defaulted and hands the state to the next stage. Only image
// validation aborts the run — nothing downstream can work without the
// photo. Partial results beat no results.

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use chrono::Utc;
use image::DynamicImage;
use tracing::{debug, info};

use crate::classifier::VisionClassifier;
use crate::detector::{self, DetectorHandle};
use crate::discussion::DiscussionClient;
use crate::error::StageError;
use crate::expiry;
use crate::fusion;
use crate::inventory::InventoryStore;
use crate::recipes::RecipeClient;
use crate::recommend;
use crate::types::{Config, DetectionCandidate, FusionConfig};
use crate::validation;
use crate::video_search::VideoSearchClient;

use super::metrics::PipelineMetrics;
use super::state::{PipelineInput, PipelineReport, PipelineState, stage};

pub struct Orchestrator {
    fusion_config: FusionConfig,
    detector_timeout: Duration,
    deadline: Duration,
    default_diet: String,
    use_hints: bool,
    detector: DetectorHandle,
    classifier: VisionClassifier,
    recipes: RecipeClient,
    discussion: DiscussionClient,
    videos: VideoSearchClient,
    inventory: Arc<dyn InventoryStore>,
    metrics: PipelineMetrics,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &Config,
        detector: DetectorHandle,
        classifier: VisionClassifier,
        recipes: RecipeClient,
        discussion: DiscussionClient,
        videos: VideoSearchClient,
        inventory: Arc<dyn InventoryStore>,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            fusion_config: config.fusion.clone(),
            detector_timeout: Duration::from_secs(config.pipeline.detector_timeout_secs),
            deadline: Duration::from_secs(config.pipeline.deadline_secs),
            default_diet: config.services.diet_type.clone(),
            use_hints: config.classifier.strategy.use_hints,
            detector,
            classifier,
            recipes,
            discussion,
            videos,
            inventory,
            metrics,
        }
    }

    /// Run the whole chain. Always returns a report; `success` is true
    /// iff no stage recorded an error.
    pub async fn run(&self, input: PipelineInput) -> PipelineReport {
        self.metrics.inc(&self.metrics.runs_started);
        let mut state = PipelineState::new(input);
        let deadline = Instant::now() + self.deadline;

        info!("🧊 pipeline run starting");

        // Stage 1: validation. The one fatal stage.
        match validation::validate_image(state.image_path.as_deref(), state.image_data.as_deref())
        {
            Ok(image) => {
                state.image = Some(Arc::new(image));
                state.complete_stage(stage::IMAGE_VALIDATED);
            }
            Err(e) => {
                self.metrics.inc(&self.metrics.validation_failures);
                state.fail_stage(stage::VALIDATION_FAILED, e);
                return self.finish(state);
            }
        }

        if self.past_deadline(&mut state, deadline, "detection") {
            return self.finish(state);
        }
        self.stage_detection(&mut state).await;

        if self.past_deadline(&mut state, deadline, "fusion") {
            return self.finish(state);
        }
        self.stage_fusion(&mut state);

        if self.past_deadline(&mut state, deadline, "expiry") {
            return self.finish(state);
        }
        self.stage_expiry(&mut state);

        if self.past_deadline(&mut state, deadline, "inventory") {
            return self.finish(state);
        }
        self.stage_inventory(&mut state);

        if self.past_deadline(&mut state, deadline, "recipes") {
            return self.finish(state);
        }
        self.stage_recipes(&mut state).await;

        if self.past_deadline(&mut state, deadline, "discussion") {
            return self.finish(state);
        }
        self.stage_discussion(&mut state).await;

        if self.past_deadline(&mut state, deadline, "video search") {
            return self.finish(state);
        }
        self.stage_video_search(&mut state).await;

        if self.past_deadline(&mut state, deadline, "recommendation") {
            return self.finish(state);
        }
        self.stage_recommend(&mut state);

        self.metrics.inc(&self.metrics.runs_completed);
        self.finish(state)
    }

    fn finish(&self, mut state: PipelineState) -> PipelineReport {
        state.finished_at = Some(Utc::now());
        let report = PipelineReport::from_state(state);
        info!(
            "🧊 pipeline finished: stage={} success={} errors={} ({:.2}s)",
            report.current_stage,
            report.success,
            report.errors.len(),
            report.processing_time_seconds
        );
        report
    }

    /// Cooperative deadline check at stage boundaries. Stages are never
    /// interrupted mid-computation; an overdue run halts before the
    /// next stage starts, keeping everything accumulated so far.
    fn past_deadline(&self, state: &mut PipelineState, deadline: Instant, next: &str) -> bool {
        if Instant::now() >= deadline {
            self.metrics.inc(&self.metrics.deadline_halts);
            state
                .errors
                .push(format!("pipeline deadline exceeded before {} stage", next));
            true
        } else {
            false
        }
    }

    // ── detection ───────────────────────────────────────────────────

    async fn stage_detection(&self, state: &mut PipelineState) {
        let Some(image) = state.image.clone() else {
            state.fail_stage(
                stage::DETECTION_FAILED,
                StageError::Downstream {
                    stage: "detection",
                    reason: "no decoded image on state".to_string(),
                },
            );
            return;
        };

        let t0 = Instant::now();
        let image_b64 = match encode_jpeg_base64(&image) {
            Ok(b64) => b64,
            Err(e) => {
                state.fail_stage(
                    stage::DETECTION_FAILED,
                    StageError::Downstream {
                        stage: "detection",
                        reason: format!("jpeg encode failed: {}", e),
                    },
                );
                return;
            }
        };

        // The two adapter calls are data-independent, so they normally
        // run concurrently; hint mode sequences them so detector output
        // can bias the classifier.
        let (detector_result, classifier_result) = if self.use_hints {
            let detector_result = self.run_detector(image.clone()).await;
            let hints: &[DetectionCandidate] = match &detector_result {
                Ok(candidates) => candidates.as_slice(),
                Err(_) => &[],
            };
            let classifier_result = self.run_classifier(&image_b64, hints).await;
            (detector_result, classifier_result)
        } else {
            tokio::join!(
                self.run_detector(image.clone()),
                self.run_classifier(&image_b64, &[])
            )
        };

        // Either adapter failing degrades to an empty candidate list;
        // fusion copes with whatever is left.
        match detector_result {
            Ok(candidates) => {
                info!("✓ detector: {} candidate(s)", candidates.len());
                state.detector_candidates = candidates;
            }
            Err(e) => {
                if matches!(e, StageError::AdapterTimeout { .. }) {
                    self.metrics.inc(&self.metrics.detector_timeouts);
                }
                state.errors.push(e.to_string());
            }
        }

        match classifier_result {
            Ok(candidates) => {
                info!("✓ classifier: {} candidate(s)", candidates.len());
                state.classifier_candidates = candidates;
            }
            Err(e) => {
                match e {
                    StageError::AdapterTimeout { .. } => {
                        self.metrics.inc(&self.metrics.classifier_timeouts)
                    }
                    StageError::MalformedResponse => {
                        self.metrics.inc(&self.metrics.classifier_parse_failures)
                    }
                    _ => {}
                }
                state.errors.push(e.to_string());
            }
        }

        self.metrics
            .set_timing(&self.metrics.detection_time_us, t0.elapsed().as_micros() as u64);
        state.complete_stage(stage::DETECTION_COMPLETED);
    }

    async fn run_detector(
        &self,
        image: Arc<DynamicImage>,
    ) -> Result<Vec<DetectionCandidate>, StageError> {
        let detector =
            self.detector
                .get()
                .await
                .map_err(|e| StageError::AdapterUnavailable {
                    adapter: "detector",
                    reason: e.to_string(),
                })?;

        let (width, height) = (image.width(), image.height());
        let timeout_ms = self.detector_timeout.as_millis() as u64;
        let task = tokio::task::spawn_blocking(move || detector.detect(&image));

        match tokio::time::timeout(self.detector_timeout, task).await {
            Err(_) => Err(StageError::AdapterTimeout {
                adapter: "detector",
                timeout_ms,
            }),
            Ok(Err(join_error)) => Err(StageError::AdapterUnavailable {
                adapter: "detector",
                reason: join_error.to_string(),
            }),
            Ok(Ok(Err(e))) => Err(StageError::AdapterUnavailable {
                adapter: "detector",
                reason: e.to_string(),
            }),
            Ok(Ok(Ok(detections))) => Ok(detector::to_candidates(&detections, width, height)),
        }
    }

    async fn run_classifier(
        &self,
        image_b64: &str,
        hints: &[DetectionCandidate],
    ) -> Result<Vec<DetectionCandidate>, StageError> {
        self.classifier.classify(image_b64, hints).await
    }

    // ── fusion ──────────────────────────────────────────────────────

    fn stage_fusion(&self, state: &mut PipelineState) {
        let t0 = Instant::now();
        let outcome = fusion::fuse(
            &state.detector_candidates,
            &state.classifier_candidates,
            &self.fusion_config,
        );

        self.metrics
            .add(&self.metrics.items_confirmed, outcome.confirmed.len() as u64);
        self.metrics.add(
            &self.metrics.items_unidentified,
            outcome.unidentified.len() as u64,
        );
        self.metrics.add(
            &self.metrics.items_filtered_non_food,
            outcome.filtered_non_food as u64,
        );
        self.metrics.add(
            &self.metrics.detector_fallback_items,
            outcome.detector_fallbacks as u64,
        );

        state.confirmed_items = outcome.confirmed;
        state.unidentified_items = outcome.unidentified;
        self.metrics
            .set_timing(&self.metrics.fusion_time_us, t0.elapsed().as_micros() as u64);
        state.complete_stage(stage::FUSION_COMPLETED);
    }

    // ── downstream stages ───────────────────────────────────────────

    fn stage_expiry(&self, state: &mut PipelineState) {
        let today = Utc::now().date_naive();
        let (records, alerts) = expiry::assess_expiry(&state.confirmed_items, today);
        state.expiry_records = records;
        state.expiry_alerts = alerts;
        state.complete_stage(stage::EXPIRY_COMPLETED);
    }

    fn stage_inventory(&self, state: &mut PipelineState) {
        match self.inventory.record(&state.confirmed_items, Utc::now()) {
            Ok(report) => {
                state.inventory_report = Some(report);
                state.complete_stage(stage::INVENTORY_COMPLETED);
            }
            Err(e) => {
                self.metrics.inc(&self.metrics.service_failures);
                state.fail_stage(
                    stage::INVENTORY_FAILED,
                    StageError::Downstream {
                        stage: "inventory",
                        reason: e.to_string(),
                    },
                );
            }
        }
    }

    async fn stage_recipes(&self, state: &mut PipelineState) {
        let ingredients: Vec<String> = state
            .confirmed_items
            .iter()
            .map(|item| item.name.clone())
            .collect();
        if ingredients.is_empty() {
            debug!("no confirmed items, skipping recipe suggestions");
            state.complete_stage(stage::RECIPES_COMPLETED);
            return;
        }

        let urgent = urgent_names(state);
        let diet = state
            .diet_type
            .clone()
            .unwrap_or_else(|| self.default_diet.clone());

        match self.recipes.suggest(&ingredients, &urgent, &diet).await {
            Ok(suggestions) => {
                state.recipe_suggestions = suggestions;
                state.complete_stage(stage::RECIPES_COMPLETED);
            }
            Err(e) => {
                self.metrics.inc(&self.metrics.service_failures);
                state.fail_stage(
                    stage::RECIPES_FAILED,
                    StageError::Downstream {
                        stage: "recipes",
                        reason: e.to_string(),
                    },
                );
            }
        }
    }

    async fn stage_discussion(&self, state: &mut PipelineState) {
        if state.recipe_suggestions.is_empty() {
            debug!("no recipes to discuss");
            state.complete_stage(stage::DISCUSSION_COMPLETED);
            return;
        }

        let ingredients: Vec<String> = state
            .confirmed_items
            .iter()
            .map(|item| item.name.clone())
            .collect();
        let urgent = urgent_names(state);

        match self
            .discussion
            .discuss(&ingredients, &urgent, &state.recipe_suggestions)
            .await
        {
            Ok(summary) => {
                state.discussion = Some(summary);
                state.complete_stage(stage::DISCUSSION_COMPLETED);
            }
            Err(e) => {
                self.metrics.inc(&self.metrics.service_failures);
                state.fail_stage(
                    stage::DISCUSSION_FAILED,
                    StageError::Downstream {
                        stage: "discussion",
                        reason: e.to_string(),
                    },
                );
            }
        }
    }

    async fn stage_video_search(&self, state: &mut PipelineState) {
        if state.recipe_suggestions.is_empty() {
            debug!("no recipes, skipping video search");
            state.complete_stage(stage::VIDEO_SEARCH_COMPLETED);
            return;
        }

        // Per-recipe failures are handled inside the client; the stage
        // itself always completes.
        state.recipe_videos = self
            .videos
            .search_for_recipes(&state.recipe_suggestions)
            .await;
        state.complete_stage(stage::VIDEO_SEARCH_COMPLETED);
    }

    fn stage_recommend(&self, state: &mut PipelineState) {
        let today = Utc::now().date_naive();
        state.recommendation = Some(recommend::build_recommendation(
            &state.confirmed_items,
            &state.expiry_records,
            &state.recipe_suggestions,
            today,
        ));
        state.complete_stage(stage::DONE);
    }
}

fn urgent_names(state: &PipelineState) -> Vec<String> {
    state
        .expiry_records
        .iter()
        .filter(|record| record.urgency.is_urgent())
        .map(|record| record.item.clone())
        .collect()
}

fn encode_jpeg_base64(image: &DynamicImage) -> anyhow::Result<String> {
    // JPEG has no alpha channel; flatten first so PNG inputs survive.
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut buf = std::io::Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, 80);
    rgb.write_with_encoder(encoder)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(buf.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{BoxDetector, PixelDetection};
    use crate::inventory::InMemoryInventory;
    use crate::types::{
        ClassificationStrategy, ClassifierConfig, IoConfig, LoggingConfig, ModelConfig,
        PipelineConfig, PromptVariant, ServicesConfig,
    };
    use anyhow::Result;
    use image::{ImageBuffer, Rgb};

    // Nothing listens on this port; connections are refused immediately,
    // exercising the unavailable-service paths without real latency.
    const DEAD_ENDPOINT: &str = "http://127.0.0.1:9";

    struct StubDetector {
        detections: Vec<PixelDetection>,
    }

    impl BoxDetector for StubDetector {
        fn detect(&self, _image: &DynamicImage) -> Result<Vec<PixelDetection>> {
            Ok(self.detections.clone())
        }
    }

    fn test_config(deadline_secs: u64) -> Config {
        Config {
            model: ModelConfig {
                path: "unused.onnx".to_string(),
                input_size: 640,
                num_threads: 1,
                confidence_threshold: 0.25,
                nms_iou_threshold: 0.45,
            },
            classifier: ClassifierConfig {
                endpoint: format!("{}/classify", DEAD_ENDPOINT),
                timeout_secs: 1,
                strategy: ClassificationStrategy {
                    prompt_variant: PromptVariant::Standard,
                    min_confidence: 0.3,
                    use_hints: false,
                },
            },
            fusion: FusionConfig::default(),
            pipeline: PipelineConfig {
                detector_timeout_secs: 5,
                deadline_secs,
            },
            services: ServicesConfig {
                recipe_endpoint: format!("{}/recipes", DEAD_ENDPOINT),
                discussion_endpoint: format!("{}/discuss", DEAD_ENDPOINT),
                video_endpoint: format!("{}/videos", DEAD_ENDPOINT),
                timeout_secs: 1,
                diet_type: "general".to_string(),
            },
            io: IoConfig {
                input_dir: "input".to_string(),
                output_dir: "output".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }

    fn orchestrator_with(detections: Vec<PixelDetection>, deadline_secs: u64) -> Orchestrator {
        let config = test_config(deadline_secs);
        let detector = DetectorHandle::new(move || {
            Ok(Arc::new(StubDetector {
                detections: detections.clone(),
            }) as Arc<dyn BoxDetector>)
        });

        Orchestrator::new(
            &config,
            detector,
            VisionClassifier::new(&config.classifier).unwrap(),
            RecipeClient::new(&config.services.recipe_endpoint, 1).unwrap(),
            DiscussionClient::new(&config.services.discussion_endpoint, 1).unwrap(),
            VideoSearchClient::new(&config.services.video_endpoint, 1).unwrap(),
            Arc::new(InMemoryInventory::new(10)),
            PipelineMetrics::new(),
        )
    }

    fn sample_photo_bytes() -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(ImageBuffer::from_pixel(
            64,
            48,
            Rgb([200, 180, 160]),
        ));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[tokio::test]
    async fn test_missing_image_halts_at_validation() {
        let orchestrator = orchestrator_with(Vec::new(), 60);
        let report = orchestrator.run(PipelineInput::default()).await;

        assert!(!report.success);
        assert_eq!(report.current_stage, stage::VALIDATION_FAILED);
        assert!(!report.errors.is_empty());
        assert!(report.confirmed_items.is_empty());
        assert!(report.unidentified_items.is_empty());
        assert!(report.expiry_records.is_empty());
        assert!(report.recommendation.is_none());
    }

    #[tokio::test]
    async fn test_degrades_to_detector_only_when_classifier_is_down() {
        // Detector sees one banana; the classifier endpoint is dead.
        let detections = vec![PixelDetection {
            label: "banana".to_string(),
            confidence: 0.9,
            bbox: [8.0, 6.0, 32.0, 24.0],
        }];
        let orchestrator = orchestrator_with(detections, 60);
        let report = orchestrator
            .run(PipelineInput::from_bytes(sample_photo_bytes()))
            .await;

        // The run completes end to end with partial results.
        assert_eq!(report.current_stage, stage::DONE);
        assert!(!report.success);
        assert!(
            report.errors.iter().any(|e| e.contains("classifier")),
            "classifier failure should be recorded: {:?}",
            report.errors
        );

        // The detector-only fallback item made it through fusion.
        assert_eq!(report.confirmed_items.len(), 1);
        let item = &report.confirmed_items[0];
        assert_eq!(item.name, "banana");
        assert!(item.matched_with_detector);

        // Downstream local stages still ran over it.
        assert_eq!(report.expiry_records.len(), 1);
        assert!(report.inventory_report.is_some());
        assert!(report.recommendation.is_some());
        // Recipe service was down too, so that error is also recorded.
        assert!(report.errors.iter().any(|e| e.contains("recipes")));
    }

    #[tokio::test]
    async fn test_empty_detection_still_reaches_done() {
        let orchestrator = orchestrator_with(Vec::new(), 60);
        let report = orchestrator
            .run(PipelineInput::from_bytes(sample_photo_bytes()))
            .await;

        assert_eq!(report.current_stage, stage::DONE);
        assert!(report.confirmed_items.is_empty());
        assert!(report.unidentified_items.is_empty());
        // No items means the recipe/discussion/video stages are skipped,
        // so the only error is the classifier being unreachable.
        assert!(report.recipe_suggestions.is_empty());
        assert!(report.recommendation.is_some());
    }

    #[tokio::test]
    async fn test_zero_deadline_halts_cooperatively() {
        let orchestrator = orchestrator_with(Vec::new(), 0);
        let report = orchestrator
            .run(PipelineInput::from_bytes(sample_photo_bytes()))
            .await;

        assert!(!report.success);
        assert!(
            report
                .errors
                .iter()
                .any(|e| e.contains("deadline exceeded")),
            "expected a deadline error, got {:?}",
            report.errors
        );
        // Validation ran, nothing later did.
        assert_eq!(report.current_stage, stage::IMAGE_VALIDATED);
        assert!(report.confirmed_items.is_empty());
        assert!(report.recommendation.is_none());
    }

    #[tokio::test]
    async fn test_processing_time_is_reported() {
        let orchestrator = orchestrator_with(Vec::new(), 60);
        let report = orchestrator.run(PipelineInput::default()).await;
        assert!(report.processing_time_seconds >= 0.0);
    }
}

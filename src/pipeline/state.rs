// src/pipeline/state.rs
//
// The single record threaded through every stage. One well-defined
// field per stage output; each stage only fills its own fields and
// reads what earlier stages produced.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::Serialize;
use tracing::warn;

use crate::discussion::DiscussionSummary;
use crate::error::StageError;
use crate::expiry::ExpiryRecord;
use crate::inventory::InventoryReport;
use crate::recipes::RecipeSuggestion;
use crate::recommend::FinalRecommendation;
use crate::types::{DetectionCandidate, FusedItem};
use crate::video_search::VideoResult;

/// Stage markers written to `current_stage`. A `*_failed` marker plus a
/// non-empty error list means that stage degraded; only
/// `validation_failed` is terminal.
pub mod stage {
    pub const INITIALIZED: &str = "initialized";
    pub const IMAGE_VALIDATED: &str = "image_validated";
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const DETECTION_COMPLETED: &str = "detection_completed";
    pub const DETECTION_FAILED: &str = "detection_failed";
    pub const FUSION_COMPLETED: &str = "fusion_completed";
    pub const EXPIRY_COMPLETED: &str = "expiry_completed";
    pub const INVENTORY_COMPLETED: &str = "inventory_completed";
    pub const INVENTORY_FAILED: &str = "inventory_failed";
    pub const RECIPES_COMPLETED: &str = "recipes_completed";
    pub const RECIPES_FAILED: &str = "recipes_failed";
    pub const DISCUSSION_COMPLETED: &str = "discussion_completed";
    pub const DISCUSSION_FAILED: &str = "discussion_failed";
    pub const VIDEO_SEARCH_COMPLETED: &str = "video_search_completed";
    pub const DONE: &str = "done";
}

/// What the caller hands the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct PipelineInput {
    pub image_path: Option<PathBuf>,
    pub image_data: Option<Vec<u8>>,
    pub diet_type: Option<String>,
}

impl PipelineInput {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            image_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            image_data: Some(bytes),
            ..Self::default()
        }
    }
}

pub struct PipelineState {
    // input
    pub image_path: Option<PathBuf>,
    pub image_data: Option<Vec<u8>>,
    pub diet_type: Option<String>,

    // validation output
    pub image: Option<Arc<DynamicImage>>,

    // detection output
    pub detector_candidates: Vec<DetectionCandidate>,
    pub classifier_candidates: Vec<DetectionCandidate>,

    // fusion output: disjoint partitions of the fused items
    pub confirmed_items: Vec<FusedItem>,
    pub unidentified_items: Vec<FusedItem>,

    // downstream outputs
    pub expiry_records: Vec<ExpiryRecord>,
    pub expiry_alerts: Vec<String>,
    pub inventory_report: Option<InventoryReport>,
    pub recipe_suggestions: Vec<RecipeSuggestion>,
    pub discussion: Option<DiscussionSummary>,
    pub recipe_videos: BTreeMap<String, Vec<VideoResult>>,
    pub recommendation: Option<FinalRecommendation>,

    // run metadata
    pub errors: Vec<String>,
    pub current_stage: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineState {
    pub fn new(input: PipelineInput) -> Self {
        Self {
            image_path: input.image_path,
            image_data: input.image_data,
            diet_type: input.diet_type,
            image: None,
            detector_candidates: Vec::new(),
            classifier_candidates: Vec::new(),
            confirmed_items: Vec::new(),
            unidentified_items: Vec::new(),
            expiry_records: Vec::new(),
            expiry_alerts: Vec::new(),
            inventory_report: None,
            recipe_suggestions: Vec::new(),
            discussion: None,
            recipe_videos: BTreeMap::new(),
            recommendation: None,
            errors: Vec::new(),
            current_stage: stage::INITIALIZED.to_string(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Record a stage failure: error appended, stage marker set, the
    /// stage's outputs stay at their defaults.
    pub fn fail_stage(&mut self, marker: &str, error: StageError) {
        warn!("stage degraded ({}): {}", marker, error);
        self.errors.push(error.to_string());
        self.current_stage = marker.to_string();
    }

    pub fn complete_stage(&mut self, marker: &str) {
        self.current_stage = marker.to_string();
    }
}

/// The serialized result handed back to callers.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub success: bool,
    pub confirmed_items: Vec<FusedItem>,
    pub unidentified_items: Vec<FusedItem>,
    pub expiry_records: Vec<ExpiryRecord>,
    pub expiry_alerts: Vec<String>,
    pub inventory_report: Option<InventoryReport>,
    pub recipe_suggestions: Vec<RecipeSuggestion>,
    pub discussion: Option<DiscussionSummary>,
    pub recipe_videos: BTreeMap<String, Vec<VideoResult>>,
    pub recommendation: Option<FinalRecommendation>,
    pub errors: Vec<String>,
    pub current_stage: String,
    pub processing_time_seconds: f64,
}

impl PipelineReport {
    pub fn from_state(state: PipelineState) -> Self {
        let finished_at = state.finished_at.unwrap_or_else(Utc::now);
        let processing_time_seconds = (finished_at - state.started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        Self {
            success: state.errors.is_empty(),
            confirmed_items: state.confirmed_items,
            unidentified_items: state.unidentified_items,
            expiry_records: state.expiry_records,
            expiry_alerts: state.expiry_alerts,
            inventory_report: state.inventory_report,
            recipe_suggestions: state.recipe_suggestions,
            discussion: state.discussion,
            recipe_videos: state.recipe_videos,
            recommendation: state.recommendation,
            errors: state.errors,
            current_stage: state.current_stage,
            processing_time_seconds,
        }
    }
}

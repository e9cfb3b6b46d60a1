// src/main.rs

mod classifier;
mod config;
mod detector;
mod discussion;
mod error;
mod expiry;
mod fusion;
mod geometry;
mod inventory;
mod pipeline;
mod recipes;
mod recommend;
mod types;
mod validation;
mod video_search;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use classifier::VisionClassifier;
use detector::DetectorHandle;
use discussion::DiscussionClient;
use inventory::InMemoryInventory;
use pipeline::{Orchestrator, PipelineInput, PipelineMetrics};
use recipes::RecipeClient;
use types::Config;
use video_search::VideoSearchClient;

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];
const INVENTORY_OVERSTOCK_THRESHOLD: u32 = 10;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    let config = Config::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("🧊 fridgescan starting");
    info!("✓ configuration loaded from {}", config_path);
    info!(
        "Fusion thresholds: confidence={:.2}, iou={:.2}",
        config.fusion.confidence_threshold, config.fusion.iou_threshold
    );

    let metrics = PipelineMetrics::new();
    let orchestrator = Orchestrator::new(
        &config,
        DetectorHandle::from_config(&config.model),
        VisionClassifier::new(&config.classifier)?,
        RecipeClient::new(&config.services.recipe_endpoint, config.services.timeout_secs)?,
        DiscussionClient::new(
            &config.services.discussion_endpoint,
            config.services.timeout_secs,
        )?,
        VideoSearchClient::new(&config.services.video_endpoint, config.services.timeout_secs)?,
        Arc::new(InMemoryInventory::new(INVENTORY_OVERSTOCK_THRESHOLD)),
        metrics.clone(),
    );

    let photos = find_photos(&config.io.input_dir);
    if photos.is_empty() {
        error!("No photos found in {}", config.io.input_dir);
        return Ok(());
    }
    info!("Found {} photo(s) to process", photos.len());

    std::fs::create_dir_all(&config.io.output_dir)
        .with_context(|| format!("failed to create output dir {}", config.io.output_dir))?;

    for (idx, photo) in photos.iter().enumerate() {
        info!("========================================");
        info!(
            "Processing photo {}/{}: {}",
            idx + 1,
            photos.len(),
            photo.display()
        );

        let report = orchestrator.run(PipelineInput::from_path(photo.clone())).await;

        info!(
            "  {} confirmed / {} unidentified item(s), {} alert(s)",
            report.confirmed_items.len(),
            report.unidentified_items.len(),
            report.expiry_alerts.len()
        );
        if !report.errors.is_empty() {
            warn!("  {} error(s) recorded during the run", report.errors.len());
        }

        let stem = photo
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("photo");
        let output_path = PathBuf::from(&config.io.output_dir).join(format!("{}_inventory.json", stem));
        match serde_json::to_string_pretty(&report) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&output_path, json) {
                    error!("failed to write {}: {}", output_path.display(), e);
                } else {
                    info!("  ✓ report written to {}", output_path.display());
                }
            }
            Err(e) => error!("failed to serialize report: {}", e),
        }
    }

    let summary = metrics.summary();
    info!("========================================");
    info!(
        "Run summary: {} started, {} completed, {} validation failure(s)",
        summary.runs_started, summary.runs_completed, summary.validation_failures
    );
    info!(
        "  items: {} confirmed, {} unidentified, {} non-food filtered, {} detector-only",
        summary.items_confirmed,
        summary.items_unidentified,
        summary.items_filtered_non_food,
        summary.detector_fallback_items
    );
    info!(
        "  adapters: {} detector timeout(s), {} classifier timeout(s), {} parse failure(s)",
        summary.detector_timeouts, summary.classifier_timeouts, summary.classifier_parse_failures
    );

    Ok(())
}

fn find_photos(input_dir: &str) -> Vec<PathBuf> {
    let mut photos: Vec<PathBuf> = WalkDir::new(input_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    photos.sort();
    photos
}

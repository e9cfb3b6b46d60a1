// src/pipeline/metrics.rs
//
// Production observability for the pipeline. Counters are shared across
// concurrent runs; export via logs at shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub runs_started: Arc<AtomicU64>,
    pub runs_completed: Arc<AtomicU64>,
    pub validation_failures: Arc<AtomicU64>,
    pub deadline_halts: Arc<AtomicU64>,
    pub detector_timeouts: Arc<AtomicU64>,
    pub classifier_timeouts: Arc<AtomicU64>,
    pub classifier_parse_failures: Arc<AtomicU64>,
    pub items_confirmed: Arc<AtomicU64>,
    pub items_unidentified: Arc<AtomicU64>,
    pub items_filtered_non_food: Arc<AtomicU64>,
    pub detector_fallback_items: Arc<AtomicU64>,
    pub service_failures: Arc<AtomicU64>,
    pub detection_time_us: Arc<AtomicU64>,
    pub fusion_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            runs_started: Arc::new(AtomicU64::new(0)),
            runs_completed: Arc::new(AtomicU64::new(0)),
            validation_failures: Arc::new(AtomicU64::new(0)),
            deadline_halts: Arc::new(AtomicU64::new(0)),
            detector_timeouts: Arc::new(AtomicU64::new(0)),
            classifier_timeouts: Arc::new(AtomicU64::new(0)),
            classifier_parse_failures: Arc::new(AtomicU64::new(0)),
            items_confirmed: Arc::new(AtomicU64::new(0)),
            items_unidentified: Arc::new(AtomicU64::new(0)),
            items_filtered_non_food: Arc::new(AtomicU64::new(0)),
            detector_fallback_items: Arc::new(AtomicU64::new(0)),
            service_failures: Arc::new(AtomicU64::new(0)),
            detection_time_us: Arc::new(AtomicU64::new(0)),
            fusion_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, amount: u64) {
        counter.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn set_timing(&self, counter: &AtomicU64, duration_us: u64) {
        counter.store(duration_us, Ordering::Relaxed);
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            deadline_halts: self.deadline_halts.load(Ordering::Relaxed),
            detector_timeouts: self.detector_timeouts.load(Ordering::Relaxed),
            classifier_timeouts: self.classifier_timeouts.load(Ordering::Relaxed),
            classifier_parse_failures: self.classifier_parse_failures.load(Ordering::Relaxed),
            items_confirmed: self.items_confirmed.load(Ordering::Relaxed),
            items_unidentified: self.items_unidentified.load(Ordering::Relaxed),
            items_filtered_non_food: self.items_filtered_non_food.load(Ordering::Relaxed),
            detector_fallback_items: self.detector_fallback_items.load(Ordering::Relaxed),
            service_failures: self.service_failures.load(Ordering::Relaxed),
            last_detection_us: self.detection_time_us.load(Ordering::Relaxed),
            last_fusion_us: self.fusion_time_us.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub runs_started: u64,
    pub runs_completed: u64,
    pub validation_failures: u64,
    pub deadline_halts: u64,
    pub detector_timeouts: u64,
    pub classifier_timeouts: u64,
    pub classifier_parse_failures: u64,
    pub items_confirmed: u64,
    pub items_unidentified: u64,
    pub items_filtered_non_food: u64,
    pub detector_fallback_items: u64,
    pub service_failures: u64,
    pub last_detection_us: u64,
    pub last_fusion_us: u64,
    pub elapsed_secs: f64,
}

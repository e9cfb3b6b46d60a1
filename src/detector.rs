// src/detector.rs
//
// Fast box detector adapter. Wraps a YOLO ONNX model: precise pixel
// boxes, terse class labels, no semantics. Output is converted to the
// 0-1000 normalized space before the fusion engine ever sees it.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use image::{DynamicImage, RgbImage};
use ort::session::{Session, builder::GraphOptimizationLevel};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::geometry::NormalizedBox;
use crate::types::{DetectionCandidate, ModelConfig};

const YOLO_CLASSES: usize = 80;
const YOLO_PREDICTIONS: usize = 8400;

// COCO classes that can plausibly sit in a refrigerator. Everything
// else the model knows (cars, chairs, people...) is noise here.
const FOOD_CLASSES: [(usize, &str); 11] = [
    (39, "bottle"),
    (46, "banana"),
    (47, "apple"),
    (48, "sandwich"),
    (49, "orange"),
    (50, "broccoli"),
    (51, "carrot"),
    (52, "hot dog"),
    (53, "pizza"),
    (54, "donut"),
    (55, "cake"),
];

/// One raw detection in source-image pixel coordinates.
#[derive(Debug, Clone)]
pub struct PixelDetection {
    pub label: String,
    pub confidence: f32,
    /// [x1, y1, x2, y2]
    pub bbox: [f32; 4],
}

/// Seam between the pipeline and whatever box detector backs it.
pub trait BoxDetector: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<PixelDetection>>;
}

pub struct YoloFoodDetector {
    session: Mutex<Session>,
    input_size: usize,
    confidence_threshold: f32,
    nms_iou_threshold: f32,
}

impl YoloFoodDetector {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        info!("Loading YOLO model: {}", config.path);

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(ort::Error::<()>::from)?
            .with_intra_threads(config.num_threads)
            .map_err(ort::Error::<()>::from)?
            .commit_from_file(&config.path)
            .context("Failed to load detector model")?;

        info!("✓ YOLO food detector initialized");
        Ok(Self {
            session: Mutex::new(session),
            input_size: config.input_size,
            confidence_threshold: config.confidence_threshold,
            nms_iou_threshold: config.nms_iou_threshold,
        })
    }

    /// Letterbox into a square canvas, normalize to [0,1], HWC -> CHW.
    fn preprocess(&self, src: &RgbImage) -> (Vec<f32>, f32, f32, f32) {
        let target = self.input_size;
        let (src_w, src_h) = (src.width() as usize, src.height() as usize);

        let scale = (target as f32 / src_w as f32).min(target as f32 / src_h as f32);
        let scaled_w = ((src_w as f32 * scale) as usize).max(1);
        let scaled_h = ((src_h as f32 * scale) as usize).max(1);
        let pad_x = (target - scaled_w) as f32 / 2.0;
        let pad_y = (target - scaled_h) as f32 / 2.0;

        let resized = image::imageops::resize(
            src,
            scaled_w as u32,
            scaled_h as u32,
            image::imageops::FilterType::Triangle,
        );

        // Gray letterbox background, per YOLO convention.
        let mut canvas = vec![114u8; target * target * 3];
        for (x, y, pixel) in resized.enumerate_pixels() {
            let dst_x = x as usize + pad_x as usize;
            let dst_y = y as usize + pad_y as usize;
            let dst_idx = (dst_y * target + dst_x) * 3;
            canvas[dst_idx..dst_idx + 3].copy_from_slice(&pixel.0);
        }

        let mut input = vec![0.0f32; 3 * target * target];
        for c in 0..3 {
            for h in 0..target {
                for w in 0..target {
                    let hwc_idx = (h * target + w) * 3 + c;
                    let chw_idx = c * target * target + h * target + w;
                    input[chw_idx] = canvas[hwc_idx] as f32 / 255.0;
                }
            }
        }

        (input, scale, pad_x, pad_y)
    }

    fn infer(&self, input: Vec<f32>) -> Result<Vec<f32>> {
        let shape = [1, 3, self.input_size, self.input_size];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("detector session lock poisoned"))?;
        let outputs = session.run(ort::inputs!["images" => input_value])?;
        let output = &outputs[0];
        let (_, data) = output.try_extract_tensor::<f32>()?;

        Ok(data.to_vec())
    }

    /// Parse the [1, 84, 8400] output, keep food classes, undo the
    /// letterbox transform, then NMS.
    fn postprocess(&self, output: &[f32], scale: f32, pad_x: f32, pad_y: f32) -> Vec<PixelDetection> {
        let mut detections = Vec::new();

        for i in 0..YOLO_PREDICTIONS {
            let cx = output[i];
            let cy = output[YOLO_PREDICTIONS + i];
            let w = output[YOLO_PREDICTIONS * 2 + i];
            let h = output[YOLO_PREDICTIONS * 3 + i];

            let mut max_conf = 0.0f32;
            let mut best_class = 0;
            for c in 0..YOLO_CLASSES {
                let conf = output[YOLO_PREDICTIONS * (4 + c) + i];
                if conf > max_conf {
                    max_conf = conf;
                    best_class = c;
                }
            }

            if max_conf < self.confidence_threshold {
                continue;
            }
            let Some(label) = class_name(best_class) else {
                continue;
            };

            // Center format -> corners, then back to source pixels.
            let x1 = (cx - w / 2.0 - pad_x) / scale;
            let y1 = (cy - h / 2.0 - pad_y) / scale;
            let x2 = (cx + w / 2.0 - pad_x) / scale;
            let y2 = (cy + h / 2.0 - pad_y) / scale;

            detections.push(PixelDetection {
                label: label.to_string(),
                confidence: max_conf,
                bbox: [x1, y1, x2, y2],
            });
        }

        nms(detections, self.nms_iou_threshold)
    }
}

impl BoxDetector for YoloFoodDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<PixelDetection>> {
        let rgb = image.to_rgb8();
        let (input, scale, pad_x, pad_y) = self.preprocess(&rgb);
        let output = self.infer(input)?;
        let detections = self.postprocess(&output, scale, pad_x, pad_y);

        debug!("detector found {} food objects", detections.len());
        Ok(detections)
    }
}

fn class_name(class_id: usize) -> Option<&'static str> {
    FOOD_CLASSES
        .iter()
        .find(|(id, _)| *id == class_id)
        .map(|(_, name)| *name)
}

fn nms(mut detections: Vec<PixelDetection>, iou_threshold: f32) -> Vec<PixelDetection> {
    if detections.is_empty() {
        return detections;
    }

    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep = Vec::new();
    while !detections.is_empty() {
        let current = detections.remove(0);
        detections.retain(|det| pixel_iou(&current.bbox, &det.bbox) < iou_threshold);
        keep.push(current);
    }
    keep
}

fn pixel_iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 { intersection / union } else { 0.0 }
}

/// Convert raw pixel detections into normalized candidates, dropping
/// boxes that collapse or fall outside the frame.
pub fn to_candidates(
    detections: &[PixelDetection],
    width: u32,
    height: u32,
) -> Vec<DetectionCandidate> {
    let mut candidates = Vec::with_capacity(detections.len());
    for det in detections {
        match NormalizedBox::from_pixels(det.bbox, width, height) {
            Some(bbox) => {
                debug!(
                    "🎯 detector: {} (conf={:.2}) -> [{:.0},{:.0},{:.0},{:.0}]",
                    det.label, det.confidence, bbox.y_min, bbox.x_min, bbox.y_max, bbox.x_max
                );
                candidates.push(DetectionCandidate::from_detector(
                    det.label.clone(),
                    bbox,
                    det.confidence,
                ));
            }
            None => {
                debug!("skipping degenerate detector box for {:?}", det.label);
            }
        }
    }
    candidates
}

type DetectorFactory = Box<dyn Fn() -> Result<Arc<dyn BoxDetector>> + Send + Sync>;

/// Lazily-initialized, shared detector handle.
///
/// The model is expensive to load, so construction is deferred until the
/// first pipeline run needs it; the once-cell guarantees concurrent runs
/// cannot initialize it twice. Ownership lives with the process
/// bootstrap, which injects the handle into the orchestrator.
pub struct DetectorHandle {
    factory: DetectorFactory,
    cell: OnceCell<Arc<dyn BoxDetector>>,
}

impl DetectorHandle {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn BoxDetector>> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            cell: OnceCell::new(),
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        let config = config.clone();
        Self::new(move || {
            let detector = YoloFoodDetector::new(&config)?;
            Ok(Arc::new(detector) as Arc<dyn BoxDetector>)
        })
    }

    pub async fn get(&self) -> Result<Arc<dyn BoxDetector>> {
        let detector = self
            .cell
            .get_or_try_init(|| async { (self.factory)() })
            .await?;
        Ok(detector.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullDetector;

    impl BoxDetector for NullDetector {
        fn detect(&self, _image: &DynamicImage) -> Result<Vec<PixelDetection>> {
            Ok(Vec::new())
        }
    }

    fn det(label: &str, conf: f32, bbox: [f32; 4]) -> PixelDetection {
        PixelDetection {
            label: label.to_string(),
            confidence: conf,
            bbox,
        }
    }

    #[test]
    fn test_nms_suppresses_overlapping_boxes() {
        let dets = vec![
            det("apple", 0.9, [100.0, 100.0, 200.0, 200.0]),
            det("apple", 0.6, [105.0, 105.0, 205.0, 205.0]),
            det("banana", 0.8, [400.0, 400.0, 500.0, 500.0]),
        ];
        let kept = nms(dets, 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn test_to_candidates_normalizes_pixels() {
        // 640x480 image, box in the top-left quadrant.
        let dets = vec![det("carrot", 0.8, [64.0, 48.0, 192.0, 144.0])];
        let candidates = to_candidates(&dets, 640, 480);
        assert_eq!(candidates.len(), 1);
        let bbox = candidates[0].bounding_box.expect("box expected");
        assert_eq!(bbox.x_min, 100.0);
        assert_eq!(bbox.y_min, 100.0);
        assert_eq!(bbox.x_max, 300.0);
        assert_eq!(bbox.y_max, 300.0);
    }

    #[test]
    fn test_to_candidates_drops_degenerate_boxes() {
        let dets = vec![
            det("carrot", 0.8, [10.0, 10.0, 10.1, 10.1]),
            det("apple", 0.9, [0.0, 0.0, 320.0, 240.0]),
        ];
        let candidates = to_candidates(&dets, 640, 480);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].label, "apple");
    }

    #[test]
    fn test_food_class_lookup() {
        assert_eq!(class_name(51), Some("carrot"));
        assert_eq!(class_name(46), Some("banana"));
        // person / car are not inventory
        assert_eq!(class_name(0), None);
        assert_eq!(class_name(2), None);
    }

    #[tokio::test]
    async fn test_handle_initializes_once() {
        let inits = Arc::new(AtomicUsize::new(0));
        let counter = inits.clone();
        let handle = DetectorHandle::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(NullDetector) as Arc<dyn BoxDetector>)
        });

        handle.get().await.unwrap();
        handle.get().await.unwrap();
        assert_eq!(inits.load(Ordering::SeqCst), 1);
    }
}

// src/fusion.rs
//
// Detection fusion engine. Reconciles the detector's geometrically
// precise boxes with the classifier's semantically rich items into one
// inventory list: greedy IoU matching, detector-box substitution,
// fallback items for boxes the classifier missed, non-food filtering,
// and a confidence split into confirmed / unidentified.
//
// The engine never fails: either input may be empty and it degrades to
// whatever is available.

use tracing::{debug, info};

use crate::geometry::NormalizedBox;
use crate::types::{DetectionCandidate, FusedItem, FusionConfig};

#[derive(Debug, Default)]
pub struct FusionOutcome {
    pub confirmed: Vec<FusedItem>,
    pub unidentified: Vec<FusedItem>,
    pub filtered_non_food: usize,
    pub detector_fallbacks: usize,
}

/// Merge detector boxes and classifier items into partitioned fused items.
pub fn fuse(
    detector_boxes: &[DetectionCandidate],
    classifier_items: &[DetectionCandidate],
    config: &FusionConfig,
) -> FusionOutcome {
    let mut used = vec![false; detector_boxes.len()];
    let mut fused: Vec<FusedItem> = Vec::with_capacity(classifier_items.len());

    // Classifier items first; encounter order decides contested boxes.
    for item in classifier_items {
        let mut record = FusedItem::from_classifier(item);

        if let Some(item_box) = &item.bounding_box {
            if let Some(idx) =
                best_detector_match(item_box, detector_boxes, &used, config.iou_threshold)
            {
                used[idx] = true;
                debug!(
                    "🔗 matched {:?} to detector box {:?} (was {:?})",
                    item.label, detector_boxes[idx].bounding_box, item.bounding_box
                );
                // The detector's box is the geometrically reliable one;
                // semantics and confidence stay with the classifier.
                record.bounding_box = detector_boxes[idx].bounding_box;
                record.matched_with_detector = true;
            }
        }

        fused.push(record);
    }

    // Boxes the classifier never claimed become generic fallback items.
    let mut detector_fallbacks = 0;
    for (idx, detection) in detector_boxes.iter().enumerate() {
        if !used[idx] {
            debug!("📌 detector-only item {:?}", detection.label);
            fused.push(FusedItem::from_unmatched_detector(detection));
            detector_fallbacks += 1;
        }
    }

    // Containers, shelving and packaging are never inventory, no matter
    // how confident either source was.
    let before = fused.len();
    fused.retain(|item| !is_non_food(&item.name, &config.non_food_keywords));
    let filtered_non_food = before - fused.len();
    if filtered_non_food > 0 {
        info!("🚫 filtered {} non-food item(s)", filtered_non_food);
    }

    let mut outcome = FusionOutcome {
        filtered_non_food,
        detector_fallbacks,
        ..FusionOutcome::default()
    };
    for item in fused {
        if item.confidence >= config.confidence_threshold {
            outcome.confirmed.push(item);
        } else {
            outcome.unidentified.push(item);
        }
    }

    info!(
        "📊 fusion: {} confirmed / {} unidentified (threshold {:.2})",
        outcome.confirmed.len(),
        outcome.unidentified.len(),
        config.confidence_threshold
    );
    outcome
}

/// Highest-IoU unused detector box, accepted only above the threshold.
/// Strict comparison means equal-IoU contenders keep the earliest
/// winner.
fn best_detector_match(
    item_box: &NormalizedBox,
    detector_boxes: &[DetectionCandidate],
    used: &[bool],
    iou_threshold: f32,
) -> Option<usize> {
    let mut best_iou = iou_threshold;
    let mut best_idx = None;

    for (idx, detection) in detector_boxes.iter().enumerate() {
        if used[idx] {
            continue;
        }
        let Some(detector_box) = &detection.bounding_box else {
            continue;
        };
        let iou = item_box.iou(detector_box);
        if iou > best_iou {
            best_iou = iou;
            best_idx = Some(idx);
        }
    }

    best_idx
}

fn is_non_food(name: &str, keywords: &[String]) -> bool {
    let lowered = name.to_lowercase();
    keywords.iter().any(|kw| lowered.contains(&kw.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DetectionSource, DEFAULT_CATEGORY};

    fn config() -> FusionConfig {
        FusionConfig::default()
    }

    fn detector_box(label: &str, conf: f32, b: [f32; 4]) -> DetectionCandidate {
        DetectionCandidate::from_detector(
            label.to_string(),
            NormalizedBox::new(b[0], b[1], b[2], b[3]),
            conf,
        )
    }

    fn classifier_item(name: &str, conf: f32, b: Option<[f32; 4]>) -> DetectionCandidate {
        DetectionCandidate {
            label: name.to_string(),
            bounding_box: b.map(|b| NormalizedBox::new(b[0], b[1], b[2], b[3])),
            confidence: conf,
            source: DetectionSource::Classifier,
            category: Some("vegetable".to_string()),
            quantity: Some(1),
            unit: Some("piece".to_string()),
            freshness: Some("good".to_string()),
            packaging: Some("none".to_string()),
            expiry_text: None,
        }
    }

    #[test]
    fn test_geometric_match_adopts_detector_box() {
        // Scenario: overlapping carrot boxes from both sources.
        let detector = vec![detector_box("carrot", 0.80, [100.0, 100.0, 300.0, 300.0])];
        let classifier = vec![classifier_item("carrot", 0.90, Some([110.0, 105.0, 310.0, 290.0]))];

        let outcome = fuse(&detector, &classifier, &config());

        assert_eq!(outcome.confirmed.len(), 1);
        assert!(outcome.unidentified.is_empty());
        let item = &outcome.confirmed[0];
        assert_eq!(item.name, "carrot");
        assert_eq!(item.confidence, 0.90);
        assert!(item.matched_with_detector);
        let bbox = item.bounding_box.expect("matched item keeps a box");
        assert_eq!(
            (bbox.y_min, bbox.x_min, bbox.y_max, bbox.x_max),
            (100.0, 100.0, 300.0, 300.0)
        );
    }

    #[test]
    fn test_low_confidence_boxless_item_is_unidentified() {
        let classifier = vec![classifier_item("unknown_item", 0.20, None)];

        let outcome = fuse(&[], &classifier, &config());

        assert!(outcome.confirmed.is_empty());
        assert_eq!(outcome.unidentified.len(), 1);
        let item = &outcome.unidentified[0];
        assert!(item.bounding_box.is_none());
        assert!(!item.matched_with_detector);
    }

    #[test]
    fn test_unmatched_detector_box_becomes_fallback_item() {
        let detector = vec![detector_box("bottle", 0.75, [600.0, 600.0, 900.0, 800.0])];

        let outcome = fuse(&detector, &[], &config());

        assert_eq!(outcome.confirmed.len(), 1);
        assert_eq!(outcome.detector_fallbacks, 1);
        let item = &outcome.confirmed[0];
        assert_eq!(item.name, "bottle");
        assert_eq!(item.category, DEFAULT_CATEGORY);
        assert_eq!(item.quantity, 1);
        assert!(item.matched_with_detector);
        assert_eq!(item.confidence, 0.75);
    }

    #[test]
    fn test_non_food_names_are_filtered_everywhere() {
        let detector = vec![detector_box("bottle", 0.9, [0.0, 0.0, 100.0, 100.0])];
        let classifier = vec![
            classifier_item("refrigerator shelf", 0.95, Some([200.0, 200.0, 400.0, 400.0])),
            classifier_item("Plastic Bag", 0.99, None),
        ];

        let outcome = fuse(&detector, &classifier, &config());

        assert_eq!(outcome.filtered_non_food, 2);
        let all_names: Vec<&str> = outcome
            .confirmed
            .iter()
            .chain(outcome.unidentified.iter())
            .map(|i| i.name.as_str())
            .collect();
        assert_eq!(all_names, vec!["bottle"]);
    }

    #[test]
    fn test_detector_box_consumed_at_most_once() {
        // Two classifier items overlapping the same detector box: the
        // first claims it, the second keeps its own box.
        let detector = vec![detector_box("apple", 0.8, [100.0, 100.0, 300.0, 300.0])];
        let classifier = vec![
            classifier_item("apple", 0.9, Some([105.0, 105.0, 305.0, 305.0])),
            classifier_item("tomato", 0.85, Some([95.0, 95.0, 295.0, 295.0])),
        ];

        let outcome = fuse(&detector, &classifier, &config());

        assert_eq!(outcome.confirmed.len(), 2);
        let apple = outcome.confirmed.iter().find(|i| i.name == "apple").unwrap();
        let tomato = outcome.confirmed.iter().find(|i| i.name == "tomato").unwrap();
        assert!(apple.matched_with_detector);
        assert!(!tomato.matched_with_detector);
        let tomato_box = tomato.bounding_box.unwrap();
        assert_eq!(tomato_box.y_min, 95.0);
        // no fallback: the detector box was consumed
        assert_eq!(outcome.detector_fallbacks, 0);
    }

    #[test]
    fn test_below_iou_threshold_is_not_a_match() {
        let detector = vec![detector_box("apple", 0.8, [0.0, 0.0, 100.0, 100.0])];
        let classifier = vec![classifier_item("apple", 0.9, Some([95.0, 95.0, 400.0, 400.0]))];

        let outcome = fuse(&detector, &classifier, &config());

        // IoU of these boxes is tiny: the classifier item stands alone
        // and the detector box falls through as its own item.
        assert_eq!(outcome.confirmed.len(), 2);
        assert_eq!(outcome.detector_fallbacks, 1);
        let apple = outcome
            .confirmed
            .iter()
            .find(|i| i.name == "apple" && !i.matched_with_detector)
            .expect("classifier item unmatched");
        assert_eq!(apple.bounding_box.unwrap().y_max, 400.0);
    }

    #[test]
    fn test_partition_respects_threshold_boundary() {
        let classifier = vec![
            classifier_item("milk", 0.30, None),
            classifier_item("cheese", 0.29, None),
        ];

        let outcome = fuse(&[], &classifier, &config());

        assert_eq!(outcome.confirmed.len(), 1);
        assert_eq!(outcome.confirmed[0].name, "milk");
        assert_eq!(outcome.unidentified.len(), 1);
        assert_eq!(outcome.unidentified[0].name, "cheese");
    }

    #[test]
    fn test_both_inputs_empty_yields_empty_partitions() {
        let outcome = fuse(&[], &[], &config());
        assert!(outcome.confirmed.is_empty());
        assert!(outcome.unidentified.is_empty());
        assert_eq!(outcome.filtered_non_food, 0);
    }

    #[test]
    fn test_partitions_cover_all_surviving_items() {
        let detector = vec![
            detector_box("apple", 0.9, [0.0, 0.0, 100.0, 100.0]),
            detector_box("banana", 0.2, [200.0, 200.0, 300.0, 300.0]),
        ];
        let classifier = vec![
            classifier_item("apple", 0.95, Some([5.0, 5.0, 105.0, 105.0])),
            classifier_item("yogurt", 0.1, None),
        ];

        let outcome = fuse(&detector, &classifier, &config());

        // apple (matched), banana fallback, yogurt — nothing filtered.
        assert_eq!(outcome.confirmed.len() + outcome.unidentified.len(), 3);
        assert_eq!(outcome.filtered_non_food, 0);
    }
}

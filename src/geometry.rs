// src/geometry.rs
//
// Box math in the shared 0-1000 coordinate space. Both adapters hand
// the fusion engine boxes in this space; the detector converts from
// source-image pixels on the way in.

use serde::{Deserialize, Serialize};

/// Upper bound of the normalized coordinate space on both axes.
pub const COORD_MAX: f32 = 1000.0;

/// Axis-aligned bounding box in 0-1000 normalized coordinates.
///
/// Ordering follows the classifier wire format: [y_min, x_min, y_max, x_max].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub y_min: f32,
    pub x_min: f32,
    pub y_max: f32,
    pub x_max: f32,
}

impl NormalizedBox {
    pub fn new(y_min: f32, x_min: f32, y_max: f32, x_max: f32) -> Self {
        Self {
            y_min,
            x_min,
            y_max,
            x_max,
        }
    }

    /// All coordinates inside [0, 1000] and strictly positive extent on
    /// both axes.
    pub fn is_valid(&self) -> bool {
        let in_range = |v: f32| v.is_finite() && (0.0..=COORD_MAX).contains(&v);
        in_range(self.y_min)
            && in_range(self.x_min)
            && in_range(self.y_max)
            && in_range(self.x_max)
            && self.y_min < self.y_max
            && self.x_min < self.x_max
    }

    pub fn area(&self) -> f32 {
        (self.y_max - self.y_min) * (self.x_max - self.x_min)
    }

    /// Intersection over union. Zero for disjoint boxes, 1 for identical
    /// boxes, symmetric in its arguments.
    pub fn iou(&self, other: &NormalizedBox) -> f32 {
        let y_min = self.y_min.max(other.y_min);
        let x_min = self.x_min.max(other.x_min);
        let y_max = self.y_max.min(other.y_max);
        let x_max = self.x_max.min(other.x_max);

        let intersection = (y_max - y_min).max(0.0) * (x_max - x_min).max(0.0);
        if intersection == 0.0 {
            return 0.0;
        }

        let union = self.area() + other.area() - intersection;
        if union > 0.0 { intersection / union } else { 0.0 }
    }

    /// Convert a pixel-space box ([x1, y1, x2, y2], as detectors emit)
    /// into the 0-1000 space. Returns None when the result would be
    /// degenerate (e.g. a sub-pixel sliver collapsing under rounding).
    pub fn from_pixels(pixel_box: [f32; 4], width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let [x1, y1, x2, y2] = pixel_box;
        let scale_x = COORD_MAX / width as f32;
        let scale_y = COORD_MAX / height as f32;

        let clamp = |v: f32| v.round().clamp(0.0, COORD_MAX);
        let converted = Self {
            y_min: clamp(y1 * scale_y),
            x_min: clamp(x1 * scale_x),
            y_max: clamp(y2 * scale_y),
            x_max: clamp(x2 * scale_x),
        };

        converted.is_valid().then_some(converted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(y_min: f32, x_min: f32, y_max: f32, x_max: f32) -> NormalizedBox {
        NormalizedBox::new(y_min, x_min, y_max, x_max)
    }

    #[test]
    fn test_iou_identity() {
        let a = bbox(100.0, 100.0, 300.0, 300.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_symmetric() {
        let a = bbox(100.0, 100.0, 300.0, 300.0);
        let b = bbox(110.0, 105.0, 310.0, 290.0);
        assert!((a.iou(&b) - b.iou(&a)).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint_is_zero() {
        let a = bbox(0.0, 0.0, 100.0, 100.0);
        let b = bbox(500.0, 500.0, 600.0, 600.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_touching_edges_is_zero() {
        let a = bbox(0.0, 0.0, 100.0, 100.0);
        let b = bbox(0.0, 100.0, 100.0, 200.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        // b covers the right half of a, and a the left half of b:
        // intersection 50x100, union 150x100.
        let a = bbox(0.0, 0.0, 100.0, 100.0);
        let b = bbox(0.0, 50.0, 100.0, 150.0);
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_validity() {
        assert!(bbox(50.0, 30.0, 180.0, 150.0).is_valid());
        // inverted extents
        assert!(!bbox(300.0, 100.0, 100.0, 300.0).is_valid());
        // zero-height
        assert!(!bbox(100.0, 100.0, 100.0, 300.0).is_valid());
        // out of range
        assert!(!bbox(-5.0, 0.0, 100.0, 100.0).is_valid());
        assert!(!bbox(0.0, 0.0, 100.0, 1001.0).is_valid());
    }

    #[test]
    fn test_from_pixels_scales_and_rounds() {
        // 200x100 image, box covering the right half.
        let converted = NormalizedBox::from_pixels([100.0, 0.0, 200.0, 100.0], 200, 100)
            .expect("box should convert");
        assert_eq!(converted.x_min, 500.0);
        assert_eq!(converted.y_min, 0.0);
        assert_eq!(converted.x_max, 1000.0);
        assert_eq!(converted.y_max, 1000.0);
    }

    #[test]
    fn test_from_pixels_rejects_degenerate() {
        // Sub-pixel sliver collapses to zero width after rounding.
        assert!(NormalizedBox::from_pixels([10.0, 10.0, 10.2, 50.0], 1000, 1000).is_none());
        assert!(NormalizedBox::from_pixels([0.0, 0.0, 10.0, 10.0], 0, 100).is_none());
    }
}

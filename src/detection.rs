//! Per-frame detection input: bounding boxes + class labels + confidences,
//! as supplied by the external detection model.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BoundingBox {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    pub fn width(&self) -> f64 {
        (self.x1 - self.x0).abs()
    }

    pub fn height(&self) -> f64 {
        (self.y1 - self.y0).abs()
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        let (x0, x1) = (self.x0.min(self.x1), self.x0.max(self.x1));
        let (y0, y1) = (self.y0.min(self.y1), self.y0.max(self.y1));
        x >= x0 && x <= x1 && y >= y0 && y <= y1
    }

    /// Intersection-over-union against another box; 0.0 for disjoint boxes.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let ax0 = self.x0.min(self.x1);
        let ax1 = self.x0.max(self.x1);
        let ay0 = self.y0.min(self.y1);
        let ay1 = self.y0.max(self.y1);
        let bx0 = other.x0.min(other.x1);
        let bx1 = other.x0.max(other.x1);
        let by0 = other.y0.min(other.y1);
        let by1 = other.y0.max(other.y1);

        let ix0 = ax0.max(bx0);
        let iy0 = ay0.max(by0);
        let ix1 = ax1.min(bx1);
        let iy1 = ay1.min(by1);

        let iw = (ix1 - ix0).max(0.0);
        let ih = (iy1 - iy0).max(0.0);
        let intersection = iw * ih;
        if intersection <= 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// A single detection for the current frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class_name: String,
    pub confidence: f64,
}

/// The class lists consulted to decide whether a detection is eligible
/// for primary tracking (P1) or P2 target-enhancement association.
#[derive(Debug, Clone)]
pub enum ClassFilter {
    All,
    Named(Vec<String>),
}

impl ClassFilter {
    pub fn matches(&self, class_name: &str) -> bool {
        match self {
            ClassFilter::All => true,
            ClassFilter::Named(names) => names.iter().any(|n| n == class_name),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn class_filter_all_matches_anything() {
        assert!(ClassFilter::All.matches("boat"));
        assert!(ClassFilter::All.matches("anything"));
    }

    #[test]
    fn class_filter_named_is_exact() {
        let f = ClassFilter::Named(vec!["boat".to_string(), "person".to_string()]);
        assert!(f.matches("boat"));
        assert!(!f.matches("car"));
    }
}

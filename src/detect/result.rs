use std::cmp::Ordering;

use anyhow::{anyhow, Result};
use serde::Serialize;

/// Axis-aligned box in pixel coordinates, `x1 < x2` and `y1 < y2`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Result<Self> {
        let finite = [x1, y1, x2, y2].iter().all(|v| v.is_finite());
        if !finite || x1 >= x2 || y1 >= y2 {
            return Err(anyhow!(
                "degenerate bounding box ({}, {})-({}, {})",
                x1,
                y1,
                x2,
                y2
            ));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    /// Build from centre/size, the layout YOLO-style heads emit.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Result<Self> {
        Self::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    /// Clip to `[0, width] x [0, height]`. Fails if nothing remains.
    pub fn clamp_to(&self, width: u32, height: u32) -> Result<Self> {
        let (w, h) = (width as f32, height as f32);
        Self::new(
            self.x1.clamp(0.0, w),
            self.y1.clamp(0.0, h),
            self.x2.clamp(0.0, w),
            self.y2.clamp(0.0, h),
        )
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection over union.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Integer corners as drawn and reported.
    pub fn pixel_corners(&self) -> (i32, i32, i32, i32) {
        (
            self.x1 as i32,
            self.y1 as i32,
            self.x2 as i32,
            self.y2 as i32,
        )
    }
}

/// One labeled, localized, confidence-scored model output.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub class_id: usize,
    pub label: String,
    /// In `[0, 1]`.
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class_id: usize, label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            class_id,
            label: label.into(),
            confidence,
            bbox,
        }
    }

    /// Label matches and confidence is at or above the threshold.
    pub fn qualifies(&self, target_label: &str, confidence_threshold: f32) -> bool {
        self.label == target_label && self.confidence >= confidence_threshold
    }

    /// Alert text, e.g. `Class: person, Confidence: 0.90 at (10,20)-(110,220)`.
    pub fn details(&self) -> String {
        let (x1, y1, x2, y2) = self.bbox.pixel_corners();
        format!(
            "Class: {}, Confidence: {:.2} at ({},{})-({},{})",
            self.label, self.confidence, x1, y1, x2, y2
        )
    }
}

/// Greedy non-maximum suppression within each class.
///
/// Output is ordered by descending confidence.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let suppressed = keep.iter().any(|kept| {
            kept.class_id == candidate.class_id && kept.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}

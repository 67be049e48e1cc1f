use image::DynamicImage;

use crate::labels::DefectKind;

/// Axis-aligned box in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Box from a center point and size, as YOLO emits them.
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self {
            x1: cx - width / 2.0,
            y1: cy - height / 2.0,
            x2: cx + width / 2.0,
            y2: cy + height / 2.0,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn intersection(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);
        (x2 - x1).max(0.0) * (y2 - y1).max(0.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let union = self.area() + other.area() - self.intersection(other);
        if union <= 0.0 {
            0.0
        } else {
            self.intersection(other) / union
        }
    }

    /// Clamp into a `width` x `height` image.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self {
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
            x2: self.x2.clamp(0.0, w),
            y2: self.y2.clamp(0.0, h),
        }
    }
}

/// Raw model output.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Detection after the label map has been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledDetection {
    pub raw_name: String,
    pub label: String,
    pub kind: Option<DefectKind>,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Per-defect tally. Always holds all six kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefectCounts {
    counts: [usize; 6],
}

impl DefectCounts {
    pub fn get(&self, kind: DefectKind) -> usize {
        self.counts[kind.index()]
    }

    pub fn increment(&mut self, kind: DefectKind) {
        self.counts[kind.index()] += 1;
    }

    /// Count for a display label; `None` for labels outside the map.
    pub fn get_by_label(&self, label: &str) -> Option<usize> {
        DefectKind::from_display(label).map(|kind| self.get(kind))
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DefectKind, usize)> + '_ {
        DefectKind::ALL.into_iter().map(|kind| (kind, self.get(kind)))
    }

    /// `(display label, count)` pairs in display order.
    pub fn by_label(&self) -> Vec<(&'static str, usize)> {
        self.iter()
            .map(|(kind, count)| (kind.display_name(), count))
            .collect()
    }
}

/// Result of one detection run.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub annotated: DynamicImage,
    pub counts: DefectCounts,
    pub detections: Vec<LabeledDetection>,
}

impl Prediction {
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

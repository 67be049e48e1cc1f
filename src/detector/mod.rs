//! Detection wrapper: runs a model, applies the label map, tallies defects
//! and draws the annotated image.

mod yolo;

pub use yolo::{OnnxYolo, nms, parse_names_metadata, postprocess, preprocess};

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use image::DynamicImage;
use tracing::{debug, info};

use crate::annotate::Annotator;
use crate::config::AppConfig;
use crate::error::DetectError;
use crate::labels::{DefectKind, display_label};
use crate::models::{DefectCounts, Detection, LabeledDetection, Prediction};

/// The model boundary: an image in, zero or more pixel-space detections out.
pub trait ObjectDetector: Send {
    /// Class names indexed by class id.
    fn class_names(&self) -> &[String];

    /// Detections scoring at least `confidence`.
    fn detect(
        &mut self,
        image: &DynamicImage,
        confidence: f32,
    ) -> Result<Vec<Detection>, DetectError>;
}

pub type SharedDetector = Arc<Mutex<PcbDetector>>;

pub struct PcbDetector {
    model: Box<dyn ObjectDetector>,
    annotator: Annotator,
}

impl PcbDetector {
    pub fn new(model: Box<dyn ObjectDetector>) -> Self {
        Self {
            model,
            annotator: Annotator::default(),
        }
    }

    /// Load the ONNX model named by `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self, DetectError> {
        let model = OnnxYolo::load(config)?;
        Ok(Self::new(Box::new(model)))
    }

    pub fn into_shared(self) -> SharedDetector {
        Arc::new(Mutex::new(self))
    }

    pub fn class_names(&self) -> &[String] {
        self.model.class_names()
    }

    pub fn predict(&mut self, image_path: &Path, threshold: f32) -> Result<Prediction, DetectError> {
        let image = image::open(image_path).map_err(|source| DetectError::ImageRead {
            path: image_path.to_path_buf(),
            source,
        })?;
        debug!(
            "loaded {} ({}x{})",
            image_path.display(),
            image.width(),
            image.height()
        );
        self.predict_image(&image, threshold)
    }

    pub fn predict_image(
        &mut self,
        image: &DynamicImage,
        threshold: f32,
    ) -> Result<Prediction, DetectError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(DetectError::InvalidThreshold(threshold));
        }

        let start = Instant::now();
        let raw = self.model.detect(image, threshold)?;
        let detections = self.label(raw);

        let mut counts = DefectCounts::default();
        for detection in &detections {
            if let Some(kind) = detection.kind {
                counts.increment(kind);
            }
        }

        let annotated = self.annotator.annotate(image, &detections);
        info!(
            "detected {} boxes ({} counted defects) at threshold {:.2} in {:.1} ms",
            detections.len(),
            counts.total(),
            threshold,
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(Prediction {
            annotated,
            counts,
            detections,
        })
    }

    fn label(&self, detections: Vec<Detection>) -> Vec<LabeledDetection> {
        let names = self.model.class_names();
        detections
            .into_iter()
            .map(|detection| {
                let raw_name = names
                    .get(detection.class_id)
                    .cloned()
                    .unwrap_or_else(|| detection.class_id.to_string());
                LabeledDetection {
                    label: display_label(&raw_name),
                    kind: DefectKind::from_raw(&raw_name),
                    raw_name,
                    confidence: detection.confidence,
                    bbox: detection.bbox,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundingBox;
    use image::{Rgb, RgbImage};

    /// Replays a fixed set of detections, filtered by confidence.
    struct Scripted {
        names: Vec<String>,
        detections: Vec<Detection>,
    }

    impl Scripted {
        fn new(names: &[&str], detections: Vec<Detection>) -> Self {
            Self {
                names: names.iter().map(|n| n.to_string()).collect(),
                detections,
            }
        }
    }

    impl ObjectDetector for Scripted {
        fn class_names(&self) -> &[String] {
            &self.names
        }

        fn detect(
            &mut self,
            _image: &DynamicImage,
            confidence: f32,
        ) -> Result<Vec<Detection>, DetectError> {
            Ok(self
                .detections
                .iter()
                .filter(|d| d.confidence >= confidence)
                .cloned()
                .collect())
        }
    }

    fn det(class_id: usize, confidence: f32, x: f32) -> Detection {
        Detection {
            class_id,
            confidence,
            bbox: BoundingBox::new(x, 10.0, x + 20.0, 30.0),
        }
    }

    fn board() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(120, 60, Rgb([10, 80, 20])))
    }

    fn pcb_names() -> Vec<&'static str> {
        vec![
            "missing_hole",
            "mouse_bite",
            "open_circuit",
            "short",
            "spur",
            "spurious_copper",
        ]
    }

    #[test]
    fn counts_mapped_defects() {
        let model = Scripted::new(
            &pcb_names(),
            vec![det(0, 0.9, 0.0), det(3, 0.8, 30.0), det(3, 0.7, 60.0)],
        );
        let mut detector = PcbDetector::new(Box::new(model));
        let prediction = detector.predict_image(&board(), 0.5).unwrap();

        assert_eq!(prediction.counts.get(DefectKind::MissingHole), 1);
        assert_eq!(prediction.counts.get(DefectKind::ShortCircuit), 2);
        assert_eq!(prediction.counts.total(), 3);
        assert_eq!(prediction.detections[1].label, "Short Circuit");
    }

    #[test]
    fn unmapped_names_are_drawn_but_not_counted() {
        let mut names = pcb_names();
        names.push("scratch");
        let model = Scripted::new(&names, vec![det(6, 0.9, 10.0)]);
        let mut detector = PcbDetector::new(Box::new(model));
        let image = board();
        let prediction = detector.predict_image(&image, 0.5).unwrap();

        assert_eq!(prediction.counts, DefectCounts::default());
        assert_eq!(prediction.counts.by_label().len(), 6);
        assert_eq!(prediction.detections.len(), 1);
        assert_eq!(prediction.detections[0].label, "scratch");
        assert_eq!(prediction.detections[0].kind, None);
        assert_ne!(prediction.annotated.to_rgb8().as_raw(), image.to_rgb8().as_raw());
    }

    #[test]
    fn class_id_without_name_uses_the_id() {
        let model = Scripted::new(&["spur"], vec![det(4, 0.9, 10.0)]);
        let mut detector = PcbDetector::new(Box::new(model));
        let prediction = detector.predict_image(&board(), 0.1).unwrap();
        assert_eq!(prediction.detections[0].label, "4");
        assert_eq!(prediction.counts.total(), 0);
    }

    #[test]
    fn zero_detections_give_zero_counts_and_identical_image() {
        let model = Scripted::new(&pcb_names(), vec![det(2, 0.3, 0.0)]);
        let mut detector = PcbDetector::new(Box::new(model));
        let image = board();
        let prediction = detector.predict_image(&image, 0.5).unwrap();

        assert!(prediction.is_empty());
        assert!(prediction.counts.iter().all(|(_, count)| count == 0));
        assert_eq!(prediction.annotated.as_bytes(), image.as_bytes());
    }

    #[test]
    fn raising_threshold_never_increases_counts() {
        let detections = (0..30)
            .map(|i| det(i % 6, (i as f32) / 30.0, (i * 3) as f32))
            .collect();
        let mut detector = PcbDetector::new(Box::new(Scripted::new(&pcb_names(), detections)));
        let image = board();

        let mut previous: Option<Prediction> = None;
        for step in 0..=10 {
            let threshold = step as f32 / 10.0;
            let prediction = detector.predict_image(&image, threshold).unwrap();
            if let Some(prev) = &previous {
                assert!(prediction.detections.len() <= prev.detections.len());
                for kind in DefectKind::ALL {
                    assert!(prediction.counts.get(kind) <= prev.counts.get(kind));
                }
            }
            previous = Some(prediction);
        }
    }

    #[test]
    fn repeated_runs_are_deterministic() {
        let model = Scripted::new(&pcb_names(), vec![det(1, 0.9, 0.0), det(5, 0.6, 40.0)]);
        let mut detector = PcbDetector::new(Box::new(model));
        let image = board();
        let first = detector.predict_image(&image, 0.5).unwrap();
        let second = detector.predict_image(&image, 0.5).unwrap();
        assert_eq!(first.counts, second.counts);
        assert_eq!(first.annotated.as_bytes(), second.annotated.as_bytes());
    }

    #[test]
    fn rejects_thresholds_outside_unit_range() {
        let mut detector = PcbDetector::new(Box::new(Scripted::new(&pcb_names(), vec![])));
        let image = board();
        assert!(matches!(
            detector.predict_image(&image, 1.5),
            Err(DetectError::InvalidThreshold(_))
        ));
        assert!(matches!(
            detector.predict_image(&image, f32::NAN),
            Err(DetectError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn unreadable_path_is_a_file_error() {
        let mut detector = PcbDetector::new(Box::new(Scripted::new(&pcb_names(), vec![])));
        let err = detector
            .predict(Path::new("/no/such/board.png"), 0.5)
            .unwrap_err();
        assert!(err.is_file_error());
    }

    #[test]
    fn predicts_from_a_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.png");
        board().save(&path).unwrap();

        let model = Scripted::new(&pcb_names(), vec![det(4, 0.9, 5.0)]);
        let mut detector = PcbDetector::new(Box::new(model));
        let prediction = detector.predict(&path, 0.5).unwrap();
        assert_eq!(prediction.counts.get(DefectKind::Spur), 1);
        assert_eq!(prediction.annotated.width(), 120);
        assert_eq!(prediction.annotated.height(), 60);
    }
}

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageBuffer, Rgb};
use pcb_inspect::labels::default_class_names;
use pcb_inspect::models::{BoundingBox, Detection};
use pcb_inspect::{AppConfig, DetectError, InspectionApp, ObjectDetector, PcbDetector};
use tempfile::NamedTempFile;

/// Replays fixed detections, filtered by confidence.
pub struct ScriptedDetector {
    pub names: Vec<String>,
    pub detections: Vec<Detection>,
    pub fail: bool,
    /// Number of upcoming `detect` calls that panic.
    pub panics: usize,
}

impl ScriptedDetector {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            names: default_class_names(),
            detections,
            fail: false,
            panics: 0,
        }
    }

    pub fn panicking_once(detections: Vec<Detection>) -> Self {
        Self {
            panics: 1,
            ..Self::new(detections)
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }
}

impl ObjectDetector for ScriptedDetector {
    fn class_names(&self) -> &[String] {
        &self.names
    }

    fn detect(
        &mut self,
        _image: &DynamicImage,
        confidence: f32,
    ) -> Result<Vec<Detection>, DetectError> {
        if self.panics > 0 {
            self.panics -= 1;
            panic!("scripted detector panic");
        }
        if self.fail {
            return Err(DetectError::Unavailable("scripted failure".to_string()));
        }
        Ok(self
            .detections
            .iter()
            .filter(|d| d.confidence >= confidence)
            .cloned()
            .collect())
    }
}

pub fn detection(class_id: usize, confidence: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
    Detection {
        class_id,
        confidence,
        bbox: BoundingBox::new(x1, y1, x2, y2),
    }
}

/// Two shorts and a spur on a 100x100 board; the spur scores 0.6.
pub fn board_detections() -> Vec<Detection> {
    vec![
        detection(3, 0.9, 10.0, 10.0, 30.0, 30.0),
        detection(3, 0.8, 50.0, 50.0, 70.0, 70.0),
        detection(4, 0.6, 20.0, 60.0, 40.0, 80.0),
    ]
}

/// Defaults, with a placeholder path that does not exist.
pub fn test_config() -> AppConfig {
    AppConfig {
        placeholder_path: PathBuf::from("/nonexistent/whitebg.jpg"),
        ..AppConfig::default()
    }
}

pub fn app_with(detector: ScriptedDetector) -> InspectionApp {
    InspectionApp::new(test_config(), Ok(PcbDetector::new(Box::new(detector))))
}

/// Creates a 100x100 green test image and returns the temp file.
/// The file will be automatically cleaned up when dropped.
pub fn create_test_image() -> NamedTempFile {
    let file = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .expect("Failed to create temp image file");
    write_board(file.path(), 100, 100);
    file
}

pub fn write_board(path: &Path, width: u32, height: u32) {
    let img = ImageBuffer::from_fn(width, height, |_, _| Rgb([20u8, 90u8, 30u8]));
    img.save_with_format(path, image::ImageFormat::Png)
        .expect("Failed to save test image");
}

use eframe::egui;
use image::DynamicImage;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::{AppConfig, validate_threshold};
use crate::detector::{PcbDetector, SharedDetector};
use crate::error::{DetectError, ThresholdError};
use crate::models::{DefectCounts, Prediction};
use crate::ui::{central_panel, statistics_panel, top_panel};
use crate::utils::{IMAGE_EXTENSIONS, blank_placeholder, thumbnail, to_color_image};
use crate::viewer::ViewerWindow;

pub const APP_TITLE: &str = "PCB Inspection System";
pub const WINDOW_SIZE: [f32; 2] = [1100.0, 650.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub text: String,
    pub kind: StatusKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Original,
    Predicted,
}

impl Panel {
    pub fn viewer_title(self) -> &'static str {
        match self {
            Panel::Original => "Original Image",
            Panel::Predicted => "Prediction Image",
        }
    }
}

/// Parse the threshold entry.
pub fn parse_threshold(input: &str) -> Result<f32, ThresholdError> {
    let trimmed = input.trim();
    let value: f32 = trimmed
        .parse()
        .map_err(|_| ThresholdError::NotANumber(trimmed.to_string()))?;
    validate_threshold(value)
}

struct DetectionJob {
    path: PathBuf,
    receiver: Receiver<Result<Prediction, DetectError>>,
}

pub struct InspectionApp {
    pub config: AppConfig,
    pub current_image_path: Option<PathBuf>,
    pub original: Option<DynamicImage>,
    pub predicted: Option<DynamicImage>,
    pub counts: DefectCounts,
    pub score_threshold: f32,
    pub score_input: String,
    pub status_message: Option<StatusMessage>,
    detector: Result<SharedDetector, String>,
    placeholder: DynamicImage,
    original_texture: Option<egui::TextureHandle>,
    predicted_texture: Option<egui::TextureHandle>,
    placeholder_texture: Option<egui::TextureHandle>,
    viewers: Vec<ViewerWindow>,
    next_viewer: u64,
    job: Option<DetectionJob>,
}

impl InspectionApp {
    /// A failed model load is kept and reported when detection is requested.
    pub fn new(config: AppConfig, detector: Result<PcbDetector, DetectError>) -> Self {
        let detector = match detector {
            Ok(detector) => Ok(detector.into_shared()),
            Err(e) => {
                error!("model unavailable: {}", e);
                Err(e.to_string())
            }
        };

        let placeholder = match image::open(&config.placeholder_path) {
            Ok(img) => img,
            Err(e) => {
                warn!(
                    "placeholder {} unavailable ({}), using a blank image",
                    config.placeholder_path.display(),
                    e
                );
                blank_placeholder(config.preview_size)
            }
        };

        Self {
            score_threshold: config.score_threshold,
            config,
            current_image_path: None,
            original: None,
            predicted: None,
            counts: DefectCounts::default(),
            score_input: String::new(),
            status_message: None,
            detector,
            placeholder,
            original_texture: None,
            predicted_texture: None,
            placeholder_texture: None,
            viewers: Vec::new(),
            next_viewer: 0,
            job: None,
        }
    }

    pub fn show_status(&mut self, message: &str) {
        info!("{}", message);
        self.status_message = Some(StatusMessage {
            text: message.to_string(),
            kind: StatusKind::Info,
        });
    }

    pub fn show_error(&mut self, message: impl Display) {
        let text = message.to_string();
        error!("{}", text);
        self.status_message = Some(StatusMessage {
            text,
            kind: StatusKind::Error,
        });
    }

    pub fn detector_error(&self) -> Option<&str> {
        self.detector.as_ref().err().map(|e| e.as_str())
    }

    pub fn is_detecting(&self) -> bool {
        self.job.is_some()
    }

    pub fn viewers(&self) -> &[ViewerWindow] {
        &self.viewers
    }

    pub fn add_image(&mut self) {
        let picked = rfd::FileDialog::new()
            .set_title("Select PCB Image")
            .add_filter("Image Files", &IMAGE_EXTENSIONS[..])
            .pick_file();
        if let Some(path) = picked {
            // already reported through the status line
            let _ = self.load_image(&path);
        }
    }

    /// Replace the current image. The previous prediction and counts are discarded.
    pub fn load_image(&mut self, path: &Path) -> Result<(), DetectError> {
        match image::open(path) {
            Ok(img) => {
                self.current_image_path = Some(path.to_path_buf());
                self.original = Some(img);
                self.predicted = None;
                self.counts = DefectCounts::default();
                self.original_texture = None;
                self.predicted_texture = None;
                self.show_status(&format!("Loaded {}", path.display()));
                Ok(())
            }
            Err(source) => {
                let err = DetectError::ImageRead {
                    path: path.to_path_buf(),
                    source,
                };
                self.show_error(&err);
                Err(err)
            }
        }
    }

    pub fn change_score(&mut self) {
        match parse_threshold(&self.score_input) {
            Ok(value) => {
                self.score_threshold = value;
                self.show_status(&format!("Threshold set to {}", value));
            }
            Err(e) => self.show_error(format!("Invalid threshold: {}", e)),
        }
    }

    pub fn run_detection(&mut self) {
        let Some(path) = self.current_image_path.clone() else {
            self.show_status("Add an image first");
            return;
        };
        if self.job.is_some() {
            self.show_status("Detection already running");
            return;
        }
        let detector = match &self.detector {
            Ok(detector) => Arc::clone(detector),
            Err(e) => {
                let message = format!("Model not loaded: {}", e);
                self.show_error(message);
                return;
            }
        };

        let threshold = self.score_threshold;
        let (sender, receiver) = mpsc::channel();
        let worker_path = path.clone();
        let spawned = thread::Builder::new()
            .name("detection".to_string())
            .spawn(move || {
                // a panicked run leaves the detector usable
                let mut detector = detector.lock().unwrap_or_else(PoisonError::into_inner);
                let result = detector.predict(&worker_path, threshold);
                let _ = sender.send(result);
            });

        match spawned {
            Ok(_) => {
                self.job = Some(DetectionJob { path, receiver });
                self.show_status(&format!("Running detection at threshold {}", threshold));
            }
            Err(e) => self.show_error(format!("Failed to start detection: {}", e)),
        }
    }

    /// Collect a finished detection. With `block` set, waits for it.
    pub fn poll_detection(&mut self, block: bool) {
        let Some(job) = &self.job else {
            return;
        };
        let received = if block {
            job.receiver.recv().map_err(|_| TryRecvError::Disconnected)
        } else {
            job.receiver.try_recv()
        };

        match received {
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                self.job = None;
                self.show_error("Detection stopped unexpectedly");
            }
            Ok(result) => {
                if let Some(job) = self.job.take() {
                    self.finish_detection(job.path, result);
                }
            }
        }
    }

    fn finish_detection(&mut self, path: PathBuf, result: Result<Prediction, DetectError>) {
        if self.current_image_path.as_deref() != Some(path.as_path()) {
            info!("discarding result for replaced image {}", path.display());
            return;
        }

        match result {
            Ok(prediction) => {
                let summary = if prediction.is_empty() {
                    "No defects detected".to_string()
                } else {
                    format!(
                        "Found {} defects ({} boxes)",
                        prediction.counts.total(),
                        prediction.detections.len()
                    )
                };
                self.predicted = Some(prediction.annotated);
                self.counts = prediction.counts;
                self.predicted_texture = None;
                self.show_status(&summary);
            }
            Err(e) => self.show_error(format!("Detection failed: {}", e)),
        }
    }

    /// Open a fresh viewer over a panel's image, if there is one.
    pub fn open_viewer(&mut self, panel: Panel) {
        let image = match panel {
            Panel::Original => self.original.clone(),
            Panel::Predicted => self.predicted.clone(),
        };
        if let Some(image) = image {
            self.next_viewer += 1;
            self.viewers.push(ViewerWindow::new(
                self.next_viewer,
                panel.viewer_title(),
                image,
                self.config.zoom_step,
            ));
        }
    }

    pub(crate) fn preview_texture(&mut self, ctx: &egui::Context, panel: Panel) -> egui::TextureHandle {
        let size = self.config.preview_size;
        let (image, slot, name) = match panel {
            Panel::Original => (
                self.original.as_ref(),
                &mut self.original_texture,
                "original_preview",
            ),
            Panel::Predicted => (
                self.predicted.as_ref(),
                &mut self.predicted_texture,
                "predicted_preview",
            ),
        };

        match image {
            Some(image) => slot
                .get_or_insert_with(|| {
                    ctx.load_texture(name, to_color_image(&thumbnail(image, size)), Default::default())
                })
                .clone(),
            None => {
                let placeholder = &self.placeholder;
                self.placeholder_texture
                    .get_or_insert_with(|| {
                        ctx.load_texture(
                            "placeholder",
                            to_color_image(&thumbnail(placeholder, size)),
                            Default::default(),
                        )
                    })
                    .clone()
            }
        }
    }

    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        let open = egui::KeyboardShortcut::new(egui::Modifiers::COMMAND, egui::Key::O);
        let run = egui::KeyboardShortcut::new(egui::Modifiers::COMMAND, egui::Key::R);
        if ctx.input_mut(|i| i.consume_shortcut(&open)) {
            self.add_image();
        }
        if ctx.input_mut(|i| i.consume_shortcut(&run)) {
            self.run_detection();
        }
    }

    fn show_viewers(&mut self, ctx: &egui::Context) {
        let mut viewers = std::mem::take(&mut self.viewers);
        viewers.retain_mut(|viewer| viewer.show(ctx));
        self.viewers = viewers;
    }

    /// One frame of the whole interface.
    pub fn ui(&mut self, ctx: &egui::Context) {
        self.poll_detection(false);
        self.handle_shortcuts(ctx);

        top_panel(self, ctx);
        statistics_panel(self, ctx);
        central_panel(self, ctx);
        self.show_viewers(ctx);

        if self.job.is_some() {
            ctx.request_repaint_after(Duration::from_millis(50));
        }
    }
}

impl eframe::App for InspectionApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.ui(ctx);
    }
}

pub mod annotate;
pub mod app;
pub mod config;
pub mod detector;
pub mod error;
pub mod evaluation;
pub mod labels;
pub mod models;
pub mod ui;
pub mod utils;
pub mod viewer;

pub use app::InspectionApp;
pub use config::AppConfig;
pub use detector::{ObjectDetector, PcbDetector};
pub use error::DetectError;
pub use models::{DefectCounts, Prediction};

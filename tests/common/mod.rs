#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

pub use pcb_inspect::models::{BoundingBox, Detection};
pub use pcb_inspect::{AppConfig, DetectError, InspectionApp, ObjectDetector, PcbDetector};

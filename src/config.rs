use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ConfigError, ThresholdError};
use crate::labels::default_class_names;

pub const CONFIG_ENV: &str = "PCB_INSPECT_CONFIG";
pub const MODEL_ENV: &str = "PCB_INSPECT_MODEL";
pub const DEFAULT_CONFIG_FILE: &str = "pcb_inspect.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// ONNX export of the trained detector.
    pub model_path: PathBuf,
    /// Shown in the image panels before anything is loaded.
    pub placeholder_path: PathBuf,
    pub score_threshold: f32,
    /// IoU above which overlapping boxes of one class are suppressed.
    pub iou_threshold: f32,
    /// Model input side, used when the model declares a dynamic shape.
    pub input_size: u32,
    /// Raw class names, used when the model has no `names` metadata.
    pub class_names: Vec<String>,
    pub preview_size: u32,
    pub zoom_step: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/best.onnx"),
            placeholder_path: PathBuf::from("assets/whitebg.jpg"),
            score_threshold: 0.5,
            iou_threshold: 0.7,
            input_size: 640,
            class_names: default_class_names(),
            preview_size: 300,
            zoom_step: 1.1,
        }
    }
}

impl AppConfig {
    /// Load from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` for environment variables.
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let explicit = lookup(CONFIG_ENV).map(PathBuf::from);
        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.is_file() {
                    Self::from_file(path)?
                } else {
                    debug!("no {} found, using defaults", DEFAULT_CONFIG_FILE);
                    Self::default()
                }
            }
        };

        if let Some(model) = lookup(MODEL_ENV) {
            debug!("model path overridden by {}: {}", MODEL_ENV, model);
            config.model_path = PathBuf::from(model);
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: AppConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        validate_threshold(config.score_threshold).map_err(|source| ConfigError::Threshold {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(base) = path.parent() {
            config.model_path = resolve(base, &config.model_path);
            config.placeholder_path = resolve(base, &config.placeholder_path);
        }
        info!("loaded config from {}", path.display());
        Ok(config)
    }
}

/// Score thresholds live in [0, 1]; NaN is rejected.
pub fn validate_threshold(value: f32) -> Result<f32, ThresholdError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ThresholdError::OutOfRange(value))
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() || base.as_os_str().is_empty() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

use std::path::PathBuf;

use thiserror::Error;

/// Failures of a single detection run.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("cannot read image {path}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("model file not found: {0}")]
    ModelMissing(PathBuf),

    #[error("failed to load model {path}: {message}")]
    ModelLoad { path: PathBuf, message: String },

    #[error("inference failed: {0}")]
    Inference(#[from] ort::Error),

    #[error("invalid input tensor: {0}")]
    Tensor(#[from] ndarray::ShapeError),

    #[error("unexpected model output shape {0:?}")]
    OutputShape(Vec<usize>),

    #[error("confidence threshold {0} is outside [0, 1]")]
    InvalidThreshold(f32),

    #[error("detector unavailable: {0}")]
    Unavailable(String),
}

impl DetectError {
    /// True for errors caused by the image file rather than the model.
    pub fn is_file_error(&self) -> bool {
        matches!(self, DetectError::ImageRead { .. })
    }
}

/// Rejected threshold entry.
#[derive(Debug, Error, PartialEq)]
pub enum ThresholdError {
    #[error("\"{0}\" is not a number")]
    NotANumber(String),

    #[error("threshold {0} must be between 0 and 1")]
    OutOfRange(f32),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid score_threshold in {path}: {source}")]
    Threshold {
        path: PathBuf,
        #[source]
        source: ThresholdError,
    },
}

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("failed to read dataset description {path}: {source}")]
    DatasetRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse dataset description {path}: {source}")]
    DatasetParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("image directory {0} does not exist")]
    MissingImageDir(PathBuf),

    #[error("no images found in {0}")]
    NoImages(PathBuf),

    #[error(transparent)]
    Detect(#[from] DetectError),
}

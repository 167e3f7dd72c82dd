//! Error types for the inference server.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Main error type for the bersihin-inference library.
#[derive(Error, Debug)]
pub enum Error {
    /// The payload is not a decodable image.
    #[error("failed to decode image: {source}")]
    Decode {
        #[source]
        source: image::ImageError,
    },

    /// The payload was empty.
    #[error("image payload is empty")]
    EmptyImage,

    /// The image URL could not be fetched.
    #[error("failed to fetch image from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The image URL answered with a non-success status.
    #[error("failed to fetch image from {url}: server responded {status}")]
    FetchStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    /// The uploaded file could not be read.
    #[error("invalid upload: {reason}")]
    Upload { reason: String },

    /// Failed to load an ONNX model.
    #[error("failed to load ONNX model {path}: {source}")]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: ort::Error,
    },

    /// The model declares an input this server cannot feed.
    #[error("unsupported model input {dims:?}: {reason}")]
    UnsupportedInput { dims: Vec<i64>, reason: String },

    /// Model inference failed.
    #[error("model inference failed: {source}")]
    Inference {
        #[source]
        source: ort::Error,
    },

    /// Shape mismatch in tensor operations.
    #[error("tensor shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// The model produced no scores.
    #[error("model returned no scores")]
    EmptyOutput,

    /// A model pull is already running.
    #[error("Model is already being downloaded")]
    DownloadInProgress,

    /// Failed to download a model artifact.
    #[error("failed to download model from {url}: {source}")]
    ModelDownload {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The backend rejected or never received a verification report.
    #[error("failed to report submission {submission_id}: {reason}")]
    Report { submission_id: i64, reason: String },

    /// Settings could not be assembled.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A `.env` file exists but could not be read.
    #[error("failed to read environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },

    /// Invalid parameter value.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// A blocking worker died before returning.
    #[error("inference worker failed: {0}")]
    Worker(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure category reported to HTTP callers alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Decode,
    Fetch,
    Upload,
    Prediction,
    Conflict,
    Download,
    Report,
    Config,
    Internal,
}

impl Error {
    /// Category of this error as seen by callers.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode { .. } | Self::EmptyImage => ErrorKind::Decode,
            Self::Fetch { .. } | Self::FetchStatus { .. } => ErrorKind::Fetch,
            Self::Upload { .. } => ErrorKind::Upload,
            Self::Inference { .. }
            | Self::ShapeMismatch { .. }
            | Self::EmptyOutput
            | Self::UnsupportedInput { .. } => ErrorKind::Prediction,
            Self::DownloadInProgress => ErrorKind::Conflict,
            Self::ModelDownload { .. } | Self::ModelLoad { .. } => ErrorKind::Download,
            Self::Report { .. } => ErrorKind::Report,
            Self::Config(_) | Self::EnvFile { .. } | Self::InvalidParameter { .. } => {
                ErrorKind::Config
            }
            Self::Worker(_) | Self::Io(_) => ErrorKind::Internal,
        }
    }
}

/// Result type alias for bersihin-inference operations.
pub type Result<T> = std::result::Result<T, Error>;

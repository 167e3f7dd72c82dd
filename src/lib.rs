//! # `bersihin-inference`
//!
//! HTTP inference server for submission photos.
//!
//! An image arrives by URL or upload, is decoded, resized to the classifier's
//! declared input, normalized to [0, 1] and run through an ONNX model once.
//! Synchronous endpoints answer with the raw scores; the async endpoint turns
//! the first score into a `VERIFIED` / `REJECTED_BY_ML` decision and PUTs it
//! to the backend.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bersihin_inference::{OnnxModel, Pipeline, Settings};
//!
//! # fn main() -> bersihin_inference::Result<()> {
//! let settings = Settings::load()?;
//! let model = OnnxModel::load(&settings.model.path, &settings.model)?;
//! let pipeline = Pipeline::new(Arc::new(model));
//!
//! let bytes = std::fs::read("submission.jpg")?;
//! let prediction = pipeline.infer(&bytes)?;
//! println!("{}", prediction.decision()?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod fetch;
pub mod image;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod server;
pub mod verify;

pub use self::config::Settings;
pub use error::{Error, ErrorKind, Result};
pub use model::{OnnxModel, Predictor};
pub use pipeline::{Decision, InferenceOutcome, Pipeline, Prediction};

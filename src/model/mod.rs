//! Model loading, prediction and artifact pulls.

mod gate;
mod loader;
mod pull;

pub use gate::{DownloadGate, DownloadTicket};
pub use loader::OnnxModel;
pub use pull::ModelPuller;

use std::path::Path;

use crate::error::Result;
use crate::image::{ImageTensor, InputShape};

/// A classifier that turns an input tensor into an ordered list of scores.
///
/// Implementations are shared read-only across concurrent requests, so any
/// engine that needs exclusive access must serialize `predict` internally.
pub trait Predictor: Send + Sync {
    /// Declared spatial input of the model.
    fn input_shape(&self) -> InputShape;

    /// Run the model once and return the first batch row of its output.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails or the output is malformed.
    fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>>;

    /// Swap in the artifact stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the new artifact cannot be loaded.
    fn reload(&self, _path: &Path) -> Result<()> {
        Ok(())
    }
}

//! ONNX model loading and prediction.

use std::path::Path;
use std::sync::{Mutex, PoisonError, RwLock};

use ort::session::Session;
use ort::value::{Tensor, ValueType};

use crate::config::ModelSettings;
use crate::error::{Error, Result};
use crate::image::{ImageTensor, InputShape};

use super::Predictor;

/// An image classifier backed by an ONNX Runtime session.
///
/// `Session::run` needs exclusive access, so the session sits behind a mutex
/// that is held for the prediction call only. Decoding and resizing happen
/// before the lock is taken.
///
/// The session and the shape it was built for are swapped together under that
/// mutex; `shape` is a copy for readers that must not wait on a prediction.
pub struct OnnxModel {
    loaded: Mutex<LoadedSession>,
    shape: RwLock<InputShape>,
    shape_override: Option<InputShape>,
    intra_threads: usize,
}

struct LoadedSession {
    session: Session,
    shape: InputShape,
}

impl OnnxModel {
    /// Load the model at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be loaded or its input is not an
    /// RGB image tensor and no override is configured.
    pub fn load<P: AsRef<Path>>(path: P, settings: &ModelSettings) -> Result<Self> {
        let shape_override = settings.shape_override()?;
        let (session, shape) = open_session(path.as_ref(), settings.intra_threads, shape_override)?;

        Ok(Self {
            loaded: Mutex::new(LoadedSession { session, shape }),
            shape: RwLock::new(shape),
            shape_override,
            intra_threads: settings.intra_threads,
        })
    }
}

impl Predictor for OnnxModel {
    fn input_shape(&self) -> InputShape {
        *self.shape.read().unwrap_or_else(PoisonError::into_inner)
    }

    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>> {
        let input_value =
            Tensor::from_array(input.clone()).map_err(|source| Error::Inference { source })?;

        let mut loaded = self
            .loaded
            .lock()
            .map_err(|_| Error::Worker("model session lock poisoned".to_string()))?;

        // The session may have been reloaded since the tensor was built
        check_input(input, loaded.shape)?;

        let outputs = loaded
            .session
            .run(ort::inputs![input_value])
            .map_err(|source| Error::Inference { source })?;

        // Get first output
        let output = outputs
            .values()
            .next()
            .ok_or_else(|| Error::ShapeMismatch {
                expected: "score output".to_string(),
                actual: "no output".to_string(),
            })?;

        let (shape_info, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|source| Error::Inference { source })?;

        // Safe: tensor dimensions are always non-negative
        let batch = shape_info.first().map_or(1, |&b| (b as usize).max(1));
        let row_len = data.len() / batch;

        if row_len == 0 {
            return Err(Error::EmptyOutput);
        }

        Ok(data[..row_len].to_vec())
    }

    fn reload(&self, path: &Path) -> Result<()> {
        let (session, shape) = open_session(path, self.intra_threads, self.shape_override)?;

        let mut loaded = self
            .loaded
            .lock()
            .map_err(|_| Error::Worker("model session lock poisoned".to_string()))?;
        *loaded = LoadedSession { session, shape };
        *self.shape.write().unwrap_or_else(PoisonError::into_inner) = shape;
        drop(loaded);

        tracing::info!(
            path = %path.display(),
            width = shape.width,
            height = shape.height,
            "Model reloaded"
        );
        Ok(())
    }
}

/// Reject a tensor built for a different input shape.
fn check_input(input: &ImageTensor, shape: InputShape) -> Result<()> {
    let (batch, width, height, channels) = shape.tensor_dims();
    let expected = [batch, width, height, channels];

    if input.shape() == &expected[..] {
        Ok(())
    } else {
        Err(Error::ShapeMismatch {
            expected: format!("{expected:?}"),
            actual: format!("{:?}", input.shape()),
        })
    }
}

/// Build a session and work out the image shape it expects.
fn open_session(
    path: &Path,
    intra_threads: usize,
    shape_override: Option<InputShape>,
) -> Result<(Session, InputShape)> {
    let load_error = |source: ort::Error| Error::ModelLoad {
        path: path.to_path_buf(),
        source,
    };

    tracing::info!(path = %path.display(), threads = intra_threads, "Loading ONNX model");

    let session = Session::builder()
        .map_err(load_error)?
        .with_intra_threads(intra_threads)
        .map_err(load_error)?
        .commit_from_file(path)
        .map_err(load_error)?;

    let declared = declared_input_dims(&session);

    let shape = match shape_override {
        Some(shape) => shape,
        None => InputShape::from_dims(&declared)?,
    };

    tracing::info!(
        path = %path.display(),
        declared = ?declared,
        width = shape.width,
        height = shape.height,
        channels = shape.channels,
        "Model loaded successfully"
    );

    Ok((session, shape))
}

/// Dims of the first model input, empty if it is not a tensor.
fn declared_input_dims(session: &Session) -> Vec<i64> {
    session
        .inputs
        .first()
        .and_then(|input| match &input.input_type {
            ValueType::Tensor { shape, .. } => Some(shape.iter().copied().collect()),
            _ => None,
        })
        .unwrap_or_default()
}

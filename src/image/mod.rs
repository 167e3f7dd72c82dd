//! Image decoding and tensor conversion.

mod load;

pub use load::{decode_image, image_to_tensor, load_tensor};

use ndarray::Array4;
use serde::Serialize;

use crate::error::{Error, Result};

/// Model input tensor, shaped (1, width, height, channels).
/// Values are normalized to the [0, 1] range.
pub type ImageTensor = Array4<f32>;

/// Number of channels in RGB images.
pub const RGB_CHANNELS: usize = 3;

/// Spatial input a classifier expects, taken from its declared `input_shape[1:]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InputShape {
    pub width: u32,
    pub height: u32,
    pub channels: usize,
}

impl InputShape {
    /// Build a shape, rejecting zero sizes and non-RGB channel counts.
    ///
    /// # Errors
    ///
    /// Returns an error if any dimension is zero or `channels` is not 3.
    pub fn new(width: u32, height: u32, channels: usize) -> Result<Self> {
        let dims = vec![
            1,
            i64::from(width),
            i64::from(height),
            i64::try_from(channels).unwrap_or(i64::MAX),
        ];

        if width == 0 || height == 0 {
            return Err(Error::UnsupportedInput {
                dims,
                reason: "width and height must be positive".to_string(),
            });
        }

        if channels != RGB_CHANNELS {
            return Err(Error::UnsupportedInput {
                dims,
                reason: format!("expected {RGB_CHANNELS} channels"),
            });
        }

        Ok(Self {
            width,
            height,
            channels,
        })
    }

    /// Build a shape from a model's declared input dims `[batch, width, height, channels]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the rank is not 4 or a spatial dim is dynamic.
    pub fn from_dims(dims: &[i64]) -> Result<Self> {
        let unsupported = |reason: &str| Error::UnsupportedInput {
            dims: dims.to_vec(),
            reason: reason.to_string(),
        };

        let [_, width, height, channels] = dims else {
            return Err(unsupported("expected a 4D input"));
        };

        let width = u32::try_from(*width).map_err(|_| unsupported("dynamic width"))?;
        let height = u32::try_from(*height).map_err(|_| unsupported("dynamic height"))?;
        let channels = usize::try_from(*channels).map_err(|_| unsupported("dynamic channels"))?;

        Self::new(width, height, channels)
    }

    /// Full tensor shape including the batch dimension.
    #[must_use]
    pub const fn tensor_dims(&self) -> (usize, usize, usize, usize) {
        (1, self.width as usize, self.height as usize, self.channels)
    }
}

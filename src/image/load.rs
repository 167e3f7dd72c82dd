//! Image loading utilities.

use image::{imageops::FilterType, DynamicImage};
use ndarray::Array4;

use crate::error::{Error, Result};

use super::{ImageTensor, InputShape};

/// Decode a raw payload into an image.
///
/// # Errors
///
/// Returns an error if the payload is empty or not a supported raster format.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(Error::EmptyImage);
    }

    image::load_from_memory(bytes).map_err(|source| Error::Decode { source })
}

/// Decode a raw payload and convert it to a model input tensor.
///
/// # Errors
///
/// Returns an error if the payload cannot be decoded.
pub fn load_tensor(bytes: &[u8], shape: InputShape) -> Result<ImageTensor> {
    let img = decode_image(bytes)?;
    image_to_tensor(&img, shape)
}

/// Convert a `DynamicImage` to a normalized (1, W, H, C) tensor.
///
/// The image is:
/// 1. Resized to `shape.width` x `shape.height` with Catmull-Rom
/// 2. Converted to RGB
/// 3. Scaled from [0, 255] to [0, 1]
/// 4. Batched as (1, W, H, C)
///
/// The row-major RGB buffer is laid into (W, H) as-is, the way the
/// classifier was trained. For square inputs this is the usual (H, W) layout.
///
/// # Errors
///
/// Returns an error if the pixel buffer does not fill the tensor.
pub fn image_to_tensor(img: &DynamicImage, shape: InputShape) -> Result<ImageTensor> {
    let resized = img.resize_exact(shape.width, shape.height, FilterType::CatmullRom);
    let rgb = resized.to_rgb8();

    let data: Vec<f32> = rgb
        .into_raw()
        .into_iter()
        .map(|v| f32::from(v) / 255.0)
        .collect();

    let actual = data.len();
    Array4::from_shape_vec(shape.tensor_dims(), data).map_err(|_| Error::ShapeMismatch {
        expected: format!("{:?}", shape.tensor_dims()),
        actual: format!("{actual} values"),
    })
}

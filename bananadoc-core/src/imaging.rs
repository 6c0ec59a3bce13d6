//! Leaf image preprocessing into the classifier's input tensor layout.

use image::imageops::FilterType;

use crate::error::InputError;

/// Side length of the square model input.
pub const INPUT_SIZE: u32 = 224;

/// `[batch, height, width, channels]` shape of the classifier input.
pub fn input_shape() -> Vec<i64> {
    vec![1, INPUT_SIZE as i64, INPUT_SIZE as i64, 3]
}

/// Decode, convert to RGB, resize to 224×224 and scale pixels to `[-1, 1]`.
///
/// Output is row-major HWC, matching [`input_shape`].
pub fn preprocess(bytes: &[u8]) -> Result<Vec<f32>, InputError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| InputError::UndecodableImage(e.to_string()))?;

    let rgb = img
        .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::Triangle)
        .to_rgb8();

    Ok(rgb
        .into_raw()
        .into_iter()
        .map(|px| px as f32 / 127.5 - 1.0)
        .collect())
}

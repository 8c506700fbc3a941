//! Upload validation and image normalization.

use image::{imageops::FilterType, DynamicImage, RgbImage};
use ndarray::Array4;

use crate::error::PredictError;

/// Side length of the square input the classifier was trained on.
pub const IMAGE_SIZE: u32 = 128;

const ALLOWED_EXTENSIONS: [&str; 3] = [".jpg", ".jpeg", ".png"];

/// Accepts `.jpg`, `.jpeg` and `.png` names in any case. Content is not
/// inspected here.
pub fn validate_upload(filename: &str) -> Result<(), PredictError> {
    let filename = filename.to_ascii_lowercase();
    if ALLOWED_EXTENSIONS.iter().any(|ext| filename.ends_with(ext)) {
        Ok(())
    } else {
        Err(PredictError::UnsupportedFileType)
    }
}

/// Decodes `bytes` and resizes to `IMAGE_SIZE` x `IMAGE_SIZE` RGB.
///
/// Bicubic (Catmull-Rom) resampling matches the default of the pipeline the
/// model was trained with. Aspect ratio is not preserved.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, PredictError> {
    let img: DynamicImage = image::load_from_memory(bytes).map_err(|e| {
        tracing::debug!("Failed to decode upload: {}", e);
        PredictError::CorruptImage
    })?;

    let rgb = img.to_rgb8();
    Ok(image::imageops::resize(
        &rgb,
        IMAGE_SIZE,
        IMAGE_SIZE,
        FilterType::CatmullRom,
    ))
}

/// NHWC tensor of shape `[1, H, W, 3]` holding raw 0-255 channel values.
pub fn to_tensor(img: &RgbImage) -> Array4<f32> {
    let (width, height) = img.dimensions();
    Array4::from_shape_fn(
        (1, height as usize, width as usize, 3),
        |(_, y, x, c)| img.get_pixel(x as u32, y as u32)[c] as f32,
    )
}

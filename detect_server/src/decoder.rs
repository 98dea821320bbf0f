//! Decode uploaded image bytes.
//!
//! Frames are kept as interleaved RGB (`image::RgbImage`) from decoding, through drawing, to
//! encoding the response PNG.
use std::io::Cursor;

use image::{metadata::Orientation, DynamicImage, ImageDecoder, ImageReader, RgbImage};

use crate::error::PipelineError;

fn decode_error(err: impl ToString) -> PipelineError {
    PipelineError::Decode(err.to_string())
}

/// Decode an encoded image (PNG, JPEG, WebP, ...) into an RGB frame.
///
/// The format is guessed from the leading magic bytes. An EXIF orientation tag is applied, so
/// the frame is upright as a viewer would show it.
pub fn decode_image(data: &[u8]) -> Result<RgbImage, PipelineError> {
    if data.is_empty() {
        return Err(PipelineError::Decode("empty image data".into()));
    }

    let mut decoder = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(decode_error)?
        .into_decoder()
        .map_err(decode_error)?;
    let orientation = decoder.orientation().unwrap_or_else(|e| {
        log::debug!("Ignoring unreadable orientation: {}", e);
        Orientation::NoTransforms
    });

    let mut image = DynamicImage::from_decoder(decoder).map_err(decode_error)?;
    image.apply_orientation(orientation);
    log::debug!(
        "Decoded {}x{} image, orientation {:?}",
        image.width(),
        image.height(),
        orientation
    );

    Ok(image.to_rgb8())
}

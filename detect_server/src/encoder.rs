//! Encode annotated frames for the JSON response.
//!
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::{codecs::png::PngEncoder, ExtendedColorType, ImageEncoder, RgbImage};

use crate::error::PipelineError;
use common::protocol::{Detection, PredictionResponse};

/// Encode a frame as PNG with the encoder's default settings.
pub fn encode_png(frame: &RgbImage) -> Result<Vec<u8>, PipelineError> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(frame, frame.width(), frame.height(), ExtendedColorType::Rgb8)
        .map_err(|e| PipelineError::Encode(e.to_string()))?;

    Ok(buf)
}

/// Build a successful response from the annotated frame and its detections.
pub fn encode_response(
    frame: &RgbImage,
    detections: Vec<Detection>,
) -> Result<PredictionResponse, PipelineError> {
    let png = encode_png(frame)?;
    log::debug!("Encoded {} bytes of PNG", png.len());

    Ok(PredictionResponse::new(BASE64.encode(png), detections))
}

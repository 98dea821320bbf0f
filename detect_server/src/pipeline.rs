//! Decode, detect, annotate and encode a single frame.
//!
use common::protocol::PredictionResponse;

use crate::{
    decoder::decode_image,
    encoder::encode_response,
    error::PipelineError,
    models::ModelHost,
    normalize::{composite_max, normalize},
    render::Annotator,
};

/// Service object answering prediction requests.
///
/// Immutable after construction and shared between all request handlers.
pub struct Predictor {
    models: ModelHost,
    annotator: Annotator,
}

impl Predictor {
    pub fn new(models: ModelHost, annotator: Annotator) -> Self {
        Self { models, annotator }
    }

    /// Run the helmet and the seatbelt model on an uploaded image.
    ///
    /// Detections of the helmet model come first. The annotated images of both models are
    /// merged with a per-pixel maximum.
    pub fn predict_upload(&self, data: &[u8]) -> Result<PredictionResponse, PipelineError> {
        let frame = decode_image(data)?;

        let helmet_result = self.models.helmet.detect(&frame)?;
        let mut annotated = self.annotator.plot(&frame, &helmet_result);
        let mut detections = normalize(&helmet_result);

        let seatbelt_result = self.models.seatbelt.detect(&frame)?;
        let seatbelt_annotated = self.annotator.plot(&frame, &seatbelt_result);
        annotated = composite_max(&annotated, &seatbelt_annotated);
        detections.extend(normalize(&seatbelt_result));

        log::debug!(
            "Upload: {} helmet and {} seatbelt detections",
            helmet_result.boxes.len(),
            seatbelt_result.boxes.len()
        );

        encode_response(&annotated, detections)
    }

    /// Run the general model on a webcam frame.
    pub fn predict_webcam(&self, data: &[u8]) -> Result<PredictionResponse, PipelineError> {
        let frame = decode_image(data)?;

        let result = self.models.general.detect(&frame)?;
        let annotated = self.annotator.plot(&frame, &result);

        encode_response(&annotated, normalize(&result))
    }
}

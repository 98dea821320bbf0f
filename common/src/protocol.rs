//! JSON payloads exchanged over the prediction endpoints.
//!
use serde::{Deserialize, Serialize};

/// A single detected object.
///
/// `x`/`y` is the top-left corner in pixel coordinates of the submitted image.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Successful answer of `/predict` and `/predict-webcam`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PredictionResponse {
    pub success: bool,
    /// Base64-encoded PNG of the annotated frame.
    pub image: String,
    pub detections: Vec<Detection>,
}

impl PredictionResponse {
    pub fn new(image: String, detections: Vec<Detection>) -> Self {
        Self {
            success: true,
            image,
            detections,
        }
    }
}

/// Body of every non-2xx answer.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl ErrorResponse {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

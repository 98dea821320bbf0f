//! Endpoints of HTTP server.
//!
use std::sync::Arc;

use axum::{
    async_trait,
    body::{Body, Bytes},
    extract::{FromRequest, Multipart},
    http::{header, Request},
    Extension, Json,
};
use common::{protocol::PredictionResponse, FILE_FIELD};

use crate::{
    error::{ApiError, PipelineError},
    meter::METER,
    pipeline::Predictor,
};

/// Image bytes sent to a prediction endpoint.
///
/// Taken from the `file` field of a `multipart/form-data` body, or the raw body for any other
/// content type.
pub struct ImageUpload(pub Bytes);

#[async_trait]
impl<S> FromRequest<S, Body> for ImageUpload
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request<Body>, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(is_multipart_form)
            .unwrap_or(false);

        if !is_multipart {
            let data = Bytes::from_request(req, state)
                .await
                .map_err(|e| ApiError::rejected(e.status(), e.body_text()))?;
            return Ok(Self(data));
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| ApiError::rejected(e.status(), e.body_text()))?;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::rejected(e.status(), e.body_text()))?
        {
            if field.name() == Some(FILE_FIELD) {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::rejected(e.status(), e.body_text()))?;
                return Ok(Self(data));
            }
            log::debug!("Skipping form field {:?}", field.name());
        }

        Err(ApiError::unprocessable(format!(
            "missing form field `{}`",
            FILE_FIELD
        )))
    }
}

fn is_multipart_form(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default();
    essence.trim().eq_ignore_ascii_case("multipart/form-data")
}

/// Health check endpoint.
pub async fn healthcheck() -> &'static str {
    "healthy"
}

/// Helmet and seatbelt detection on an uploaded image.
pub async fn predict(
    Extension(predictor): Extension<Arc<Predictor>>,
    ImageUpload(data): ImageUpload,
) -> Result<Json<PredictionResponse>, ApiError> {
    log::info!("Upload of {} bytes received", data.len());

    let response = run_pipeline(move || predictor.predict_upload(&data)).await?;
    METER.tick_upload();
    log::info!("Upload answered with {} detections", response.detections.len());

    Ok(Json(response))
}

/// General object detection on a single webcam frame.
pub async fn predict_webcam(
    Extension(predictor): Extension<Arc<Predictor>>,
    ImageUpload(data): ImageUpload,
) -> Result<Json<PredictionResponse>, ApiError> {
    log::debug!("Webcam frame of {} bytes received", data.len());

    let response = run_pipeline(move || predictor.predict_webcam(&data)).await?;
    METER.tick_webcam();
    log::debug!(
        "Webcam frame answered with {} detections",
        response.detections.len()
    );

    Ok(Json(response))
}

/// Run the CPU heavy pipeline on the blocking thread pool.
async fn run_pipeline<F>(pipeline: F) -> Result<PredictionResponse, ApiError>
where
    F: FnOnce() -> Result<PredictionResponse, PipelineError> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(pipeline)
        .await
        .map_err(|e| PipelineError::Inference(e.to_string()))
        .and_then(|result| result);

    result.map_err(|err| {
        log::warn!("Prediction failed: {}", err);
        METER.tick_failure();
        ApiError::from(err)
    })
}

//! Error types of the detection pipeline and their HTTP representation.
//!
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::ErrorResponse;
use thiserror::Error;

/// Failure anywhere between receiving the image bytes and building the response.
///
/// The display output is the bare underlying message, since it is what ends up in the
/// `detail` field returned to the caller.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Decode(String),
    #[error("{0}")]
    Inference(String),
    #[error("{0}")]
    Encode(String),
}

/// Error answer of an endpoint.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    /// The request did not carry a usable image upload.
    pub fn unprocessable(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            detail: detail.into(),
        }
    }

    /// The request was turned down by a body extractor.
    ///
    /// Bodies that cannot be parsed are reported as unprocessable, any other status of the
    /// rejection (such as an exceeded size limit) is kept.
    pub fn rejected(status: StatusCode, detail: impl Into<String>) -> Self {
        let status = match status {
            StatusCode::BAD_REQUEST => StatusCode::UNPROCESSABLE_ENTITY,
            status => status,
        };
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self::internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse::new(self.detail))).into_response()
    }
}

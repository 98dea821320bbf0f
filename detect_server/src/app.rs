//! Assembly of the HTTP application.
//!
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Extension, Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::{
    config::Config,
    endpoints::{healthcheck, predict, predict_webcam},
    pipeline::Predictor,
};

/// Build the router serving all endpoints with the given predictor.
pub fn build_app(predictor: Arc<Predictor>, config: &Config) -> Result<Router> {
    let cors = cors_layer(&config.allowed_origins)?;

    Ok(Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/predict", post(predict))
        .route("/predict-webcam", post(predict_webcam))
        .layer(Extension(predictor))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors))
}

/// Allow credentialed requests with any method and header from the listed origins.
///
/// Methods and headers are mirrored from the preflight request since wildcards are not allowed
/// together with credentials.
fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).with_context(|| format!("invalid origin {origin:?}"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

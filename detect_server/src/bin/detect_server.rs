//! Detection server binary.
//!
use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use detect_server::{
    app::build_app, config::Config, meter::spawn_meter_logger, models::ModelHost,
    pipeline::Predictor, render::Annotator,
};
use env_logger::{Env, TimestampPrecision};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    // Setup logger
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    // Models are loaded before binding, a server without models must not start
    let models = ModelHost::load(&config)?;
    let annotator = Annotator::with_font_file(&config.font, config.color_scheme);
    let predictor = Arc::new(Predictor::new(models, annotator));

    spawn_meter_logger();

    // Build HTTP server with endpoints
    let app = build_app(predictor, &config)?;

    // Serve HTTP server
    let addr: SocketAddr = config
        .server_address
        .parse()
        .with_context(|| format!("invalid server address {}", config.server_address))?;
    log::info!("Serving on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

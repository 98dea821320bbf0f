//! Command line and environment configuration of the server.
//!
use std::path::PathBuf;

use clap::Parser;

use crate::{nn::ModelParams, render::ColorScheme};

/// Front-end origins allowed to call the API by default.
const DEFAULT_ORIGINS: [&str; 4] = [
    "http://localhost:3000",
    "http://127.0.0.1:3000",
    "http://localhost:8080",
    "http://127.0.0.1:8080",
];

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about = "Helmet and seatbelt detection server")]
pub struct Config {
    /// Address to serve HTTP on
    #[clap(long, env = "DETECT_SERVER_ADDRESS", default_value = "127.0.0.1:8000")]
    pub server_address: String,

    /// General model used for webcam frames
    #[clap(long, env = "DETECT_GENERAL_MODEL", default_value = "models/general.onnx")]
    pub general_model: PathBuf,

    /// Helmet model used for uploads
    #[clap(long, env = "DETECT_HELMET_MODEL", default_value = "models/helmet.onnx")]
    pub helmet_model: PathBuf,

    /// Seatbelt model used for uploads
    #[clap(long, env = "DETECT_SEATBELT_MODEL", default_value = "models/seatbelt.onnx")]
    pub seatbelt_model: PathBuf,

    /// Class names of the general model, one per line. Defaults to the model metadata.
    #[clap(long)]
    pub general_labels: Option<PathBuf>,

    /// Class names of the helmet model, one per line. Defaults to the model metadata.
    #[clap(long)]
    pub helmet_labels: Option<PathBuf>,

    /// Class names of the seatbelt model, one per line. Defaults to the model metadata.
    #[clap(long)]
    pub seatbelt_labels: Option<PathBuf>,

    /// Side length of the square model input
    #[clap(long, default_value_t = 640)]
    pub input_size: u32,

    /// Minimum confidence of reported detections
    #[clap(long, default_value_t = 0.25)]
    pub confidence: f32,

    /// Maximum overlap of two detections of the same class
    #[clap(long, default_value_t = 0.7)]
    pub iou: f32,

    /// Maximum number of detections per model and frame
    #[clap(long, default_value_t = 300)]
    pub max_detections: usize,

    /// Origins allowed for cross-origin requests, comma separated
    #[clap(
        long,
        env = "DETECT_ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_values_t = DEFAULT_ORIGINS.map(String::from)
    )]
    pub allowed_origins: Vec<String>,

    /// TrueType font for the box captions
    #[clap(long, env = "DETECT_FONT", default_value = "resources/DejaVuSansMono.ttf")]
    pub font: PathBuf,

    /// Colors of boxes and captions
    #[clap(long, value_enum, default_value_t = ColorScheme::Keyword)]
    pub color_scheme: ColorScheme,

    /// Maximum accepted request body size in bytes
    #[clap(long, default_value_t = 20 * 1024 * 1024)]
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn model_params(&self) -> ModelParams {
        ModelParams {
            input_size: self.input_size,
            min_confidence: self.confidence,
            max_iou: self.iou,
            max_detections: self.max_detections,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse_from(["detect_server"]);

        assert_eq!(config.allowed_origins.len(), 4);
        assert_eq!(config.allowed_origins[0], "http://localhost:3000");
        assert_eq!(config.color_scheme, ColorScheme::Keyword);

        let params = config.model_params();
        assert_eq!(params.input_size, 640);
        assert_eq!(params.min_confidence, 0.25);
    }

    #[test]
    fn test_origin_list() {
        let config = Config::parse_from([
            "detect_server",
            "--allowed-origins",
            "https://a.example,https://b.example",
            "--color-scheme",
            "palette",
        ]);

        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(config.color_scheme, ColorScheme::Palette);
    }
}

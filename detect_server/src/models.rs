//! Detection models known to the server.
//!
//! A model is anything implementing [`Detector`]. The server holds three of them in a
//! [`ModelHost`], loaded once at startup and shared read-only between requests.
use std::{collections::HashMap, path::Path, sync::Arc};

use anyhow::{Context, Result};
use image::RgbImage;

use crate::{config::Config, error::PipelineError, nn::YoloModel};

/// Mapping of class index to human readable label.
pub type ClassNames = HashMap<usize, String>;

/// One box as returned by a model, in pixel coordinates of the input frame.
#[derive(Clone, Debug, PartialEq)]
pub struct RawBox {
    pub class_id: usize,
    pub confidence: f32,
    /// `[x_top_left, y_top_left, x_bottom_right, y_bottom_right]`
    pub xyxy: [f32; 4],
}

/// Output of a single model run.
#[derive(Clone, Debug)]
pub struct RawResult {
    pub boxes: Vec<RawBox>,
    pub names: Arc<ClassNames>,
}

/// Object detector running on RGB frames.
///
/// Implementations are shared between concurrently handled requests.
pub trait Detector: Send + Sync {
    fn detect(&self, frame: &RgbImage) -> Result<RawResult, PipelineError>;
}

/// Read-only set of the models served by the endpoints.
#[derive(Clone)]
pub struct ModelHost {
    /// General model answering webcam frames
    pub general: Arc<dyn Detector>,
    pub helmet: Arc<dyn Detector>,
    pub seatbelt: Arc<dyn Detector>,
}

impl ModelHost {
    /// Load all models named in the configuration.
    ///
    /// Fails if any of the model files is missing or cannot be turned into a runnable plan.
    pub fn load(config: &Config) -> Result<Self> {
        let load = |kind: &str, model: &Path, labels: Option<&Path>| -> Result<Arc<dyn Detector>> {
            log::info!("Loading {} model from {}", kind, model.display());
            let model = YoloModel::new(model, labels, config.model_params())
                .with_context(|| format!("failed to load {} model", kind))?;
            Ok(Arc::new(model))
        };

        Ok(Self {
            general: load(
                "general",
                config.general_model.as_path(),
                config.general_labels.as_deref(),
            )?,
            helmet: load(
                "helmet",
                config.helmet_model.as_path(),
                config.helmet_labels.as_deref(),
            )?,
            seatbelt: load(
                "seatbelt",
                config.seatbelt_model.as_path(),
                config.seatbelt_labels.as_deref(),
            )?,
        })
    }
}

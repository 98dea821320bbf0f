//! HTTP client of the prediction endpoints.
//!
use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use clap::ValueEnum;
use common::{
    protocol::{Detection, ErrorResponse, PredictionResponse},
    FILE_FIELD,
};
use reqwest::multipart;

/// Server endpoint a frame is sent to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum Endpoint {
    /// Helmet and seatbelt models
    Upload,
    /// General model
    Webcam,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Upload => "/predict",
            Endpoint::Webcam => "/predict-webcam",
        }
    }
}

pub struct DetectClient {
    http: reqwest::Client,
    base_url: String,
}

impl DetectClient {
    /// Create a client for the server at `address`, with or without `http://` prefix.
    pub fn new(address: &str) -> Self {
        let address = address.trim_end_matches('/');
        let base_url = match address.starts_with("http://") || address.starts_with("https://") {
            true => address.to_owned(),
            false => format!("http://{}", address),
        };

        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    pub fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    /// Send one encoded image as the `file` form field.
    pub async fn send(
        &self,
        endpoint: Endpoint,
        name: &str,
        data: Vec<u8>,
    ) -> Result<PredictionResponse> {
        let part = multipart::Part::bytes(data).file_name(name.to_owned());
        let form = multipart::Form::new().part(FILE_FIELD, part);

        let response = self
            .http
            .post(self.url(endpoint))
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("failed to reach {}", self.base_url))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ErrorResponse>()
                .await
                .map(|error| error.detail)
                .unwrap_or_else(|_| "no detail".into());
            bail!("server answered {}: {}", status, detail);
        }

        Ok(response.json::<PredictionResponse>().await?)
    }
}

/// One-line overview of detections for logging.
pub fn summarize(detections: &[Detection]) -> String {
    if detections.is_empty() {
        return "nothing detected".into();
    }

    detections
        .iter()
        .map(|d| {
            format!(
                "{} {:.1}% at ({}, {}) {}x{}",
                d.label,
                d.confidence * 100.0,
                d.x,
                d.y,
                d.width,
                d.height
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Write the annotated PNG of a response to `dir/<name>.png`.
pub fn save_annotated(response: &PredictionResponse, dir: &Path, name: &str) -> Result<()> {
    let png = BASE64
        .decode(&response.image)
        .context("annotated image is not valid base64")?;

    let stem = Path::new(name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_owned());
    let path = dir.join(format!("{}.png", stem));
    fs::write(&path, png).with_context(|| format!("failed to write {}", path.display()))?;
    log::debug!("Annotated frame written to {}", path.display());

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn detection(label: &str) -> Detection {
        Detection {
            label: label.into(),
            confidence: 0.5,
            x: 1,
            y: 2,
            width: 3,
            height: 4,
        }
    }

    #[test]
    fn test_urls() {
        let client = DetectClient::new("127.0.0.1:8000/");
        assert_eq!(client.url(Endpoint::Upload), "http://127.0.0.1:8000/predict");

        let client = DetectClient::new("https://detect.example");
        assert_eq!(
            client.url(Endpoint::Webcam),
            "https://detect.example/predict-webcam"
        );
    }

    #[test]
    fn test_summarize() {
        assert_eq!(summarize(&[]), "nothing detected");
        assert_eq!(
            summarize(&[detection("helmet"), detection("seatbelt")]),
            "helmet 50.0% at (1, 2) 3x4, seatbelt 50.0% at (1, 2) 3x4"
        );
    }

    #[test]
    fn test_save_annotated() -> Result<()> {
        let dir = std::env::temp_dir().join(format!("annotated-{}", std::process::id()));
        fs::create_dir_all(&dir)?;

        let response = PredictionResponse::new(BASE64.encode(b"png bytes"), vec![]);
        save_annotated(&response, &dir, "street.jpg")?;
        assert_eq!(fs::read(dir.join("street.png"))?, b"png bytes");

        let broken = PredictionResponse::new("%%%".into(), vec![]);
        assert!(save_annotated(&broken, &dir, "broken.jpg").is_err());

        Ok(())
    }
}

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::StageError;

pub const DEFAULT_DETECT_ENDPOINT: &str =
    "https://translation.googleapis.com/language/translate/v2/detect";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LanguageVerdict {
    English,
    Spanish,
    Unknown,
}

impl LanguageVerdict {
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "en" => Self::English,
            "es" => Self::Spanish,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Spanish => "es",
            Self::Unknown => "unknown",
        }
    }
}

/// External language identification. Returns an ISO 639-1 code.
pub trait LanguageDetector {
    fn detect(&self, text: &str) -> Result<String, StageError>;
}

pub struct LanguageFilter {
    detector: Box<dyn LanguageDetector>,
}

impl LanguageFilter {
    pub fn new(detector: Box<dyn LanguageDetector>) -> Self {
        Self { detector }
    }

    /// Never fails: detector errors, timeouts and unsupported languages all
    /// come back as `Unknown`.
    pub fn classify(&self, title: &str) -> LanguageVerdict {
        match self.detector.detect(title) {
            Ok(code) => {
                let verdict = LanguageVerdict::from_code(&code);
                debug!(title, code = %code, verdict = verdict.as_str(), "language detected");
                verdict
            }
            Err(err) => {
                warn!(title, error = %err, "language detection failed");
                LanguageVerdict::Unknown
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorCredentials {
    pub api_key: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

fn default_endpoint() -> String {
    DEFAULT_DETECT_ENDPOINT.to_string()
}

impl DetectorCredentials {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read(path)
            .with_context(|| format!("failed to read credential file {}", path.display()))?;
        serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse credential file {}", path.display()))
    }
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    data: DetectData,
}

#[derive(Debug, Deserialize)]
struct DetectData {
    detections: Vec<Vec<Detection>>,
}

#[derive(Debug, Deserialize)]
struct Detection {
    language: String,
}

/// Detector backed by a translation API `detect` endpoint
/// (`POST ?key=..` with form field `q`).
pub struct HttpLanguageDetector {
    client: Client,
    credentials: DetectorCredentials,
}

impl HttpLanguageDetector {
    pub fn new(credentials: DetectorCredentials, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .context("failed to build language detection http client")?;
        Ok(Self {
            client,
            credentials,
        })
    }
}

impl LanguageDetector for HttpLanguageDetector {
    fn detect(&self, text: &str) -> Result<String, StageError> {
        let response = self
            .client
            .post(&self.credentials.endpoint)
            .query(&[("key", self.credentials.api_key.as_str())])
            .form(&[("q", text)])
            .send()
            .map_err(|err| StageError::TransientIo(format!("detect request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StageError::TransientIo(format!(
                "detect endpoint returned {status}"
            )));
        }

        let body: DetectResponse = response
            .json()
            .map_err(|err| StageError::MalformedInput(format!("detect response: {err}")))?;

        body.data
            .detections
            .into_iter()
            .flatten()
            .map(|detection| detection.language)
            .next()
            .ok_or_else(|| {
                StageError::MalformedInput("detect response had no detections".to_string())
            })
    }
}

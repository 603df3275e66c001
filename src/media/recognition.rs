//! Song recognition through an audio fingerprinting service.

use crate::config::RecognitionConfig;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// A recognized song.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Recognition {
    pub artist: String,
    pub title: String,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default, rename = "song_link")]
    pub link: Option<String>,
}

impl Recognition {
    pub fn display_name(&self) -> String {
        format!("{} - {}", self.artist, self.title)
    }
}

#[async_trait]
pub trait SongRecognizer: Send + Sync {
    /// Identify the song in an audio clip. `Ok(None)` means no match.
    async fn recognize(&self, audio: Vec<u8>, filename: &str) -> AppResult<Option<Recognition>>;
}

/// Client for AudD-compatible recognition endpoints.
#[derive(Debug, Clone)]
pub struct AuddRecognizer {
    config: RecognitionConfig,
    http: reqwest::Client,
}

impl AuddRecognizer {
    pub fn new(config: RecognitionConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { config, http }
    }
}

#[async_trait]
impl SongRecognizer for AuddRecognizer {
    async fn recognize(&self, audio: Vec<u8>, filename: &str) -> AppResult<Option<Recognition>> {
        debug!(filename, bytes = audio.len(), "Sending clip for recognition");

        let mut form = Form::new().part("file", Part::bytes(audio).file_name(filename.to_string()));
        if let Some(token) = &self.config.api_token {
            form = form.text("api_token", token.clone());
        }

        let response = self
            .http
            .post(&self.config.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout { operation: "recognize" }
                } else {
                    AppError::Http(e)
                }
            })?;
        let body = response.error_for_status()?.text().await?;

        let result = parse_response(&body)?;
        match &result {
            Some(song) => info!(song = %song.display_name(), "Recognized song"),
            None => info!("No match for clip"),
        }
        Ok(result)
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    result: Option<Recognition>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    error_message: Option<String>,
}

fn parse_response(body: &str) -> AppResult<Option<Recognition>> {
    let response: ApiResponse = serde_json::from_str(body)
        .map_err(|e| AppError::Recognition(format!("invalid response: {}", e)))?;

    if response.status == "success" {
        return Ok(response.result);
    }

    let message = response
        .error
        .map(|e| {
            format!(
                "{} (code {})",
                e.error_message.unwrap_or_else(|| "unknown error".into()),
                e.error_code.unwrap_or_default()
            )
        })
        .unwrap_or_else(|| format!("status {}", response.status));
    Err(AppError::Recognition(message))
}

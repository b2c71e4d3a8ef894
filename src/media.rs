use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use crate::error::{PulseError, Result};
use crate::validation::MediaAttachment;
use crate::MediaType;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub api_base: String,
    pub cloud_name: String,
    pub upload_preset: String,
    pub folder: String,
    pub timeout_ms: u64,
    /// Media links are cleared this many hours after posting. `None` keeps
    /// them forever.
    pub retention_hours: Option<u64>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.cloudinary.com/v1_1".to_string(),
            cloud_name: String::new(),
            upload_preset: "pulses".to_string(),
            folder: "pulse".to_string(),
            timeout_ms: 30_000,
            retention_hours: None,
        }
    }
}

impl MediaConfig {
    pub fn retention(&self) -> Option<chrono::Duration> {
        self.retention_hours
            .map(|hours| chrono::Duration::hours(hours.min(i64::MAX as u64 / 3600) as i64))
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

#[derive(Debug, Deserialize)]
struct UploadErrorBody {
    error: Option<UploadErrorMessage>,
}

#[derive(Debug, Deserialize)]
struct UploadErrorMessage {
    message: String,
}

#[derive(Clone)]
pub struct MediaUploader {
    api_base: String,
    cloud_name: String,
    upload_preset: String,
    folder: String,
    client: reqwest::Client,
}

impl MediaUploader {
    pub fn from_config(config: &MediaConfig) -> Result<Self> {
        if config.cloud_name.trim().is_empty() {
            return Err(PulseError::Config(
                "media.cloud_name is not set (PULSE_CLOUD_NAME)".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            api_base: config.api_base.clone(),
            cloud_name: config.cloud_name.clone(),
            upload_preset: config.upload_preset.clone(),
            folder: config.folder.clone(),
            client,
        })
    }

    pub fn upload_url(&self, kind: MediaType) -> String {
        format!(
            "{}/{}/{}/upload",
            self.api_base.trim_end_matches('/'),
            self.cloud_name,
            kind.resource_type()
        )
    }

    /// Uploads bytes under the configured preset and returns the durable URL.
    pub async fn upload(&self, kind: MediaType, file_name: &str, bytes: Vec<u8>) -> Result<String> {
        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name.to_string()))
            .text("upload_preset", self.upload_preset.clone())
            .text("folder", self.folder.clone());

        let response = self
            .client
            .post(self.upload_url(kind))
            .multipart(form)
            .send()
            .await
            .map_err(|err| PulseError::Upload(format!("request failed: {}", err)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<UploadErrorBody>(&body)
                .ok()
                .and_then(|parsed| parsed.error)
                .map(|error| error.message)
                .unwrap_or(body);
            return Err(PulseError::Upload(format!("{}: {}", status, message)));
        }

        let parsed: UploadResponse = response
            .json()
            .await
            .map_err(|err| PulseError::Upload(format!("response parse failed: {}", err)))?;
        tracing::info!(kind = kind.as_str(), url = %parsed.secure_url, "media uploaded");
        Ok(parsed.secure_url)
    }

    pub async fn upload_file(&self, path: &Path, kind: MediaType) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload")
            .to_string();
        self.upload(kind, &file_name, bytes).await
    }
}

/// Reads size metadata for a local file and guesses its kind from the
/// extension when none is given.
pub async fn describe_file(path: &Path, kind: Option<MediaType>) -> Result<MediaAttachment> {
    let metadata = tokio::fs::metadata(path).await?;
    let kind = match kind.or_else(|| guess_kind(path)) {
        Some(kind) => kind,
        None => {
            let mut errors = crate::ValidationErrors::new();
            errors.add(
                "media",
                "Unsupported file type. Please upload image, video, or audio.",
            );
            return Err(errors.into());
        }
    };
    Ok(MediaAttachment {
        kind,
        size_bytes: metadata.len(),
    })
}

pub fn guess_kind(path: &Path) -> Option<MediaType> {
    let extension = path.extension()?.to_str()?.to_lowercase();
    match extension.as_str() {
        "jpg" | "jpeg" | "png" | "gif" | "webp" | "heic" => Some(MediaType::Image),
        "mp4" | "mov" | "webm" | "mkv" | "m4v" => Some(MediaType::Video),
        "mp3" | "wav" | "ogg" | "m4a" | "aac" | "opus" => Some(MediaType::Audio),
        _ => None,
    }
}

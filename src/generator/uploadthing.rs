use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::UploadThingConfig;
use crate::error::{AppError, Result};
use crate::generator::AssetStore;

/// Decoded `UPLOADTHING_TOKEN`: base64 of a JSON object.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadThingToken {
    pub api_key: String,
    pub app_id: String,
    #[serde(default)]
    pub regions: Vec<String>,
}

impl UploadThingToken {
    pub fn decode(raw: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(raw.trim())
            .map_err(|e| AppError::Config(format!("UPLOADTHING_TOKEN is not valid base64: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AppError::Config(format!("UPLOADTHING_TOKEN is malformed: {e}")))
    }
}

pub struct UploadThingClient {
    client: Client,
    api_key: String,
    api_url: String,
}

impl UploadThingClient {
    pub fn new(config: &UploadThingConfig) -> Result<Self> {
        let token = UploadThingToken::decode(&config.token)?;
        tracing::debug!(app_id = %token.app_id, "UploadThing client configured");

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build UploadThing HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: token.api_key,
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    async fn prepare_upload(&self, request: &PrepareUploadRequest) -> Result<PrepareUploadResponse> {
        let response = self
            .client
            .post(format!("{}/v7/prepareUpload", self.api_url))
            .header("x-uploadthing-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::Upload(format!("prepareUpload request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upload(format!(
                "prepareUpload returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Upload(format!("Malformed prepareUpload response: {e}")))
    }
}

#[async_trait]
impl AssetStore for UploadThingClient {
    async fn upload(&self, bytes: Vec<u8>, filename: &str, mime_type: &str) -> Result<String> {
        let prepared = self
            .prepare_upload(&PrepareUploadRequest {
                file_name: filename.to_string(),
                file_size: bytes.len() as u64,
                file_type: mime_type.to_string(),
                content_disposition: "inline".to_string(),
                acl: "public-read".to_string(),
            })
            .await?;

        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime_type)
            .map_err(|e| AppError::Upload(format!("Invalid mime type {mime_type}: {e}")))?;

        let response = self
            .client
            .put(&prepared.url)
            .header("x-uploadthing-api-key", &self.api_key)
            .multipart(Form::new().part("file", part))
            .send()
            .await
            .map_err(|e| AppError::Upload(format!("File upload failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upload(format!("Upload returned {status}: {body}")));
        }

        let uploaded: UploadedFile = response
            .json()
            .await
            .map_err(|e| AppError::Upload(format!("Malformed upload response: {e}")))?;

        let url = uploaded
            .ufs_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AppError::Upload("UploadThing did not return a file URL".to_string()))?;

        tracing::debug!(key = %prepared.key, url = %url, "Uploaded file to UploadThing");
        Ok(url)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrepareUploadRequest {
    file_name: String,
    file_size: u64,
    file_type: String,
    content_disposition: String,
    acl: String,
}

#[derive(Debug, Deserialize)]
struct PrepareUploadResponse {
    key: String,
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadedFile {
    #[serde(default)]
    ufs_url: Option<String>,
}

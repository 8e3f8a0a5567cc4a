pub mod gemini;
pub mod uploadthing;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::workflow::types::GenerationResult;

use gemini::GeminiClient;

/// Produces one hosted candidate image for a prompt.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GenerationResult>;
}

/// Persists raw image bytes and returns a publicly resolvable URL.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>, filename: &str, mime_type: &str) -> Result<String>;
}

/// Renders with Gemini, then re-hosts the image through an [`AssetStore`].
pub struct GeminiGenerator {
    client: GeminiClient,
    store: Arc<dyn AssetStore>,
}

impl GeminiGenerator {
    pub fn new(client: GeminiClient, store: Arc<dyn AssetStore>) -> Self {
        Self { client, store }
    }
}

#[async_trait]
impl ImageGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<GenerationResult> {
        let image = self.client.generate_image(prompt).await.map_err(|e| {
            tracing::error!(error = %e, prompt = %prompt, "Error generating meme image");
            e
        })?;

        let filename = format!(
            "meme-{}.{}",
            chrono::Utc::now().timestamp_millis(),
            image.extension()
        );

        let image_url = self
            .store
            .upload(image.bytes, &filename, &image.mime_type)
            .await?;

        if image_url.is_empty() {
            return Err(AppError::Upload("Asset store returned an empty URL".to_string()));
        }

        tracing::info!(image_url = %image_url, "Meme candidate hosted");
        Ok(GenerationResult { image_url })
    }
}

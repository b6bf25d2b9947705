//! Gemini-backed image synthesis.
//!
//! Each call submits the *original* portrait plus one editing instruction
//! (inpainting style, never chained off a previous variation) and persists
//! the first inline image part of the response through the local store.

use super::client::{EncodedImage, GeminiClient, IMAGE_MODEL, Part};
use crate::image_store::LocalImageStore;
use crate::retry::{RetryPolicy, with_retries};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use restyle_core::config::GenerationConfig;
use restyle_core::error::{RestyleError, Result};
use restyle_core::provider::{ImageSource, ImageSynthesizer, ProgressSink};
use restyle_core::session::{GenerationProgress, GenerationStage, SwipeImage};
use std::sync::Arc;
use std::time::Duration;

pub struct GeminiSynthesizer {
    client: GeminiClient,
    store: Arc<LocalImageStore>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl GeminiSynthesizer {
    pub fn new(client: GeminiClient, store: Arc<LocalImageStore>) -> Self {
        Self {
            client,
            store,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Applies the retry and timeout budgets from the generation config.
    pub fn with_config(mut self, config: &GenerationConfig) -> Self {
        self.retry = RetryPolicy::new(
            config.max_attempts,
            Duration::from_secs(config.backoff_base_secs),
        );
        self.timeout = Duration::from_secs(config.synthesis_timeout_secs);
        self
    }

    /// One synthesis round against an already-encoded original.
    ///
    /// Transient failures and timeouts are retried under the policy; a
    /// response without an inline image part surfaces as `NoImage` without
    /// retrying, since re-sending the same prompt after a refusal just
    /// burns quota.
    async fn synthesize_encoded(
        &self,
        encoded: &EncodedImage,
        prompt: &str,
    ) -> Result<SwipeImage> {
        with_retries(&self.retry, "synthesize", |attempt| async move {
            tracing::debug!(
                "[GeminiSynthesizer] Requesting edit (attempt {}): {}",
                attempt,
                prompt
            );
            let parts = vec![Part::inline_image(encoded), Part::text(prompt)];
            let response = tokio::time::timeout(
                self.timeout,
                self.client.generate_content(IMAGE_MODEL, parts),
            )
            .await
            .map_err(|_| RestyleError::Timeout {
                seconds: self.timeout.as_secs(),
            })??;

            let inline = response.first_inline_image().ok_or(RestyleError::NoImage)?;
            let bytes = STANDARD.decode(&inline.data).map_err(|err| {
                RestyleError::provider_fatal(format!("image payload was not valid base64: {err}"))
            })?;
            let uri = self.store.persist(&bytes, &inline.mime_type).await?;
            Ok(SwipeImage::new(uri, prompt))
        })
        .await
    }
}

#[async_trait]
impl ImageSynthesizer for GeminiSynthesizer {
    async fn synthesize(&self, image: &ImageSource, prompt: &str) -> Result<SwipeImage> {
        let encoded = self.client.encode_image(image).await?;
        self.synthesize_encoded(&encoded, prompt).await
    }

    /// Overrides the default loop so the original image is encoded once and
    /// reused across every prompt in the batch.
    async fn synthesize_batch(
        &self,
        image: &ImageSource,
        prompts: &[String],
        on_progress: Option<ProgressSink>,
    ) -> Result<Vec<SwipeImage>> {
        let encoded = self.client.encode_image(image).await?;
        let total = prompts.len();
        let mut generated = Vec::new();
        for (index, prompt) in prompts.iter().enumerate() {
            match self.synthesize_encoded(&encoded, prompt).await {
                Ok(image) => {
                    tracing::info!(
                        "[GeminiSynthesizer] Image {}/{} saved",
                        index + 1,
                        total
                    );
                    generated.push(image);
                }
                Err(RestyleError::NoImage) => {
                    tracing::warn!(
                        "[GeminiSynthesizer] No image data in response for prompt {}/{}, skipping",
                        index + 1,
                        total
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        "[GeminiSynthesizer] Failed to generate image {}/{}: {}, skipping",
                        index + 1,
                        total,
                        err
                    );
                }
            }
            if let Some(sink) = on_progress.as_ref() {
                let completed = index + 1;
                let percent = ((completed as f64 / total as f64) * 100.0).round() as u8;
                sink(GenerationProgress::new(
                    GenerationStage::Generating,
                    percent,
                    format!("Generating image {completed} of {total}..."),
                ));
            }
        }
        tracing::info!(
            "[GeminiSynthesizer] Batch complete: {}/{} images generated",
            generated.len(),
            total
        );
        Ok(generated)
    }
}

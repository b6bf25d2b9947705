//! Generative provider seams.
//!
//! The session controller talks to two external model capabilities through
//! these traits: one that analyzes the portrait and writes editing prompts,
//! and one that applies a single editing prompt to the original photo.
//! Concrete Gemini-backed implementations live in `restyle-infrastructure`;
//! tests substitute mocks.

use crate::error::{RestyleError, Result};
use crate::session::{GenerationProgress, GenerationStage, ImageAnalysis, SwipeImage, VariationKind};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Opaque reference to readable image bytes.
///
/// The core never touches the bytes itself; adapters resolve the source
/// when they need to encode it for a provider request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Local file path
    Path(PathBuf),
    /// Remote URL (uploaded original)
    Url(String),
    /// `data:<mime>;base64,<payload>` reference
    DataUri(String),
}

impl ImageSource {
    /// Classifies an opaque image reference string.
    pub fn from_ref(image_ref: &str) -> Self {
        if image_ref.starts_with("data:") {
            Self::DataUri(image_ref.to_string())
        } else if image_ref.starts_with("http://") || image_ref.starts_with("https://") {
            Self::Url(image_ref.to_string())
        } else {
            let trimmed = image_ref.strip_prefix("file://").unwrap_or(image_ref);
            Self::Path(PathBuf::from(trimmed))
        }
    }
}

/// Result of the combined analysis + prompt-generation provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptPlan {
    pub analysis: ImageAnalysis,
    /// 1..=count editing instructions; never padded to the requested count
    pub prompts: Vec<String>,
}

/// Sink for incremental generation progress, invoked after each completed
/// (or skipped) prompt in a batch.
pub type ProgressSink = Arc<dyn Fn(GenerationProgress) + Send + Sync>;

/// Analyzes a portrait and produces editing instructions for it.
#[async_trait]
pub trait PromptProvider: Send + Sync {
    /// Issues one combined request for a structured analysis plus up to
    /// `count` distinct editing instructions.
    ///
    /// # Errors
    ///
    /// Returns a retryable `Provider` error for rate-limit/overload-class
    /// failures (the adapter has already exhausted its own retry budget by
    /// the time the caller sees it) and a non-retryable one for auth or
    /// request-shape failures.
    async fn analyze_and_generate_prompts(
        &self,
        image: &ImageSource,
        kind: VariationKind,
        count: usize,
    ) -> Result<PromptPlan>;
}

/// Applies one editing instruction to the original photo.
#[async_trait]
pub trait ImageSynthesizer: Send + Sync {
    /// Synthesizes a single variation. Each call edits the *original*
    /// image, never a previously generated variation, to avoid drift.
    async fn synthesize(&self, image: &ImageSource, prompt: &str) -> Result<SwipeImage>;

    /// Sequential convenience wrapper over [`synthesize`](Self::synthesize).
    ///
    /// Failures on individual prompts are logged and skipped, so the result
    /// holds between 0 and `prompts.len()` images; callers must not assume
    /// a 1:1 correspondence between input prompts and output images.
    async fn synthesize_batch(
        &self,
        image: &ImageSource,
        prompts: &[String],
        on_progress: Option<ProgressSink>,
    ) -> Result<Vec<SwipeImage>> {
        let total = prompts.len();
        let mut generated = Vec::new();
        for (index, prompt) in prompts.iter().enumerate() {
            match self.synthesize(image, prompt).await {
                Ok(swipe_image) => generated.push(swipe_image),
                Err(RestyleError::NoImage) => {
                    tracing::warn!(
                        "[Synthesizer] No image in response for prompt {}/{}, skipping",
                        index + 1,
                        total
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        "[Synthesizer] Failed to synthesize image {}/{}: {}, skipping",
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
        Ok(generated)
    }
}

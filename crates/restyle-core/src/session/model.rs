//! Swipe session domain model.
//!
//! This module contains the core `SwipeSession` entity that represents one
//! upload-to-swipe-completion run in the application's domain layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

/// The category of edit a session requests from the synthesis provider.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VariationKind {
    Hairstyle,
    Outfit,
}

/// Structured description of the subject extracted from the original photo.
///
/// All fields are free-text classifications; anything the provider did not
/// extract stays `"unknown"`. Immutable once attached to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageAnalysis {
    pub gender: String,
    pub age_range: String,
    pub hair_color: String,
    pub hair_length: String,
    pub hair_style: String,
    pub face_shape: String,
    pub skin_tone: String,
    pub eye_color: String,
    pub body_type: String,
    pub clothing_style: String,
    pub overall_style: String,
}

impl Default for ImageAnalysis {
    fn default() -> Self {
        let unknown = || "unknown".to_string();
        Self {
            gender: unknown(),
            age_range: unknown(),
            hair_color: unknown(),
            hair_length: unknown(),
            hair_style: unknown(),
            face_shape: unknown(),
            skin_tone: unknown(),
            eye_color: unknown(),
            body_type: unknown(),
            clothing_style: unknown(),
            overall_style: unknown(),
        }
    }
}

/// One generated variation of the original photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwipeImage {
    /// Unique image identifier (UUID format)
    pub id: String,
    /// Reference to the generated bytes (local path, data URI, or remote URL)
    pub uri: String,
    /// The editing instruction that produced this image
    pub prompt: String,
    /// Set exactly once when the image is swiped; never reset
    pub is_liked: bool,
    /// Timestamp of synthesis completion
    pub generated_at: DateTime<Utc>,
}

impl SwipeImage {
    /// Creates a freshly synthesized, not-yet-swiped image.
    pub fn new(uri: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            uri: uri.into(),
            prompt: prompt.into(),
            is_liked: false,
            generated_at: Utc::now(),
        }
    }
}

/// Pipeline stage reported alongside generation progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GenerationStage {
    Analyzing,
    Prompting,
    Generating,
}

/// Transient progress record for UI display; cleared on completion or idle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationProgress {
    pub stage: GenerationStage,
    /// 0..=100
    pub percent: u8,
    pub message: String,
}

impl GenerationProgress {
    pub fn new(stage: GenerationStage, percent: u8, message: impl Into<String>) -> Self {
        Self {
            stage,
            percent,
            message: message.into(),
        }
    }
}

/// One user's generation-and-swipe run.
///
/// Invariants upheld by the controller (never by ad hoc field writes):
/// - `0 <= cursor <= images.len() <= prompts.len()` once prompts are set
/// - `images` is append-only and ordered by prompt index
/// - `liked_images` is a subset of `images`, ordered by when the like
///   decisions were made
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwipeSession {
    /// Unique session identifier (UUID format)
    pub id: String,
    /// Opaque reference to the source photo; immutable after creation
    pub original_image_ref: String,
    /// Durable URL if the photo was uploaded to blob storage first
    #[serde(default)]
    pub uploaded_ref: Option<String>,
    /// The category of edit; immutable after creation
    pub variation_kind: VariationKind,
    /// Set once, after the first provider call succeeds
    #[serde(default)]
    pub analysis: Option<ImageAnalysis>,
    /// Ordered editing instructions, consumed by index
    #[serde(default)]
    pub prompts: Vec<String>,
    /// Generated variations, append-only, in prompt order
    #[serde(default)]
    pub images: Vec<SwipeImage>,
    /// Index of the next image to present to the user
    #[serde(default)]
    pub cursor: usize,
    /// Images the user swiped right on, in swipe order
    #[serde(default)]
    pub liked_images: Vec<SwipeImage>,
    /// True while any provider call for this session is in flight
    #[serde(default)]
    pub is_generating: bool,
    /// Transient progress record for UI display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<GenerationProgress>,
    /// Dismissible session-level error message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Creation timestamp, immutable
    pub created_at: DateTime<Utc>,
}

impl SwipeSession {
    /// Creates a fresh session for the given source photo.
    pub fn new(
        original_image_ref: impl Into<String>,
        uploaded_ref: Option<String>,
        variation_kind: VariationKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            original_image_ref: original_image_ref.into(),
            uploaded_ref,
            variation_kind,
            analysis: None,
            prompts: Vec::new(),
            images: Vec::new(),
            cursor: 0,
            liked_images: Vec::new(),
            is_generating: false,
            progress: None,
            last_error: None,
            created_at: Utc::now(),
        }
    }

    /// Number of images the user swiped right on.
    pub fn liked_count(&self) -> usize {
        self.liked_images.len()
    }

    /// Already-synthesized images not yet shown.
    pub fn remaining(&self) -> usize {
        self.images.len().saturating_sub(self.cursor)
    }

    /// Whether every requested prompt has been consumed by synthesis.
    pub fn prompts_exhausted(&self) -> bool {
        !self.prompts.is_empty() && self.images.len() >= self.prompts.len()
    }

    /// The image currently presented to the user, if any.
    pub fn current_image(&self) -> Option<&SwipeImage> {
        self.images.get(self.cursor)
    }
}

//! Tuning knobs for the generation pipeline and secret configuration.

use serde::{Deserialize, Serialize};

/// Pacing and budget configuration for a swipe session.
///
/// The defaults mirror the production pacing: ten prompts per session, a
/// two-image look-ahead buffer refilled whenever it runs low, twenty images
/// before a session counts as complete, and five extra images per
/// "generate more" round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// How many editing prompts to request at session initialization
    pub prompt_count: usize,
    /// How many images to synthesize up front before the session is swipeable
    pub initial_buffer: usize,
    /// Refill the look-ahead buffer when `images.len() - cursor` drops to this
    pub lookahead_low_water: usize,
    /// Sessions are complete once this many images have been swiped through
    pub max_images: usize,
    /// How many additional prompts a "generate more" round requests
    pub more_batch: usize,
    /// Per-call budget for one image synthesis request
    pub synthesis_timeout_secs: u64,
    /// Attempts per provider call before giving up
    pub max_attempts: u32,
    /// First backoff delay; doubles on every subsequent attempt
    pub backoff_base_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            prompt_count: 10,
            initial_buffer: 2,
            lookahead_low_water: 2,
            max_images: 20,
            more_batch: 5,
            synthesis_timeout_secs: 60,
            max_attempts: 3,
            backoff_base_secs: 2,
        }
    }
}

/// Secret configuration (API keys).
///
/// Loaded by the infrastructure layer from the environment or from the
/// user's secret file. Never log the contents of this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretConfig {
    pub gemini_api_key: String,
}

//! Gemini-backed provider adapters.
//!
//! - `client`: shared `generateContent` HTTP client and wire types
//! - `prompt_provider`: combined analysis + prompt generation adapter
//! - `synthesizer`: per-prompt image editing adapter

mod client;
mod prompt_provider;
mod synthesizer;

pub use client::{GeminiClient, IMAGE_MODEL, TEXT_MODEL};
pub use prompt_provider::GeminiPromptProvider;
pub use synthesizer::GeminiSynthesizer;

//! Infrastructure implementations for the Restyle engine: Gemini provider
//! adapters, local image storage, JSON session history, and secret loading.

pub mod gemini;
pub mod image_store;
pub mod json_session_repository;
pub mod retry;
pub mod secret_service;

pub use gemini::{GeminiClient, GeminiPromptProvider, GeminiSynthesizer};
pub use image_store::LocalImageStore;
pub use json_session_repository::JsonSessionRepository;
pub use retry::RetryPolicy;
pub use secret_service::SecretStore;

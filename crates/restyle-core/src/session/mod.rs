//! Session domain module.
//!
//! This module contains the swipe session domain model, repository
//! interface, and the controller that owns the active session.
//!
//! # Module Structure
//!
//! - `model`: Core domain types (`SwipeSession`, `SwipeImage`, `ImageAnalysis`)
//! - `repository`: Repository trait for session history persistence
//! - `controller`: Session lifecycle and generation pacing (`SwipeController`)

mod controller;
mod model;
mod repository;

// Re-export public API
pub use controller::SwipeController;
pub use model::{
    GenerationProgress, GenerationStage, ImageAnalysis, SwipeImage, SwipeSession, VariationKind,
};
pub use repository::SessionRepository;

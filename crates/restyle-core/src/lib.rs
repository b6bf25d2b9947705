//! Core domain and orchestration engine for Restyle.
//!
//! Restyle lets a user upload a portrait photo, generates a sequence of
//! stylistic variations (hairstyle or outfit edits) through an external
//! generative model, and presents them one at a time through a swipe
//! interface. This crate holds the part with real engineering weight: the
//! session controller that paces incremental generation against a slow,
//! rate-limited provider while the user keeps swiping, plus the trait seams
//! it talks through.

pub mod config;
pub mod error;
pub mod provider;
pub mod session;

// Re-export common error type
pub use error::{RestyleError, Result};

//! Session repository trait.
//!
//! Defines the interface for session history persistence.

use super::model::SwipeSession;
use crate::error::Result;
use async_trait::async_trait;

/// An abstract repository for the swipe session history.
///
/// Semantics are append-only: finished (or abandoned) sessions are appended
/// to a history list, never upserted. The controller treats persistence as
/// best effort; repository failures are logged there and never surface to
/// the swiping or generation paths.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Appends a session to the stored history.
    async fn append(&self, session: &SwipeSession) -> Result<()>;

    /// Lists all stored sessions, oldest first.
    async fn list_all(&self) -> Result<Vec<SwipeSession>>;
}

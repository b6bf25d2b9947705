//! Swipe session controller.
//!
//! `SwipeController` is the single owner of the active `SwipeSession`. All
//! mutation funnels through its named operations; the presentation layer is
//! a read-only observer (snapshots plus a progress channel) and an intent
//! dispatcher. Generation runs as a background task relative to user
//! interaction but stays internally sequential: one synthesis call at a
//! time, appended in prompt order.

use super::model::{
    GenerationProgress, GenerationStage, SwipeSession, VariationKind,
};
use super::repository::SessionRepository;
use crate::config::GenerationConfig;
use crate::error::{RestyleError, Result};
use crate::provider::{ImageSource, ImageSynthesizer, PromptProvider};
use std::sync::{Arc, Mutex};
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;

struct SwipeState {
    /// The single active session, if any
    current: Option<SwipeSession>,
    /// Previously saved sessions loaded from the repository
    history: Vec<SwipeSession>,
}

/// Orchestrates the lifecycle of a swipe session: initialization against the
/// prompt provider, progressive look-ahead image synthesis, swipe decisions,
/// and opportunistic persistence.
///
/// # Concurrency
///
/// One logical session is active at a time. State lives behind a `RwLock`
/// that is never held across a provider await; every mutation after an await
/// re-validates that the session it belongs to is still current, so results
/// of in-flight calls for a cleared or replaced session are dropped.
pub struct SwipeController {
    state: RwLock<SwipeState>,
    prompt_provider: Arc<dyn PromptProvider>,
    synthesizer: Arc<dyn ImageSynthesizer>,
    repository: Arc<dyn SessionRepository>,
    config: GenerationConfig,
    progress_tx: watch::Sender<Option<GenerationProgress>>,
    /// Single-flight guard for background look-ahead generation
    lookahead: Mutex<Option<JoinHandle<()>>>,
}

impl SwipeController {
    /// Creates a new controller wired to the given providers and repository.
    pub fn new(
        prompt_provider: Arc<dyn PromptProvider>,
        synthesizer: Arc<dyn ImageSynthesizer>,
        repository: Arc<dyn SessionRepository>,
        config: GenerationConfig,
    ) -> Arc<Self> {
        let (progress_tx, _) = watch::channel(None);
        Arc::new(Self {
            state: RwLock::new(SwipeState {
                current: None,
                history: Vec::new(),
            }),
            prompt_provider,
            synthesizer,
            repository,
            config,
            progress_tx,
            lookahead: Mutex::new(None),
        })
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Starts a new session, fully replacing any previous one.
    ///
    /// The previous session is dropped without being persisted; callers
    /// wanting durability must invoke [`save_session`](Self::save_session)
    /// first. Returns the new session id.
    pub async fn start_session(
        &self,
        image_ref: impl Into<String>,
        uploaded_ref: Option<String>,
        kind: VariationKind,
    ) -> String {
        let session = SwipeSession::new(image_ref.into(), uploaded_ref, kind);
        let id = session.id.clone();
        let mut state = self.state.write().await;
        if let Some(previous) = state.current.take() {
            tracing::debug!(
                "[SwipeController] Replacing session {} with {}",
                previous.id,
                id
            );
        }
        state.current = Some(session);
        drop(state);
        self.progress_tx.send_replace(None);
        tracing::info!("[SwipeController] Started session {} ({})", id, kind);
        id
    }

    /// Drops the current session from active state.
    ///
    /// Any in-flight generation for it resolves against a stale session id
    /// and its result is discarded.
    pub async fn clear_session(&self) {
        let mut state = self.state.write().await;
        if let Some(session) = state.current.take() {
            tracing::info!("[SwipeController] Cleared session {}", session.id);
        }
        drop(state);
        self.progress_tx.send_replace(None);
    }

    /// Clears a dismissible session-level error, returning the session to
    /// its pre-error state without losing already-generated images.
    pub async fn dismiss_error(&self) {
        let mut state = self.state.write().await;
        if let Some(session) = state.current.as_mut() {
            session.last_error = None;
        }
    }

    // ========================================================================
    // Generation
    // ========================================================================

    /// Runs session initialization: one combined analysis + prompt call,
    /// then synthesis of the initial look-ahead buffer.
    ///
    /// No-op if there is no current session or a provider call is already
    /// in flight. Any failure here is fatal to the session: the error is
    /// attached as a dismissible message and also returned.
    pub async fn initialize_generation(self: &Arc<Self>) -> Result<()> {
        let (session_id, source, kind) = {
            let mut state = self.state.write().await;
            let Some(session) = state.current.as_mut() else {
                tracing::debug!("[SwipeController] initialize_generation: no session");
                return Ok(());
            };
            if session.is_generating {
                tracing::debug!("[SwipeController] initialize_generation: already generating");
                return Ok(());
            }
            session.is_generating = true;
            session.last_error = None;
            let progress = GenerationProgress::new(
                GenerationStage::Analyzing,
                0,
                "Analyzing your photo...",
            );
            session.progress = Some(progress.clone());
            self.progress_tx.send_replace(Some(progress));
            (
                session.id.clone(),
                ImageSource::from_ref(&session.original_image_ref),
                session.variation_kind,
            )
        };

        let plan = match self
            .prompt_provider
            .analyze_and_generate_prompts(&source, kind, self.config.prompt_count)
            .await
        {
            Ok(plan) => plan,
            Err(err) => {
                self.fail_session(&session_id, &err).await;
                return Err(err);
            }
        };
        if plan.prompts.is_empty() {
            let err = RestyleError::provider_fatal("provider returned no usable prompts");
            self.fail_session(&session_id, &err).await;
            return Err(err);
        }

        let (prompts, buffer_len) = {
            let mut state = self.state.write().await;
            let Some(session) = current_session(&mut state, &session_id) else {
                return Ok(());
            };
            let mut prompts = plan.prompts;
            prompts.truncate(self.config.prompt_count);
            session.analysis = Some(plan.analysis);
            session.prompts = prompts.clone();
            let progress = GenerationProgress::new(
                GenerationStage::Prompting,
                0,
                format!("Prepared {} editing prompts", prompts.len()),
            );
            session.progress = Some(progress.clone());
            self.progress_tx.send_replace(Some(progress));
            let buffer_len = self.config.initial_buffer.min(prompts.len());
            (prompts, buffer_len)
        };

        for index in 0..buffer_len {
            let image = match self.synthesizer.synthesize(&source, &prompts[index]).await {
                Ok(image) => image,
                Err(err) => {
                    self.fail_session(&session_id, &err).await;
                    return Err(err);
                }
            };
            let mut state = self.state.write().await;
            let Some(session) = current_session(&mut state, &session_id) else {
                return Ok(());
            };
            if session.images.len() != index {
                tracing::warn!(
                    "[SwipeController] Dropping out-of-order image for index {}",
                    index
                );
                return Ok(());
            }
            session.images.push(image);
            let percent =
                ((index as f64 + 1.0) / buffer_len as f64 * 100.0).round() as u8;
            let progress = GenerationProgress::new(
                GenerationStage::Generating,
                percent,
                format!("Generating image {} of {}...", index + 1, buffer_len),
            );
            session.progress = Some(progress.clone());
            self.progress_tx.send_replace(Some(progress));
        }

        let mut state = self.state.write().await;
        if let Some(session) = current_session(&mut state, &session_id) {
            session.is_generating = false;
            session.progress = None;
        }
        drop(state);
        self.progress_tx.send_replace(None);
        tracing::info!("[SwipeController] Session {} initialized", session_id);
        Ok(())
    }

    /// Synthesizes exactly one image for the next unconsumed prompt and
    /// appends it.
    ///
    /// No-op (returning `false`) if there is no session, no prompts, every
    /// prompt already has an image, or a provider call is in flight.
    /// Failures are logged and swallowed: one missing look-ahead image must
    /// not abort an otherwise-healthy session.
    pub async fn generate_next_image(self: &Arc<Self>) -> bool {
        let (session_id, source, index, prompt) = {
            let mut state = self.state.write().await;
            let Some(session) = state.current.as_mut() else {
                return false;
            };
            if session.prompts.is_empty()
                || session.images.len() >= session.prompts.len()
                || session.is_generating
            {
                return false;
            }
            let index = session.images.len();
            session.is_generating = true;
            (
                session.id.clone(),
                ImageSource::from_ref(&session.original_image_ref),
                index,
                session.prompts[index].clone(),
            )
        };

        let result = self.synthesizer.synthesize(&source, &prompt).await;

        let mut state = self.state.write().await;
        let Some(session) = current_session(&mut state, &session_id) else {
            tracing::debug!(
                "[SwipeController] Discarding image for stale session {}",
                session_id
            );
            return false;
        };
        session.is_generating = false;
        match result {
            Ok(image) if session.images.len() == index => {
                session.images.push(image);
                true
            }
            Ok(_) => {
                tracing::warn!(
                    "[SwipeController] Dropping out-of-order image for index {}",
                    index
                );
                false
            }
            Err(err) => {
                tracing::warn!(
                    "[SwipeController] Look-ahead generation for index {} failed: {}",
                    index,
                    err
                );
                false
            }
        }
    }

    /// Generates five additional images after the user has expressed at
    /// least one preference.
    ///
    /// Re-runs analysis on the original image to produce the extra prompts,
    /// appends them to the session's prompt list, then synthesizes them
    /// sequentially, skipping individual failures and publishing per-image
    /// progress into the session snapshot. Any in-flight background
    /// look-ahead is waited out first instead of counting as a busy no-op.
    /// Returns the number of images appended.
    pub async fn generate_more_images(self: &Arc<Self>) -> Result<usize> {
        self.wait_for_pending_generation().await;
        let (session_id, source, kind) = {
            let mut state = self.state.write().await;
            let Some(session) = state.current.as_mut() else {
                tracing::debug!("[SwipeController] generate_more_images: no session");
                return Ok(0);
            };
            if session.liked_images.is_empty() {
                tracing::debug!("[SwipeController] generate_more_images: no liked images yet");
                return Ok(0);
            }
            if session.is_generating {
                tracing::debug!("[SwipeController] generate_more_images: already generating");
                return Ok(0);
            }
            session.is_generating = true;
            session.last_error = None;
            let progress = GenerationProgress::new(
                GenerationStage::Analyzing,
                0,
                "Preparing more variations...",
            );
            session.progress = Some(progress.clone());
            self.progress_tx.send_replace(Some(progress));
            (
                session.id.clone(),
                ImageSource::from_ref(&session.original_image_ref),
                session.variation_kind,
            )
        };

        let plan = match self
            .prompt_provider
            .analyze_and_generate_prompts(&source, kind, self.config.more_batch)
            .await
        {
            Ok(plan) => plan,
            Err(err) => {
                self.fail_session(&session_id, &err).await;
                return Err(err);
            }
        };

        let new_prompts = {
            let mut state = self.state.write().await;
            let Some(session) = current_session(&mut state, &session_id) else {
                return Ok(0);
            };
            let mut prompts = plan.prompts;
            prompts.truncate(self.config.more_batch);
            // New prompts land before any synthesis, so images.len() never
            // exceeds prompts.len(). A skipped prompt leaves a hole: images
            // stays shorter than prompts, and later look-ahead resumes by
            // count, not by which prompt failed.
            session.prompts.extend(prompts.iter().cloned());
            prompts
        };

        let total = new_prompts.len();
        let mut appended = 0usize;
        for (offset, prompt) in new_prompts.iter().enumerate() {
            let result = self.synthesizer.synthesize(&source, prompt).await;
            let mut state = self.state.write().await;
            let Some(session) = current_session(&mut state, &session_id) else {
                return Ok(appended);
            };
            match result {
                Ok(image) => {
                    session.images.push(image);
                    appended += 1;
                }
                Err(RestyleError::NoImage) => {
                    tracing::warn!(
                        "[SwipeController] No image data for extra prompt {}/{}, skipping",
                        offset + 1,
                        total
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        "[SwipeController] Failed to generate extra image {}/{}: {}, skipping",
                        offset + 1,
                        total,
                        err
                    );
                }
            }
            let completed = offset + 1;
            let percent = ((completed as f64 / total as f64) * 100.0).round() as u8;
            let progress = GenerationProgress::new(
                GenerationStage::Generating,
                percent,
                format!("Generating image {completed} of {total}..."),
            );
            session.progress = Some(progress.clone());
            self.progress_tx.send_replace(Some(progress));
        }

        let mut state = self.state.write().await;
        if let Some(session) = current_session(&mut state, &session_id) {
            session.is_generating = false;
            session.progress = None;
        }
        drop(state);
        self.progress_tx.send_replace(None);
        tracing::info!(
            "[SwipeController] Appended {} more images to session {}",
            appended,
            session_id
        );
        Ok(appended)
    }

    // ========================================================================
    // Swiping
    // ========================================================================

    /// Records a dislike for the current image and advances the cursor.
    ///
    /// Defensive no-op (returning `false`) when the cursor already sits past
    /// the last synthesized image.
    pub async fn swipe_left(self: &Arc<Self>) -> bool {
        self.swipe(false).await
    }

    /// Records a like for the current image and advances the cursor.
    pub async fn swipe_right(self: &Arc<Self>) -> bool {
        self.swipe(true).await
    }

    async fn swipe(self: &Arc<Self>, liked: bool) -> bool {
        let advanced = {
            let mut state = self.state.write().await;
            let Some(session) = state.current.as_mut() else {
                return false;
            };
            if session.cursor >= session.images.len() {
                return false;
            }
            let cursor = session.cursor;
            session.images[cursor].is_liked = liked;
            if liked {
                let image = session.images[cursor].clone();
                session.liked_images.push(image);
            }
            session.cursor += 1;
            true
        };
        if advanced {
            self.maybe_trigger_lookahead().await;
        }
        advanced
    }

    // ========================================================================
    // Look-ahead pacing
    // ========================================================================

    /// Checked after every cursor advance: when the unswiped buffer is low
    /// and prompts remain, schedule background generation. At most one
    /// background task runs at a time; it keeps generating until the buffer
    /// is refilled or a call fails.
    async fn maybe_trigger_lookahead(self: &Arc<Self>) {
        if !self.lookahead_needed().await {
            return;
        }
        let mut guard = self.lookahead.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                return;
            }
        }
        let controller = Arc::clone(self);
        *guard = Some(tokio::spawn(async move {
            while controller.lookahead_needed().await {
                if !controller.generate_next_image().await {
                    // Failure or a replaced session; the next swipe re-triggers.
                    break;
                }
            }
        }));
    }

    async fn lookahead_needed(&self) -> bool {
        let state = self.state.read().await;
        let Some(session) = state.current.as_ref() else {
            return false;
        };
        !session.prompts.is_empty()
            && !session.is_generating
            && session.images.len() < session.prompts.len()
            && session.remaining() <= self.config.lookahead_low_water
            && session.cursor < session.prompts.len() - 1
    }

    /// Waits for any in-flight background look-ahead generation to settle.
    ///
    /// The UI never needs this; it exists for drivers that want a quiescent
    /// state before reading a snapshot (the CLI between swipes, tests).
    pub async fn wait_for_pending_generation(&self) {
        let handle = {
            let mut guard = self.lookahead.lock().unwrap_or_else(|e| e.into_inner());
            guard.take()
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    // ========================================================================
    // Persistence (best effort)
    // ========================================================================

    /// Appends the current session to the stored history.
    ///
    /// Best effort: repository failures are logged and never surfaced, and
    /// persistence never blocks generation or swiping.
    pub async fn save_session(&self) {
        let session = {
            let state = self.state.read().await;
            let Some(session) = state.current.clone() else {
                return;
            };
            session
        };
        match self.repository.append(&session).await {
            Ok(()) => {
                let mut state = self.state.write().await;
                state.history.push(session);
            }
            Err(err) => {
                tracing::error!(
                    "[SwipeController] Failed to persist session {}: {}",
                    session.id,
                    err
                );
            }
        }
    }

    /// Loads the stored session history, replacing the in-memory copy.
    ///
    /// Best effort: on repository failure the error is logged and the
    /// previously loaded history is kept.
    pub async fn load_sessions(&self) -> Vec<SwipeSession> {
        match self.repository.list_all().await {
            Ok(sessions) => {
                let mut state = self.state.write().await;
                state.history = sessions.clone();
                sessions
            }
            Err(err) => {
                tracing::error!("[SwipeController] Failed to load sessions: {}", err);
                let state = self.state.read().await;
                state.history.clone()
            }
        }
    }

    // ========================================================================
    // Read-only view
    // ========================================================================

    /// Clone of the active session for the presentation layer.
    pub async fn current_session(&self) -> Option<SwipeSession> {
        self.state.read().await.current.clone()
    }

    /// Clone of the loaded session history.
    pub async fn sessions(&self) -> Vec<SwipeSession> {
        self.state.read().await.history.clone()
    }

    /// Whether the session has reached its image budget and the user has
    /// swiped past every image. Completion is deferred while the budget is
    /// unmet, even if the user has caught up with generation.
    pub async fn is_session_complete(&self) -> bool {
        let state = self.state.read().await;
        let Some(session) = state.current.as_ref() else {
            return false;
        };
        !session.images.is_empty()
            && session.cursor + 1 >= session.images.len()
            && session.images.len() >= self.config.max_images
    }

    /// Subscribes to fine-grained generation progress updates.
    pub fn progress_rx(&self) -> watch::Receiver<Option<GenerationProgress>> {
        self.progress_tx.subscribe()
    }

    async fn fail_session(&self, session_id: &str, err: &RestyleError) {
        let mut state = self.state.write().await;
        if let Some(session) = current_session(&mut state, session_id) {
            session.is_generating = false;
            session.progress = None;
            session.last_error = Some(err.to_string());
            tracing::error!("[SwipeController] Session {} failed: {}", session_id, err);
        }
        drop(state);
        self.progress_tx.send_replace(None);
    }
}

/// The current session, but only if it is still the one an in-flight
/// operation started against. Stale results must be discarded.
fn current_session<'a>(
    state: &'a mut SwipeState,
    session_id: &str,
) -> Option<&'a mut SwipeSession> {
    state
        .current
        .as_mut()
        .filter(|session| session.id == session_id)
}

#[cfg(test)]
#[path = "controller_test.rs"]
mod controller_test;

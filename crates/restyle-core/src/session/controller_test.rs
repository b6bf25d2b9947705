use crate::config::GenerationConfig;
use crate::error::{RestyleError, Result};
use crate::provider::{ImageSource, ImageSynthesizer, PromptPlan, PromptProvider};
use crate::session::model::{
    GenerationStage, ImageAnalysis, SwipeImage, SwipeSession, VariationKind,
};
use crate::session::repository::SessionRepository;
use crate::session::SwipeController;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

// Mock PromptProvider for testing.
//
// By default every call answers with exactly `count` prompts and a default
// analysis; queued overrides (short prompt lists, errors) are consumed first.
struct MockPromptProvider {
    overrides: Mutex<VecDeque<Result<PromptPlan>>>,
    calls: Mutex<usize>,
}

impl MockPromptProvider {
    fn new() -> Self {
        Self {
            overrides: Mutex::new(VecDeque::new()),
            calls: Mutex::new(0),
        }
    }

    fn push_plan(&self, prompts: Vec<String>) {
        self.overrides.lock().unwrap().push_back(Ok(PromptPlan {
            analysis: ImageAnalysis::default(),
            prompts,
        }));
    }

    fn push_error(&self, err: RestyleError) {
        self.overrides.lock().unwrap().push_back(Err(err));
    }

    fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl PromptProvider for MockPromptProvider {
    async fn analyze_and_generate_prompts(
        &self,
        _image: &ImageSource,
        _kind: VariationKind,
        count: usize,
    ) -> Result<PromptPlan> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if let Some(queued) = self.overrides.lock().unwrap().pop_front() {
            return queued;
        }
        Ok(PromptPlan {
            analysis: ImageAnalysis::default(),
            prompts: (0..count)
                .map(|i| format!("call {call} edit {i}"))
                .collect(),
        })
    }
}

// Mock ImageSynthesizer for testing. Failures are injected by global call
// index (0-based, counting every synthesize invocation).
struct MockSynthesizer {
    calls: Mutex<usize>,
    failures: Mutex<HashMap<usize, RestyleError>>,
}

impl MockSynthesizer {
    fn new() -> Self {
        Self {
            calls: Mutex::new(0),
            failures: Mutex::new(HashMap::new()),
        }
    }

    fn fail_call(&self, index: usize, err: RestyleError) {
        self.failures.lock().unwrap().insert(index, err);
    }

    fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ImageSynthesizer for MockSynthesizer {
    async fn synthesize(&self, _image: &ImageSource, prompt: &str) -> Result<SwipeImage> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            let index = *calls;
            *calls += 1;
            index
        };
        if let Some(err) = self.failures.lock().unwrap().remove(&index) {
            return Err(err);
        }
        Ok(SwipeImage::new(format!("mock://image-{index}"), prompt))
    }
}

// Synthesizer that blocks each call on a semaphore permit, so tests can
// control exactly when in-flight generation resolves.
struct GatedSynthesizer {
    permits: Semaphore,
    calls: Mutex<usize>,
}

impl GatedSynthesizer {
    fn new(initial_permits: usize) -> Self {
        Self {
            permits: Semaphore::new(initial_permits),
            calls: Mutex::new(0),
        }
    }

    fn release(&self, n: usize) {
        self.permits.add_permits(n);
    }
}

#[async_trait]
impl ImageSynthesizer for GatedSynthesizer {
    async fn synthesize(&self, _image: &ImageSource, prompt: &str) -> Result<SwipeImage> {
        self.permits.acquire().await.unwrap().forget();
        let index = {
            let mut calls = self.calls.lock().unwrap();
            let index = *calls;
            *calls += 1;
            index
        };
        Ok(SwipeImage::new(format!("gated://image-{index}"), prompt))
    }
}

// Mock SessionRepository for testing.
struct MockSessionRepository {
    saved: Mutex<Vec<SwipeSession>>,
    fail: bool,
}

impl MockSessionRepository {
    fn new() -> Self {
        Self {
            saved: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            saved: Mutex::new(Vec::new()),
            fail: true,
        }
    }
}

#[async_trait]
impl SessionRepository for MockSessionRepository {
    async fn append(&self, session: &SwipeSession) -> Result<()> {
        if self.fail {
            return Err(RestyleError::data_access("disk full"));
        }
        self.saved.lock().unwrap().push(session.clone());
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<SwipeSession>> {
        if self.fail {
            return Err(RestyleError::data_access("disk full"));
        }
        Ok(self.saved.lock().unwrap().clone())
    }
}

struct Fixture {
    provider: Arc<MockPromptProvider>,
    synthesizer: Arc<MockSynthesizer>,
    repository: Arc<MockSessionRepository>,
    controller: Arc<SwipeController>,
}

fn fixture_with_config(config: GenerationConfig) -> Fixture {
    let provider = Arc::new(MockPromptProvider::new());
    let synthesizer = Arc::new(MockSynthesizer::new());
    let repository = Arc::new(MockSessionRepository::new());
    let controller = SwipeController::new(
        provider.clone(),
        synthesizer.clone(),
        repository.clone(),
        config,
    );
    Fixture {
        provider,
        synthesizer,
        repository,
        controller,
    }
}

fn fixture() -> Fixture {
    fixture_with_config(GenerationConfig::default())
}

/// The structural invariants that must hold after every operation.
fn assert_invariants(session: &SwipeSession) {
    assert!(session.cursor <= session.images.len());
    if !session.prompts.is_empty() {
        assert!(session.images.len() <= session.prompts.len());
    }
    // Liked images form a subsequence of images, all marked liked.
    for liked in &session.liked_images {
        let found = session.images.iter().find(|i| i.id == liked.id);
        assert!(found.is_some(), "liked image not present in images");
        assert!(found.unwrap().is_liked);
    }
}

async fn initialized_fixture() -> Fixture {
    let f = fixture();
    f.controller
        .start_session("file:///portrait.jpg", None, VariationKind::Hairstyle)
        .await;
    f.controller.initialize_generation().await.unwrap();
    f
}

#[tokio::test]
async fn initialization_builds_a_two_image_buffer() {
    let f = initialized_fixture().await;

    let session = f.controller.current_session().await.unwrap();
    assert_eq!(session.prompts.len(), 10);
    assert_eq!(session.images.len(), 2);
    assert_eq!(session.cursor, 0);
    assert!(!session.is_generating);
    assert!(session.progress.is_none());
    assert!(session.analysis.is_some());
    assert!(session.last_error.is_none());
    // Images were produced in prompt order.
    assert_eq!(session.images[0].prompt, session.prompts[0]);
    assert_eq!(session.images[1].prompt, session.prompts[1]);
    assert_invariants(&session);
}

#[tokio::test]
async fn initialization_accepts_fewer_prompts_than_requested() {
    let f = fixture();
    f.provider
        .push_plan((0..7).map(|i| format!("edit {i}")).collect());
    f.controller
        .start_session("file:///portrait.jpg", None, VariationKind::Outfit)
        .await;
    f.controller.initialize_generation().await.unwrap();

    let session = f.controller.current_session().await.unwrap();
    // Seven usable prompts, no padding with empty strings.
    assert_eq!(session.prompts.len(), 7);
    assert!(session.prompts.iter().all(|p| !p.is_empty()));
    assert_invariants(&session);
}

#[tokio::test]
async fn initialization_failure_is_fatal_and_dismissible() {
    let f = fixture();
    f.provider
        .push_error(RestyleError::provider_transient("model overloaded"));
    f.controller
        .start_session("file:///portrait.jpg", None, VariationKind::Hairstyle)
        .await;

    let err = f.controller.initialize_generation().await.unwrap_err();
    assert!(err.is_provider());

    let session = f.controller.current_session().await.unwrap();
    assert!(session.last_error.is_some());
    assert!(session.images.is_empty());
    assert!(!session.is_generating);

    f.controller.dismiss_error().await;
    let session = f.controller.current_session().await.unwrap();
    assert!(session.last_error.is_none());
}

#[tokio::test]
async fn initialization_without_session_is_a_noop() {
    let f = fixture();
    f.controller.initialize_generation().await.unwrap();
    assert_eq!(f.provider.call_count(), 0);
    assert!(f.controller.current_session().await.is_none());
}

#[tokio::test]
async fn empty_prompt_plan_fails_initialization() {
    let f = fixture();
    f.provider.push_plan(Vec::new());
    f.controller
        .start_session("file:///portrait.jpg", None, VariationKind::Hairstyle)
        .await;

    let err = f.controller.initialize_generation().await.unwrap_err();
    assert!(!err.is_retryable());
    let session = f.controller.current_session().await.unwrap();
    assert!(session.last_error.is_some());
}

#[tokio::test]
async fn swipes_advance_cursor_and_refill_the_lookahead_buffer() {
    let f = initialized_fixture().await;

    assert!(f.controller.swipe_right().await);
    assert!(f.controller.swipe_right().await);
    f.controller.wait_for_pending_generation().await;

    let session = f.controller.current_session().await.unwrap();
    assert_eq!(session.cursor, 2);
    assert_eq!(session.liked_count(), 2);
    assert!(session.images[0].is_liked);
    assert!(session.images[1].is_liked);
    // The buffer was refilled until it ran ahead of the cursor again.
    assert_eq!(session.images.len(), 5);
    assert_eq!(session.remaining(), 3);
    // Append order still equals prompt order, one image per prompt.
    for (index, image) in session.images.iter().enumerate() {
        assert_eq!(image.prompt, session.prompts[index]);
    }
    assert_eq!(f.synthesizer.call_count(), session.images.len());
    assert_invariants(&session);
}

#[tokio::test]
async fn swipe_left_records_a_dislike_without_liking() {
    let f = initialized_fixture().await;

    assert!(f.controller.swipe_left().await);
    f.controller.wait_for_pending_generation().await;

    let session = f.controller.current_session().await.unwrap();
    assert_eq!(session.cursor, 1);
    assert!(!session.images[0].is_liked);
    assert!(session.liked_images.is_empty());
    assert_invariants(&session);
}

#[tokio::test]
async fn concurrent_swipes_never_duplicate_a_lookahead_index() {
    let provider = Arc::new(MockPromptProvider::new());
    let synthesizer = Arc::new(GatedSynthesizer::new(2)); // permits for init only
    let repository = Arc::new(MockSessionRepository::new());
    let controller = SwipeController::new(
        provider.clone(),
        synthesizer.clone(),
        repository,
        GenerationConfig::default(),
    );

    controller
        .start_session("file:///portrait.jpg", None, VariationKind::Hairstyle)
        .await;
    controller.initialize_generation().await.unwrap();

    // Both swipes see a low buffer; only one background task may exist.
    assert!(controller.swipe_right().await);
    assert!(controller.swipe_right().await);

    synthesizer.release(16);
    controller.wait_for_pending_generation().await;

    let session = controller.current_session().await.unwrap();
    // Every image maps to a distinct prompt index, in order: no index was
    // generated twice by overlapping triggers.
    for (index, image) in session.images.iter().enumerate() {
        assert_eq!(image.prompt, session.prompts[index]);
    }
    assert_eq!(*synthesizer.calls.lock().unwrap(), session.images.len());
    assert_invariants(&session);
}

#[tokio::test]
async fn generate_next_image_is_a_noop_once_prompts_are_exhausted() {
    let f = fixture();
    f.provider
        .push_plan(vec!["edit 0".to_string(), "edit 1".to_string()]);
    f.controller
        .start_session("file:///portrait.jpg", None, VariationKind::Hairstyle)
        .await;
    f.controller.initialize_generation().await.unwrap();

    let before = f.controller.current_session().await.unwrap();
    assert_eq!(before.images.len(), 2);
    assert!(before.prompts_exhausted());

    assert!(!f.controller.generate_next_image().await);

    let after = f.controller.current_session().await.unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn swiping_past_the_last_image_is_a_noop() {
    let f = fixture();
    f.provider
        .push_plan(vec!["edit 0".to_string(), "edit 1".to_string()]);
    f.controller
        .start_session("file:///portrait.jpg", None, VariationKind::Hairstyle)
        .await;
    f.controller.initialize_generation().await.unwrap();

    assert!(f.controller.swipe_right().await);
    assert!(f.controller.swipe_left().await);
    f.controller.wait_for_pending_generation().await;

    assert!(!f.controller.swipe_right().await);
    let session = f.controller.current_session().await.unwrap();
    assert_eq!(session.cursor, 2);
    assert_eq!(session.liked_count(), 1);
    assert_invariants(&session);
}

#[tokio::test]
async fn lookahead_failure_is_swallowed_and_session_stays_healthy() {
    let f = initialized_fixture().await;
    // The first look-ahead call (third synthesize overall) fails.
    f.synthesizer
        .fail_call(2, RestyleError::provider_transient("quota exceeded"));

    assert!(f.controller.swipe_right().await);
    f.controller.wait_for_pending_generation().await;

    let session = f.controller.current_session().await.unwrap();
    assert!(session.last_error.is_none());
    assert!(!session.is_generating);
    assert_invariants(&session);

    // The next swipe re-triggers and generation recovers.
    assert!(f.controller.swipe_right().await);
    f.controller.wait_for_pending_generation().await;
    let session = f.controller.current_session().await.unwrap();
    assert!(session.images.len() > 2);
    assert_invariants(&session);
}

#[tokio::test]
async fn full_session_completes_and_generate_more_appends_five() {
    let config = GenerationConfig {
        prompt_count: 20,
        ..GenerationConfig::default()
    };
    let f = fixture_with_config(config);
    f.controller
        .start_session("file:///portrait.jpg", None, VariationKind::Outfit)
        .await;
    f.controller.initialize_generation().await.unwrap();

    // Swipe through everything, waiting out the look-ahead whenever the
    // cursor catches up with generation.
    loop {
        if !f.controller.swipe_right().await {
            f.controller.wait_for_pending_generation().await;
            if !f.controller.swipe_right().await {
                break;
            }
        }
    }
    f.controller.wait_for_pending_generation().await;

    let session = f.controller.current_session().await.unwrap();
    assert_eq!(session.images.len(), 20);
    assert_eq!(session.cursor, 20);
    assert_eq!(session.liked_count(), 20);
    assert!(f.controller.is_session_complete().await);
    assert_invariants(&session);

    let appended = f.controller.generate_more_images().await.unwrap();
    assert_eq!(appended, 5);

    let session = f.controller.current_session().await.unwrap();
    assert_eq!(session.prompts.len(), 25);
    assert_eq!(session.images.len(), 25);
    assert!(!f.controller.is_session_complete().await);
    assert_invariants(&session);
}

#[tokio::test]
async fn generate_more_requires_at_least_one_like() {
    let f = initialized_fixture().await;

    let appended = f.controller.generate_more_images().await.unwrap();
    assert_eq!(appended, 0);
    // Only the initialization call reached the provider.
    assert_eq!(f.provider.call_count(), 1);
}

#[tokio::test]
async fn generate_more_skips_individual_failures_without_a_session_error() {
    let f = initialized_fixture().await;
    assert!(f.controller.swipe_right().await);
    f.controller.wait_for_pending_generation().await;

    let before = f.controller.current_session().await.unwrap();
    // Fail the second synthesis of the upcoming batch of five.
    f.synthesizer.fail_call(
        f.synthesizer.call_count() + 1,
        RestyleError::Timeout { seconds: 60 },
    );

    let appended = f.controller.generate_more_images().await.unwrap();
    assert_eq!(appended, 4);

    let session = f.controller.current_session().await.unwrap();
    assert_eq!(session.prompts.len(), before.prompts.len() + 5);
    assert_eq!(session.images.len(), before.images.len() + 4);
    assert!(session.last_error.is_none());
    assert_invariants(&session);
}

#[tokio::test]
async fn generate_more_reports_per_image_progress_in_snapshots() {
    let provider = Arc::new(MockPromptProvider::new());
    let synthesizer = Arc::new(GatedSynthesizer::new(2));
    let repository = Arc::new(MockSessionRepository::new());
    // Low water of zero keeps the swipe below from triggering look-ahead.
    let config = GenerationConfig {
        lookahead_low_water: 0,
        ..GenerationConfig::default()
    };
    let controller = SwipeController::new(
        provider.clone(),
        synthesizer.clone(),
        repository,
        config,
    );

    controller
        .start_session("file:///portrait.jpg", None, VariationKind::Hairstyle)
        .await;
    controller.initialize_generation().await.unwrap();
    assert!(controller.swipe_right().await);

    let generate = tokio::spawn({
        let controller = controller.clone();
        async move { controller.generate_more_images().await }
    });

    // Release exactly one batch synthesis and watch the snapshot update.
    synthesizer.release(1);
    let mut mid_batch = None;
    for _ in 0..100 {
        tokio::task::yield_now().await;
        let session = controller.current_session().await.unwrap();
        if session.images.len() == 3 {
            mid_batch = Some(session);
            break;
        }
    }
    let session = mid_batch.expect("first batch image never landed");
    let progress = session.progress.expect("snapshot carries no progress mid-batch");
    assert_eq!(progress.stage, GenerationStage::Generating);
    assert_eq!(progress.percent, 20);

    synthesizer.release(16);
    let appended = generate.await.unwrap().unwrap();
    assert_eq!(appended, 5);

    let session = controller.current_session().await.unwrap();
    assert!(session.progress.is_none());
    assert_eq!(session.images.len(), 7);
    assert_invariants(&session);
}

#[tokio::test]
async fn generate_more_waits_out_an_inflight_lookahead() {
    let provider = Arc::new(MockPromptProvider::new());
    let synthesizer = Arc::new(GatedSynthesizer::new(2));
    let repository = Arc::new(MockSessionRepository::new());
    let controller = SwipeController::new(
        provider.clone(),
        synthesizer.clone(),
        repository,
        GenerationConfig::default(),
    );

    controller
        .start_session("file:///portrait.jpg", None, VariationKind::Hairstyle)
        .await;
    controller.initialize_generation().await.unwrap();
    assert!(controller.swipe_right().await); // background refill now gated

    // The refill in flight must not turn this round into a zero-image no-op.
    synthesizer.release(16);
    let appended = controller.generate_more_images().await.unwrap();
    assert_eq!(appended, 5);

    let session = controller.current_session().await.unwrap();
    assert_eq!(session.prompts.len(), 15);
    assert!(session.last_error.is_none());
    assert_invariants(&session);
}

#[tokio::test]
async fn cleared_sessions_discard_in_flight_results() {
    let provider = Arc::new(MockPromptProvider::new());
    let synthesizer = Arc::new(GatedSynthesizer::new(2));
    let repository = Arc::new(MockSessionRepository::new());
    let controller = SwipeController::new(
        provider.clone(),
        synthesizer.clone(),
        repository,
        GenerationConfig::default(),
    );

    controller
        .start_session("file:///portrait.jpg", None, VariationKind::Hairstyle)
        .await;
    controller.initialize_generation().await.unwrap();
    assert!(controller.swipe_right().await); // look-ahead now blocked on the gate

    controller.clear_session().await;
    synthesizer.release(16);
    controller.wait_for_pending_generation().await;

    assert!(controller.current_session().await.is_none());

    // A brand-new session is unaffected by the abandoned one's results.
    controller
        .start_session("file:///portrait-2.jpg", None, VariationKind::Outfit)
        .await;
    controller.initialize_generation().await.unwrap();
    let session = controller.current_session().await.unwrap();
    assert_eq!(session.images.len(), 2);
    assert_eq!(session.cursor, 0);
    assert_invariants(&session);
}

#[tokio::test]
async fn save_session_appends_to_history() {
    let f = initialized_fixture().await;
    f.controller.save_session().await;

    assert_eq!(f.repository.saved.lock().unwrap().len(), 1);
    assert_eq!(f.controller.sessions().await.len(), 1);

    let loaded = f.controller.load_sessions().await;
    assert_eq!(loaded.len(), 1);
}

#[tokio::test]
async fn persistence_failures_never_surface() {
    let provider = Arc::new(MockPromptProvider::new());
    let synthesizer = Arc::new(MockSynthesizer::new());
    let repository = Arc::new(MockSessionRepository::failing());
    let controller = SwipeController::new(
        provider,
        synthesizer,
        repository,
        GenerationConfig::default(),
    );

    controller
        .start_session("file:///portrait.jpg", None, VariationKind::Hairstyle)
        .await;
    controller.initialize_generation().await.unwrap();

    // Neither save nor load panics or errors; swiping continues unharmed.
    controller.save_session().await;
    assert!(controller.load_sessions().await.is_empty());
    assert!(controller.swipe_right().await);
    controller.wait_for_pending_generation().await;
    let session = controller.current_session().await.unwrap();
    assert!(session.last_error.is_none());
}

#[tokio::test]
async fn starting_a_session_replaces_the_previous_one() {
    let f = initialized_fixture().await;
    let first = f.controller.current_session().await.unwrap();

    let second_id = f
        .controller
        .start_session("file:///other.jpg", None, VariationKind::Outfit)
        .await;
    let session = f.controller.current_session().await.unwrap();
    assert_ne!(session.id, first.id);
    assert_eq!(session.id, second_id);
    assert!(session.images.is_empty());
    assert_eq!(session.variation_kind, VariationKind::Outfit);
}

#[tokio::test]
async fn completion_is_deferred_until_the_image_budget_is_met() {
    let f = fixture();
    f.provider
        .push_plan(vec!["edit 0".to_string(), "edit 1".to_string()]);
    f.controller
        .start_session("file:///portrait.jpg", None, VariationKind::Hairstyle)
        .await;
    f.controller.initialize_generation().await.unwrap();

    assert!(f.controller.swipe_right().await);
    assert!(f.controller.swipe_left().await);
    f.controller.wait_for_pending_generation().await;

    // Everything swiped, but only 2 of the configured 20 images exist.
    assert!(!f.controller.is_session_complete().await);
}

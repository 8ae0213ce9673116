//! Per-entity enrichment tracking.
//!
//! The tracker owns the map from entity key to [`EnrichmentState`] and is its
//! only writer. Each request runs as its own tokio task; the map is only
//! touched in short synchronous sections, never across an await, so every
//! transition is atomic per key and keys never contend with one another.
//!
//! Lifecycle of one key: `Idle -> InFlight -> Succeeded | Failed`, and from a
//! terminal state back to `InFlight` only through a fresh request. A request
//! for a key that is already in flight is a no-op.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::FutureExt;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::GenerateError;
use crate::events::{EnrichmentEvent, EventBus, DEFAULT_EVENT_CAPACITY};
use crate::generator::TextGenerator;
use crate::prompt::build_prompt;
use crate::types::{EnrichmentState, Entity};

/// Tracker tuning.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Deadline for one whole request cycle, retries included.
    pub request_timeout: Duration,
    pub event_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(45),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// What `request_enrichment` did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A new cycle was started.
    Started { request_id: Uuid },
    /// The key already had a request in flight; nothing was sent.
    Suppressed,
}

/// Drives enrichment requests and records their outcome per entity.
///
/// Cheap to clone; clones share the same state map.
#[derive(Clone)]
pub struct EnrichmentTracker {
    inner: Arc<Inner>,
}

struct Inner {
    states: DashMap<String, EnrichmentState>,
    generator: Arc<dyn TextGenerator>,
    events: EventBus,
    config: TrackerConfig,
}

impl EnrichmentTracker {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self::with_config(generator, TrackerConfig::default())
    }

    pub fn with_config(generator: Arc<dyn TextGenerator>, config: TrackerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                states: DashMap::new(),
                generator,
                events: EventBus::new(config.event_capacity),
                config,
            }),
        }
    }

    /// Start an enrichment cycle for `entity` unless one is already running.
    ///
    /// Returns immediately; the outbound call runs on a spawned task. Called
    /// outside a tokio runtime, the cycle settles at once as a failure.
    pub fn request_enrichment(&self, entity: &Entity) -> Dispatch {
        let key = entity.key().to_string();

        if !self.inner.begin(&key) {
            tracing::debug!("Enrichment for '{key}' already in flight; request ignored");
            self.inner.events.emit(EnrichmentEvent::Suppressed { key });
            return Dispatch::Suppressed;
        }

        let request_id = Uuid::new_v4();
        let prompt = build_prompt(entity);
        tracing::info!(
            key = %key,
            request_id = %request_id,
            generator = self.inner.generator.name(),
            "Enrichment started"
        );
        self.inner.events.emit(EnrichmentEvent::Started {
            key: key.clone(),
            request_id,
        });

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.inner.settle(
                key,
                request_id,
                Err(GenerateError::NoRuntime),
                Duration::ZERO,
            );
            return Dispatch::Started { request_id };
        };

        let inner = Arc::clone(&self.inner);
        handle.spawn(async move {
            inner.run_cycle(key, request_id, prompt).await;
        });

        Dispatch::Started { request_id }
    }

    /// Current state for `key`; keys never requested read as `Idle`.
    pub fn state(&self, key: &str) -> EnrichmentState {
        self.inner
            .states
            .get(key)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Copy of every tracked state, ordered by key.
    pub fn snapshot(&self) -> BTreeMap<String, EnrichmentState> {
        self.inner
            .states
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Number of keys currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inner
            .states
            .iter()
            .filter(|entry| entry.value().is_in_flight())
            .count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EnrichmentEvent> {
        self.inner.events.subscribe()
    }

    /// Wait until `key` is no longer in flight and return its state.
    pub async fn wait_until_settled(&self, key: &str) -> EnrichmentState {
        let mut rx = self.subscribe();
        loop {
            let state = self.state(key);
            if !state.is_in_flight() {
                return state;
            }
            match rx.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return self.state(key),
            }
        }
    }
}

impl Inner {
    /// Move `key` to `InFlight` unless it already is. Returns whether it moved.
    fn begin(&self, key: &str) -> bool {
        match self.states.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_in_flight() {
                    return false;
                }
                entry.insert(EnrichmentState::InFlight);
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(EnrichmentState::InFlight);
                true
            }
        }
    }

    async fn run_cycle(&self, key: String, request_id: Uuid, prompt: String) {
        let started = Instant::now();
        let generation = AssertUnwindSafe(self.generator.generate(&prompt)).catch_unwind();

        let outcome = match tokio::time::timeout(self.config.request_timeout, generation).await {
            Ok(Ok(result)) => result,
            Ok(Err(_panic)) => Err(GenerateError::Panicked),
            Err(_elapsed) => Err(GenerateError::Timeout(self.config.request_timeout)),
        };

        self.settle(key, request_id, outcome, started.elapsed());
    }

    /// Record the terminal state, then announce it.
    fn settle(
        &self,
        key: String,
        request_id: Uuid,
        outcome: Result<String, GenerateError>,
        elapsed: Duration,
    ) {
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(text) => {
                let chars = text.chars().count();
                tracing::info!(
                    key = %key,
                    request_id = %request_id,
                    elapsed_ms,
                    chars,
                    "Enrichment succeeded"
                );
                self.states
                    .insert(key.clone(), EnrichmentState::Succeeded { result: text });
                self.events.emit(EnrichmentEvent::Succeeded {
                    key,
                    request_id,
                    chars,
                    elapsed_ms,
                });
            }
            Err(err) => {
                let kind = err.kind();
                tracing::warn!(
                    key = %key,
                    request_id = %request_id,
                    elapsed_ms,
                    ?kind,
                    error = %err,
                    "Enrichment failed"
                );
                self.states.insert(
                    key.clone(),
                    EnrichmentState::Failed {
                        error_message: err.user_message().to_string(),
                    },
                );
                self.events.emit(EnrichmentEvent::Failed {
                    key,
                    request_id,
                    kind,
                    elapsed_ms,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FailureKind, MALFORMED_RESPONSE_MESSAGE, TRANSPORT_FAILURE_MESSAGE};
    use crate::types::EnrichmentStatus;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    type Outcome = Result<String, GenerateError>;

    /// Generator whose replies are released by the test, one gate per title.
    #[derive(Default)]
    struct GatedGenerator {
        gates: Mutex<HashMap<String, oneshot::Receiver<Outcome>>>,
        calls: AtomicUsize,
    }

    impl GatedGenerator {
        fn gate(&self, title: &str) -> oneshot::Sender<Outcome> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().insert(title.to_string(), rx);
            tx
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextGenerator for GatedGenerator {
        async fn generate(&self, prompt: &str) -> Outcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let title = prompt
                .lines()
                .find_map(|line| line.strip_prefix("Project Title: "))
                .unwrap_or_default()
                .to_string();
            let gate = self.gates.lock().unwrap().remove(&title);
            match gate {
                Some(rx) => rx.await.unwrap_or_else(|_| {
                    Err(GenerateError::ServiceStatus {
                        status: 503,
                        body: "gate dropped".into(),
                    })
                }),
                None => Err(GenerateError::Malformed(format!("no gate for {title}"))),
            }
        }
    }

    struct PanickingGenerator;

    #[async_trait]
    impl TextGenerator for PanickingGenerator {
        async fn generate(&self, _prompt: &str) -> Outcome {
            panic!("generator blew up");
        }
    }

    fn entity(key: &str) -> Entity {
        Entity::new(key, format!("Title {key}"), vec![format!("detail for {key}")]).unwrap()
    }

    fn setup() -> (Arc<GatedGenerator>, EnrichmentTracker) {
        let generator = Arc::new(GatedGenerator::default());
        let tracker = EnrichmentTracker::new(generator.clone());
        (generator, tracker)
    }

    #[tokio::test]
    async fn test_unknown_key_is_idle() {
        let (_, tracker) = setup();
        assert_eq!(tracker.state("nobody"), EnrichmentState::Idle);
        assert!(tracker.snapshot().is_empty());
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn test_request_outside_runtime_settles_as_failure() {
        let (generator, tracker) = setup();
        let mut rx = tracker.subscribe();

        let dispatch = tracker.request_enrichment(&entity("a"));
        assert!(matches!(dispatch, Dispatch::Started { .. }));
        assert_eq!(
            tracker.state("a"),
            EnrichmentState::Failed {
                error_message: TRANSPORT_FAILURE_MESSAGE.into()
            }
        );
        assert_eq!(tracker.in_flight(), 0);
        assert_eq!(generator.calls(), 0);

        assert!(matches!(rx.try_recv(), Ok(EnrichmentEvent::Started { .. })));
        assert!(matches!(
            rx.try_recv(),
            Ok(EnrichmentEvent::Failed {
                kind: FailureKind::Transport,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_successful_cycle() {
        let (generator, tracker) = setup();
        let a = entity("a");
        let gate = generator.gate(a.title());

        let dispatch = tracker.request_enrichment(&a);
        assert!(matches!(dispatch, Dispatch::Started { .. }));
        assert_eq!(tracker.state("a"), EnrichmentState::InFlight);
        assert_eq!(tracker.in_flight(), 1);

        gate.send(Ok("- One\n- Two".into())).unwrap();
        let state = tracker.wait_until_settled("a").await;

        assert_eq!(state.status(), EnrichmentStatus::Succeeded);
        assert_eq!(state.result(), Some("- One\n- Two"));
        assert_eq!(state.error_message(), None);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_request_is_suppressed() {
        let (generator, tracker) = setup();
        let a = entity("a");
        let gate = generator.gate(a.title());

        tracker.request_enrichment(&a);
        tokio::task::yield_now().await;
        let second = tracker.request_enrichment(&a);

        assert_eq!(second, Dispatch::Suppressed);
        assert_eq!(tracker.state("a"), EnrichmentState::InFlight);

        gate.send(Ok("done".into())).unwrap();
        tracker.wait_until_settled("a").await;
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_settle_independently() {
        let (generator, tracker) = setup();
        let (a, b) = (entity("a"), entity("b"));
        let gate_a = generator.gate(a.title());
        let gate_b = generator.gate(b.title());

        tracker.request_enrichment(&a);
        tracker.request_enrichment(&b);
        assert_eq!(tracker.in_flight(), 2);

        gate_b
            .send(Err(GenerateError::Malformed("empty".into())))
            .unwrap();
        let b_state = tracker.wait_until_settled("b").await;
        assert_eq!(b_state.status(), EnrichmentStatus::Failed);
        assert_eq!(tracker.state("a"), EnrichmentState::InFlight);

        gate_a.send(Ok("summary a".into())).unwrap();
        let a_state = tracker.wait_until_settled("a").await;
        assert_eq!(a_state.result(), Some("summary a"));
        assert_eq!(tracker.state("b"), b_state);
    }

    #[tokio::test]
    async fn test_rerequest_clears_previous_result() {
        let (generator, tracker) = setup();
        let a = entity("a");

        generator.gate(a.title()).send(Ok("first".into())).unwrap();
        tracker.request_enrichment(&a);
        assert_eq!(tracker.wait_until_settled("a").await.result(), Some("first"));

        let gate = generator.gate(a.title());
        let dispatch = tracker.request_enrichment(&a);
        assert!(matches!(dispatch, Dispatch::Started { .. }));
        let state = tracker.state("a");
        assert_eq!(state, EnrichmentState::InFlight);
        assert_eq!(state.result(), None);

        gate.send(Ok("second".into())).unwrap();
        assert_eq!(
            tracker.wait_until_settled("a").await.result(),
            Some("second")
        );
    }

    #[tokio::test]
    async fn test_rerequest_after_failure() {
        let (generator, tracker) = setup();
        let a = entity("a");

        generator
            .gate(a.title())
            .send(Err(GenerateError::Malformed("no candidates".into())))
            .unwrap();
        tracker.request_enrichment(&a);
        let failed = tracker.wait_until_settled("a").await;
        assert_eq!(failed.error_message(), Some(MALFORMED_RESPONSE_MESSAGE));
        assert!(!failed.error_message().unwrap().contains("candidates"));

        generator.gate(a.title()).send(Ok("ok now".into())).unwrap();
        tracker.request_enrichment(&a);
        let state = tracker.wait_until_settled("a").await;
        assert_eq!(state.result(), Some("ok now"));
        assert_eq!(state.error_message(), None);
    }

    #[tokio::test]
    async fn test_transport_failure_message() {
        let (generator, tracker) = setup();
        let a = entity("a");
        generator
            .gate(a.title())
            .send(Err(GenerateError::ServiceStatus {
                status: 500,
                body: "internal stack trace".into(),
            }))
            .unwrap();

        tracker.request_enrichment(&a);
        let state = tracker.wait_until_settled("a").await;
        assert_eq!(state.error_message(), Some(TRANSPORT_FAILURE_MESSAGE));
    }

    #[tokio::test]
    async fn test_timeout_settles_as_failed() {
        let generator = Arc::new(GatedGenerator::default());
        let tracker = EnrichmentTracker::with_config(
            generator.clone(),
            TrackerConfig {
                request_timeout: Duration::from_millis(50),
                ..TrackerConfig::default()
            },
        );
        let a = entity("a");
        let _held_open = generator.gate(a.title());

        tracker.request_enrichment(&a);
        let state = tracker.wait_until_settled("a").await;
        assert_eq!(state.error_message(), Some(TRANSPORT_FAILURE_MESSAGE));
    }

    #[tokio::test]
    async fn test_generator_panic_settles_as_failed() {
        let tracker = EnrichmentTracker::new(Arc::new(PanickingGenerator));
        tracker.request_enrichment(&entity("a"));
        let state = tracker.wait_until_settled("a").await;
        assert_eq!(state.status(), EnrichmentStatus::Failed);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_event_sequence() {
        let (generator, tracker) = setup();
        let a = entity("a");
        let gate = generator.gate(a.title());
        let mut rx = tracker.subscribe();

        let Dispatch::Started { request_id } = tracker.request_enrichment(&a) else {
            panic!("expected a started dispatch");
        };
        tracker.request_enrichment(&a);
        gate.send(Err(GenerateError::Malformed("x".into()))).unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            EnrichmentEvent::Started {
                key: "a".into(),
                request_id
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            EnrichmentEvent::Suppressed { key: "a".into() }
        );
        match rx.recv().await.unwrap() {
            EnrichmentEvent::Failed {
                key,
                request_id: id,
                kind,
                ..
            } => {
                assert_eq!(key, "a");
                assert_eq!(id, request_id);
                assert_eq!(kind, FailureKind::Malformed);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_snapshot_is_ordered() {
        let (generator, tracker) = setup();
        for key in ["c", "a", "b"] {
            let e = entity(key);
            generator.gate(e.title()).send(Ok(key.into())).unwrap();
            tracker.request_enrichment(&e);
        }
        for key in ["a", "b", "c"] {
            tracker.wait_until_settled(key).await;
        }

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert!(snapshot.values().all(|s| s.status() == EnrichmentStatus::Succeeded));
    }
}

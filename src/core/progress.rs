//! Progress registry: request id -> ordered event log plus live subscribers.
//!
//! The registry is an explicitly constructed value shared (by cloning) between
//! the pipelines that publish and the transport that subscribes. Each
//! subscriber gets its own FIFO channel, preloaded with everything published
//! so far. A terminal event closes every subscriber channel and starts the
//! grace period after which [`ProgressRegistry::sweep`] drops the entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{CaptureOutcome, ProgressEvent, ProgressKind, ProgressStage};

/// How long finished requests stay readable
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(300);

struct Entry {
    log: Vec<ProgressEvent>,
    stage: ProgressStage,
    outcome: Option<CaptureOutcome>,
    error: Option<String>,
    started_at: DateTime<Utc>,
    finished_at: Option<Instant>,
    subscribers: Vec<mpsc::UnboundedSender<ProgressEvent>>,
}

impl Entry {
    fn new() -> Self {
        Self {
            log: Vec::new(),
            stage: ProgressStage::Pending,
            outcome: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
            subscribers: Vec::new(),
        }
    }

    fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

/// Point-in-time view of one request
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub request_id: Uuid,
    pub stage: ProgressStage,
    pub events: Vec<ProgressEvent>,
    pub outcome: Option<CaptureOutcome>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Shared registry of in-flight and recently finished requests
#[derive(Clone)]
pub struct ProgressRegistry {
    entries: Arc<Mutex<HashMap<Uuid, Entry>>>,
    grace: Duration,
}

impl Default for ProgressRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_PERIOD)
    }
}

impl ProgressRegistry {
    pub fn new(grace: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            grace,
        }
    }

    pub fn grace_period(&self) -> Duration {
        self.grace
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Entry>> {
        // A panic while holding the lock leaves the map itself consistent
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new request. Re-registering an existing id is a no-op.
    pub fn begin(&self, request_id: Uuid) {
        self.lock().entry(request_id).or_insert_with(Entry::new);
    }

    /// Append an event and fan it out.
    ///
    /// Returns false when the request is unknown or already finished; the
    /// event is dropped in both cases.
    pub fn publish(&self, request_id: Uuid, kind: ProgressKind) -> bool {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(&request_id) else {
            warn!(%request_id, "Progress event for unknown request dropped");
            return false;
        };

        if entry.is_finished() {
            warn!(%request_id, stage = ?kind.stage(), "Progress event after terminal event dropped");
            return false;
        }

        let event = ProgressEvent {
            request_id,
            sequence: entry.log.len() as u64,
            timestamp: Utc::now(),
            kind,
        };

        entry.stage = event.stage();
        match &event.kind {
            ProgressKind::Complete { outcome } => entry.outcome = Some(outcome.clone()),
            ProgressKind::Error { message, .. } => entry.error = Some(message.clone()),
            _ => {}
        }

        // Disconnected subscribers fall away here
        entry
            .subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());

        if event.is_terminal() {
            entry.finished_at = Some(Instant::now());
            entry.subscribers.clear();
            debug!(%request_id, events = entry.log.len() + 1, "Request finished");
        }

        entry.log.push(event);
        true
    }

    /// Subscribe to a request, receiving its backlog first.
    ///
    /// The stream ends after the terminal event. `None` if the id is unknown
    /// or has already been swept.
    pub fn subscribe(&self, request_id: Uuid) -> Option<ProgressSubscription> {
        let mut entries = self.lock();
        let entry = entries.get_mut(&request_id)?;

        let (tx, rx) = mpsc::unbounded_channel();
        for event in &entry.log {
            // Receiver is still in hand, so this cannot fail
            let _ = tx.send(event.clone());
        }

        if !entry.is_finished() {
            entry.subscribers.push(tx);
        }

        Some(ProgressSubscription { request_id, rx })
    }

    pub fn snapshot(&self, request_id: Uuid) -> Option<ProgressSnapshot> {
        let entries = self.lock();
        let entry = entries.get(&request_id)?;

        Some(ProgressSnapshot {
            request_id,
            stage: entry.stage,
            events: entry.log.clone(),
            outcome: entry.outcome.clone(),
            error: entry.error.clone(),
            started_at: entry.started_at,
        })
    }

    /// Number of tracked requests, finished or not
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop finished requests whose grace period has elapsed by `now`
    pub fn sweep_at(&self, now: Instant) -> usize {
        let grace = self.grace;
        let mut entries = self.lock();
        let before = entries.len();

        entries.retain(|_, entry| match entry.finished_at {
            Some(finished) => now.saturating_duration_since(finished) < grace,
            None => true,
        });

        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "Swept finished progress requests");
        }
        removed
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Sweep on a fixed interval until the returned handle is aborted
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                registry.sweep();
            }
        })
    }
}

/// One subscriber's ordered view of a request
pub struct ProgressSubscription {
    request_id: Uuid,
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressSubscription {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Next event, or `None` once the terminal event has been delivered
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    /// Drain the stream to its end
    pub async fn collect(mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn finish(registry: &ProgressRegistry, id: Uuid) {
        registry.publish(
            id,
            ProgressKind::Error {
                message: "boom".into(),
                kind: ErrorKind::PipelineFailure,
            },
        );
    }

    #[test]
    fn test_backlog_then_close() {
        let registry = ProgressRegistry::default();
        let id = Uuid::new_v4();
        registry.begin(id);
        registry.publish(id, ProgressKind::ContextLoading);
        registry.publish(id, ProgressKind::ProcessingStart);
        finish(&registry, id);

        let events = tokio_test::block_on(registry.subscribe(id).unwrap().collect());
        let sequences: Vec<_> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        assert!(events[2].is_terminal());
    }

    #[test]
    fn test_nothing_accepted_after_terminal() {
        let registry = ProgressRegistry::default();
        let id = Uuid::new_v4();
        registry.begin(id);
        finish(&registry, id);

        assert!(!registry.publish(id, ProgressKind::Saving));
        let snapshot = registry.snapshot(id).unwrap();
        assert_eq!(snapshot.events.len(), 1);
        assert_eq!(snapshot.stage, ProgressStage::Error);
        assert_eq!(snapshot.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_unknown_request() {
        let registry = ProgressRegistry::default();
        let id = Uuid::new_v4();
        assert!(!registry.publish(id, ProgressKind::ContextLoading));
        assert!(registry.subscribe(id).is_none());
        assert!(registry.snapshot(id).is_none());
    }

    #[test]
    fn test_sweep_respects_grace_period() {
        let registry = ProgressRegistry::new(Duration::from_secs(300));
        let running = Uuid::new_v4();
        let done = Uuid::new_v4();
        registry.begin(running);
        registry.begin(done);
        finish(&registry, done);

        assert_eq!(registry.sweep(), 0);
        assert_eq!(registry.len(), 2);

        let later = Instant::now() + Duration::from_secs(301);
        assert_eq!(registry.sweep_at(later), 1);
        assert!(registry.snapshot(done).is_none());
        assert!(registry.snapshot(running).is_some());
    }

    #[tokio::test]
    async fn test_dropped_subscriber_does_not_block_others() {
        let registry = ProgressRegistry::default();
        let id = Uuid::new_v4();
        registry.begin(id);

        let dropped = registry.subscribe(id).unwrap();
        let kept = registry.subscribe(id).unwrap();
        drop(dropped);

        registry.publish(id, ProgressKind::ContextLoading);
        finish(&registry, id);

        let events = kept.collect().await;
        assert_eq!(events.len(), 2);
    }
}

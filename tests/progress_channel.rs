//! Progress registry under concurrent publishers and subscribers.

use std::time::{Duration, Instant};

use gravity::core::ProgressRegistry;
use gravity::domain::{CaptureOutcome, ProgressKind, ProgressStage};
use gravity::error::PipelineError;
use uuid::Uuid;

fn stages_for(n: usize) -> Vec<ProgressKind> {
    (0..n)
        .map(|i| ProgressKind::TranscriptionStart { audio_bytes: i })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_keep_per_request_order() {
    let registry = ProgressRegistry::default();
    let ids: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();

    let mut subscriptions = Vec::new();
    for id in &ids {
        registry.begin(*id);
        subscriptions.push(registry.subscribe(*id).unwrap());
    }

    let mut publishers = Vec::new();
    for id in ids.clone() {
        let registry = registry.clone();
        publishers.push(tokio::spawn(async move {
            for kind in stages_for(50) {
                registry.publish(id, kind);
                tokio::task::yield_now().await;
            }
            registry.publish(
                id,
                ProgressKind::from_error(&PipelineError::EmptyDecomposition),
            );
        }));
    }

    for handle in publishers {
        handle.await.unwrap();
    }

    for (id, subscription) in ids.iter().zip(subscriptions) {
        let events = subscription.collect().await;
        assert_eq!(events.len(), 51);
        assert!(events.iter().all(|e| e.request_id == *id));

        let payloads: Vec<usize> = events
            .iter()
            .filter_map(|e| match e.kind {
                ProgressKind::TranscriptionStart { audio_bytes } => Some(audio_bytes),
                _ => None,
            })
            .collect();
        assert_eq!(payloads, (0..50).collect::<Vec<_>>());
        assert!(events.last().unwrap().is_terminal());
    }
}

#[tokio::test]
async fn test_late_subscriber_reads_final_state() {
    let registry = ProgressRegistry::default();
    let id = Uuid::new_v4();
    registry.begin(id);

    let early = registry.subscribe(id).unwrap();
    registry.publish(id, ProgressKind::ContextLoading);
    registry.publish(
        id,
        ProgressKind::Complete {
            outcome: CaptureOutcome::unintelligible(),
        },
    );
    let late = registry.subscribe(id).unwrap();

    let early_events = early.collect().await;
    let late_events = late.collect().await;
    assert_eq!(early_events.len(), 2);
    assert_eq!(late_events.len(), 2);
    assert_eq!(
        late_events.iter().map(|e| e.sequence).collect::<Vec<_>>(),
        vec![0, 1]
    );

    let snapshot = registry.snapshot(id).unwrap();
    assert_eq!(snapshot.stage, ProgressStage::Complete);
    assert!(snapshot.outcome.unwrap().is_unintelligible);
}

#[tokio::test]
async fn test_subscriber_waits_for_live_events() {
    let registry = ProgressRegistry::default();
    let id = Uuid::new_v4();
    registry.begin(id);
    let mut subscription = registry.subscribe(id).unwrap();

    let publisher = registry.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        publisher.publish(id, ProgressKind::Saving);
        publisher.publish(
            id,
            ProgressKind::from_error(&PipelineError::MissingUser),
        );
    });

    let first = subscription.next().await.unwrap();
    assert_eq!(first.stage(), ProgressStage::Saving);
    let second = subscription.next().await.unwrap();
    assert!(second.is_terminal());
    assert!(subscription.next().await.is_none());
}

#[tokio::test]
async fn test_swept_requests_disappear() {
    let registry = ProgressRegistry::new(Duration::from_secs(300));
    let id = Uuid::new_v4();
    registry.begin(id);
    registry.publish(id, ProgressKind::from_error(&PipelineError::EmptyDecomposition));

    assert_eq!(registry.sweep_at(Instant::now() + Duration::from_secs(299)), 0);
    assert_eq!(registry.sweep_at(Instant::now() + Duration::from_secs(301)), 1);
    assert!(registry.subscribe(id).is_none());
}

#[tokio::test]
async fn test_background_sweeper_clears_expired_requests() {
    let registry = ProgressRegistry::new(Duration::from_millis(10));
    let id = Uuid::new_v4();
    registry.begin(id);
    registry.publish(id, ProgressKind::from_error(&PipelineError::EmptyDecomposition));

    let sweeper = registry.spawn_sweeper(Duration::from_millis(5));
    tokio::time::sleep(Duration::from_millis(100)).await;
    sweeper.abort();

    assert!(registry.is_empty());
}

mod common;

use std::time::Duration;

use common::Harness;
use strategy_worker::models::{JobKind, JobStatus};
use strategy_worker::services::job_worker_service::PollResult;
use strategy_worker::services::lifecycle::LifecycleError;
use strategy_worker::store::JobStore;
use strategy_worker::LifecycleOwner;

#[tokio::test]
async fn test_empty_queue_polls_empty() {
    let h = Harness::new();
    assert_eq!(h.worker("w1").poll_once().await.unwrap(), PollResult::Empty);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_workers_process_a_job_once() {
    let h = Harness::new();
    let snapshot_id = h.seed(true);
    h.store.enqueue(snapshot_id, JobKind::Full).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let worker = h.worker(&format!("w{}", i));
        handles.push(tokio::spawn(async move { worker.poll_once().await.unwrap() }));
    }

    let mut processed = 0;
    for handle in handles {
        if let PollResult::Processed(_) = handle.await.unwrap() {
            processed += 1;
        }
    }

    assert_eq!(processed, 1);
    assert_eq!(h.strategist.calls(), 1);
    assert_eq!(h.consolidator.calls(), 1);
    assert_eq!(h.store.jobs()[0].status, JobStatus::Ok);
}

#[tokio::test]
async fn test_run_loop_drains_queue_and_stops_on_shutdown() {
    let h = Harness::new();
    let first = h.seed(true);
    let second = h.seed(false);
    h.store.enqueue(first, JobKind::Full).await.unwrap();
    h.store.enqueue(second, JobKind::Full).await.unwrap();

    let lifecycle = LifecycleOwner::new(Duration::from_secs(5));
    lifecycle.spawn("job worker", h.worker("w1").run(lifecycle.shutdown_token()));

    let store = h.store.clone();
    let drained = async move {
        while store
            .jobs()
            .iter()
            .any(|j| matches!(j.status, JobStatus::Queued | JobStatus::Running))
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), drained)
        .await
        .expect("queue was not drained");

    lifecycle.shutdown().await.unwrap();

    let jobs = h.store.jobs();
    let status_of = |id| jobs.iter().find(|j| j.snapshot_id == id).unwrap().status;
    assert_eq!(status_of(first), JobStatus::Ok);
    assert_eq!(status_of(second), JobStatus::Error);
}

#[tokio::test]
async fn test_second_listener_in_process_is_refused() {
    let h = Harness::new();
    let lifecycle = LifecycleOwner::new(Duration::from_secs(1));

    let slot = lifecycle.acquire_listener_slot().unwrap();
    let listener = h.listener();
    assert_eq!(listener.channel(), "upstream_ready");
    assert_eq!(
        lifecycle.acquire_listener_slot().unwrap_err(),
        LifecycleError::ListenerAlreadyRunning
    );

    drop(slot);
    assert!(lifecycle.acquire_listener_slot().is_ok());
}

#[tokio::test]
async fn test_failed_job_can_be_requeued_and_recovered() {
    let h = Harness::new();
    let snapshot_id = h.seed(false);

    h.store.enqueue(snapshot_id, JobKind::Full).await.unwrap();
    assert!(matches!(h.worker("w1").poll_once().await.unwrap(), PollResult::Failed(_)));

    h.store.insert_briefing(common::briefing(snapshot_id));
    let requeued = h.store.enqueue(snapshot_id, JobKind::Consolidate).await.unwrap();
    assert!(requeued.was_created());

    let result = h.worker("w2").poll_once().await.unwrap();
    assert!(matches!(result, PollResult::Processed(_)));
    // Stage A from the failed attempt is reused
    assert_eq!(h.strategist.calls(), 1);
    assert_eq!(h.consolidator.calls(), 1);
}

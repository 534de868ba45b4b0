//! Approval bookkeeping and the blocking approval policy.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use weave::character::DevelopmentMode;
use weave::pipeline::{ApprovalPolicy, NullProgress, ProgressEvent};
use weave::store::RunStatus;
use weave::Error;

use crate::fixtures::{concept, Harness, MockText};

/// Test: Approval is advisory by default
/// Given the advisory policy
/// When development runs without any approvals
/// Then the run completes and approvals only move the watermark
#[tokio::test]
async fn test_advisory_approval_is_bookkeeping_only() {
    let harness = Harness::new(MockText::new());
    let id = harness
        .service
        .create(concept(), DevelopmentMode::Fast)
        .await
        .unwrap();
    harness
        .service
        .run_development(id, Arc::new(NullProgress))
        .await
        .unwrap();
    assert_eq!(
        harness.service.get_status(id).await.unwrap().progress.completed_checkpoints,
        0
    );

    assert_eq!(harness.service.approve_checkpoint(id, 5).await.unwrap(), 5);
    assert_eq!(harness.service.approve_checkpoint(id, 3).await.unwrap(), 5);
    assert_eq!(harness.service.approve_checkpoint(id, 8).await.unwrap(), 8);
    assert!(matches!(
        harness.service.approve_checkpoint(id, 9).await.unwrap_err(),
        Error::CheckpointNotFound { number: 9, .. }
    ));
    assert_eq!(
        harness.service.get_status(id).await.unwrap().progress.completed_checkpoints,
        8
    );
}

/// Test: Blocking policy pauses between waves until approval
/// Given the blocking policy
/// When wave 1 completes
/// Then wave 2 does not start until checkpoints 1-2 are approved
#[tokio::test]
async fn test_blocking_policy_waits_between_waves() {
    let harness = Harness::with_policy(MockText::new(), ApprovalPolicy::Blocking);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (id, handle) = harness
        .service
        .start_development(concept(), DevelopmentMode::Fast, Arc::new(tx))
        .await
        .unwrap();

    let mut approvals = 0;
    while let Some(event) = rx.recv().await {
        if let ProgressEvent::WaveComplete { wave, .. } = event {
            tokio::time::sleep(Duration::from_millis(30)).await;
            let status = harness.service.get_status(id).await.unwrap();
            assert!(status.active);
            let last = match wave {
                1 => 2,
                2 => 5,
                _ => 7,
            };
            assert_eq!(
                status.progress.current_checkpoint, last,
                "no further checkpoints before approval of wave {}",
                wave
            );
            harness.service.approve_checkpoint(id, last).await.unwrap();
            approvals += 1;
        }
    }

    let profile = handle.await.unwrap().unwrap();
    assert_eq!(approvals, 3);
    assert_eq!(profile.metadata.total_checkpoints, 8);
    let status = harness.service.get_status(id).await.unwrap();
    assert_eq!(status.status, RunStatus::Completed);
    assert_eq!(status.progress.completed_checkpoints, 7);
}

/// Test: A spawned blocking run is released step by step by approvals
#[tokio::test]
async fn test_spawned_blocking_run_released_by_approvals() {
    let harness = Harness::with_policy(MockText::new(), ApprovalPolicy::Blocking);
    let id = harness
        .service
        .create(concept(), DevelopmentMode::Fast)
        .await
        .unwrap();

    let handle = harness
        .service
        .spawn_development(id, Arc::new(NullProgress))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        harness
            .service
            .get_status(id)
            .await
            .unwrap()
            .progress
            .current_checkpoint,
        2
    );

    harness.service.approve_checkpoint(id, 2).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.service.approve_checkpoint(id, 5).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.service.approve_checkpoint(id, 7).await.unwrap();

    let profile = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("run should finish once approved")
        .unwrap()
        .unwrap();
    assert_eq!(profile.character_id, id);
}

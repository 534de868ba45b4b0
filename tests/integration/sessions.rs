//! Single active session per character.

use std::sync::Arc;
use std::time::Duration;

use weave::character::DevelopmentMode;
use weave::pipeline::{ApprovalPolicy, NullProgress};
use weave::session::SessionOutcome;
use weave::store::RunStatus;
use weave::tasks::TaskKind;
use weave::Error;

use crate::fixtures::{concept, Harness, MockText};

/// Test: A second run for the same character is rejected while one is active
/// Given a blocking run paused after wave 1
/// When another run is requested for the same character
/// Then it fails with SessionActive and the first run is unaffected
#[tokio::test]
async fn test_second_run_for_same_character_conflicts() {
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
    assert!(harness.service.registry().is_active(id));

    let err = harness
        .service
        .spawn_development(id, Arc::new(NullProgress))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SessionActive(other) if other == id));
    assert!(err.is_conflict());

    for checkpoint in [2, 5, 7] {
        tokio::time::sleep(Duration::from_millis(40)).await;
        harness
            .service
            .approve_checkpoint(id, checkpoint)
            .await
            .unwrap();
    }
    handle.await.unwrap().unwrap();

    assert!(!harness.service.registry().is_active(id));
    assert_eq!(
        harness.service.registry().outcome(id),
        Some(SessionOutcome::Completed)
    );
}

/// Test: Different characters develop concurrently
#[tokio::test]
async fn test_distinct_characters_run_in_parallel() {
    let harness = Harness::new(MockText::new());
    let mut handles = Vec::new();
    for _ in 0..3 {
        let (id, handle) = harness
            .service
            .start_development(concept(), DevelopmentMode::Fast, Arc::new(NullProgress))
            .await
            .unwrap();
        handles.push((id, handle));
    }
    for (id, handle) in handles {
        let profile = handle.await.unwrap().unwrap();
        assert_eq!(profile.character_id, id);
        assert!(!harness.service.registry().is_active(id));
    }
}

/// Test: A finished run releases its session for a later attempt
#[tokio::test]
async fn test_session_released_after_failure() {
    let harness = Harness::new(MockText::new().failing(TaskKind::Relationships));
    let id = harness
        .service
        .create(concept(), DevelopmentMode::Fast)
        .await
        .unwrap();
    assert!(harness
        .service
        .run_development(id, Arc::new(NullProgress))
        .await
        .is_err());
    assert!(matches!(
        harness.service.registry().outcome(id),
        Some(SessionOutcome::Failed(ref e)) if e.contains("relationships")
    ));

    // The session is free again, but the failed run cannot be restarted.
    let err = harness
        .service
        .run_development(id, Arc::new(NullProgress))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Precondition(_)));
    assert!(!harness.service.registry().is_active(id));
    assert!(matches!(
        harness.service.registry().outcome(id),
        Some(SessionOutcome::Failed(ref e)) if e.contains("relationships")
    ));
}

/// Test: Restarting a finished character keeps its recorded outcome
/// Given a character whose development completed
/// When development is requested again
/// Then it is refused before any task runs and status still reports completion
#[tokio::test]
async fn test_restart_of_completed_character_keeps_outcome() {
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
    let calls = harness.text.calls().len();

    let err = harness
        .service
        .run_development(id, Arc::new(NullProgress))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Precondition(_)));
    assert_eq!(harness.text.calls().len(), calls);

    let status = harness.service.get_status(id).await.unwrap();
    assert_eq!(status.status, RunStatus::Completed);
    assert_eq!(status.outcome, Some(SessionOutcome::Completed));
    assert!(!status.active);
}

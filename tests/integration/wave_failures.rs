//! Failure and precondition handling across waves.

use std::sync::Arc;

use tokio::sync::mpsc;

use weave::character::{DevelopmentMode, Personality, StoryArc, StructuredOutput};
use weave::pipeline::{NullProgress, Orchestrator, ProgressEvent, RunPhase};
use weave::session::SessionOutcome;
use weave::store::{RunStatus, Store};
use weave::tasks::{TaskContext, TaskKind};
use weave::Error;

use crate::fixtures::{concept, drain, Harness, MockImage, MockText};

fn context(harness: &Harness, id: weave::character::CharacterId) -> TaskContext {
    TaskContext {
        character_id: id,
        text: harness.text.clone(),
        image: harness.image.clone(),
        store: harness.store.clone(),
    }
}

/// Test: One failing task fails the wave and the run
/// Given a story arc backend that errors
/// When wave 2 runs
/// Then no wave 2 checkpoint exists and the run is marked failed
#[tokio::test]
async fn test_failed_task_writes_no_sibling_checkpoints() {
    let harness = Harness::new(MockText::new().failing(TaskKind::StoryArc));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (id, handle) = harness
        .service
        .start_development(concept(), DevelopmentMode::Fast, Arc::new(tx))
        .await
        .unwrap();

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Generation(_)));

    assert_eq!(harness.store.list_checkpoints(id).await.unwrap(), vec![1, 2]);
    let kb = harness.store.load_kb(id).await.unwrap();
    assert!(kb.voice_dialogue().is_none());
    assert!(kb.physical_description().is_none());

    // The siblings still ran to completion before the wave failed.
    let calls = harness.text.calls();
    assert!(calls.contains(&TaskKind::VoiceDialogue));
    assert!(calls.contains(&TaskKind::PhysicalDescription));
    assert!(!calls.contains(&TaskKind::Relationships));

    let status = harness.service.get_status(id).await.unwrap();
    assert_eq!(status.status, RunStatus::Failed);
    assert_eq!(status.phase, RunPhase::Failed);
    assert!(status.error.as_deref().unwrap().contains("story_arc"));
    assert!(!status.active);
    assert!(matches!(status.outcome, Some(SessionOutcome::Failed(_))));

    let events = drain(&mut rx);
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::Error { wave: Some(2), agent: Some(agent), .. }) if agent == "story_arc"
    ));
    assert!(!events
        .iter()
        .any(|e| matches!(e, ProgressEvent::WaveComplete { wave: 2, .. })));
}

/// Test: Image backend failure fails wave 3
#[tokio::test]
async fn test_image_failure_fails_wave_three() {
    let harness = Harness::build(
        MockText::new(),
        MockImage::failing(),
        weave::pipeline::ApprovalPolicy::Advisory,
    );
    let id = harness
        .service
        .create(concept(), DevelopmentMode::Fast)
        .await
        .unwrap();
    let err = harness
        .service
        .run_development(id, Arc::new(NullProgress))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Generation(_)));
    assert_eq!(
        harness.store.list_checkpoints(id).await.unwrap(),
        vec![1, 2, 3, 4, 5]
    );
    assert!(harness.store.load_final_profile(id).await.is_err());
}

/// Test: Out-of-order requests are precondition failures that leave the run intact
#[tokio::test]
async fn test_preconditions_do_not_fail_the_run() {
    let harness = Harness::new(MockText::new());
    let id = harness
        .service
        .create(concept(), DevelopmentMode::Fast)
        .await
        .unwrap();
    let mut orchestrator = Orchestrator::load(context(&harness, id), Arc::new(NullProgress))
        .await
        .unwrap();

    assert!(matches!(
        orchestrator.consolidate().await.unwrap_err(),
        Error::Precondition(_)
    ));
    assert!(matches!(
        orchestrator.run_wave(3).await.unwrap_err(),
        Error::Precondition(_)
    ));

    orchestrator.run_wave(1).await.unwrap();
    assert!(matches!(
        orchestrator.run_wave(1).await.unwrap_err(),
        Error::Precondition(_)
    ));
    assert!(matches!(
        orchestrator.consolidate().await.unwrap_err(),
        Error::Precondition(_)
    ));
    assert_eq!(harness.store.list_checkpoints(id).await.unwrap(), vec![1, 2]);
    assert!(harness.store.load_final_profile(id).await.unwrap_err().is_not_found());

    let status = harness.service.get_status(id).await.unwrap();
    assert_eq!(status.status, RunStatus::Running);
    assert_eq!(status.phase, RunPhase::WaveDone(1));
    assert!(status.error.is_none());
    assert_eq!(harness.text.calls().len(), 2);

    orchestrator.run_wave(2).await.unwrap();
    orchestrator.run_wave(3).await.unwrap();
    orchestrator.consolidate().await.unwrap();
    assert_eq!(
        harness.service.get_status(id).await.unwrap().status,
        RunStatus::Completed
    );
}

/// Test: A failed run cannot be resumed
#[tokio::test]
async fn test_failed_run_rejects_further_waves() {
    let harness = Harness::new(MockText::new().failing(TaskKind::Personality));
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

    let mut orchestrator = Orchestrator::load(context(&harness, id), Arc::new(NullProgress))
        .await
        .unwrap();
    assert_eq!(orchestrator.phase(), RunPhase::Failed);
    assert!(matches!(
        orchestrator.run_wave(1).await.unwrap_err(),
        Error::InvalidPhaseTransition { .. }
    ));
}

/// Test: Unparseable structured output degrades to the fallback
/// Given a personality response with no JSON at all
/// When wave 1 runs
/// Then the run continues with the personality fallback
#[tokio::test]
async fn test_unparseable_structured_section_uses_fallback() {
    let text = MockText::new().replying(
        TaskKind::Personality,
        "NARRATIVE:\nShe keeps her own counsel.\n\nSTRUCTURED:\nnot json at all",
    );
    let harness = Harness::new(text);
    let id = harness
        .service
        .create(concept(), DevelopmentMode::Fast)
        .await
        .unwrap();
    let profile = harness
        .service
        .run_development(id, Arc::new(NullProgress))
        .await
        .unwrap();

    assert_eq!(profile.psychology, Personality::fallback());
    let checkpoint = harness.service.get_checkpoint(id, 1).await.unwrap();
    assert_eq!(checkpoint.output.narrative, "She keeps her own counsel.");
    assert_eq!(
        checkpoint.output.structured,
        serde_json::to_value(Personality::fallback()).unwrap()
    );
}

/// Test: A response with no structured section at all degrades to the fallback
/// Given a story arc response that is plain prose
/// When development runs to completion
/// Then the story arc is the fallback rather than an empty record
#[tokio::test]
async fn test_prose_only_response_uses_fallback() {
    let text = MockText::new().replying(
        TaskKind::StoryArc,
        "She drifts from port to port and never says why.",
    );
    let harness = Harness::new(text);
    let id = harness
        .service
        .create(concept(), DevelopmentMode::Fast)
        .await
        .unwrap();
    let profile = harness
        .service
        .run_development(id, Arc::new(NullProgress))
        .await
        .unwrap();

    assert_eq!(profile.narrative_arc, StoryArc::fallback());
    assert_ne!(profile.narrative_arc, StoryArc::default());
    let checkpoint = harness.service.get_checkpoint(id, 5).await.unwrap();
    assert_eq!(
        checkpoint.output.narrative,
        "She drifts from port to port and never says why."
    );
    assert_eq!(
        checkpoint.output.structured,
        serde_json::to_value(StoryArc::fallback()).unwrap()
    );
}

/// Test: Unknown characters are not found
#[tokio::test]
async fn test_unknown_character_is_not_found() {
    let harness = Harness::new(MockText::new());
    let id = weave::character::CharacterId::new();
    assert!(harness.service.get_status(id).await.unwrap_err().is_not_found());
    assert!(harness
        .service
        .run_development(id, Arc::new(NullProgress))
        .await
        .unwrap_err()
        .is_not_found());
    assert!(!harness.service.registry().is_active(id));
}

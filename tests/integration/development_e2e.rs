//! Full development runs from concept to final profile.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use weave::character::{DevelopmentMode, FinalProfile, Relationships};
use weave::pipeline::{NextWave, ProgressEvent, RunPhase, FINAL_AGENT};
use weave::store::{RunStatus, Store};
use weave::tasks::{TaskKind, IMAGE_VIEWS};

use crate::fixtures::{concept, drain, fs_service, Harness, MockText};

/// Test: Full run produces eight checkpoints in plan order
/// Given a concept and well-behaved backends
/// When development runs to completion
/// Then checkpoints 1-8 exist with agents in plan order
#[tokio::test]
async fn test_full_run_produces_numbered_checkpoints() {
    let harness = Harness::new(MockText::new());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (id, handle) = harness
        .service
        .start_development(concept(), DevelopmentMode::Balanced, Arc::new(tx))
        .await
        .unwrap();
    let profile = handle.await.unwrap().unwrap();

    let expected = [
        (1, "personality", 1),
        (2, "backstory_motivation", 1),
        (3, "voice_dialogue", 2),
        (4, "physical_description", 2),
        (5, "story_arc", 2),
        (6, "relationships", 3),
        (7, "image_generation", 3),
        (8, FINAL_AGENT, 4),
    ];
    for (number, agent, wave) in expected {
        let checkpoint = harness.service.get_checkpoint(id, number).await.unwrap();
        assert_eq!(checkpoint.agent, agent, "checkpoint {}", number);
        assert_eq!(checkpoint.wave, wave, "checkpoint {}", number);
    }

    let status = harness.service.get_status(id).await.unwrap();
    assert_eq!(status.status, RunStatus::Completed);
    assert_eq!(status.phase, RunPhase::Completed);
    assert_eq!(status.progress.total_checkpoints, 8);
    assert_eq!(status.progress.current_checkpoint, 8);
    assert!(!status.active);

    assert_eq!(profile.metadata.total_checkpoints, 8);
    assert_eq!(profile.metadata.mode, DevelopmentMode::Balanced);
    assert_eq!(profile.overview.role, "reluctant ally");
    assert_eq!(profile.voice.speech_pattern, "clipped");

    let events = drain(&mut rx);
    let checkpoints: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::CheckpointReady {
                checkpoint_number, ..
            } => Some(*checkpoint_number),
            _ => None,
        })
        .collect();
    assert_eq!(checkpoints, (1..=8).collect::<Vec<u32>>());
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::CharacterComplete { character_id, .. }) if *character_id == id
    ));
}

/// Test: Final profile relationships equal the relationships task output
#[tokio::test]
async fn test_final_profile_matches_task_outputs() {
    let harness = Harness::new(MockText::new());
    let id = harness
        .service
        .create(concept(), DevelopmentMode::Fast)
        .await
        .unwrap();
    let profile = harness
        .service
        .run_development(id, Arc::new(weave::pipeline::NullProgress))
        .await
        .unwrap();

    let checkpoint = harness.service.get_checkpoint(id, 6).await.unwrap();
    let relationships: Relationships =
        serde_json::from_value(checkpoint.output.structured).unwrap();
    assert_eq!(profile.relationships, relationships.relationships);
    assert_eq!(profile.relationships[1].character, "The Mentor (TBD)");

    let stored = harness.service.get_final_profile(id).await.unwrap();
    assert_eq!(stored, profile);

    let final_checkpoint = harness.service.get_checkpoint(id, 8).await.unwrap();
    let embedded: FinalProfile =
        serde_json::from_value(final_checkpoint.output.structured).unwrap();
    assert_eq!(embedded, profile);

    let json = serde_json::to_value(&profile).unwrap();
    for key in FinalProfile::KEYS {
        assert!(json.get(key).is_some(), "profile missing {}", key);
    }
}

/// Test: Completion order does not change numbering
/// Given wave 2 tasks that finish in reverse plan order
/// When the wave completes
/// Then checkpoints 3, 4, 5 still follow plan order
#[tokio::test]
async fn test_completion_order_does_not_affect_numbering() {
    let text = MockText::new()
        .delayed(TaskKind::VoiceDialogue, Duration::from_millis(80))
        .delayed(TaskKind::PhysicalDescription, Duration::from_millis(40));
    let harness = Harness::new(text);
    let id = harness
        .service
        .create(concept(), DevelopmentMode::Fast)
        .await
        .unwrap();
    harness
        .service
        .run_development(id, Arc::new(weave::pipeline::NullProgress))
        .await
        .unwrap();

    let calls = harness.text.calls();
    let story = calls.iter().position(|k| *k == TaskKind::StoryArc).unwrap();
    let voice = calls.iter().position(|k| *k == TaskKind::VoiceDialogue).unwrap();
    assert!(story < voice, "story arc should finish first: {:?}", calls);

    assert_eq!(harness.service.get_checkpoint(id, 3).await.unwrap().agent, "voice_dialogue");
    assert_eq!(
        harness.service.get_checkpoint(id, 4).await.unwrap().agent,
        "physical_description"
    );
    assert_eq!(harness.service.get_checkpoint(id, 5).await.unwrap().agent, "story_arc");
}

/// Test: Images are written through the store and referenced by path
#[tokio::test]
async fn test_images_saved_through_store() {
    let harness = Harness::new(MockText::new());
    let id = harness
        .service
        .create(concept(), DevelopmentMode::Fast)
        .await
        .unwrap();
    let profile = harness
        .service
        .run_development(id, Arc::new(weave::pipeline::NullProgress))
        .await
        .unwrap();

    let kinds: Vec<&str> = profile
        .visual
        .images
        .iter()
        .map(|i| i.kind.as_str())
        .collect();
    assert_eq!(kinds, IMAGE_VIEWS.to_vec());
    for view in IMAGE_VIEWS {
        let file = format!("{}.png", view);
        assert!(harness.store.image(id, &file).await.is_some(), "{} missing", file);
    }

    let requests = harness.image.requests();
    assert_eq!(requests.len(), 4);
    assert!(requests[0].style_context.contains("gritty tone"));
    assert!(requests[0].style_context.contains("watchful calm"));
    assert!(requests.iter().all(|r| r.prompt.contains("coiled, back to the wall")));

    let checkpoint = harness.service.get_checkpoint(id, 7).await.unwrap();
    assert_eq!(checkpoint.metadata.tokens_used, 4 * 1290);
}

/// Test: Usage accounting sums task checkpoints
#[tokio::test]
async fn test_total_tokens_sum_task_checkpoints() {
    let harness = Harness::new(MockText::new());
    let id = harness
        .service
        .create(concept(), DevelopmentMode::Deep)
        .await
        .unwrap();
    let profile = harness
        .service
        .run_development(id, Arc::new(weave::pipeline::NullProgress))
        .await
        .unwrap();

    let mut sum = 0;
    for number in 1..=7 {
        let checkpoint = harness.store.load_checkpoint(id, number).await.unwrap();
        assert!(checkpoint.metadata.tokens_used > 0);
        sum += checkpoint.metadata.tokens_used;
    }
    assert_eq!(profile.metadata.total_tokens, sum);
    assert_eq!(
        harness.store.load_checkpoint(id, 8).await.unwrap().metadata.tokens_used,
        0
    );
}

/// Test: Independent runs produce the same shape
#[tokio::test]
async fn test_runs_are_shape_identical_across_ids() {
    let harness = Harness::new(MockText::new());
    let mut shapes = Vec::new();
    for _ in 0..2 {
        let id = harness
            .service
            .create(concept(), DevelopmentMode::Fast)
            .await
            .unwrap();
        let profile = harness
            .service
            .run_development(id, Arc::new(weave::pipeline::NullProgress))
            .await
            .unwrap();
        assert_eq!(profile.character_id, id);
        let agents: Vec<String> = {
            let mut agents = Vec::new();
            for number in harness.store.list_checkpoints(id).await.unwrap() {
                agents.push(harness.store.load_checkpoint(id, number).await.unwrap().agent);
            }
            agents
        };
        shapes.push((agents, profile.psychology, profile.relationships));
    }
    assert_eq!(shapes[0], shapes[1]);
}

/// Test: Wave events carry the next wave, ending with "final"
#[tokio::test]
async fn test_wave_complete_events_chain_to_final() {
    let harness = Harness::new(MockText::new());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (_id, handle) = harness
        .service
        .start_development(concept(), DevelopmentMode::Fast, Arc::new(tx))
        .await
        .unwrap();
    handle.await.unwrap().unwrap();

    let next: Vec<NextWave> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            ProgressEvent::WaveComplete { next_wave, .. } => Some(next_wave),
            _ => None,
        })
        .collect();
    assert_eq!(
        next,
        vec![NextWave::Wave(2), NextWave::Wave(3), NextWave::Final]
    );
}

/// Test: A filesystem-backed run leaves the documented layout on disk
#[tokio::test]
async fn test_filesystem_layout_after_run() {
    let (_temp_dir, store, service) = fs_service(MockText::new());
    let id = service
        .create(concept(), DevelopmentMode::Fast)
        .await
        .unwrap();
    service
        .run_development(id, Arc::new(weave::pipeline::NullProgress))
        .await
        .unwrap();

    let dir = store.character_dir(id);
    assert!(dir.join("kb.json").exists());
    assert!(dir.join("metadata.json").exists());
    assert!(dir.join("final_profile.json").exists());
    assert!(dir.join("images").join("portrait.png").exists());
    for number in 1..=8 {
        assert!(dir
            .join("checkpoints")
            .join(format!("checkpoint_{}.json", number))
            .exists());
    }
}

//! Assembling the final profile from a completed knowledge base.

use chrono::{DateTime, Utc};

use crate::character::{
    FinalProfile, KnowledgeBase, ProfileImage, ProfileMetadata, ProfileOverview, ProfileVisual,
    PROFILE_VERSION,
};
use crate::error::{Error, Result};
use crate::store::RunMetadata;
use crate::tasks::TaskKind;

pub const FINAL_NARRATIVE: &str =
    "Character development complete. All aspects consolidated into comprehensive profile.";

const DEFAULT_IMPORTANCE: u8 = 5;

fn missing(kind: TaskKind) -> Error {
    Error::Precondition(format!("cannot consolidate before {} completes", kind))
}

/// Merge every task output into one profile.
///
/// Fails with `Precondition` if any task has not completed; no partial
/// profile is produced.
pub fn build_profile(
    kb: &KnowledgeBase,
    metadata: &RunMetadata,
    total_tokens: u64,
    completed_at: DateTime<Utc>,
) -> Result<FinalProfile> {
    let character = kb.primary_character()?;
    let personality = kb.personality().ok_or_else(|| missing(TaskKind::Personality))?;
    let backstory = kb
        .backstory_motivation()
        .ok_or_else(|| missing(TaskKind::BackstoryMotivation))?;
    let voice = kb.voice_dialogue().ok_or_else(|| missing(TaskKind::VoiceDialogue))?;
    let physical = kb
        .physical_description()
        .ok_or_else(|| missing(TaskKind::PhysicalDescription))?;
    let arc = kb.story_arc().ok_or_else(|| missing(TaskKind::StoryArc))?;
    let relationships = kb
        .relationships()
        .ok_or_else(|| missing(TaskKind::Relationships))?;
    let images = kb
        .image_generation()
        .ok_or_else(|| missing(TaskKind::ImageGeneration))?;

    let role = if arc.role.trim().is_empty() {
        character.role.clone()
    } else {
        arc.role.clone()
    };

    let elapsed = completed_at - metadata.created_at;
    let development_time_minutes = (elapsed.num_milliseconds().max(0) as f64) / 60_000.0;

    Ok(FinalProfile {
        character_id: kb.character_id(),
        name: character.name.clone(),
        version: PROFILE_VERSION.to_string(),
        completed_at,
        overview: ProfileOverview {
            name: character.name.clone(),
            role,
            importance: DEFAULT_IMPORTANCE,
            one_line: format!("{} - {}", character.name, character.role),
        },
        visual: ProfileVisual {
            images: images
                .images
                .iter()
                .map(|img| ProfileImage {
                    kind: img.kind.clone(),
                    url: img.path.clone(),
                })
                .collect(),
            style_notes: images.style_profile.clone(),
        },
        psychology: personality.clone(),
        physical_presence: physical.clone(),
        voice: voice.clone(),
        backstory_motivation: backstory.clone(),
        narrative_arc: arc.clone(),
        relationships: relationships.relationships.clone(),
        metadata: ProfileMetadata {
            mode: kb.mode(),
            development_time_minutes,
            total_checkpoints: metadata.total_checkpoints,
            regenerations: metadata.regenerations,
            total_tokens,
        },
    })
}

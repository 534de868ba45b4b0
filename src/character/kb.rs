//! The per-character knowledge base that generation tasks read from.
//!
//! Each task owns one optional slot. A task counts as completed exactly
//! when its slot is filled, so status is derived from the slots rather
//! than tracked beside them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::outputs::{
    BackstoryMotivation, ImageSet, PhysicalDescription, Personality, Relationships, StoryArc,
    TaskOutput, VoiceDialogue,
};
use super::types::{CharacterId, CharacterSeed, ConceptInput, DevelopmentMode};
use crate::error::{Error, Result};
use crate::tasks::TaskKind;

/// Lifecycle of a single task as seen through the knowledge base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatusEntry {
    pub status: TaskState,
    pub wave: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    character_id: CharacterId,
    input: ConceptInput,
    mode: DevelopmentMode,
    current_wave: u32,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    personality: Option<Personality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    backstory_motivation: Option<BackstoryMotivation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    voice_dialogue: Option<VoiceDialogue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    physical_description: Option<PhysicalDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    story_arc: Option<StoryArc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    relationships: Option<Relationships>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image_generation: Option<ImageSet>,
}

impl KnowledgeBase {
    /// Create an empty knowledge base for a validated concept.
    pub fn new(character_id: CharacterId, input: ConceptInput, mode: DevelopmentMode) -> Result<Self> {
        input.validate()?;
        Ok(Self {
            character_id,
            input,
            mode,
            current_wave: 0,
            created_at: Utc::now(),
            personality: None,
            backstory_motivation: None,
            voice_dialogue: None,
            physical_description: None,
            story_arc: None,
            relationships: None,
            image_generation: None,
        })
    }

    pub fn character_id(&self) -> CharacterId {
        self.character_id
    }

    pub fn input(&self) -> &ConceptInput {
        &self.input
    }

    pub fn mode(&self) -> DevelopmentMode {
        self.mode
    }

    pub fn current_wave(&self) -> u32 {
        self.current_wave
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn primary_character(&self) -> Result<&CharacterSeed> {
        self.input
            .primary()
            .ok_or_else(|| Error::Validation("knowledge base has no primary character".into()))
    }

    /// Stamp the wave about to run. The wave number never decreases.
    pub fn begin_wave(&mut self, wave: u32) -> Result<()> {
        if wave < self.current_wave {
            return Err(Error::Precondition(format!(
                "wave {} requested after wave {} already started",
                wave, self.current_wave
            )));
        }
        self.current_wave = wave;
        Ok(())
    }

    pub fn personality(&self) -> Option<&Personality> {
        self.personality.as_ref()
    }

    pub fn backstory_motivation(&self) -> Option<&BackstoryMotivation> {
        self.backstory_motivation.as_ref()
    }

    pub fn voice_dialogue(&self) -> Option<&VoiceDialogue> {
        self.voice_dialogue.as_ref()
    }

    pub fn physical_description(&self) -> Option<&PhysicalDescription> {
        self.physical_description.as_ref()
    }

    pub fn story_arc(&self) -> Option<&StoryArc> {
        self.story_arc.as_ref()
    }

    pub fn relationships(&self) -> Option<&Relationships> {
        self.relationships.as_ref()
    }

    pub fn image_generation(&self) -> Option<&ImageSet> {
        self.image_generation.as_ref()
    }

    pub fn has(&self, kind: TaskKind) -> bool {
        match kind {
            TaskKind::Personality => self.personality.is_some(),
            TaskKind::BackstoryMotivation => self.backstory_motivation.is_some(),
            TaskKind::VoiceDialogue => self.voice_dialogue.is_some(),
            TaskKind::PhysicalDescription => self.physical_description.is_some(),
            TaskKind::StoryArc => self.story_arc.is_some(),
            TaskKind::Relationships => self.relationships.is_some(),
            TaskKind::ImageGeneration => self.image_generation.is_some(),
        }
    }

    /// Tasks from `kinds` whose output is not yet present.
    pub fn missing<'a>(&self, kinds: impl IntoIterator<Item = &'a TaskKind>) -> Vec<TaskKind> {
        kinds.into_iter().copied().filter(|k| !self.has(*k)).collect()
    }

    pub fn status(&self, kind: TaskKind) -> TaskStatusEntry {
        TaskStatusEntry {
            status: if self.has(kind) {
                TaskState::Completed
            } else {
                TaskState::Pending
            },
            wave: kind.wave(),
        }
    }

    pub fn task_statuses(&self) -> BTreeMap<TaskKind, TaskStatusEntry> {
        TaskKind::ALL.iter().map(|k| (*k, self.status(*k))).collect()
    }

    /// Merge a completed task's output. Filled slots are never overwritten.
    pub fn record(&mut self, output: TaskOutput) -> Result<()> {
        let kind = output.kind();
        if self.has(kind) {
            return Err(Error::FieldAlreadySet(kind.name().to_string()));
        }
        match output {
            TaskOutput::Personality(v) => self.personality = Some(v),
            TaskOutput::BackstoryMotivation(v) => self.backstory_motivation = Some(v),
            TaskOutput::VoiceDialogue(v) => self.voice_dialogue = Some(v),
            TaskOutput::PhysicalDescription(v) => self.physical_description = Some(v),
            TaskOutput::StoryArc(v) => self.story_arc = Some(v),
            TaskOutput::Relationships(v) => self.relationships = Some(v),
            TaskOutput::ImageGeneration(v) => self.image_generation = Some(v),
        }
        Ok(())
    }
}

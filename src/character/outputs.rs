//! Structured outputs produced by each generation task.
//!
//! Every field defaults to empty so a partially filled structured section
//! still deserializes with all keys present. `fallback()` is the minimal
//! value used when the section does not parse at all.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::tasks::TaskKind;
use crate::Result;

/// A task's structured section.
pub trait StructuredOutput: Serialize + DeserializeOwned + Default + Clone + Send + 'static {
    const KIND: TaskKind;

    /// Minimal valid value for a structured section that failed to parse.
    fn fallback() -> Self;

    fn into_output(self) -> TaskOutput;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Personality {
    pub core_traits: Vec<String>,
    pub fears: Vec<String>,
    pub secrets: Vec<String>,
    pub emotional_baseline: String,
    pub triggers: Vec<String>,
}

impl StructuredOutput for Personality {
    const KIND: TaskKind = TaskKind::Personality;

    fn fallback() -> Self {
        Self {
            core_traits: vec!["complex".into(), "conflicted".into()],
            fears: vec!["unknown".into()],
            secrets: vec!["hidden past".into()],
            emotional_baseline: "guarded".into(),
            triggers: vec!["personal questions".into()],
        }
    }

    fn into_output(self) -> TaskOutput {
        TaskOutput::Personality(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TimelineEvent {
    pub age: Option<u32>,
    pub event: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Goals {
    pub surface: String,
    pub deep: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BackstoryMotivation {
    pub timeline: Vec<TimelineEvent>,
    pub formative_experiences: Vec<String>,
    pub goals: Goals,
    pub internal_conflicts: Vec<String>,
}

impl StructuredOutput for BackstoryMotivation {
    const KIND: TaskKind = TaskKind::BackstoryMotivation;

    fn fallback() -> Self {
        Self {
            timeline: vec![TimelineEvent {
                age: Some(20),
                event: "Significant event".into(),
            }],
            formative_experiences: vec!["Key experience".into()],
            goals: Goals {
                surface: "Unknown".into(),
                deep: "Unknown".into(),
            },
            internal_conflicts: vec!["Internal struggle".into()],
        }
    }

    fn into_output(self) -> TaskOutput {
        TaskOutput::BackstoryMotivation(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SampleDialogue {
    pub confident: String,
    pub vulnerable: String,
    pub stressed: String,
    pub sarcastic: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VoiceDialogue {
    pub speech_pattern: String,
    pub verbal_tics: Vec<String>,
    pub vocabulary: String,
    pub sample_dialogue: SampleDialogue,
}

impl StructuredOutput for VoiceDialogue {
    const KIND: TaskKind = TaskKind::VoiceDialogue;

    fn fallback() -> Self {
        Self {
            speech_pattern: "Unknown".into(),
            verbal_tics: vec!["...".into()],
            vocabulary: "Unknown".into(),
            sample_dialogue: SampleDialogue {
                confident: "...".into(),
                vulnerable: "...".into(),
                stressed: "...".into(),
                sarcastic: "...".into(),
            },
        }
    }

    fn into_output(self) -> TaskOutput {
        TaskOutput::VoiceDialogue(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PhysicalDescription {
    pub mannerisms: Vec<String>,
    pub body_language: String,
    pub movement_style: String,
    pub physical_quirks: Vec<String>,
}

impl StructuredOutput for PhysicalDescription {
    const KIND: TaskKind = TaskKind::PhysicalDescription;

    fn fallback() -> Self {
        Self {
            mannerisms: vec!["Unknown mannerism".into()],
            body_language: "Unknown".into(),
            movement_style: "Unknown".into(),
            physical_quirks: vec!["Unknown quirk".into()],
        }
    }

    fn into_output(self) -> TaskOutput {
        TaskOutput::PhysicalDescription(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StoryArc {
    pub role: String,
    pub arc_type: String,
    pub starting_point: String,
    pub key_moments: Vec<String>,
    pub transformation: String,
    pub ending_point: String,
}

impl StructuredOutput for StoryArc {
    const KIND: TaskKind = TaskKind::StoryArc;

    fn fallback() -> Self {
        Self {
            role: String::new(),
            arc_type: "unknown".into(),
            starting_point: "Unknown".into(),
            key_moments: vec!["Turning point".into()],
            transformation: "Unknown".into(),
            ending_point: "Unknown".into(),
        }
    }

    fn into_output(self) -> TaskOutput {
        TaskOutput::StoryArc(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Relationship {
    pub character: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub dynamic: String,
    pub evolution: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Relationships {
    pub relationships: Vec<Relationship>,
}

impl StructuredOutput for Relationships {
    const KIND: TaskKind = TaskKind::Relationships;

    fn fallback() -> Self {
        Self {
            relationships: vec![Relationship {
                character: "Unknown".into(),
                kind: "unknown".into(),
                dynamic: "Unknown".into(),
                evolution: "Unknown".into(),
            }],
        }
    }

    fn into_output(self) -> TaskOutput {
        TaskOutput::Relationships(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GeneratedImage {
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ImageSet {
    pub images: Vec<GeneratedImage>,
    pub style_profile: String,
}

impl StructuredOutput for ImageSet {
    const KIND: TaskKind = TaskKind::ImageGeneration;

    fn fallback() -> Self {
        Self::default()
    }

    fn into_output(self) -> TaskOutput {
        TaskOutput::ImageGeneration(self)
    }
}

/// The structured output of one completed task, tagged by task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", content = "data", rename_all = "snake_case")]
pub enum TaskOutput {
    Personality(Personality),
    BackstoryMotivation(BackstoryMotivation),
    VoiceDialogue(VoiceDialogue),
    PhysicalDescription(PhysicalDescription),
    StoryArc(StoryArc),
    Relationships(Relationships),
    ImageGeneration(ImageSet),
}

impl TaskOutput {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskOutput::Personality(_) => TaskKind::Personality,
            TaskOutput::BackstoryMotivation(_) => TaskKind::BackstoryMotivation,
            TaskOutput::VoiceDialogue(_) => TaskKind::VoiceDialogue,
            TaskOutput::PhysicalDescription(_) => TaskKind::PhysicalDescription,
            TaskOutput::StoryArc(_) => TaskKind::StoryArc,
            TaskOutput::Relationships(_) => TaskKind::Relationships,
            TaskOutput::ImageGeneration(_) => TaskKind::ImageGeneration,
        }
    }

    /// The untagged structured value, as stored in a checkpoint.
    pub fn to_structured(&self) -> Result<serde_json::Value> {
        let value = match self {
            TaskOutput::Personality(v) => serde_json::to_value(v)?,
            TaskOutput::BackstoryMotivation(v) => serde_json::to_value(v)?,
            TaskOutput::VoiceDialogue(v) => serde_json::to_value(v)?,
            TaskOutput::PhysicalDescription(v) => serde_json::to_value(v)?,
            TaskOutput::StoryArc(v) => serde_json::to_value(v)?,
            TaskOutput::Relationships(v) => serde_json::to_value(v)?,
            TaskOutput::ImageGeneration(v) => serde_json::to_value(v)?,
        };
        Ok(value)
    }
}

//! The seven generation tasks and everything needed to run one.
//!
//! A task reads the knowledge base as it stood when its wave started,
//! issues one generation call (four for the image task) and returns its
//! narrative beside a typed structured output.

mod image;
mod parse;
mod prompt;
mod runner;

pub use image::IMAGE_VIEWS;
pub use parse::{parse_response, split_response, ParsedResponse};
pub use prompt::{build_request, style_context};
pub use runner::{run_task, TaskContext, TaskOutcome};

use serde::{Deserialize, Serialize};

/// One of the seven character-development tasks.
///
/// Declaration order is table order: it fixes checkpoint numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Personality,
    BackstoryMotivation,
    VoiceDialogue,
    PhysicalDescription,
    StoryArc,
    Relationships,
    ImageGeneration,
}

impl TaskKind {
    pub const ALL: [TaskKind; 7] = [
        TaskKind::Personality,
        TaskKind::BackstoryMotivation,
        TaskKind::VoiceDialogue,
        TaskKind::PhysicalDescription,
        TaskKind::StoryArc,
        TaskKind::Relationships,
        TaskKind::ImageGeneration,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::Personality => "personality",
            TaskKind::BackstoryMotivation => "backstory_motivation",
            TaskKind::VoiceDialogue => "voice_dialogue",
            TaskKind::PhysicalDescription => "physical_description",
            TaskKind::StoryArc => "story_arc",
            TaskKind::Relationships => "relationships",
            TaskKind::ImageGeneration => "image_generation",
        }
    }

    /// The wave this task is scheduled in.
    pub fn wave(&self) -> u32 {
        match self {
            TaskKind::Personality | TaskKind::BackstoryMotivation => 1,
            TaskKind::VoiceDialogue | TaskKind::PhysicalDescription | TaskKind::StoryArc => 2,
            TaskKind::Relationships | TaskKind::ImageGeneration => 3,
        }
    }

    /// Fields that must be present before this task may run.
    pub fn dependencies(&self) -> &'static [TaskKind] {
        match self {
            TaskKind::Personality | TaskKind::BackstoryMotivation => &[],
            TaskKind::VoiceDialogue | TaskKind::PhysicalDescription | TaskKind::StoryArc => {
                &[TaskKind::Personality, TaskKind::BackstoryMotivation]
            }
            TaskKind::Relationships => &[
                TaskKind::Personality,
                TaskKind::BackstoryMotivation,
                TaskKind::StoryArc,
            ],
            TaskKind::ImageGeneration => &[TaskKind::PhysicalDescription, TaskKind::Personality],
        }
    }

    /// Same-wave fields used as context when they happen to be present.
    pub fn optional_context(&self) -> &'static [TaskKind] {
        match self {
            TaskKind::BackstoryMotivation => &[TaskKind::Personality],
            _ => &[],
        }
    }

    pub fn temperature(&self) -> f32 {
        match self {
            TaskKind::VoiceDialogue => 0.8,
            _ => 0.7,
        }
    }

    pub fn max_tokens(&self) -> u32 {
        match self {
            TaskKind::BackstoryMotivation => 5000,
            TaskKind::Relationships => 4500,
            _ => 4000,
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        TaskKind::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| format!("unknown task: {}", s))
    }
}

//! The terminal, consolidated character profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::outputs::{
    BackstoryMotivation, PhysicalDescription, Personality, Relationship, StoryArc, VoiceDialogue,
};
use super::types::{CharacterId, DevelopmentMode};

pub const PROFILE_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileOverview {
    pub name: String,
    pub role: String,
    pub importance: u8,
    pub one_line: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileImage {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileVisual {
    pub images: Vec<ProfileImage>,
    pub style_notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileMetadata {
    pub mode: DevelopmentMode,
    pub development_time_minutes: f64,
    pub total_checkpoints: u32,
    pub regenerations: u32,
    pub total_tokens: u64,
}

/// Every task's output merged under disjoint keys. Written once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalProfile {
    pub character_id: CharacterId,
    pub name: String,
    pub version: String,
    pub completed_at: DateTime<Utc>,
    pub overview: ProfileOverview,
    pub visual: ProfileVisual,
    pub psychology: Personality,
    pub physical_presence: PhysicalDescription,
    pub voice: VoiceDialogue,
    pub backstory_motivation: BackstoryMotivation,
    pub narrative_arc: StoryArc,
    pub relationships: Vec<Relationship>,
    pub metadata: ProfileMetadata,
}

impl FinalProfile {
    /// Top-level keys in serialized order.
    pub const KEYS: [&'static str; 13] = [
        "character_id",
        "name",
        "version",
        "completed_at",
        "overview",
        "visual",
        "psychology",
        "physical_presence",
        "voice",
        "backstory_motivation",
        "narrative_arc",
        "relationships",
        "metadata",
    ];
}

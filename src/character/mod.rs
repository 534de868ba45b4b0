//! Character data model: identity, concept input, task outputs and the
//! knowledge base that accumulates them.

mod kb;
mod outputs;
mod profile;
mod types;

pub use kb::{KnowledgeBase, TaskState, TaskStatusEntry};
pub use outputs::{
    BackstoryMotivation, GeneratedImage, Goals, ImageSet, PhysicalDescription, Personality,
    Relationship, Relationships, SampleDialogue, StoryArc, StructuredOutput, TaskOutput,
    TimelineEvent, VoiceDialogue,
};
pub use profile::{
    FinalProfile, ProfileImage, ProfileMetadata, ProfileOverview, ProfileVisual, PROFILE_VERSION,
};
pub use types::{CharacterId, CharacterSeed, ConceptInput, DevelopmentMode, Storyline};

use thiserror::Error;

use crate::character::CharacterId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Generation binary not found: {0}")]
    BinaryNotFound(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Character not found: {0}")]
    CharacterNotFound(CharacterId),

    #[error("Checkpoint {number} not found for character {character}")]
    CheckpointNotFound { character: CharacterId, number: u32 },

    #[error("Final profile not found for character {0}")]
    ProfileNotFound(CharacterId),

    #[error("Checkpoint {number} already exists for character {character}")]
    CheckpointExists { character: CharacterId, number: u32 },

    #[error("Knowledge base field already set: {0}")]
    FieldAlreadySet(String),

    #[error("Development session already active: {0}")]
    SessionActive(CharacterId),

    #[error("Invalid phase transition from {from} to {to}")]
    InvalidPhaseTransition { from: String, to: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("No home directory")]
    NoHomeDir,
}

impl Error {
    /// Requested record does not exist yet.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::CharacterNotFound(_)
                | Error::CheckpointNotFound { .. }
                | Error::ProfileNotFound(_)
        )
    }

    /// A write collided with an existing record or an active session.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Error::CheckpointExists { .. } | Error::FieldAlreadySet(_) | Error::SessionActive(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

//! Identity and input types for a character in development.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a character development run.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterId(pub Uuid);

impl CharacterId {
    /// Create a new unique character identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for CharacterId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CharacterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CharacterId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// How much detail generation tasks ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DevelopmentMode {
    Fast,
    #[default]
    Balanced,
    Deep,
}

impl DevelopmentMode {
    /// Depth directive embedded in every task instruction.
    pub fn directive(&self) -> &'static str {
        match self {
            DevelopmentMode::Fast => "Focus on essential elements only.",
            DevelopmentMode::Balanced => "Balance depth with efficiency.",
            DevelopmentMode::Deep => "Provide comprehensive analysis with depth and nuance.",
        }
    }
}

impl std::fmt::Display for DevelopmentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DevelopmentMode::Fast => write!(f, "fast"),
            DevelopmentMode::Balanced => write!(f, "balanced"),
            DevelopmentMode::Deep => write!(f, "deep"),
        }
    }
}

impl std::str::FromStr for DevelopmentMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fast" => Ok(DevelopmentMode::Fast),
            "balanced" => Ok(DevelopmentMode::Balanced),
            "deep" => Ok(DevelopmentMode::Deep),
            other => Err(format!("unknown development mode: {}", other)),
        }
    }
}

/// One character as described by the upstream concept-gathering step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CharacterSeed {
    pub name: String,
    pub personality: String,
    pub appearance: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Storyline {
    pub overview: String,
    pub tone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setting: Option<String>,
}

/// The terse concept a run starts from. Immutable once a run is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptInput {
    pub characters: Vec<CharacterSeed>,
    #[serde(default)]
    pub storyline: Storyline,
}

impl ConceptInput {
    /// The character being developed; the first one listed.
    pub fn primary(&self) -> Option<&CharacterSeed> {
        self.characters.first()
    }

    /// Reject inputs the pipeline cannot work from.
    pub fn validate(&self) -> crate::Result<()> {
        match self.primary() {
            None => Err(crate::Error::Validation(
                "concept input lists no characters".to_string(),
            )),
            Some(seed) if seed.name.trim().is_empty() => Err(crate::Error::Validation(
                "primary character has no name".to_string(),
            )),
            Some(_) => Ok(()),
        }
    }
}

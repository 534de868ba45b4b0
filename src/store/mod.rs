//! Storage boundary: knowledge base, run metadata, checkpoints, the final
//! profile and image files, keyed by character.
//!
//! Checkpoints are append-only. Metadata is replaced whole by
//! `save_metadata`; concurrent writers (the orchestrator and approvals)
//! go through `update_metadata` instead.

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::character::{CharacterId, ConceptInput, DevelopmentMode, FinalProfile, KnowledgeBase};
use crate::pipeline::{RunPhase, TOTAL_CHECKPOINTS};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Run-level bookkeeping for one character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub status: RunStatus,
    pub phase: RunPhase,
    /// Highest checkpoint created so far.
    pub current_checkpoint: u32,
    /// Highest checkpoint a human has approved.
    pub completed_checkpoints: u32,
    pub total_checkpoints: u32,
    pub regenerations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunMetadata {
    pub fn new(total_checkpoints: u32) -> Self {
        let now = Utc::now();
        Self {
            status: RunStatus::Running,
            phase: RunPhase::Created,
            current_checkpoint: 0,
            completed_checkpoints: 0,
            total_checkpoints,
            regenerations: 0,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = RunStatus::Failed;
        self.phase = RunPhase::Failed;
        self.error = Some(error.into());
        self.touch();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    AwaitingApproval,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointOutput {
    pub narrative: String,
    pub structured: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub timestamp: DateTime<Utc>,
    pub tokens_used: u64,
    pub agent_time_seconds: f64,
}

/// One completed task's output, numbered for review. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_number: u32,
    pub agent: String,
    pub wave: u32,
    pub status: CheckpointStatus,
    pub output: CheckpointOutput,
    pub metadata: CheckpointMetadata,
}

/// In-place edit applied by [`Store::update_metadata`].
pub type MetadataUpdate = Box<dyn FnOnce(&mut RunMetadata) + Send>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn save_kb(&self, kb: &KnowledgeBase) -> Result<()>;

    /// Fails with `CharacterNotFound` for unknown ids.
    async fn load_kb(&self, id: CharacterId) -> Result<KnowledgeBase>;

    async fn save_metadata(&self, id: CharacterId, metadata: &RunMetadata) -> Result<()>;

    async fn load_metadata(&self, id: CharacterId) -> Result<RunMetadata>;

    /// Load, edit, touch and save the metadata as one step with respect to
    /// other updates through this store. Returns the saved value.
    async fn update_metadata(&self, id: CharacterId, apply: MetadataUpdate) -> Result<RunMetadata>;

    /// Fails with `CheckpointExists` if that number is already stored.
    async fn save_checkpoint(&self, id: CharacterId, checkpoint: &Checkpoint) -> Result<()>;

    async fn load_checkpoint(&self, id: CharacterId, number: u32) -> Result<Checkpoint>;

    /// Stored checkpoint numbers, ascending.
    async fn list_checkpoints(&self, id: CharacterId) -> Result<Vec<u32>>;

    async fn save_final_profile(&self, id: CharacterId, profile: &FinalProfile) -> Result<()>;

    async fn load_final_profile(&self, id: CharacterId) -> Result<FinalProfile>;

    /// Persist an image file and return the path or URL it can be read from.
    async fn save_image(&self, id: CharacterId, file_name: &str, data: &[u8]) -> Result<String>;

    /// Create a fresh knowledge base and metadata record for `input`.
    async fn create(&self, input: ConceptInput, mode: DevelopmentMode) -> Result<CharacterId> {
        let id = CharacterId::new();
        let kb = KnowledgeBase::new(id, input, mode)?;
        self.save_kb(&kb).await?;
        self.save_metadata(id, &RunMetadata::new(TOTAL_CHECKPOINTS))
            .await?;
        Ok(id)
    }
}

//! Operations exposed to the presentation layer.
//!
//! `CharacterService` owns the store, the generation backends and the
//! session registry. Development runs are spawned as tokio tasks; their
//! result is available through the returned handle and, once finished,
//! through the registry even when nobody listened for progress.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::character::{
    CharacterId, ConceptInput, DevelopmentMode, FinalProfile, TaskStatusEntry,
};
use crate::config::{Config, TextBackendKind};
use crate::generation::{ClaudeCli, HttpBackend, ImageGenerator, TextGenerator};
use crate::pipeline::{ApprovalPolicy, Orchestrator, ProgressSink, RunPhase};
use crate::session::{SessionOutcome, SessionRegistry};
use crate::store::{Checkpoint, FsStore, RunStatus, Store};
use crate::tasks::{TaskContext, TaskKind};
use crate::{wlog, wlog_warn, Error, Result};

/// Text and image generators used by development runs.
#[derive(Clone)]
pub struct Backends {
    pub text: Arc<dyn TextGenerator>,
    pub image: Arc<dyn ImageGenerator>,
}

impl Backends {
    pub fn new(text: Arc<dyn TextGenerator>, image: Arc<dyn ImageGenerator>) -> Self {
        Self { text, image }
    }

    /// Build the configured backends. Both must be usable before a run starts.
    pub fn from_config(config: &Config) -> Result<Self> {
        let text: Arc<dyn TextGenerator> = match config.text.kind {
            TextBackendKind::ClaudeCli => Arc::new(
                ClaudeCli::from_command(config.text.effective_command())?
                    .with_timeout(config.text.timeout()),
            ),
            TextBackendKind::Http => Arc::new(HttpBackend::from_text_config(&config.text)?),
        };
        let image = Arc::new(HttpBackend::from_image_config(&config.image)?);
        Ok(Self { text, image })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSummary {
    pub completed_checkpoints: u32,
    pub total_checkpoints: u32,
    pub current_checkpoint: u32,
}

/// Snapshot of a character's development run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub character_id: CharacterId,
    pub name: String,
    pub current_wave: u32,
    pub phase: RunPhase,
    pub status: RunStatus,
    pub progress: ProgressSummary,
    pub agents: BTreeMap<TaskKind, TaskStatusEntry>,
    pub error: Option<String>,
    /// A session for this character is registered in this process.
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<SessionOutcome>,
}

pub struct CharacterService {
    store: Arc<dyn Store>,
    backends: Option<Backends>,
    registry: SessionRegistry,
    policy: ApprovalPolicy,
}

impl CharacterService {
    /// A service that can read and approve but not run until backends are attached.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            backends: None,
            registry: SessionRegistry::new(),
            policy: ApprovalPolicy::Advisory,
        }
    }

    /// Filesystem store at the configured data directory, with the
    /// configured approval policy. Backends are attached separately.
    pub fn open(config: &Config) -> Result<Self> {
        let root = config.data_dir()?;
        wlog!("[service] data dir {}", root.display());
        Ok(Self::new(Arc::new(FsStore::new(root))).with_policy(config.approval))
    }

    pub fn with_backends(mut self, backends: Backends) -> Self {
        self.backends = Some(backends);
        self
    }

    pub fn with_policy(mut self, policy: ApprovalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn policy(&self) -> ApprovalPolicy {
        self.policy
    }

    fn context(&self, id: CharacterId) -> Result<TaskContext> {
        let backends = self.backends.as_ref().ok_or_else(|| {
            Error::Config("no generation backends configured for this service".to_string())
        })?;
        Ok(TaskContext {
            character_id: id,
            text: backends.text.clone(),
            image: backends.image.clone(),
            store: self.store.clone(),
        })
    }

    pub async fn create(&self, input: ConceptInput, mode: DevelopmentMode) -> Result<CharacterId> {
        let id = self.store.create(input, mode).await?;
        wlog!("[service] created character {} ({})", id.short(), mode);
        Ok(id)
    }

    /// Create a character and launch its development in the background.
    pub async fn start_development(
        &self,
        input: ConceptInput,
        mode: DevelopmentMode,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<(CharacterId, JoinHandle<Result<FinalProfile>>)> {
        let id = self.create(input, mode).await?;
        let handle = self.spawn_development(id, progress).await?;
        Ok((id, handle))
    }

    /// Launch every wave and the consolidation for `id` as a tokio task.
    ///
    /// Fails with `SessionActive` if a run for `id` is already registered,
    /// and with `Precondition` if the character has already started or
    /// finished a run. The session is released when the task ends, however
    /// it ends.
    pub async fn spawn_development(
        &self,
        id: CharacterId,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<JoinHandle<Result<FinalProfile>>> {
        let ctx = self.context(id)?;
        let metadata = self.store.load_metadata(id).await?;
        let (guard, gate) = self.registry.acquire(id, metadata.completed_checkpoints)?;
        if metadata.phase != RunPhase::Created || metadata.status != RunStatus::Running {
            guard.abandon();
            return Err(Error::Precondition(format!(
                "character {} cannot be developed again (phase {}, status {})",
                id.short(),
                metadata.phase,
                metadata.status
            )));
        }

        let mut orchestrator = Orchestrator::load(ctx, progress).await?;
        if self.policy == ApprovalPolicy::Blocking {
            orchestrator = orchestrator.with_blocking_approval(gate);
        }
        wlog!(
            "[service] starting development of {} ({} approval)",
            id.short(),
            self.policy
        );

        Ok(tokio::spawn(async move {
            let result = orchestrator.run_all_waves().await;
            guard.finish(match &result {
                Ok(_) => SessionOutcome::Completed,
                Err(e) => SessionOutcome::Failed(e.to_string()),
            });
            result
        }))
    }

    /// Run development for `id` to completion.
    pub async fn run_development(
        &self,
        id: CharacterId,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<FinalProfile> {
        self.spawn_development(id, progress)
            .await?
            .await
            .map_err(|e| Error::TaskJoin(e.to_string()))?
    }

    pub async fn get_status(&self, id: CharacterId) -> Result<StatusReport> {
        let kb = self.store.load_kb(id).await?;
        let metadata = self.store.load_metadata(id).await?;
        Ok(StatusReport {
            character_id: id,
            name: kb.primary_character()?.name.clone(),
            current_wave: kb.current_wave(),
            phase: metadata.phase,
            status: metadata.status,
            progress: ProgressSummary {
                completed_checkpoints: metadata.completed_checkpoints,
                total_checkpoints: metadata.total_checkpoints,
                current_checkpoint: metadata.current_checkpoint,
            },
            agents: kb.task_statuses(),
            error: metadata.error,
            active: self.registry.is_active(id),
            outcome: self.registry.outcome(id),
        })
    }

    pub async fn get_checkpoint(&self, id: CharacterId, number: u32) -> Result<Checkpoint> {
        self.store.load_checkpoint(id, number).await
    }

    /// Record approval of checkpoint `number` and return the approved watermark.
    ///
    /// The watermark never decreases. A running session under the blocking
    /// policy is released to continue once its next gate is reached.
    pub async fn approve_checkpoint(&self, id: CharacterId, number: u32) -> Result<u32> {
        self.store.load_checkpoint(id, number).await?;
        let metadata = self
            .store
            .update_metadata(
                id,
                Box::new(move |m| {
                    m.completed_checkpoints = m.completed_checkpoints.max(number);
                }),
            )
            .await?;
        let forwarded = self.registry.approve(id, number);
        wlog!(
            "[service] {} approved checkpoint {} (watermark {}{})",
            id.short(),
            number,
            metadata.completed_checkpoints,
            if forwarded { ", forwarded to session" } else { "" }
        );
        Ok(metadata.completed_checkpoints)
    }

    /// Count a regeneration request and return the new total.
    ///
    /// No task is re-run: outputs and checkpoints are left as they are.
    pub async fn request_regeneration(
        &self,
        id: CharacterId,
        task: TaskKind,
        feedback: &str,
    ) -> Result<u32> {
        let metadata = self
            .store
            .update_metadata(id, Box::new(|m| m.regenerations += 1))
            .await?;
        wlog_warn!(
            "[service] {} regeneration of {} requested ({} so far) but not performed; feedback: {}",
            id.short(),
            task,
            metadata.regenerations,
            feedback
        );
        Ok(metadata.regenerations)
    }

    pub async fn get_final_profile(&self, id: CharacterId) -> Result<FinalProfile> {
        self.store.load_final_profile(id).await
    }
}

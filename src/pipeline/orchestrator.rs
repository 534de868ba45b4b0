//! Wave scheduler for one character.
//!
//! The orchestrator is the sole writer of its character's knowledge base
//! and checkpoints while it runs; metadata edits go through
//! `Store::update_metadata` so approvals can land concurrently. Tasks in a
//! wave run concurrently
//! against a snapshot taken at wave start; their outputs are merged and
//! checkpointed only after every task in the wave has returned.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;

use super::approval::{ApprovalGate, ApprovalPolicy};
use super::consolidate::{build_profile, FINAL_NARRATIVE};
use super::events::{NextWave, ProgressEvent, ProgressSink};
use super::phase::{PhaseTracker, RunPhase};
use super::plan::{WavePlan, FINAL_AGENT};
use crate::character::{CharacterId, FinalProfile, KnowledgeBase};
use crate::error::{Error, Result};
use crate::store::{
    Checkpoint, CheckpointMetadata, CheckpointOutput, CheckpointStatus, RunMetadata, RunStatus,
};
use crate::tasks::{run_task, TaskContext, TaskKind, TaskOutcome};
use crate::{wlog, wlog_error, wlog_warn};

pub struct Orchestrator {
    ctx: TaskContext,
    kb: KnowledgeBase,
    metadata: RunMetadata,
    plan: WavePlan,
    phase: PhaseTracker,
    progress: Arc<dyn ProgressSink>,
    policy: ApprovalPolicy,
    gate: Option<ApprovalGate>,
}

impl Orchestrator {
    /// Load the character's knowledge base and metadata from the store.
    pub async fn load(ctx: TaskContext, progress: Arc<dyn ProgressSink>) -> Result<Self> {
        let kb = ctx.store.load_kb(ctx.character_id).await?;
        let metadata = ctx.store.load_metadata(ctx.character_id).await?;
        let plan = WavePlan::standard()?;
        let phase = PhaseTracker::new(metadata.phase, plan.wave_count());
        Ok(Self {
            ctx,
            kb,
            metadata,
            plan,
            phase,
            progress,
            policy: ApprovalPolicy::Advisory,
            gate: None,
        })
    }

    /// Wait on `gate` for approvals before each wave after the first and
    /// before consolidation.
    pub fn with_blocking_approval(mut self, gate: ApprovalGate) -> Self {
        self.policy = ApprovalPolicy::Blocking;
        self.gate = Some(gate);
        self
    }

    pub fn character_id(&self) -> CharacterId {
        self.ctx.character_id
    }

    pub fn kb(&self) -> &KnowledgeBase {
        &self.kb
    }

    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    pub fn phase(&self) -> RunPhase {
        self.phase.current()
    }

    pub fn plan(&self) -> &WavePlan {
        &self.plan
    }

    pub fn policy(&self) -> ApprovalPolicy {
        self.policy
    }

    /// Run waves 1..=N in order, then consolidate.
    pub async fn run_all_waves(&mut self) -> Result<FinalProfile> {
        for wave in 1..=self.plan.wave_count() {
            self.run_wave(wave).await?;
        }
        self.consolidate().await
    }

    /// Run every task of `wave` concurrently and checkpoint the results.
    ///
    /// Precondition failures (unknown wave, fields already present, missing
    /// dependencies, out-of-order phase) leave the run untouched. Any task
    /// failure fails the whole run and creates no checkpoints for the wave.
    pub async fn run_wave(&mut self, wave: u32) -> Result<()> {
        let tasks = self.check_wave(wave)?;

        if wave > 1 {
            let previous = self.plan.last_checkpoint_of_wave(wave - 1);
            self.await_approval(previous).await?;
        }

        let agents: Vec<String> = tasks.iter().map(|k| k.name().to_string()).collect();
        self.progress.emit(ProgressEvent::WaveStarted {
            wave,
            agents: agents.clone(),
        });
        wlog!(
            "[pipeline] {} wave {} started: {}",
            self.character_id().short(),
            wave,
            agents.join(", ")
        );

        self.phase.transition(RunPhase::WaveRunning(wave))?;
        if let Err(e) = self.execute_wave(wave, &tasks).await {
            self.fail(Some(wave), failed_agent(&e), e.to_string()).await;
            return Err(e.into_error());
        }

        let next_wave = if wave < self.plan.wave_count() {
            NextWave::Wave(wave + 1)
        } else {
            NextWave::Final
        };
        self.progress.emit(ProgressEvent::WaveComplete {
            wave,
            agents_completed: agents,
            next_wave,
        });
        wlog!("[pipeline] {} wave {} complete", self.character_id().short(), wave);
        Ok(())
    }

    fn check_wave(&self, wave: u32) -> Result<Vec<TaskKind>> {
        let tasks = self
            .plan
            .tasks_in(wave)
            .ok_or_else(|| {
                Error::Precondition(format!(
                    "wave {} is not in the plan (1..={})",
                    wave,
                    self.plan.wave_count()
                ))
            })?
            .to_vec();

        let done: Vec<&str> = tasks
            .iter()
            .filter(|k| self.kb.has(**k))
            .map(|k| k.name())
            .collect();
        if !done.is_empty() {
            return Err(Error::Precondition(format!(
                "wave {} already produced {}",
                wave,
                done.join(", ")
            )));
        }

        for kind in &tasks {
            let missing = self.kb.missing(kind.dependencies());
            if !missing.is_empty() {
                let names: Vec<&str> = missing.iter().map(|k| k.name()).collect();
                return Err(Error::Precondition(format!(
                    "{} needs {} before wave {}",
                    kind,
                    names.join(", "),
                    wave
                )));
            }
        }

        let target = RunPhase::WaveRunning(wave);
        if !self.phase.can_transition(target) {
            return Err(Error::InvalidPhaseTransition {
                from: self.phase.current().to_string(),
                to: target.to_string(),
            });
        }
        Ok(tasks)
    }

    async fn execute_wave(
        &mut self,
        wave: u32,
        tasks: &[TaskKind],
    ) -> std::result::Result<(), WaveError> {
        self.kb.begin_wave(wave).map_err(WaveError::Run)?;
        self.ctx.store.save_kb(&self.kb).await.map_err(WaveError::Run)?;
        self.update_metadata(move |m| m.phase = RunPhase::WaveRunning(wave))
            .await
            .map_err(WaveError::Run)?;

        let snapshot = self.kb.clone();
        let ctx = &self.ctx;
        let results = join_all(tasks.iter().map(|kind| run_task(*kind, &snapshot, ctx))).await;

        // Fail on the first error in plan order, after every task returned.
        let mut outcomes: Vec<TaskOutcome> = Vec::with_capacity(results.len());
        for (kind, result) in tasks.iter().zip(results) {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => return Err(WaveError::Task(*kind, e)),
            }
        }

        for outcome in &outcomes {
            if outcome.degraded {
                wlog_warn!(
                    "[pipeline] {} {} degraded to its fallback output",
                    self.character_id().short(),
                    outcome.kind()
                );
            }
            self.kb
                .record(outcome.output.clone())
                .map_err(WaveError::Run)?;
        }
        self.ctx.store.save_kb(&self.kb).await.map_err(WaveError::Run)?;

        for outcome in outcomes {
            self.write_task_checkpoint(wave, outcome)
                .await
                .map_err(WaveError::Run)?;
        }

        self.phase
            .transition(RunPhase::WaveDone(wave))
            .map_err(WaveError::Run)?;
        self.update_metadata(move |m| m.phase = RunPhase::WaveDone(wave))
            .await
            .map_err(WaveError::Run)
    }

    async fn write_task_checkpoint(&mut self, wave: u32, outcome: TaskOutcome) -> Result<()> {
        let kind = outcome.kind();
        let number = self.plan.checkpoint_number(kind).ok_or_else(|| {
            Error::Validation(format!("{} has no checkpoint in the plan", kind))
        })?;
        let checkpoint = Checkpoint {
            checkpoint_number: number,
            agent: kind.name().to_string(),
            wave,
            status: CheckpointStatus::AwaitingApproval,
            output: CheckpointOutput {
                narrative: outcome.narrative,
                structured: outcome.output.to_structured()?,
            },
            metadata: CheckpointMetadata {
                timestamp: Utc::now(),
                tokens_used: outcome.tokens_used,
                agent_time_seconds: outcome.elapsed.as_secs_f64(),
            },
        };
        self.publish_checkpoint(
            checkpoint,
            format!("{} analysis complete. Awaiting approval.", kind),
        )
        .await
    }

    async fn publish_checkpoint(&mut self, checkpoint: Checkpoint, message: String) -> Result<()> {
        let number = checkpoint.checkpoint_number;
        let agent = checkpoint.agent.clone();
        self.ctx
            .store
            .save_checkpoint(self.ctx.character_id, &checkpoint)
            .await?;
        self.update_metadata(move |m| m.current_checkpoint = m.current_checkpoint.max(number))
            .await?;
        self.progress.emit(ProgressEvent::CheckpointReady {
            checkpoint_number: number,
            agent,
            message,
        });
        Ok(())
    }

    /// Assemble the final profile and record it as the last checkpoint.
    pub async fn consolidate(&mut self) -> Result<FinalProfile> {
        let missing = self.kb.missing(TaskKind::ALL.iter());
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|k| k.name()).collect();
            return Err(Error::Precondition(format!(
                "consolidation needs {}",
                names.join(", ")
            )));
        }
        if !self.phase.can_transition(RunPhase::Consolidating) {
            return Err(Error::InvalidPhaseTransition {
                from: self.phase.current().to_string(),
                to: RunPhase::Consolidating.to_string(),
            });
        }

        let last_task_checkpoint = self.plan.last_checkpoint_of_wave(self.plan.wave_count());
        self.await_approval(last_task_checkpoint).await?;

        self.phase.transition(RunPhase::Consolidating)?;
        match self.execute_consolidation().await {
            Ok(profile) => {
                self.progress.emit(ProgressEvent::CharacterComplete {
                    character_id: self.character_id(),
                    message: "All agents completed. Character profile ready.".to_string(),
                });
                wlog!(
                    "[pipeline] {} completed ({} checkpoints, ~{} tokens)",
                    self.character_id().short(),
                    profile.metadata.total_checkpoints,
                    profile.metadata.total_tokens
                );
                Ok(profile)
            }
            Err(e) => {
                self.fail(None, Some(FINAL_AGENT.to_string()), e.to_string())
                    .await;
                Err(e)
            }
        }
    }

    async fn execute_consolidation(&mut self) -> Result<FinalProfile> {
        let started = Instant::now();
        self.update_metadata(move |m| m.phase = RunPhase::Consolidating)
            .await?;

        let mut total_tokens = 0;
        for kind in TaskKind::ALL {
            if let Some(number) = self.plan.checkpoint_number(kind) {
                let checkpoint = self
                    .ctx
                    .store
                    .load_checkpoint(self.ctx.character_id, number)
                    .await?;
                total_tokens += checkpoint.metadata.tokens_used;
            }
        }

        let profile = build_profile(&self.kb, &self.metadata, total_tokens, Utc::now())?;
        self.ctx
            .store
            .save_final_profile(self.ctx.character_id, &profile)
            .await?;

        let checkpoint = Checkpoint {
            checkpoint_number: self.plan.total_checkpoints(),
            agent: FINAL_AGENT.to_string(),
            wave: self.plan.final_wave(),
            status: CheckpointStatus::AwaitingApproval,
            output: CheckpointOutput {
                narrative: FINAL_NARRATIVE.to_string(),
                structured: serde_json::to_value(&profile)?,
            },
            metadata: CheckpointMetadata {
                timestamp: Utc::now(),
                tokens_used: 0,
                agent_time_seconds: started.elapsed().as_secs_f64(),
            },
        };
        self.publish_checkpoint(
            checkpoint,
            "Final profile consolidated. Awaiting approval.".to_string(),
        )
        .await?;

        self.phase.transition(RunPhase::Completed)?;
        self.update_metadata(move |m| {
            m.phase = RunPhase::Completed;
            m.status = RunStatus::Completed;
        })
        .await?;
        Ok(profile)
    }

    async fn await_approval(&mut self, checkpoint: u32) -> Result<()> {
        if self.policy != ApprovalPolicy::Blocking {
            return Ok(());
        }
        if let Some(gate) = self.gate.as_mut() {
            if gate.approved() < checkpoint {
                wlog!(
                    "[pipeline] {} waiting for approval of checkpoint {}",
                    self.ctx.character_id.short(),
                    checkpoint
                );
            }
            gate.wait_for(checkpoint).await?;
        }
        Ok(())
    }

    async fn update_metadata<F>(&mut self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut RunMetadata) + Send + 'static,
    {
        self.metadata = self
            .ctx
            .store
            .update_metadata(self.ctx.character_id, Box::new(apply))
            .await?;
        Ok(())
    }

    async fn fail(&mut self, wave: Option<u32>, agent: Option<String>, message: String) {
        wlog_error!(
            "[pipeline] {} failed (wave {:?}, agent {:?}): {}",
            self.character_id().short(),
            wave,
            agent,
            message
        );
        if let Err(e) = self.phase.transition(RunPhase::Failed) {
            wlog_warn!("[pipeline] {}", e);
        }
        let recorded = message.clone();
        if let Err(e) = self.update_metadata(move |m| m.mark_failed(recorded)).await {
            wlog_error!(
                "[pipeline] {} could not record failure: {}",
                self.character_id().short(),
                e
            );
            self.metadata.mark_failed(message.clone());
        }
        self.progress.emit(ProgressEvent::Error {
            wave,
            agent,
            message,
        });
    }
}

/// A wave failure, attributed to a task when one caused it.
enum WaveError {
    Task(TaskKind, Error),
    Run(Error),
}

impl WaveError {
    fn into_error(self) -> Error {
        match self {
            WaveError::Task(_, e) | WaveError::Run(e) => e,
        }
    }
}

impl std::fmt::Display for WaveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaveError::Task(kind, e) => write!(f, "{} failed: {}", kind, e),
            WaveError::Run(e) => write!(f, "{}", e),
        }
    }
}

fn failed_agent(error: &WaveError) -> Option<String> {
    match error {
        WaveError::Task(kind, _) => Some(kind.name().to_string()),
        WaveError::Run(_) => None,
    }
}

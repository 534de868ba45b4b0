//! Registry of in-flight development sessions.
//!
//! At most one orchestrator may run per character. A session is claimed
//! with [`SessionRegistry::acquire`], which hands back a guard; dropping the
//! guard releases the claim even if the run panicked or was cancelled.
//! Outcomes of finished sessions are kept for the most recent
//! [`MAX_FINISHED`] characters.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::character::CharacterId;
use crate::pipeline::{approval_channel, ApprovalGate, ApprovalHandle};
use crate::{wlog_debug, wlog_warn, Error, Result};

/// Finished outcomes retained before the oldest is evicted.
pub const MAX_FINISHED: usize = 256;

/// How a finished session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "error", rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed,
    Failed(String),
}

#[derive(Debug)]
struct ActiveSession {
    approvals: ApprovalHandle,
    started_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    active: HashMap<CharacterId, ActiveSession>,
    /// Outcome and release order of finished sessions.
    finished: HashMap<CharacterId, (SessionOutcome, u64)>,
    releases: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    state: Arc<Mutex<State>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // State stays consistent across a panic: every update is a single insert/remove.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the single development session for `id`.
    ///
    /// `approved` seeds the approval watermark, normally the stored
    /// `completed_checkpoints`.
    pub fn acquire(&self, id: CharacterId, approved: u32) -> Result<(SessionGuard, ApprovalGate)> {
        let mut state = self.lock();
        if state.active.contains_key(&id) {
            return Err(Error::SessionActive(id));
        }
        let (approvals, gate) = approval_channel(approved);
        state.active.insert(
            id,
            ActiveSession {
                approvals,
                started_at: Utc::now(),
            },
        );
        wlog_debug!("[session] {} acquired", id.short());
        Ok((
            SessionGuard {
                registry: self.clone(),
                id,
                outcome: None,
                abandoned: false,
            },
            gate,
        ))
    }

    pub fn is_active(&self, id: CharacterId) -> bool {
        self.lock().active.contains_key(&id)
    }

    /// Active sessions with their start times, oldest first.
    pub fn active(&self) -> Vec<(CharacterId, DateTime<Utc>)> {
        let mut sessions: Vec<_> = self
            .lock()
            .active
            .iter()
            .map(|(id, s)| (*id, s.started_at))
            .collect();
        sessions.sort_by_key(|(_, started)| *started);
        sessions
    }

    /// Forward an approval to a running session. Returns false if none is active.
    pub fn approve(&self, id: CharacterId, checkpoint: u32) -> bool {
        match self.lock().active.get(&id) {
            Some(session) => {
                session.approvals.approve(checkpoint);
                true
            }
            None => false,
        }
    }

    /// How the last session for `id` ended, if one has finished in this process.
    pub fn outcome(&self, id: CharacterId) -> Option<SessionOutcome> {
        self.lock()
            .finished
            .get(&id)
            .map(|(outcome, _)| outcome.clone())
    }

    /// Drop the recorded outcome for `id`.
    pub fn forget(&self, id: CharacterId) -> Option<SessionOutcome> {
        self.lock().finished.remove(&id).map(|(outcome, _)| outcome)
    }

    fn release(&self, id: CharacterId, outcome: Option<SessionOutcome>) {
        let mut state = self.lock();
        state.active.remove(&id);
        let Some(outcome) = outcome else {
            wlog_debug!("[session] {} released without running", id.short());
            return;
        };
        if let SessionOutcome::Failed(ref e) = outcome {
            wlog_warn!("[session] {} ended: {}", id.short(), e);
        } else {
            wlog_debug!("[session] {} completed", id.short());
        }
        state.releases += 1;
        let order = state.releases;
        state.finished.insert(id, (outcome, order));
        if state.finished.len() > MAX_FINISHED {
            let oldest = state
                .finished
                .iter()
                .min_by_key(|(_, (_, order))| *order)
                .map(|(id, _)| *id);
            if let Some(oldest) = oldest {
                state.finished.remove(&oldest);
            }
        }
    }
}

/// Exclusive claim on a character's development session.
#[derive(Debug)]
pub struct SessionGuard {
    registry: SessionRegistry,
    id: CharacterId,
    outcome: Option<SessionOutcome>,
    abandoned: bool,
}

impl SessionGuard {
    pub fn id(&self) -> CharacterId {
        self.id
    }

    /// Record how the session ended and release it.
    pub fn finish(mut self, outcome: SessionOutcome) {
        self.outcome = Some(outcome);
    }

    /// Release the claim before any run started, leaving the previous
    /// outcome for this character in place.
    pub fn abandon(mut self) {
        self.abandoned = true;
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let outcome = if self.abandoned {
            None
        } else {
            Some(self.outcome.take().unwrap_or_else(|| {
                SessionOutcome::Failed("session ended unexpectedly".to_string())
            }))
        };
        self.registry.release(self.id, outcome);
    }
}

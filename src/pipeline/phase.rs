//! Run phase state machine with transition validation.
//!
//! `created -> wave_1_running -> wave_1_done -> ... -> wave_N_done ->
//! consolidating -> completed`, with `failed` reachable from any running
//! phase and absorbing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum RunPhase {
    Created,
    WaveRunning(u32),
    WaveDone(u32),
    Consolidating,
    Completed,
    Failed,
}

impl RunPhase {
    /// Whether work is in flight in this phase.
    pub fn is_running(&self) -> bool {
        matches!(self, RunPhase::WaveRunning(_) | RunPhase::Consolidating)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Failed)
    }

    /// Check a transition against the phase ordering for a plan of
    /// `wave_count` waves.
    pub fn can_transition(&self, target: RunPhase, wave_count: u32) -> bool {
        match (*self, target) {
            (RunPhase::Created, RunPhase::WaveRunning(1)) => true,
            (RunPhase::WaveRunning(n), RunPhase::WaveDone(m)) => n == m,
            (RunPhase::WaveDone(n), RunPhase::WaveRunning(m)) => m == n + 1 && m <= wave_count,
            (RunPhase::WaveDone(n), RunPhase::Consolidating) => n == wave_count,
            (RunPhase::Consolidating, RunPhase::Completed) => true,
            (from, RunPhase::Failed) => from.is_running(),
            _ => false,
        }
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Created => write!(f, "created"),
            RunPhase::WaveRunning(n) => write!(f, "wave_{}_running", n),
            RunPhase::WaveDone(n) => write!(f, "wave_{}_done", n),
            RunPhase::Consolidating => write!(f, "consolidating"),
            RunPhase::Completed => write!(f, "completed"),
            RunPhase::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for RunPhase {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "created" => return Ok(RunPhase::Created),
            "consolidating" => return Ok(RunPhase::Consolidating),
            "completed" => return Ok(RunPhase::Completed),
            "failed" => return Ok(RunPhase::Failed),
            _ => {}
        }
        let wave = |rest: &str| rest.parse::<u32>().ok().filter(|n| *n > 0);
        if let Some(rest) = s.strip_prefix("wave_") {
            if let Some(n) = rest.strip_suffix("_running").and_then(wave) {
                return Ok(RunPhase::WaveRunning(n));
            }
            if let Some(n) = rest.strip_suffix("_done").and_then(wave) {
                return Ok(RunPhase::WaveDone(n));
            }
        }
        Err(format!("unknown run phase: {}", s))
    }
}

impl From<RunPhase> for String {
    fn from(phase: RunPhase) -> Self {
        phase.to_string()
    }
}

impl TryFrom<String> for RunPhase {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

/// A record of a phase transition with timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseHistoryEntry {
    pub phase: RunPhase,
    pub entered_at: DateTime<Utc>,
}

/// Tracks the current phase of one run and enforces valid transitions.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    current: RunPhase,
    wave_count: u32,
    history: Vec<PhaseHistoryEntry>,
}

impl PhaseTracker {
    pub fn new(initial: RunPhase, wave_count: u32) -> Self {
        Self {
            current: initial,
            wave_count,
            history: vec![PhaseHistoryEntry {
                phase: initial,
                entered_at: Utc::now(),
            }],
        }
    }

    pub fn current(&self) -> RunPhase {
        self.current
    }

    pub fn can_transition(&self, target: RunPhase) -> bool {
        self.current.can_transition(target, self.wave_count)
    }

    /// Move to `target`, or fail with `InvalidPhaseTransition`.
    pub fn transition(&mut self, target: RunPhase) -> Result<()> {
        if !self.can_transition(target) {
            return Err(Error::InvalidPhaseTransition {
                from: self.current.to_string(),
                to: target.to_string(),
            });
        }
        self.current = target;
        self.history.push(PhaseHistoryEntry {
            phase: target,
            entered_at: Utc::now(),
        });
        Ok(())
    }

    pub fn history(&self) -> &[PhaseHistoryEntry] {
        &self.history
    }
}

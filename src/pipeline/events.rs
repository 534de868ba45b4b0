//! Progress events pushed to whoever is listening.
//!
//! Delivery is best-effort: sinks never block the scheduler, and a full or
//! closed channel simply drops the event.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::sync::{broadcast, mpsc};

use crate::character::CharacterId;
use crate::wlog_trace;

/// What follows a completed wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextWave {
    Wave(u32),
    /// Consolidation is next. Serialized as `"final"`.
    Final,
}

impl Serialize for NextWave {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NextWave::Wave(n) => serializer.serialize_u32(*n),
            NextWave::Final => serializer.serialize_str("final"),
        }
    }
}

impl<'de> Deserialize<'de> for NextWave {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Wave(u32),
            Named(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Wave(n) => Ok(NextWave::Wave(n)),
            Raw::Named(s) if s == "final" => Ok(NextWave::Final),
            Raw::Named(s) => Err(serde::de::Error::custom(format!(
                "unknown next wave: {}",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    WaveStarted {
        wave: u32,
        agents: Vec<String>,
    },
    WaveComplete {
        wave: u32,
        agents_completed: Vec<String>,
        next_wave: NextWave,
    },
    CheckpointReady {
        checkpoint_number: u32,
        agent: String,
        message: String,
    },
    CharacterComplete {
        character_id: CharacterId,
        message: String,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        wave: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent: Option<String>,
        message: String,
    },
}

impl ProgressEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            ProgressEvent::WaveStarted { .. } => "wave_started",
            ProgressEvent::WaveComplete { .. } => "wave_complete",
            ProgressEvent::CheckpointReady { .. } => "checkpoint_ready",
            ProgressEvent::CharacterComplete { .. } => "character_complete",
            ProgressEvent::Error { .. } => "error",
        }
    }
}

/// Receiver side of the progress channel, as seen by the orchestrator.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

impl ProgressSink for mpsc::Sender<ProgressEvent> {
    fn emit(&self, event: ProgressEvent) {
        if let Err(e) = self.try_send(event) {
            wlog_trace!("[progress] dropped event: {}", e);
        }
    }
}

impl ProgressSink for mpsc::UnboundedSender<ProgressEvent> {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.send(event);
    }
}

impl ProgressSink for broadcast::Sender<ProgressEvent> {
    fn emit(&self, event: ProgressEvent) {
        // Err only means nobody is subscribed right now.
        let _ = self.send(event);
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn emit(&self, _event: ProgressEvent) {}
}

//! Wave-based development of one character: the plan, the phase machine,
//! approval gating, progress events and the orchestrator that drives them.

mod approval;
mod consolidate;
mod events;
mod orchestrator;
mod phase;
mod plan;

pub use approval::{approval_channel, ApprovalGate, ApprovalHandle, ApprovalPolicy};
pub use consolidate::{build_profile, FINAL_NARRATIVE};
pub use events::{NextWave, NullProgress, ProgressEvent, ProgressSink};
pub use orchestrator::Orchestrator;
pub use phase::{PhaseHistoryEntry, PhaseTracker, RunPhase};
pub use plan::{WavePlan, FINAL_AGENT, TOTAL_CHECKPOINTS};

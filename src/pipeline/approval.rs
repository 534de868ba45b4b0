//! Human approval of checkpoints.
//!
//! Under the advisory policy approvals are audit state only and waves run
//! straight through. Under the blocking policy the orchestrator waits on
//! an `ApprovalGate` until the previous wave's checkpoints are approved.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalPolicy {
    #[default]
    Advisory,
    Blocking,
}

impl std::fmt::Display for ApprovalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalPolicy::Advisory => write!(f, "advisory"),
            ApprovalPolicy::Blocking => write!(f, "blocking"),
        }
    }
}

/// Sending side: raises the approved watermark.
#[derive(Debug)]
pub struct ApprovalHandle {
    tx: watch::Sender<u32>,
}

impl ApprovalHandle {
    /// Record approval of checkpoint `number`. The watermark never drops.
    pub fn approve(&self, number: u32) {
        self.tx.send_if_modified(|approved| {
            if number > *approved {
                *approved = number;
                true
            } else {
                false
            }
        });
    }

    pub fn approved(&self) -> u32 {
        *self.tx.borrow()
    }
}

/// Receiving side held by the orchestrator.
#[derive(Debug, Clone)]
pub struct ApprovalGate {
    rx: watch::Receiver<u32>,
}

impl ApprovalGate {
    pub fn approved(&self) -> u32 {
        *self.rx.borrow()
    }

    /// Wait until checkpoint `number` (and everything before it) is approved.
    pub async fn wait_for(&mut self, number: u32) -> Result<()> {
        self.rx
            .wait_for(|approved| *approved >= number)
            .await
            .map(|_| ())
            .map_err(|_| {
                Error::Precondition(format!(
                    "approval channel closed before checkpoint {} was approved",
                    number
                ))
            })
    }
}

/// Create a connected handle and gate starting at `approved`.
pub fn approval_channel(approved: u32) -> (ApprovalHandle, ApprovalGate) {
    let (tx, rx) = watch::channel(approved);
    (ApprovalHandle { tx }, ApprovalGate { rx })
}

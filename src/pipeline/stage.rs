use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// The five steps of a classification run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Preprocess,
    Encrypt,
    Transmit,
    Infer,
    Decrypt,
}

impl StageId {
    pub const ALL: [StageId; 5] = [
        StageId::Preprocess,
        StageId::Encrypt,
        StageId::Transmit,
        StageId::Infer,
        StageId::Decrypt,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StageId::Preprocess => "preprocess",
            StageId::Encrypt => "encrypt",
            StageId::Transmit => "transmit",
            StageId::Infer => "infer",
            StageId::Decrypt => "decrypt",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StageId::Preprocess => "Preprocessing Image (28×28)",
            StageId::Encrypt => "Encrypting Input Locally (Simulated)",
            StageId::Transmit => "Sending Encrypted Data to Server",
            StageId::Infer => "Server: Blind Inference",
            StageId::Decrypt => "Decrypting Result (Simulated)",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Active,
    Completed,
    Error,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            StageStatus::Pending => "pending",
            StageStatus::Active => "active",
            StageStatus::Completed => "completed",
            StageStatus::Error => "error",
        })
    }
}

/// Progress of one stage; `elapsed` is only set once the stage completes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStage {
    pub id: StageId,
    pub label: &'static str,
    pub status: StageStatus,
    pub elapsed: Option<Duration>,
}

impl PipelineStage {
    pub fn new(id: StageId) -> Self {
        Self {
            id,
            label: id.label(),
            status: StageStatus::Pending,
            elapsed: None,
        }
    }

    pub(crate) fn activate(&mut self) {
        self.status = StageStatus::Active;
        self.elapsed = None;
    }

    pub(crate) fn complete(&mut self, elapsed: Duration) {
        self.status = StageStatus::Completed;
        self.elapsed = Some(elapsed);
    }

    pub(crate) fn fail(&mut self) {
        self.status = StageStatus::Error;
        self.elapsed = None;
    }

    /// Undo an activation that never got anywhere
    pub(crate) fn deactivate(&mut self) {
        self.status = StageStatus::Pending;
        self.elapsed = None;
    }

    pub fn is(&self, status: StageStatus) -> bool {
        self.status == status
    }
}

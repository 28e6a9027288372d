use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::error::{AppError, Result};

/// Per-file progress state during a batch run.
///
/// `Queued -> Converting -> Analyzing -> Complete`, or `Converting | Analyzing -> Error`.
/// `Complete` and `Error` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Queued,
    Converting,
    Analyzing,
    Complete,
    Error,
}

impl UploadStatus {
    /// Progress shown for a task sitting in this state.
    pub fn progress(&self) -> u8 {
        match self {
            UploadStatus::Queued => 0,
            UploadStatus::Converting => 25,
            UploadStatus::Analyzing => 50,
            UploadStatus::Complete => 100,
            UploadStatus::Error => 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Complete | UploadStatus::Error)
    }

    pub fn can_transition_to(&self, next: UploadStatus) -> bool {
        use UploadStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Queued, Converting)
                | (Converting, Analyzing)
                | (Converting, Error)
                | (Analyzing, Complete)
                | (Analyzing, Error)
        )
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UploadStatus::Queued => "queued",
            UploadStatus::Converting => "converting",
            UploadStatus::Analyzing => "analyzing",
            UploadStatus::Complete => "complete",
            UploadStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// Transient tracker for one file of a batch. Keyed by `index`; the file name is
/// only a label since a batch may contain duplicate names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadTask {
    pub index: usize,
    pub file_name: String,
    pub status: UploadStatus,
    pub progress: u8,
}

impl UploadTask {
    pub fn new(index: usize, file_name: impl Into<String>) -> Self {
        Self {
            index,
            file_name: file_name.into(),
            status: UploadStatus::Queued,
            progress: UploadStatus::Queued.progress(),
        }
    }

    pub fn advance(&mut self, next: UploadStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::Internal(format!(
                "invalid upload transition for task {} ({}): {} -> {}",
                self.index, self.file_name, self.status, next
            )));
        }
        self.status = next;
        self.progress = next.progress();
        Ok(())
    }
}

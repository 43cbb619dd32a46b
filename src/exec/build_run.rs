//! Per-execution build record.

use std::time::{Duration, SystemTime};

use crate::types::{TaskName, TransformName, TriggerReason};

/// Outcome of a single transform within one build run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformStatus {
    /// All steps ran; `files` outputs were published.
    Succeeded { files: usize },
    /// A step failed; remaining steps and transforms were aborted.
    Failed { step: usize, error: String },
}

#[derive(Debug, Clone)]
pub struct TransformOutcome {
    pub transform: TransformName,
    pub status: TransformStatus,
}

/// One execution attempt of a task.
///
/// Transient: created per triggered execution, logged, never persisted.
#[derive(Debug, Clone)]
pub struct BuildRun {
    pub task: TaskName,
    pub reason: TriggerReason,
    pub started_at: SystemTime,
    pub duration: Duration,
    pub outcomes: Vec<TransformOutcome>,
}

impl BuildRun {
    pub fn is_success(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| matches!(o.status, TransformStatus::Succeeded { .. }))
    }

    /// Total number of files published across all transforms.
    pub fn published_files(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o.status {
                TransformStatus::Succeeded { files } => files,
                TransformStatus::Failed { .. } => 0,
            })
            .sum()
    }

    /// The first (and only) recorded failure, if any.
    pub fn first_failure(&self) -> Option<&TransformOutcome> {
        self.outcomes
            .iter()
            .find(|o| matches!(o.status, TransformStatus::Failed { .. }))
    }
}

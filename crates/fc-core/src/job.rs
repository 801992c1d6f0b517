//! Conversion jobs and batch bookkeeping.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::ids::{BatchId, JobId};

/// Lifecycle of a single conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Completed, failed and cancelled jobs never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One input file queued for conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJob {
    pub id: JobId,
    /// Zero-based position in the batch.
    pub index: usize,
    pub input_path: PathBuf,
    /// Resolved when the job starts; `None` while pending.
    pub output_path: Option<PathBuf>,
    status: JobStatus,
}

impl ConversionJob {
    pub fn new(index: usize, input_path: PathBuf) -> Self {
        Self {
            id: JobId::new(),
            index,
            input_path,
            output_path: None,
            status: JobStatus::Pending,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Move to `next`. Returns `false` and leaves the job untouched if it is
    /// already terminal.
    pub fn transition(&mut self, next: JobStatus) -> bool {
        if self.status.is_terminal() {
            tracing::warn!(
                job = %self.id.short(),
                from = %self.status,
                to = %next,
                "Ignoring status change on finished job"
            );
            return false;
        }
        self.status = next;
        true
    }
}

/// Counters for a running batch. Owned by the sequencer task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchState {
    pub batch_id: BatchId,
    pub total_jobs: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub current_job_index: Option<usize>,
    pub cancelled: bool,
}

impl BatchState {
    pub fn new(total_jobs: usize) -> Self {
        Self {
            batch_id: BatchId::new(),
            total_jobs,
            completed_count: 0,
            failed_count: 0,
            current_job_index: None,
            cancelled: false,
        }
    }

    /// Jobs that reached `Completed` or `Failed`.
    pub fn processed(&self) -> usize {
        self.completed_count + self.failed_count
    }

    /// Fraction of the batch processed, in `0.0..=1.0`.
    pub fn fraction_done(&self) -> f64 {
        if self.total_jobs == 0 {
            return 1.0;
        }
        self.processed() as f64 / self.total_jobs as f64
    }
}

//! Job scheduling for background cache maintenance.
//!
//! Jobs run on one of two `rayon` pools and cooperate with cancellation through
//! [`CancellationToken`]: a job body checks the token at its own checkpoints and unwinds with
//! [`Cancelled`]. Jobs are tagged with a [`JobFamily`] for group cancellation and may hold a
//! [`SchedulingRule`] so that at most one job per rule runs at a time.

mod jobs;
mod progress;
mod rule;
mod scheduler;
mod task;

use std::fmt;

pub use jobs::{JobFamily, JobId, JobPriority, JobRegistry, JobSpec};
pub use progress::{Progress, ProgressEvent, ProgressId, ProgressReceiver, ProgressSender};
pub use rule::{RuleGuard, SchedulingRule};
pub use scheduler::{PoolKind, Scheduler, SchedulerConfig};
pub use task::{BlockingTask, JobHandle};
pub use tokio_util::sync::CancellationToken;

/// Unwind signal returned from a cancellation checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Cancelled;

impl Cancelled {
    /// Returns `Err(Cancelled)` once `token` has been cancelled.
    #[inline]
    pub fn check(token: &CancellationToken) -> Result<(), Cancelled> {
        if token.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("operation cancelled")
    }
}

impl std::error::Error for Cancelled {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("task was cancelled")]
    Cancelled,
    #[error("task panicked")]
    Panicked,
}

impl From<Cancelled> for TaskError {
    fn from(_: Cancelled) -> Self {
        TaskError::Cancelled
    }
}

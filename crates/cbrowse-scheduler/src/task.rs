use tokio::sync::oneshot;

use crate::{CancellationToken, JobFamily, JobId, TaskError};

/// Handle to a body submitted with [`crate::Scheduler::spawn_blocking_on`].
pub struct BlockingTask<T> {
    token: CancellationToken,
    rx: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> BlockingTask<T> {
    pub(crate) fn new(
        token: CancellationToken,
        rx: oneshot::Receiver<Result<T, TaskError>>,
    ) -> Self {
        Self { token, rx }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Resolves early with [`TaskError::Cancelled`] once the token is cancelled, without waiting
    /// for the body to observe it.
    pub async fn join(self) -> Result<T, TaskError> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(TaskError::Cancelled),
            result = self.rx => match result {
                Ok(result) => result,
                Err(_) => Err(TaskError::Panicked),
            }
        }
    }
}

/// Handle to a job submitted with [`crate::Scheduler::schedule`].
///
/// Unlike [`BlockingTask::join`], joining a job waits for its body to return even after
/// cancellation, so the caller knows the job no longer holds its scheduling rule.
pub struct JobHandle<T> {
    id: JobId,
    family: JobFamily,
    token: CancellationToken,
    rx: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> JobHandle<T> {
    pub(crate) fn new(
        id: JobId,
        family: JobFamily,
        token: CancellationToken,
        rx: oneshot::Receiver<Result<T, TaskError>>,
    ) -> Self {
        Self {
            id,
            family,
            token,
            rx,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn family(&self) -> JobFamily {
        self.family
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Blocks the current thread until the job has finished.
    ///
    /// Must not be called from inside an async runtime.
    pub fn join_blocking(self) -> Result<T, TaskError> {
        self.rx.blocking_recv().unwrap_or(Err(TaskError::Panicked))
    }

    pub async fn join(self) -> Result<T, TaskError> {
        self.rx.await.unwrap_or(Err(TaskError::Panicked))
    }
}

impl<T> std::fmt::Debug for JobHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.id)
            .field("family", &self.family)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

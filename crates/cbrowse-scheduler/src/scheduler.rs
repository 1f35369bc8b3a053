use std::sync::Arc;

use rayon::ThreadPool;
use tokio::runtime::Runtime;
use tokio::sync::{broadcast, oneshot};

use cbrowse_core::panic_payload_to_str;

use crate::jobs::JobRegistry;
use crate::task::{BlockingTask, JobHandle};
use crate::{CancellationToken, Cancelled, JobSpec, ProgressSender, TaskError};

enum BlockingPool {
    Rayon(ThreadPool),
    Inline,
}

impl BlockingPool {
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self {
            BlockingPool::Rayon(pool) => pool.spawn(job),
            BlockingPool::Inline => job(),
        }
    }
}

fn build_rayon_pool(prefix: &'static str, threads: usize) -> BlockingPool {
    // Thread creation can fail in constrained environments (low RLIMIT_NPROC, `EAGAIN`).
    let mut threads = threads.max(1);
    loop {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(move |idx| format!("{prefix}-{idx}"))
            .build()
        {
            Ok(pool) => return BlockingPool::Rayon(pool),
            Err(_) if threads > 1 => {
                threads = (threads / 2).max(1);
            }
            Err(_) => {
                // Without worker threads, run jobs on the submitting thread.
                return BlockingPool::Inline;
            }
        }
    }
}

fn build_timer_runtime() -> Runtime {
    match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_time()
        .thread_name("cbrowse-timer")
        .build()
    {
        Ok(rt) => rt,
        Err(err) => tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap_or_else(|_| panic!("failed to build timer runtime: {err}")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Compute,
    Background,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub compute_threads: usize,
    pub background_threads: usize,
    pub progress_channel_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            compute_threads: available.saturating_sub(1).clamp(1, 8),
            background_threads: available.clamp(1, 2),
            progress_channel_capacity: 1024,
        }
    }
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    compute_pool: BlockingPool,
    background_pool: BlockingPool,
    timer_runtime: Option<Runtime>,
    timer_handle: tokio::runtime::Handle,
    progress: ProgressSender,
    jobs: Arc<JobRegistry>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let timer_runtime = build_timer_runtime();
        let timer_handle = timer_runtime.handle().clone();
        Self::build(config, Some(timer_runtime), timer_handle)
    }

    /// Build a scheduler that reuses an existing Tokio runtime for delayed starts.
    pub fn new_with_handle(config: SchedulerConfig, handle: tokio::runtime::Handle) -> Self {
        Self::build(config, None, handle)
    }

    fn build(
        config: SchedulerConfig,
        timer_runtime: Option<Runtime>,
        timer_handle: tokio::runtime::Handle,
    ) -> Self {
        let compute_pool = build_rayon_pool("cbrowse-compute", config.compute_threads);
        let background_pool = build_rayon_pool("cbrowse-background", config.background_threads);
        let (progress_tx, _) = broadcast::channel(config.progress_channel_capacity.max(1));

        Self {
            inner: Arc::new(SchedulerInner {
                compute_pool,
                background_pool,
                timer_runtime,
                timer_handle,
                progress: ProgressSender::new(progress_tx),
                jobs: JobRegistry::new(),
            }),
        }
    }

    pub fn progress(&self) -> ProgressSender {
        self.inner.progress.clone()
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<crate::ProgressEvent> {
        self.inner.progress.subscribe()
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.inner.jobs
    }

    fn dispatch<T, F>(
        &self,
        pool: PoolKind,
        token: CancellationToken,
        f: F,
    ) -> oneshot::Receiver<Result<T, TaskError>>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Result<T, Cancelled> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        if token.is_cancelled() {
            let _ = tx.send(Err(TaskError::Cancelled));
            return rx;
        }

        let job = move || {
            let result =
                match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(token))) {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(err)) => Err(TaskError::from(err)),
                    Err(panic) => {
                        let message = panic_payload_to_str(&*panic);
                        tracing::error!(
                            target: "cbrowse.scheduler",
                            pool = ?pool,
                            panic = %message,
                            "task panicked"
                        );
                        Err(TaskError::Panicked)
                    }
                };
            let _ = tx.send(result);
        };

        match pool {
            PoolKind::Compute => self.inner.compute_pool.spawn(job),
            PoolKind::Background => self.inner.background_pool.spawn(job),
        }
        rx
    }

    pub fn spawn_blocking_on<T, F>(
        &self,
        pool: PoolKind,
        token: CancellationToken,
        f: F,
    ) -> BlockingTask<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Result<T, Cancelled> + Send + 'static,
    {
        let rx = self.dispatch(pool, token.clone(), f);
        BlockingTask::new(token, rx)
    }

    pub fn spawn_compute<T, F>(&self, f: F) -> BlockingTask<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Result<T, Cancelled> + Send + 'static,
    {
        self.spawn_blocking_on(PoolKind::Compute, CancellationToken::new(), f)
    }

    pub fn spawn_background<T, F>(&self, f: F) -> BlockingTask<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Result<T, Cancelled> + Send + 'static,
    {
        self.spawn_blocking_on(PoolKind::Background, CancellationToken::new(), f)
    }

    /// Submit a job described by `spec`.
    ///
    /// The job is registered under its family until the body returns (or is dropped unrun
    /// because it was cancelled while delayed). When `spec` carries a rule, the body only starts
    /// once the rule is acquired; cancellation while waiting for it ends the job.
    pub fn schedule<T, F>(&self, spec: JobSpec, f: F) -> JobHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Result<T, Cancelled> + Send + 'static,
    {
        let token = match &spec.parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let registration = self
            .inner
            .jobs
            .register(spec.family, &spec.name, token.clone());
        let id = registration.id();
        let family = spec.family;
        let pool = spec.priority.pool();
        let rule = spec.rule;

        let body = move |token: CancellationToken| {
            let _registration = registration;
            let _guard = match rule.as_ref() {
                Some(rule) => Some(rule.acquire(&token)?),
                None => None,
            };
            f(token)
        };

        if spec.delay.is_zero() {
            let rx = self.dispatch(pool, token.clone(), body);
            return JobHandle::new(id, family, token, rx);
        }

        let (tx, rx) = oneshot::channel();
        let scheduler = self.clone();
        let token_for_timer = token.clone();
        let delay = spec.delay;
        self.inner.timer_handle.spawn(async move {
            let elapsed = tokio::select! {
                _ = token_for_timer.cancelled() => false,
                _ = tokio::time::sleep(delay) => true,
            };
            let result = if elapsed {
                scheduler
                    .dispatch(pool, token_for_timer, body)
                    .await
                    .unwrap_or(Err(TaskError::Panicked))
            } else {
                // Unregisters the job before the handle observes the result.
                drop(body);
                Err(TaskError::Cancelled)
            };
            let _ = tx.send(result);
        });

        JobHandle::new(id, family, token, rx)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        if let Some(runtime) = self.timer_runtime.take() {
            runtime.shutdown_background();
        }
    }
}

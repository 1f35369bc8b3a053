use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::{CancellationToken, PoolKind, SchedulingRule};

/// Tag shared by related jobs so they can be queried and cancelled as a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobFamily(&'static str);

impl JobFamily {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for JobFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JobPriority {
    /// The user is waiting on the result.
    Interactive,
    Short,
    #[default]
    Long,
}

impl JobPriority {
    pub fn pool(self) -> PoolKind {
        match self {
            JobPriority::Interactive | JobPriority::Short => PoolKind::Compute,
            JobPriority::Long => PoolKind::Background,
        }
    }
}

/// Everything the scheduler needs to know about a job besides its body.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub(crate) name: String,
    pub(crate) family: JobFamily,
    pub(crate) rule: Option<SchedulingRule>,
    pub(crate) priority: JobPriority,
    pub(crate) delay: Duration,
    pub(crate) parent: Option<CancellationToken>,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, family: JobFamily) -> Self {
        Self {
            name: name.into(),
            family,
            rule: None,
            priority: JobPriority::default(),
            delay: Duration::ZERO,
            parent: None,
        }
    }

    pub fn rule(mut self, rule: SchedulingRule) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Cancelling `token` also cancels the job.
    pub fn parent_token(mut self, token: CancellationToken) -> Self {
        self.parent = Some(token);
        self
    }
}

struct ActiveJob {
    family: JobFamily,
    name: String,
    token: CancellationToken,
}

/// Book of scheduled-but-unfinished jobs, keyed by id and queried by family.
#[derive(Default)]
pub struct JobRegistry {
    next_id: AtomicU64,
    active: Mutex<HashMap<JobId, ActiveJob>>,
    scheduled: Mutex<HashMap<JobFamily, u64>>,
}

impl JobRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn register(
        self: &Arc<Self>,
        family: JobFamily,
        name: &str,
        token: CancellationToken,
    ) -> JobRegistration {
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.active.lock().insert(
            id,
            ActiveJob {
                family,
                name: name.to_string(),
                token,
            },
        );
        *self.scheduled.lock().entry(family).or_default() += 1;
        tracing::trace!(target: "cbrowse.scheduler", %id, %family, name, "job scheduled");
        JobRegistration {
            registry: Arc::clone(self),
            id,
        }
    }

    /// Cancels every unfinished job of `family`; returns how many were signalled.
    pub fn cancel_family(&self, family: JobFamily) -> usize {
        let active = self.active.lock();
        let mut cancelled = 0;
        for job in active.values().filter(|job| job.family == family) {
            job.token.cancel();
            cancelled += 1;
        }
        if cancelled > 0 {
            tracing::debug!(target: "cbrowse.scheduler", %family, cancelled, "cancelled job family");
        }
        cancelled
    }

    /// Jobs of `family` that are queued, waiting on a rule, or running.
    pub fn active_count(&self, family: JobFamily) -> usize {
        self.active
            .lock()
            .values()
            .filter(|job| job.family == family)
            .count()
    }

    /// Number of jobs of `family` ever submitted to this registry.
    pub fn scheduled_total(&self, family: JobFamily) -> u64 {
        self.scheduled.lock().get(&family).copied().unwrap_or(0)
    }

    pub fn active_names(&self, family: JobFamily) -> Vec<String> {
        let mut names: Vec<String> = self
            .active
            .lock()
            .values()
            .filter(|job| job.family == family)
            .map(|job| job.name.clone())
            .collect();
        names.sort();
        names
    }
}

/// Removes its job from the registry when dropped, however the job ended.
pub(crate) struct JobRegistration {
    registry: Arc<JobRegistry>,
    id: JobId,
}

impl JobRegistration {
    pub(crate) fn id(&self) -> JobId {
        self.id
    }
}

impl Drop for JobRegistration {
    fn drop(&mut self) {
        self.registry.active.lock().remove(&self.id);
    }
}

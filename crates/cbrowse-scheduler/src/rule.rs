use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::{CancellationToken, Cancelled};

const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Mutual-exclusion token shared by every job that touches the same resource.
///
/// Clones share the same underlying lock.
#[derive(Clone)]
pub struct SchedulingRule {
    name: Arc<str>,
    lock: Arc<Mutex<()>>,
}

/// Held for as long as a job owns its [`SchedulingRule`].
pub struct RuleGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl SchedulingRule {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Blocks until the rule is free, giving up as soon as `token` is cancelled.
    pub fn acquire(&self, token: &CancellationToken) -> Result<RuleGuard<'_>, Cancelled> {
        loop {
            Cancelled::check(token)?;
            if let Some(guard) = self.lock.try_lock_for(ACQUIRE_POLL_INTERVAL) {
                return Ok(RuleGuard { _guard: guard });
            }
        }
    }

    pub fn try_acquire(&self) -> Option<RuleGuard<'_>> {
        self.lock.try_lock().map(|guard| RuleGuard { _guard: guard })
    }

    pub fn is_held(&self) -> bool {
        self.lock.is_locked()
    }

    /// `true` when both values refer to the same lock.
    pub fn same_as(&self, other: &SchedulingRule) -> bool {
        Arc::ptr_eq(&self.lock, &other.lock)
    }
}

impl fmt::Debug for SchedulingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulingRule")
            .field("name", &self.name)
            .field("held", &self.is_held())
            .finish()
    }
}

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Reader/writer monitor guarding a whole index.
///
/// Readers hold the monitor for the duration of a batch of queries so that the batch sees
/// one consistent snapshot. Writers take it exclusively and may downgrade to a read lock to
/// finish work (such as persisting) without letting other writers in.
///
/// The monitor is not reentrant: a thread holding a read guard must not ask for another one.
#[derive(Debug, Default)]
pub struct IndexMonitor {
    lock: RwLock<()>,
}

#[must_use = "the read lock is released when the guard is dropped"]
pub struct IndexReadGuard<'a> {
    _guard: RwLockReadGuard<'a, ()>,
}

#[must_use = "the write lock is released when the guard is dropped"]
pub struct IndexWriteGuard<'a> {
    guard: RwLockWriteGuard<'a, ()>,
}

impl IndexMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> IndexReadGuard<'_> {
        IndexReadGuard {
            _guard: self.lock.read(),
        }
    }

    /// Non-blocking probe; `None` while a writer holds the monitor.
    pub fn try_read(&self) -> Option<IndexReadGuard<'_>> {
        self.lock
            .try_read()
            .map(|guard| IndexReadGuard { _guard: guard })
    }

    pub fn write(&self) -> IndexWriteGuard<'_> {
        IndexWriteGuard {
            guard: self.lock.write(),
        }
    }

    pub fn is_write_locked(&self) -> bool {
        self.lock.is_locked_exclusive()
    }
}

impl<'a> IndexWriteGuard<'a> {
    pub fn downgrade(self) -> IndexReadGuard<'a> {
        IndexReadGuard {
            _guard: RwLockWriteGuard::downgrade(self.guard),
        }
    }
}

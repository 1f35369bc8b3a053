//! Job bodies run by the [`crate::CacheManager`] on the scheduler.
//!
//! Every body checks its cancellation token before each unit of work (one index entry, one
//! file, one declaration) and unwinds with [`cbrowse_scheduler::Cancelled`].

pub(crate) mod index_flush;
pub(crate) mod index_populate;
pub(crate) mod locator;
pub(crate) mod refresh;

use cbrowse_index::{BuilderState, IndexError, SymbolIndex};
use cbrowse_scheduler::JobFamily;

/// Background refreshes of project caches.
pub const REFRESH_FAMILY: JobFamily = JobFamily::new("typecache.refresh");

/// Parse-based fallback resolution.
pub const LOCATOR_FAMILY: JobFamily = JobFamily::new("typecache.locator");

/// A run of queries against one index, preceded by a non-blocking busy probe.
pub(crate) struct IndexSession<'a> {
    index: &'a dyn SymbolIndex,
    busy: bool,
}

impl<'a> IndexSession<'a> {
    /// The index counts as busy while its builder runs or while a writer holds the monitor.
    pub(crate) fn probe(index: &'a dyn SymbolIndex) -> Self {
        let busy = index.builder_state() == BuilderState::Busy
            || index.monitor().try_read().is_none();
        Self { index, busy }
    }

    pub(crate) fn index(&self) -> &'a dyn SymbolIndex {
        self.index
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.busy
    }

    /// Runs one query under a read lock of the index monitor.
    ///
    /// On a busy index the query never waits for the writer: if the monitor cannot be taken
    /// right away the query yields nothing.
    pub(crate) fn query<T>(
        &self,
        what: &'static str,
        run: impl FnOnce(&dyn SymbolIndex) -> Result<Vec<T>, IndexError>,
    ) -> Result<Vec<T>, IndexError> {
        let _read = if self.busy {
            match self.index.monitor().try_read() {
                Some(guard) => guard,
                None => {
                    tracing::debug!(
                        target: "cbrowse.typecache",
                        query = what,
                        "index write-locked; skipping best-effort query"
                    );
                    return Ok(Vec::new());
                }
            }
        } else {
            self.index.monitor().read()
        };
        run(self.index)
    }
}

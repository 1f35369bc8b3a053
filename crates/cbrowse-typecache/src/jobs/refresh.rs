//! Background refresh: flush the union of pending invalidations, propagate through
//! includes, repopulate from the index.

use std::sync::Arc;

use cbrowse_index::SymbolIndex;
use cbrowse_scheduler::{CancellationToken, Cancelled, ProgressSender};

use crate::delta::CacheDelta;
use crate::error::{Result, TypeCacheError};
use crate::jobs::{index_flush, index_populate, IndexSession};
use crate::manager::ProjectCache;
use crate::reference::IndexFileResolver;
use crate::scope::SearchScope;

/// Why a refresh ended without touching the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Nothing pending and the cache was clean.
    UpToDate,
    IndexingDisabled,
    /// The project has no index yet; none is built on its behalf.
    NoIndex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Completed {
        scope: SearchScope,
        /// Files outside `scope` flushed and refilled because they include something in it.
        dependents: usize,
        /// The cache was left dirty because the indexer was busy.
        indexer_busy: bool,
    },
    Skipped {
        scope: SearchScope,
        reason: SkipReason,
    },
    Failed {
        scope: SearchScope,
        error: String,
    },
}

/// Per-project refresh counters. A cancelled run counts once, when its body unwinds; a run
/// cancelled before it started is not counted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshStats {
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub skipped: u64,
    /// Invalidation scope of the last completed run.
    pub last_scope: Option<SearchScope>,
    pub last_indexer_busy: bool,
    pub last_error: Option<String>,
}

pub(crate) struct RefreshTask {
    pub cache: Arc<ProjectCache>,
    pub index: Option<Arc<dyn SymbolIndex>>,
    pub enable_indexing: bool,
    pub progress: ProgressSender,
}

impl RefreshTask {
    pub(crate) fn run(
        self,
        token: CancellationToken,
    ) -> std::result::Result<RefreshOutcome, Cancelled> {
        Cancelled::check(&token)?;
        let store = &self.cache.store;
        let claimed = store.take_deltas();
        let mut scope = SearchScope::new();
        for delta in &claimed {
            scope.union(&delta.invalidation_scope());
        }
        let index = self.usable_index();
        if scope.is_empty() {
            // A dirty cache with nothing queued is refilled as a whole, which only makes
            // sense when there is an index to refill it from.
            let skip = match &index {
                _ if !store.is_dirty() => Some(SkipReason::UpToDate),
                Err(reason) => Some(*reason),
                Ok(_) => None,
            };
            if let Some(reason) = skip {
                let outcome = RefreshOutcome::Skipped { scope, reason };
                self.record(&outcome);
                return Ok(outcome);
            }
            scope = SearchScope::for_project(store.project().clone());
        } else if index.is_ok() && !store.is_populated() {
            scope.add_project(store.project().clone());
        }

        tracing::debug!(
            target: "cbrowse.typecache",
            project = %store.project(),
            deltas = claimed.len(),
            jobs = ?claimed.iter().filter_map(CacheDelta::job).collect::<Vec<_>>(),
            "refresh claimed deltas"
        );

        match self.refresh(&scope, index, &token) {
            Ok(outcome) => {
                self.record(&outcome);
                Ok(outcome)
            }
            Err(TypeCacheError::Cancelled) => {
                // Hand the claimed work back so the next run sees the union.
                for delta in claimed {
                    store.add_delta(delta.released());
                }
                self.cache.stats.lock().cancelled += 1;
                tracing::debug!(
                    target: "cbrowse.typecache",
                    project = %store.project(),
                    "refresh cancelled; invalidation re-queued"
                );
                Err(Cancelled)
            }
            Err(err) => {
                tracing::warn!(
                    target: "cbrowse.typecache",
                    project = %store.project(),
                    error = %err,
                    "refresh failed; cache left dirty"
                );
                let outcome = RefreshOutcome::Failed {
                    scope,
                    error: err.to_string(),
                };
                self.record(&outcome);
                Ok(outcome)
            }
        }
    }

    fn usable_index(&self) -> std::result::Result<Arc<dyn SymbolIndex>, SkipReason> {
        match (&self.index, self.enable_indexing) {
            (_, false) => Err(SkipReason::IndexingDisabled),
            (None, true) => Err(SkipReason::NoIndex),
            (Some(index), true) => Ok(index.clone()),
        }
    }

    fn refresh(
        &self,
        scope: &SearchScope,
        index: std::result::Result<Arc<dyn SymbolIndex>, SkipReason>,
        token: &CancellationToken,
    ) -> Result<RefreshOutcome> {
        let store = &self.cache.store;
        let project = store.project();
        let progress = self
            .progress
            .start(format!("Refreshing types of {project}"), Some(3));

        Cancelled::check(token)?;
        let flushed = store.flush_scope(scope);
        progress.report("flushed", 1);
        tracing::debug!(
            target: "cbrowse.typecache",
            project = %project,
            flushed,
            "flushed scope"
        );

        let index = match index {
            Ok(index) => index,
            Err(reason) => {
                progress.finish(Some("skipped".to_string()));
                return Ok(RefreshOutcome::Skipped {
                    scope: scope.clone(),
                    reason,
                });
            }
        };

        let mut populate_scope = scope.clone();
        let mut indexer_busy = false;
        let mut dependents = 0;
        if !scope.encloses_project(project) {
            let session = IndexSession::probe(index.as_ref());
            let report = index_flush::flush_dependents(store, &session, scope, token)?;
            indexer_busy |= report.indexer_busy;
            dependents = report.dependents.len();
            for path in report.dependents {
                populate_scope.add_path(path);
            }
        }
        progress.report("populating", 2);

        let session = IndexSession::probe(index.as_ref());
        let resolver = IndexFileResolver::new(project.clone(), index.clone());
        let report = index_populate::populate(store, &session, &resolver, &populate_scope, token)?;
        indexer_busy |= report.indexer_busy;

        if !indexer_busy {
            store.mark_dirty(false);
            if populate_scope.encloses_project(project) {
                store.mark_populated();
            }
        }
        progress.finish(Some("done".to_string()));
        tracing::info!(
            target: "cbrowse.typecache",
            project = %project,
            types = report.types,
            dependents,
            busy = indexer_busy,
            "refresh complete"
        );
        Ok(RefreshOutcome::Completed {
            scope: scope.clone(),
            dependents,
            indexer_busy,
        })
    }

    fn record(&self, outcome: &RefreshOutcome) {
        let mut stats = self.cache.stats.lock();
        match outcome {
            RefreshOutcome::Completed {
                scope,
                indexer_busy,
                ..
            } => {
                stats.succeeded += 1;
                stats.last_scope = Some(scope.clone());
                stats.last_indexer_busy = *indexer_busy;
            }
            RefreshOutcome::Skipped { .. } => stats.skipped += 1,
            RefreshOutcome::Failed { error, .. } => {
                stats.failed += 1;
                stats.last_error = Some(error.clone());
            }
        }
    }
}

//! Propagates an invalidation from changed headers to the files including them.

use std::collections::BTreeSet;
use std::path::PathBuf;

use cbrowse_scheduler::{CancellationToken, Cancelled};

use crate::error::Result;
use crate::jobs::IndexSession;
use crate::scope::SearchScope;
use crate::store::CacheStore;

#[derive(Debug, Default)]
pub(crate) struct FlushReport {
    /// Files flushed because they (transitively) include something in the scope.
    pub dependents: BTreeSet<PathBuf>,
    pub indexer_busy: bool,
}

/// Flushes every file that includes a file enclosed by `scope`, following the reverse
/// include relation until no new includer turns up.
pub(crate) fn flush_dependents(
    store: &CacheStore,
    session: &IndexSession<'_>,
    scope: &SearchScope,
    token: &CancellationToken,
) -> Result<FlushReport> {
    let mut report = FlushReport {
        indexer_busy: session.is_busy(),
        ..FlushReport::default()
    };
    let mut frontier = scope.clone();

    while !frontier.is_empty() {
        Cancelled::check(token)?;
        let filter = frontier.to_query_filter();
        let entries = session.query("includes", |index| index.includes(&filter))?;

        let mut next = SearchScope::new();
        for entry in entries {
            for includer in entry.includers {
                Cancelled::check(token)?;
                let Some(path) = session.index().file_path(includer) else {
                    continue;
                };
                if scope.encloses(&path) || report.dependents.contains(&path) {
                    continue;
                }
                store.flush(&path);
                next.add_path(path.clone());
                report.dependents.insert(path);
            }
        }
        frontier = next;
    }

    tracing::debug!(
        target: "cbrowse.typecache",
        project = %store.project(),
        dependents = report.dependents.len(),
        busy = report.indexer_busy,
        "flushed including files"
    );
    Ok(report)
}

//! Symbol index consumed by the type cache.
//!
//! The index is produced elsewhere (by a compiler-backed indexer); this crate only defines
//! the query surface the cache relies on, the [`IndexMonitor`] used to take consistent
//! snapshots, and an in-memory implementation used by embedders without a persistent store.

mod entries;
mod memory;
mod monitor;

use std::path::PathBuf;
use std::sync::Arc;

use cbrowse_core::Project;

pub use entries::{
    DerivedTypeEntry, EntryLocation, EntryReference, IncludeEntry, IndexFileId, IndexTypeKind,
    NamespaceEntry, QueryFilter, TypeEntry,
};
pub use memory::{DeclaredName, DeclaredType, FileFacts, MemoryIndex, MemoryIndexProvider};
pub use monitor::{IndexMonitor, IndexReadGuard, IndexWriteGuard};

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("index storage error: {0}")]
    Io(#[from] std::io::Error),
    #[error("index is corrupt: {0}")]
    Corrupt(String),
}

/// Whether the indexer is currently (re)building.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BuilderState {
    #[default]
    Idle,
    Busy,
}

/// How [`IndexProvider::index_for`] treats a project without an index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexLookup {
    /// Return the index if one exists; never trigger a build.
    ReuseExisting,
    CreateIfMissing,
}

/// Read-only query surface of a project's symbol index.
///
/// Query methods do not take the monitor themselves. Callers hold
/// [`IndexMonitor::read`] around a batch of queries so the batch observes one snapshot.
pub trait SymbolIndex: Send + Sync {
    fn monitor(&self) -> &IndexMonitor;

    fn namespaces(&self, filter: &QueryFilter) -> Result<Vec<NamespaceEntry>, IndexError>;

    fn types(&self, filter: &QueryFilter) -> Result<Vec<TypeEntry>, IndexError>;

    /// Base types named in inheritance clauses of files matching `filter`.
    fn derived_types(&self, filter: &QueryFilter) -> Result<Vec<DerivedTypeEntry>, IndexError>;

    /// Include relations whose included path matches `filter`.
    fn includes(&self, filter: &QueryFilter) -> Result<Vec<IncludeEntry>, IndexError>;

    fn file_path(&self, file: IndexFileId) -> Option<PathBuf>;

    fn builder_state(&self) -> BuilderState;

    fn has_changed(&self) -> bool;

    /// Writes pending changes and returns the new generation.
    fn persist(&self) -> Result<u64, IndexError>;
}

pub trait IndexProvider: Send + Sync {
    fn index_for(&self, project: &Project, lookup: IndexLookup) -> Option<Arc<dyn SymbolIndex>>;
}

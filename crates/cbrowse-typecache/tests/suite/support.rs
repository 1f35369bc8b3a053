use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use cbrowse_config::TypeCacheConfig;
use cbrowse_index::{
    BuilderState, DerivedTypeEntry, EntryLocation, IncludeEntry, IndexError, IndexFileId,
    IndexMonitor, MemoryIndex, MemoryIndexProvider, NamespaceEntry, QueryFilter, SymbolIndex,
    TypeEntry,
};
use cbrowse_typecache::CacheManager;
use parking_lot::Mutex;

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(10);

pub fn line(line: u32) -> EntryLocation {
    EntryLocation::Line(line)
}

pub fn config(reconcile_delay_ms: u64) -> TypeCacheConfig {
    TypeCacheConfig {
        reconcile_delay_ms,
        compute_threads: Some(2),
        background_threads: Some(2),
        ..TypeCacheConfig::default()
    }
}

pub fn manager(config: TypeCacheConfig, provider: &Arc<MemoryIndexProvider>) -> CacheManager {
    CacheManager::with_defaults(config, provider.clone())
}

/// Test side of a [`GatedIndex`].
pub struct Gate {
    pub entered: mpsc::Receiver<()>,
    pub release: mpsc::Sender<()>,
}

/// Wraps a [`MemoryIndex`]; once armed, the next namespace query blocks until released.
pub struct GatedIndex {
    inner: Arc<MemoryIndex>,
    armed: AtomicBool,
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl GatedIndex {
    pub fn new(inner: Arc<MemoryIndex>) -> (Arc<Self>, Gate) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let index = Arc::new(Self {
            inner,
            armed: AtomicBool::new(false),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        let gate = Gate {
            entered: entered_rx,
            release: release_tx,
        };
        (index, gate)
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

impl SymbolIndex for GatedIndex {
    fn monitor(&self) -> &IndexMonitor {
        self.inner.monitor()
    }

    fn namespaces(&self, filter: &QueryFilter) -> Result<Vec<NamespaceEntry>, IndexError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            let _ = self.entered.lock().send(());
            let _ = self.release.lock().recv_timeout(WAIT);
        }
        self.inner.namespaces(filter)
    }

    fn types(&self, filter: &QueryFilter) -> Result<Vec<TypeEntry>, IndexError> {
        self.inner.types(filter)
    }

    fn derived_types(&self, filter: &QueryFilter) -> Result<Vec<DerivedTypeEntry>, IndexError> {
        self.inner.derived_types(filter)
    }

    fn includes(&self, filter: &QueryFilter) -> Result<Vec<IncludeEntry>, IndexError> {
        self.inner.includes(filter)
    }

    fn file_path(&self, file: IndexFileId) -> Option<std::path::PathBuf> {
        self.inner.file_path(file)
    }

    fn builder_state(&self) -> BuilderState {
        self.inner.builder_state()
    }

    fn has_changed(&self) -> bool {
        self.inner.has_changed()
    }

    fn persist(&self) -> Result<u64, IndexError> {
        self.inner.persist()
    }
}

/// Wraps a [`MemoryIndex`] whose type query always fails.
pub struct FailingIndex {
    inner: Arc<MemoryIndex>,
}

impl FailingIndex {
    pub fn new(inner: Arc<MemoryIndex>) -> Arc<Self> {
        Arc::new(Self { inner })
    }
}

impl SymbolIndex for FailingIndex {
    fn monitor(&self) -> &IndexMonitor {
        self.inner.monitor()
    }

    fn namespaces(&self, filter: &QueryFilter) -> Result<Vec<NamespaceEntry>, IndexError> {
        self.inner.namespaces(filter)
    }

    fn types(&self, _filter: &QueryFilter) -> Result<Vec<TypeEntry>, IndexError> {
        Err(IndexError::Corrupt("type table truncated".to_string()))
    }

    fn derived_types(&self, filter: &QueryFilter) -> Result<Vec<DerivedTypeEntry>, IndexError> {
        self.inner.derived_types(filter)
    }

    fn includes(&self, filter: &QueryFilter) -> Result<Vec<IncludeEntry>, IndexError> {
        self.inner.includes(filter)
    }

    fn file_path(&self, file: IndexFileId) -> Option<std::path::PathBuf> {
        self.inner.file_path(file)
    }

    fn builder_state(&self) -> BuilderState {
        self.inner.builder_state()
    }

    fn has_changed(&self) -> bool {
        self.inner.has_changed()
    }

    fn persist(&self) -> Result<u64, IndexError> {
        self.inner.persist()
    }
}

/// Polls `done` until it holds or [`WAIT`] runs out.
pub fn eventually(mut done: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + WAIT;
    while std::time::Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    done()
}

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use cbrowse_core::{Project, ProjectId};
use parking_lot::{Mutex, RwLock};

use crate::{
    BuilderState, DerivedTypeEntry, EntryLocation, EntryReference, IncludeEntry, IndexError,
    IndexFileId, IndexLookup, IndexMonitor, IndexProvider, IndexTypeKind, NamespaceEntry,
    QueryFilter, SymbolIndex, TypeEntry,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeclaredName {
    pub name: String,
    pub enclosing: Vec<String>,
    pub location: EntryLocation,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeclaredType {
    pub kind: IndexTypeKind,
    pub name: String,
    pub enclosing: Vec<String>,
    pub location: EntryLocation,
}

/// Everything the indexer recorded about one file.
///
/// Qualified names passed to the builder methods use `::` separators.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileFacts {
    pub namespaces: Vec<DeclaredName>,
    pub types: Vec<DeclaredType>,
    /// Base types named by inheritance clauses in this file.
    pub derivations: Vec<DeclaredName>,
    pub includes: Vec<PathBuf>,
}

fn split_qualified(qualified: &str) -> (Vec<String>, String) {
    let mut segments: Vec<String> = qualified
        .split("::")
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let name = segments.pop().unwrap_or_default();
    (segments, name)
}

impl FileFacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(mut self, qualified: &str, location: EntryLocation) -> Self {
        let (enclosing, name) = split_qualified(qualified);
        self.namespaces.push(DeclaredName {
            name,
            enclosing,
            location,
        });
        self
    }

    pub fn ty(mut self, kind: IndexTypeKind, qualified: &str, location: EntryLocation) -> Self {
        let (enclosing, name) = split_qualified(qualified);
        self.types.push(DeclaredType {
            kind,
            name,
            enclosing,
            location,
        });
        self
    }

    pub fn derives_from(mut self, base: &str, location: EntryLocation) -> Self {
        let (enclosing, name) = split_qualified(base);
        self.derivations.push(DeclaredName {
            name,
            enclosing,
            location,
        });
        self
    }

    pub fn includes(mut self, included: impl Into<PathBuf>) -> Self {
        self.includes.push(included.into());
        self
    }
}

#[derive(Default)]
struct IndexData {
    paths: Vec<PathBuf>,
    ids: HashMap<PathBuf, IndexFileId>,
    facts: BTreeMap<IndexFileId, FileFacts>,
}

impl IndexData {
    fn intern(&mut self, path: &Path) -> IndexFileId {
        if let Some(id) = self.ids.get(path) {
            return *id;
        }
        let id = IndexFileId(self.paths.len() as u32);
        self.paths.push(path.to_path_buf());
        self.ids.insert(path.to_path_buf(), id);
        id
    }

    fn path(&self, id: IndexFileId) -> &Path {
        &self.paths[id.0 as usize]
    }

    /// Facts of files matching `filter`, in file-id order.
    fn matching<'a>(
        &'a self,
        filter: &'a QueryFilter,
    ) -> impl Iterator<Item = (IndexFileId, &'a FileFacts)> + 'a {
        self.facts
            .iter()
            .filter(move |(id, _)| filter.matches(self.path(**id)))
            .map(|(id, facts)| (*id, facts))
    }
}

/// In-memory [`SymbolIndex`] fed by whatever indexer the embedder runs.
///
/// Mutations take the monitor's write lock; queries only take the internal data lock, so the
/// caller is expected to hold a read guard on [`SymbolIndex::monitor`] around a batch.
pub struct MemoryIndex {
    monitor: IndexMonitor,
    data: RwLock<IndexData>,
    busy: AtomicBool,
    changed: AtomicBool,
    generation: AtomicU64,
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            monitor: IndexMonitor::new(),
            data: RwLock::new(IndexData::default()),
            busy: AtomicBool::new(false),
            changed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    /// Replaces everything recorded for `path`.
    pub fn add_file(&self, path: impl AsRef<Path>, facts: FileFacts) -> IndexFileId {
        let _write = self.monitor.write();
        let mut data = self.data.write();
        let id = data.intern(path.as_ref());
        data.facts.insert(id, facts);
        self.changed.store(true, Ordering::Release);
        id
    }

    /// Drops the facts of `path`. Its file id stays reserved.
    pub fn remove_file(&self, path: impl AsRef<Path>) -> bool {
        let _write = self.monitor.write();
        let mut data = self.data.write();
        let Some(id) = data.ids.get(path.as_ref()).copied() else {
            return false;
        };
        let removed = data.facts.remove(&id).is_some();
        if removed {
            self.changed.store(true, Ordering::Release);
        }
        removed
    }

    pub fn file_id(&self, path: impl AsRef<Path>) -> Option<IndexFileId> {
        self.data.read().ids.get(path.as_ref()).copied()
    }

    pub fn file_count(&self) -> usize {
        self.data.read().facts.len()
    }

    pub fn set_builder_state(&self, state: BuilderState) {
        self.busy
            .store(matches!(state, BuilderState::Busy), Ordering::Release);
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

fn reference(file: IndexFileId, location: EntryLocation) -> EntryReference {
    EntryReference { file, location }
}

impl SymbolIndex for MemoryIndex {
    fn monitor(&self) -> &IndexMonitor {
        &self.monitor
    }

    fn namespaces(&self, filter: &QueryFilter) -> Result<Vec<NamespaceEntry>, IndexError> {
        let data = self.data.read();
        let mut grouped: BTreeMap<(Vec<String>, String), Vec<EntryReference>> = BTreeMap::new();
        for (id, facts) in data.matching(filter) {
            for decl in &facts.namespaces {
                grouped
                    .entry((decl.enclosing.clone(), decl.name.clone()))
                    .or_default()
                    .push(reference(id, decl.location));
            }
        }
        Ok(grouped
            .into_iter()
            .map(|((enclosing, name), references)| NamespaceEntry {
                name,
                enclosing,
                references,
            })
            .collect())
    }

    fn types(&self, filter: &QueryFilter) -> Result<Vec<TypeEntry>, IndexError> {
        let data = self.data.read();
        let mut grouped: BTreeMap<(IndexTypeKind, Vec<String>, String), Vec<EntryReference>> =
            BTreeMap::new();
        for (id, facts) in data.matching(filter) {
            for decl in &facts.types {
                grouped
                    .entry((decl.kind, decl.enclosing.clone(), decl.name.clone()))
                    .or_default()
                    .push(reference(id, decl.location));
            }
        }
        Ok(grouped
            .into_iter()
            .map(|((kind, enclosing, name), references)| TypeEntry {
                kind,
                name,
                enclosing,
                references,
            })
            .collect())
    }

    fn derived_types(&self, filter: &QueryFilter) -> Result<Vec<DerivedTypeEntry>, IndexError> {
        let data = self.data.read();
        let mut grouped: BTreeMap<(Vec<String>, String), Vec<EntryReference>> = BTreeMap::new();
        for (id, facts) in data.matching(filter) {
            for decl in &facts.derivations {
                grouped
                    .entry((decl.enclosing.clone(), decl.name.clone()))
                    .or_default()
                    .push(reference(id, decl.location));
            }
        }
        Ok(grouped
            .into_iter()
            .map(|((base_enclosing, base_name), references)| DerivedTypeEntry {
                base_name,
                base_enclosing,
                references,
            })
            .collect())
    }

    fn includes(&self, filter: &QueryFilter) -> Result<Vec<IncludeEntry>, IndexError> {
        let data = self.data.read();
        let mut grouped: BTreeMap<&Path, BTreeSet<IndexFileId>> = BTreeMap::new();
        for (id, facts) in &data.facts {
            for included in &facts.includes {
                if filter.matches(included) {
                    grouped.entry(included.as_path()).or_default().insert(*id);
                }
            }
        }
        Ok(grouped
            .into_iter()
            .map(|(included, includers)| IncludeEntry {
                included: included.to_path_buf(),
                includers: includers.into_iter().collect(),
            })
            .collect())
    }

    fn file_path(&self, file: IndexFileId) -> Option<PathBuf> {
        self.data.read().paths.get(file.0 as usize).cloned()
    }

    fn builder_state(&self) -> BuilderState {
        if self.busy.load(Ordering::Acquire) {
            BuilderState::Busy
        } else {
            BuilderState::Idle
        }
    }

    fn has_changed(&self) -> bool {
        self.changed.load(Ordering::Acquire)
    }

    fn persist(&self) -> Result<u64, IndexError> {
        let write = self.monitor.write();
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        // Readers may come back in while the snapshot is finalized; writers may not.
        let _read = write.downgrade();
        self.changed.store(false, Ordering::Release);
        tracing::debug!(target: "cbrowse.index", generation, "persisted in-memory index");
        Ok(generation)
    }
}

/// Project → index registry handed to the type cache.
#[derive(Default)]
pub struct MemoryIndexProvider {
    indexes: Mutex<HashMap<ProjectId, Arc<dyn SymbolIndex>>>,
}

impl MemoryIndexProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, project: ProjectId, index: Arc<dyn SymbolIndex>) {
        self.indexes.lock().insert(project, index);
    }

    /// Creates and registers an empty [`MemoryIndex`] for `project`, replacing any existing one.
    pub fn create(&self, project: ProjectId) -> Arc<MemoryIndex> {
        let index = Arc::new(MemoryIndex::new());
        self.register(project, index.clone());
        index
    }

    pub fn unregister(&self, project: &ProjectId) -> bool {
        self.indexes.lock().remove(project).is_some()
    }
}

impl IndexProvider for MemoryIndexProvider {
    fn index_for(&self, project: &Project, lookup: IndexLookup) -> Option<Arc<dyn SymbolIndex>> {
        let mut indexes = self.indexes.lock();
        match lookup {
            IndexLookup::ReuseExisting => indexes.get(project.id()).cloned(),
            IndexLookup::CreateIfMissing => Some(
                indexes
                    .entry(project.id().clone())
                    .or_insert_with(|| Arc::new(MemoryIndex::new()) as Arc<dyn SymbolIndex>)
                    .clone(),
            ),
        }
    }
}

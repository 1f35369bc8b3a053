//! Per-project table of cached types.
//!
//! Two maps are kept in lock-step: file → types declared in it, and type → files declaring
//! it. Every public method takes the single store lock, so each call is atomic with respect
//! to every other call and a cancelled job can only truncate a sequence of calls, never leave
//! the maps disagreeing.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cbrowse_core::Project;
use cbrowse_scheduler::{JobId, SchedulingRule};
use parking_lot::Mutex;

use crate::delta::CacheDelta;
use crate::reference::TypeReference;
use crate::scope::SearchScope;
use crate::types::{DeclKind, QualifiedName, TypeInfo, TypeKey, TypeKind};

struct Entry {
    info: Arc<TypeInfo>,
    paths: BTreeSet<PathBuf>,
}

#[derive(Default)]
struct StoreState {
    path_to_types: HashMap<PathBuf, HashSet<TypeKey>>,
    type_to_paths: HashMap<TypeKey, Entry>,
    dirty: bool,
    /// A project-wide population completed since creation or the last `flush_all`.
    populated: bool,
    pending: Vec<CacheDelta>,
    /// Types carrying a derivation site in a file they are not filed under.
    derived_sites: HashMap<PathBuf, HashSet<TypeKey>>,
}

impl StoreState {
    /// Adds `info` under `path`, adopting an existing entry with the same key.
    fn insert_one(&mut self, path: &Path, info: Arc<TypeInfo>) -> Arc<TypeInfo> {
        let key = info.key().clone();
        let entry = self.type_to_paths.entry(key.clone()).or_insert_with(|| Entry {
            info: info.clone(),
            paths: BTreeSet::new(),
        });
        if !Arc::ptr_eq(&entry.info, &info) {
            entry.info.merge_references_from(&info);
        }
        entry.paths.insert(path.to_path_buf());
        let canonical = entry.info.clone();
        self.path_to_types
            .entry(path.to_path_buf())
            .or_default()
            .insert(key);
        canonical
    }

    fn flush_path(&mut self, path: &Path) -> usize {
        self.dirty = true;
        if let Some(keys) = self.derived_sites.remove(path) {
            for key in keys {
                if let Some(entry) = self.type_to_paths.get(&key) {
                    entry.info.remove_references_in(path);
                }
            }
        }
        let Some(keys) = self.path_to_types.remove(path) else {
            return 0;
        };
        let mut dropped = 0;
        for key in keys {
            let emptied = match self.type_to_paths.get_mut(&key) {
                Some(entry) => {
                    entry.paths.remove(path);
                    entry.info.remove_references_in(path);
                    entry.paths.is_empty()
                }
                None => false,
            };
            if emptied {
                self.type_to_paths.remove(&key);
                dropped += 1;
            }
        }
        dropped
    }

    fn remove_key(&mut self, key: &TypeKey) -> Option<Arc<TypeInfo>> {
        let entry = self.type_to_paths.remove(key)?;
        for path in &entry.paths {
            if let Some(keys) = self.path_to_types.get_mut(path) {
                keys.remove(key);
                if keys.is_empty() {
                    self.path_to_types.remove(path);
                }
            }
        }
        Some(entry.info)
    }
}

pub struct CacheStore {
    project: Project,
    rule: SchedulingRule,
    state: Mutex<StoreState>,
}

impl CacheStore {
    /// A new store starts dirty: nothing has been populated yet.
    pub fn new(project: Project) -> Self {
        let rule = SchedulingRule::new(format!("typecache:{}", project.id()));
        Self {
            project,
            rule,
            state: Mutex::new(StoreState {
                dirty: true,
                ..StoreState::default()
            }),
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Mutual-exclusion token held by every job that writes this store.
    pub fn rule(&self) -> &SchedulingRule {
        &self.rule
    }

    /// Registers `types` as declared in `path` and returns the canonical instances.
    ///
    /// When an equal entry already exists, it stays the canonical instance (so relations
    /// resolved on it survive) and absorbs the newcomer's references.
    pub fn insert<I>(&self, path: &Path, types: I) -> Vec<Arc<TypeInfo>>
    where
        I: IntoIterator<Item = Arc<TypeInfo>>,
    {
        let mut state = self.state.lock();
        let canonical = types
            .into_iter()
            .map(|info| state.insert_one(path, info))
            .collect();
        canonical
    }

    /// Registers `info` under every file its references point into.
    ///
    /// Returns `None` (and stores nothing) if no reference resolves to a file.
    pub fn insert_type(&self, info: Arc<TypeInfo>) -> Option<Arc<TypeInfo>> {
        let paths: BTreeSet<PathBuf> = info
            .references()
            .iter()
            .filter_map(|reference| reference.absolute_path())
            .collect();
        let mut state = self.state.lock();
        let mut canonical = None;
        for path in paths {
            canonical = Some(state.insert_one(&path, info.clone()));
        }
        canonical
    }

    /// Records that something declared at `reference` derives from `base`.
    ///
    /// The site is remembered per file, so flushing the deriving file drops it from `base`
    /// even though `base` is declared elsewhere.
    pub fn add_derived_reference(&self, base: &TypeInfo, reference: TypeReference) -> bool {
        let path = reference.absolute_path();
        let added = base.add_derived_reference(reference);
        if let Some(path) = path {
            self.state
                .lock()
                .derived_sites
                .entry(path)
                .or_default()
                .insert(base.key().clone());
        }
        added
    }

    /// Drops `key` from every file. Returns the removed instance.
    pub fn remove(&self, key: &TypeKey) -> Option<Arc<TypeInfo>> {
        self.state.lock().remove_key(key)
    }

    /// Forgets everything declared in `path`. Types left without any file are dropped, and
    /// surviving types lose their references into `path`.
    ///
    /// Returns the number of types dropped.
    pub fn flush(&self, path: &Path) -> usize {
        self.state.lock().flush_path(path)
    }

    pub fn flush_paths<'a, I>(&self, paths: I) -> usize
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let mut state = self.state.lock();
        state.dirty = true;
        let dropped = paths.into_iter().map(|path| state.flush_path(path)).sum();
        dropped
    }

    /// Flushes every cached file enclosed by `scope`; a scope covering the whole project
    /// takes the [`CacheStore::flush_all`] path instead.
    pub fn flush_scope(&self, scope: &SearchScope) -> usize {
        if scope.encloses_project(&self.project) {
            return self.flush_all();
        }
        let mut state = self.state.lock();
        state.dirty = true;
        let doomed: Vec<PathBuf> = state
            .path_to_types
            .keys()
            .filter(|path| scope.encloses(path))
            .cloned()
            .collect();
        let dropped = doomed.iter().map(|path| state.flush_path(path)).sum();
        dropped
    }

    pub fn flush_all(&self) -> usize {
        let mut state = self.state.lock();
        let dropped = state.type_to_paths.len();
        state.path_to_types.clear();
        state.type_to_paths.clear();
        state.derived_sites.clear();
        state.dirty = true;
        state.populated = false;
        tracing::trace!(
            target: "cbrowse.typecache",
            project = %self.project,
            dropped,
            "flushed whole store"
        );
        dropped
    }

    /// Re-keys the placeholder for `name` as `kind`, keeping its files and references.
    ///
    /// If an entry of that kind already exists the placeholder is folded into it. Returns the
    /// resulting canonical instance, or `None` when there is no placeholder for `name`.
    pub fn upgrade_placeholder(
        &self,
        name: &QualifiedName,
        kind: TypeKind,
    ) -> Option<Arc<TypeInfo>> {
        let pending = TypeKey::new(DeclKind::Pending, name.clone());
        let mut state = self.state.lock();
        let entry = state.type_to_paths.get(&pending)?;
        let upgraded = Arc::new(entry.info.rekeyed(TypeKey::new(kind, name.clone())));
        let paths: Vec<PathBuf> = entry.paths.iter().cloned().collect();
        state.remove_key(&pending);

        let mut canonical = upgraded.clone();
        for path in &paths {
            canonical = state.insert_one(path, upgraded.clone());
        }
        Some(canonical)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.state.lock().path_to_types.contains_key(path)
    }

    pub fn contains_type(&self, key: &TypeKey) -> bool {
        self.state.lock().type_to_paths.contains_key(key)
    }

    /// Every cached file, sorted.
    pub fn all_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self.state.lock().path_to_types.keys().cloned().collect();
        files.sort();
        files
    }

    /// Every cached type, sorted by key.
    pub fn all_types(&self) -> Vec<Arc<TypeInfo>> {
        let state = self.state.lock();
        let mut types: Vec<Arc<TypeInfo>> = state
            .type_to_paths
            .values()
            .map(|entry| entry.info.clone())
            .collect();
        types.sort_by(|a, b| a.key().cmp(b.key()));
        types
    }

    /// Types declared in any cached file enclosed by `scope`, sorted by key.
    pub fn types(&self, scope: &SearchScope) -> Vec<Arc<TypeInfo>> {
        let state = self.state.lock();
        let mut keys: BTreeSet<&TypeKey> = BTreeSet::new();
        for (path, types) in &state.path_to_types {
            if scope.encloses(path) {
                keys.extend(types.iter());
            }
        }
        let types = keys
            .into_iter()
            .filter_map(|key| state.type_to_paths.get(key))
            .map(|entry| entry.info.clone())
            .collect();
        types
    }

    pub fn get_type(&self, kind: TypeKind, name: &QualifiedName) -> Option<Arc<TypeInfo>> {
        self.get(&TypeKey::new(kind, name.clone()))
    }

    pub fn get(&self, key: &TypeKey) -> Option<Arc<TypeInfo>> {
        self.state
            .lock()
            .type_to_paths
            .get(key)
            .map(|entry| entry.info.clone())
    }

    /// First class-like entry named `name`: class, then struct, then union.
    pub fn find_class_like(&self, name: &QualifiedName) -> Option<Arc<TypeInfo>> {
        let state = self.state.lock();
        let found = [TypeKind::Class, TypeKind::Struct, TypeKind::Union]
            .into_iter()
            .find_map(|kind| state.type_to_paths.get(&TypeKey::new(kind, name.clone())))
            .map(|entry| entry.info.clone());
        found
    }

    /// Cached files enclosed by `scope`, sorted.
    pub fn paths(&self, scope: &SearchScope) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .state
            .lock()
            .path_to_types
            .keys()
            .filter(|path| scope.encloses(path))
            .cloned()
            .collect();
        paths.sort();
        paths
    }

    /// Files declaring `key`, sorted.
    pub fn paths_of(&self, key: &TypeKey) -> Vec<PathBuf> {
        self.state
            .lock()
            .type_to_paths
            .get(key)
            .map(|entry| entry.paths.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().type_to_paths.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    pub fn mark_dirty(&self, dirty: bool) {
        self.state.lock().dirty = dirty;
    }

    /// `false` until the whole project has been filled once; partial refreshes of a store
    /// that was never filled widen to the whole project.
    pub fn is_populated(&self) -> bool {
        self.state.lock().populated
    }

    pub(crate) fn mark_populated(&self) {
        self.state.lock().populated = true;
    }

    /// Clean and with nothing queued.
    pub fn is_up_to_date(&self) -> bool {
        let state = self.state.lock();
        !state.dirty && state.pending.is_empty()
    }

    pub fn add_delta(&self, delta: CacheDelta) {
        self.state.lock().pending.push(delta);
    }

    pub fn has_pending_deltas(&self) -> bool {
        !self.state.lock().pending.is_empty()
    }

    /// Hands every queued delta to `job`, the run that will claim them.
    pub(crate) fn assign_pending(&self, job: JobId) {
        for delta in self.state.lock().pending.iter_mut() {
            delta.assign_job(job);
        }
    }

    pub fn take_deltas(&self) -> Vec<CacheDelta> {
        std::mem::take(&mut self.state.lock().pending)
    }

    /// Checks that both maps describe the same relation.
    pub fn is_consistent(&self) -> bool {
        let state = self.state.lock();
        let forward = state.path_to_types.iter().all(|(path, keys)| {
            !keys.is_empty()
                && keys.iter().all(|key| {
                    state
                        .type_to_paths
                        .get(key)
                        .is_some_and(|entry| entry.paths.contains(path))
                })
        });
        let backward = state.type_to_paths.iter().all(|(key, entry)| {
            entry.info.key() == key
                && !entry.paths.is_empty()
                && entry.paths.iter().all(|path| {
                    state
                        .path_to_types
                        .get(path)
                        .is_some_and(|keys| keys.contains(key))
                })
        });
        forward && backward
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CacheStore")
            .field("project", &self.project.id())
            .field("files", &state.path_to_types.len())
            .field("types", &state.type_to_paths.len())
            .field("dirty", &state.dirty)
            .field("pending", &state.pending.len())
            .finish()
    }
}

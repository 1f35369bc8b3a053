//! Registry of per-project caches and the jobs that maintain them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cbrowse_config::TypeCacheConfig;
use cbrowse_core::{ElementDelta, Project, ProjectId};
use cbrowse_index::{IndexLookup, IndexProvider, SymbolIndex};
use cbrowse_parser::{OutlineParser, StructuralParser, SymbolTable};
use cbrowse_scheduler::{
    CancellationToken, Cancelled, JobHandle, JobId, JobPriority, JobSpec, Scheduler,
    SchedulerConfig, TaskError,
};
use parking_lot::Mutex;

use crate::delta::CacheDelta;
use crate::error::Result;
use crate::jobs::locator::{LocateGoal, LocateOutcome, LocatorTask};
use crate::jobs::refresh::{RefreshOutcome, RefreshStats, RefreshTask};
use crate::jobs::{LOCATOR_FAMILY, REFRESH_FAMILY};
use crate::listener::{node_impact, NodeImpact};
use crate::reference::TypeReference;
use crate::scope::SearchScope;
use crate::source::{FsSourceProvider, SourceProvider};
use crate::store::CacheStore;
use crate::types::{TypeInfo, TypeKey};

/// The refresh currently owning a project's pending deltas.
struct ScheduledRefresh {
    id: JobId,
    token: CancellationToken,
    /// `None` when a blocking caller holds the handle itself.
    handle: Option<JobHandle<RefreshOutcome>>,
}

pub(crate) struct ProjectCache {
    pub(crate) store: Arc<CacheStore>,
    refresh: Mutex<Option<ScheduledRefresh>>,
    pub(crate) stats: Mutex<RefreshStats>,
}

impl ProjectCache {
    fn new(project: Project) -> Self {
        Self {
            store: Arc::new(CacheStore::new(project)),
            refresh: Mutex::new(None),
            stats: Mutex::new(RefreshStats::default()),
        }
    }
}

/// Process-wide owner of one [`CacheStore`] per project.
///
/// Cheap to clone; clones share the registry and the scheduler.
#[derive(Clone)]
pub struct CacheManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    scheduler: Scheduler,
    indexes: Arc<dyn IndexProvider>,
    sources: Arc<dyn SourceProvider>,
    parser: Arc<dyn StructuralParser>,
    config: TypeCacheConfig,
    projects: Mutex<BTreeMap<ProjectId, Arc<ProjectCache>>>,
}

impl CacheManager {
    pub fn new(
        scheduler: Scheduler,
        indexes: Arc<dyn IndexProvider>,
        sources: Arc<dyn SourceProvider>,
        parser: Arc<dyn StructuralParser>,
        config: TypeCacheConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                scheduler,
                indexes,
                sources,
                parser,
                config,
                projects: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// A manager reading sources from disk and parsing them with [`OutlineParser`].
    pub fn with_defaults(config: TypeCacheConfig, indexes: Arc<dyn IndexProvider>) -> Self {
        let scheduler = Scheduler::new(SchedulerConfig {
            compute_threads: config.effective_compute_threads(),
            background_threads: config.effective_background_threads(),
            ..SchedulerConfig::default()
        });
        let sources = Arc::new(FsSourceProvider::from_config(&config));
        Self::new(
            scheduler,
            indexes,
            sources,
            Arc::new(OutlineParser::new()),
            config,
        )
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn config(&self) -> &TypeCacheConfig {
        &self.inner.config
    }

    fn project_cache(&self, project: &Project) -> Arc<ProjectCache> {
        let mut projects = self.inner.projects.lock();
        projects
            .entry(project.id().clone())
            .or_insert_with(|| Arc::new(ProjectCache::new(project.clone())))
            .clone()
    }

    fn caches(&self) -> Vec<Arc<ProjectCache>> {
        self.inner.projects.lock().values().cloned().collect()
    }

    /// The cache for `project`, created empty (and dirty) on first access.
    pub fn get_cache(&self, project: &Project) -> Arc<CacheStore> {
        self.project_cache(project).store.clone()
    }

    pub fn cache(&self, id: &ProjectId) -> Option<Arc<CacheStore>> {
        self.inner
            .projects
            .lock()
            .get(id)
            .map(|cache| cache.store.clone())
    }

    pub fn projects(&self) -> Vec<Project> {
        self.inner
            .projects
            .lock()
            .values()
            .map(|cache| cache.store.project().clone())
            .collect()
    }

    /// The registered project with the deepest root containing `path`.
    pub fn project_for_path(&self, path: &Path) -> Option<Project> {
        self.projects()
            .into_iter()
            .filter(|project| project.contains(path))
            .max_by_key(|project| project.root().components().count())
    }

    /// Unregisters `project`, cancelling its pending refresh.
    pub fn remove_project(&self, id: &ProjectId) -> Option<Arc<CacheStore>> {
        let cache = self.inner.projects.lock().remove(id)?;
        if let Some(scheduled) = cache.refresh.lock().take() {
            scheduled.token.cancel();
        }
        Some(cache.store.clone())
    }

    pub fn refresh_stats(&self, id: &ProjectId) -> Option<RefreshStats> {
        let cache = self.inner.projects.lock().get(id).cloned()?;
        let stats = cache.stats.lock().clone();
        Some(stats)
    }

    fn index_for(&self, project: &Project) -> Option<Arc<dyn SymbolIndex>> {
        self.inner
            .indexes
            .index_for(project, IndexLookup::ReuseExisting)
    }

    fn symbol_table(&self, project: &Project) -> SymbolTable {
        let parser = &self.inner.config.parser;
        let mut table = SymbolTable::new();
        for dir in &parser.include_paths {
            table = table.include_path(project.root().join(dir));
        }
        for (name, replacement) in &parser.macros {
            table = table.define(name, replacement);
        }
        table
    }

    /// Queues a whole-project invalidation.
    pub fn update_project(&self, project: &Project) -> JobId {
        self.add_delta(CacheDelta::for_project(project.clone()))
    }

    /// Queues `delta` and restarts the project's background refresh after the configured
    /// delay. A refresh already scheduled or running is cancelled; its deltas carry over.
    pub fn add_delta(&self, delta: CacheDelta) -> JobId {
        let cache = self.project_cache(delta.project());
        cache.store.add_delta(delta);
        let config = &self.inner.config;
        let mut slot = cache.refresh.lock();
        let handle = self.schedule_refresh(
            &cache,
            &mut slot,
            config.enable_indexing,
            JobPriority::Long,
            config.reconcile_delay(),
            None,
        );
        let id = handle.id();
        *slot = Some(ScheduledRefresh {
            id,
            token: handle.token(),
            handle: Some(handle),
        });
        id
    }

    /// Cancels whatever refresh owns `slot` and schedules a new one claiming the project's
    /// pending deltas. The caller decides who keeps the returned handle.
    fn schedule_refresh(
        &self,
        cache: &Arc<ProjectCache>,
        slot: &mut Option<ScheduledRefresh>,
        enable_indexing: bool,
        priority: JobPriority,
        delay: Duration,
        parent: Option<CancellationToken>,
    ) -> JobHandle<RefreshOutcome> {
        if let Some(previous) = slot.take() {
            tracing::trace!(
                target: "cbrowse.typecache",
                job = previous.id.raw(),
                "superseding refresh"
            );
            previous.token.cancel();
        }

        let project = cache.store.project();
        let task = RefreshTask {
            cache: cache.clone(),
            index: self.index_for(project),
            enable_indexing,
            progress: self.inner.scheduler.progress(),
        };
        let mut spec = JobSpec::new(format!("refresh types of {project}"), REFRESH_FAMILY)
            .rule(cache.store.rule().clone())
            .priority(priority)
            .delay(delay);
        if let Some(parent) = parent {
            spec = spec.parent_token(parent);
        }
        let handle = self
            .inner
            .scheduler
            .schedule(spec, move |token| task.run(token));
        cache.store.assign_pending(handle.id());
        handle
    }

    /// Cancels the project's refresh and waits until it no longer runs.
    fn cancel_and_join(&self, cache: &ProjectCache) {
        let scheduled = cache.refresh.lock().take();
        if let Some(scheduled) = scheduled {
            scheduled.token.cancel();
            if let Some(handle) = scheduled.handle {
                let _ = handle.join_blocking();
            }
        }
        // A refresh joined by a blocking caller still holds the rule until it unwinds.
        let _ = cache.store.rule().acquire(&CancellationToken::new());
    }

    /// Waits for the project's refresh without cancelling it. Returns its outcome when it
    /// ran to completion.
    fn settle(&self, cache: &ProjectCache) -> Option<RefreshOutcome> {
        let handle = cache
            .refresh
            .lock()
            .as_mut()
            .and_then(|scheduled| scheduled.handle.take());
        handle.and_then(|handle| handle.join_blocking().ok())
    }

    /// Flushes `scope` from `project`'s cache right away, then schedules a refresh for it.
    ///
    /// Any running refresh is cancelled and joined first so the flush never interleaves
    /// with it. Returns the number of types dropped.
    pub fn flush_and_restart(&self, project: &Project, scope: SearchScope) -> usize {
        let cache = self.project_cache(project);
        self.cancel_and_join(&cache);
        let dropped = cache.store.flush_scope(&scope);
        tracing::debug!(
            target: "cbrowse.typecache",
            project = %project,
            dropped,
            "flushed before restart"
        );
        self.add_delta(CacheDelta::for_scope(project.clone(), scope));
        dropped
    }

    /// Routes a change tree to the affected projects as cache deltas, without flushing
    /// anything synchronously. Returns the number of projects that received a delta.
    pub fn process_delta(&self, event: &ElementDelta) -> usize {
        let mut routed = Routed::default();
        self.route(event, &mut routed);

        if routed.everything {
            let projects = self.projects();
            for project in &projects {
                self.add_delta(CacheDelta::for_event(project.clone(), event.clone()));
            }
            return projects.len();
        }

        let count = routed.scopes.len();
        for (project, scope) in routed.scopes.into_values() {
            self.add_delta(CacheDelta::for_scope(project, scope));
        }
        count
    }

    fn route(&self, node: &ElementDelta, routed: &mut Routed) {
        if routed.everything {
            return;
        }
        match node_impact(node) {
            NodeImpact::Ignore => {}
            NodeImpact::Everything => routed.everything = true,
            NodeImpact::Descend => {
                for child in &node.children {
                    self.route(child, routed);
                }
            }
            NodeImpact::Container => {
                let dir = node.path();
                let covered: Vec<Project> = self
                    .projects()
                    .into_iter()
                    .filter(|project| project.root().starts_with(dir))
                    .collect();
                if covered.is_empty() {
                    if let Some(project) = self.owning_project(node) {
                        routed.scope(&project).add_container(dir.to_path_buf());
                    }
                }
                for project in covered {
                    routed.scope(&project).add_project(project.clone());
                }
            }
            NodeImpact::File => {
                if let Some(project) = self.owning_project(node) {
                    routed.scope(&project).add_path(node.path().to_path_buf());
                }
            }
        }
    }

    fn owning_project(&self, node: &ElementDelta) -> Option<Project> {
        let by_id = node.element.project.as_ref().and_then(|id| {
            self.inner
                .projects
                .lock()
                .get(id)
                .map(|cache| cache.store.project().clone())
        });
        by_id.or_else(|| self.project_for_path(node.path()))
    }

    /// Schedules a background refresh for every project whose cache is not up to date.
    /// Returns the number of refreshes scheduled.
    pub fn reconcile(&self, enable_indexing: bool, priority: JobPriority, delay: Duration) -> usize {
        let mut scheduled = 0;
        for cache in self.caches() {
            if cache.store.is_up_to_date() {
                continue;
            }
            let mut slot = cache.refresh.lock();
            let handle =
                self.schedule_refresh(&cache, &mut slot, enable_indexing, priority, delay, None);
            *slot = Some(ScheduledRefresh {
                id: handle.id(),
                token: handle.token(),
                handle: Some(handle),
            });
            scheduled += 1;
        }
        scheduled
    }

    /// Brings every project cache up to date, blocking until done.
    ///
    /// A refresh already scheduled for a project is waited for rather than cancelled. A run
    /// superseded by a concurrent delta is retried; only cancelling `monitor` stops the pass,
    /// with [`crate::TypeCacheError::Cancelled`]. The result holds the last outcome of each
    /// project that refreshed during the call.
    /// Must not be called from inside an async runtime.
    pub fn reconcile_and_wait(
        &self,
        enable_indexing: bool,
        priority: JobPriority,
        monitor: Option<&CancellationToken>,
    ) -> Result<BTreeMap<ProjectId, RefreshOutcome>> {
        let mut outcomes = BTreeMap::new();
        for cache in self.caches() {
            if let Some(outcome) = self.reconcile_one(&cache, enable_indexing, priority, monitor)? {
                outcomes.insert(cache.store.project().id().clone(), outcome);
            }
        }
        Ok(outcomes)
    }

    fn reconcile_one(
        &self,
        cache: &Arc<ProjectCache>,
        enable_indexing: bool,
        priority: JobPriority,
        monitor: Option<&CancellationToken>,
    ) -> Result<Option<RefreshOutcome>> {
        let check = || match monitor {
            Some(monitor) => Cancelled::check(monitor),
            None => Ok(()),
        };
        check()?;
        let mut last = self.settle(cache);
        loop {
            check()?;
            if cache.store.is_up_to_date() {
                return Ok(last);
            }
            let handle = {
                let mut slot = cache.refresh.lock();
                let handle = self.schedule_refresh(
                    cache,
                    &mut slot,
                    enable_indexing,
                    priority,
                    Duration::ZERO,
                    monitor.cloned(),
                );
                *slot = Some(ScheduledRefresh {
                    id: handle.id(),
                    token: handle.token(),
                    handle: None,
                });
                handle
            };
            match handle.join_blocking() {
                Ok(outcome) => return Ok(Some(outcome)),
                Err(TaskError::Cancelled) => {
                    // Superseded by a newer delta, whose deltas are still queued; the next
                    // iteration claims them right away.
                    tracing::debug!(
                        target: "cbrowse.typecache",
                        project = %cache.store.project(),
                        "blocking refresh superseded; retrying"
                    );
                    last = None;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Cancels every refresh and locator job in the process.
    pub fn cancel_jobs(&self) -> usize {
        let jobs = self.inner.scheduler.jobs();
        jobs.cancel_family(REFRESH_FAMILY) + jobs.cancel_family(LOCATOR_FAMILY)
    }

    /// The project cache holding `info`, falling back to the project of its first reference.
    fn owner_of(&self, info: &TypeInfo) -> Option<Arc<ProjectCache>> {
        if let Some(cache) = self
            .caches()
            .into_iter()
            .find(|cache| cache.store.contains_type(info.key()))
        {
            return Some(cache);
        }
        let path = info.primary_reference()?.absolute_path()?;
        let project = self.project_for_path(&path)?;
        Some(self.project_cache(&project))
    }

    fn reference_paths(info: &TypeInfo) -> Vec<PathBuf> {
        info.references()
            .iter()
            .filter_map(TypeReference::absolute_path)
            .collect()
    }

    fn schedule_locator(
        &self,
        cache: &ProjectCache,
        goal: LocateGoal,
        hints: Vec<PathBuf>,
        priority: JobPriority,
        delay: Duration,
        parent: Option<CancellationToken>,
    ) -> JobHandle<LocateOutcome> {
        let project = cache.store.project();
        let mut spec = JobSpec::new(format!("locate {goal} in {project}"), LOCATOR_FAMILY)
            .rule(cache.store.rule().clone())
            .priority(priority)
            .delay(delay);
        if let Some(parent) = parent {
            spec = spec.parent_token(parent);
        }
        let task = LocatorTask {
            store: cache.store.clone(),
            sources: self.inner.sources.clone(),
            parser: self.inner.parser.clone(),
            symbols: Arc::new(self.symbol_table(project)),
            goal,
            hints,
        };
        self.inner
            .scheduler
            .schedule(spec, move |token| task.run(token))
    }

    /// Starts a background search for a precise declaration site of `info`.
    ///
    /// Does not cancel the project's refresh; the locator waits for it through the
    /// project's scheduling rule. `None` when no registered project owns `info`.
    pub fn locate_type(
        &self,
        info: &TypeInfo,
        priority: JobPriority,
        delay: Duration,
    ) -> Option<JobHandle<LocateOutcome>> {
        let cache = self.owner_of(info)?;
        let goal = LocateGoal::Declaration(info.key().clone());
        Some(self.schedule_locator(
            &cache,
            goal,
            Self::reference_paths(info),
            priority,
            delay,
            None,
        ))
    }

    /// Returns a declaration site of `info` with an exact offset, parsing sources when the
    /// known references only carry line numbers.
    pub fn locate_type_and_wait(
        &self,
        info: &TypeInfo,
        priority: JobPriority,
        monitor: Option<&CancellationToken>,
    ) -> Option<TypeReference> {
        if let Some(exact) = info
            .references()
            .into_iter()
            .find(|reference| !reference.is_line_number())
        {
            return Some(exact);
        }
        let goal = LocateGoal::Declaration(info.key().clone());
        let enable_indexing = self.inner.config.enable_indexing;
        let (_, outcome) =
            self.locate_and_wait(info, goal, enable_indexing, priority, monitor)?;
        let reference = outcome.reference?;
        info.add_reference(reference.clone());
        Some(reference)
    }

    /// Base classes of `info`. Returns at once when they are already resolved.
    pub fn locate_super_types_and_wait(
        &self,
        info: &TypeInfo,
        enable_indexing: bool,
        priority: JobPriority,
        monitor: Option<&CancellationToken>,
    ) -> Vec<TypeKey> {
        if let Some(resolved) = info.super_types() {
            return resolved;
        }
        let goal = LocateGoal::SuperTypes(info.key().clone());
        let Some((cache, outcome)) =
            self.locate_and_wait(info, goal, enable_indexing, priority, monitor)
        else {
            return Vec::new();
        };
        let Some(super_types) = outcome.super_types else {
            return Vec::new();
        };
        if let Some(canonical) = cache.store.get(info.key()) {
            canonical.set_super_types(super_types.clone());
        }
        info.set_super_types(super_types.clone());
        super_types
    }

    /// Classes deriving directly from `info`. Returns at once when they are already
    /// resolved, even to nothing.
    pub fn locate_sub_types_and_wait(
        &self,
        info: &TypeInfo,
        enable_indexing: bool,
        priority: JobPriority,
        monitor: Option<&CancellationToken>,
    ) -> Vec<TypeKey> {
        if let Some(resolved) = info.sub_types() {
            return resolved;
        }
        let goal = LocateGoal::SubTypes(info.key().clone());
        let Some((cache, outcome)) =
            self.locate_and_wait(info, goal, enable_indexing, priority, monitor)
        else {
            return Vec::new();
        };
        let Some(sub_types) = outcome.sub_types else {
            return Vec::new();
        };
        if let Some(canonical) = cache.store.get(info.key()) {
            canonical.set_sub_types(sub_types.clone());
        }
        info.set_sub_types(sub_types.clone());
        sub_types
    }

    /// Cancels the owning project's refresh, runs a locator for `goal` to completion, then
    /// resumes background reconciliation for every project.
    fn locate_and_wait(
        &self,
        info: &TypeInfo,
        goal: LocateGoal,
        enable_indexing: bool,
        priority: JobPriority,
        monitor: Option<&CancellationToken>,
    ) -> Option<(Arc<ProjectCache>, LocateOutcome)> {
        let cache = self.owner_of(info)?;
        self.cancel_and_join(&cache);

        let handle = self.schedule_locator(
            &cache,
            goal,
            Self::reference_paths(info),
            priority,
            Duration::ZERO,
            monitor.cloned(),
        );
        let result = handle.join_blocking();
        self.reconcile(
            enable_indexing,
            JobPriority::Long,
            self.inner.config.reconcile_delay(),
        );

        match result {
            Ok(outcome) => Some((cache, outcome)),
            Err(err) => {
                tracing::debug!(
                    target: "cbrowse.typecache",
                    project = %cache.store.project(),
                    error = %err,
                    "locator did not finish"
                );
                None
            }
        }
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("projects", &self.projects())
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Routed {
    everything: bool,
    scopes: BTreeMap<ProjectId, (Project, SearchScope)>,
}

impl Routed {
    fn scope(&mut self, project: &Project) -> &mut SearchScope {
        &mut self
            .scopes
            .entry(project.id().clone())
            .or_insert_with(|| (project.clone(), SearchScope::new()))
            .1
    }
}

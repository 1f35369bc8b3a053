//! Translation of source-model change events into cache invalidations.

use std::collections::BTreeSet;
use std::path::PathBuf;

use cbrowse_core::{DeltaFlags, ElementDelta, ElementKind, Project};

use crate::manager::CacheManager;
use crate::scope::SearchScope;

/// What a single node of a change tree means for the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeImpact {
    /// Nothing below this node can affect type declarations.
    Ignore,
    /// Only the node's children may matter.
    Descend,
    /// Whole workspace.
    Everything,
    /// The node's path and everything under it.
    Container,
    /// The node's file.
    File,
}

pub(crate) fn node_impact(node: &ElementDelta) -> NodeImpact {
    // Unsaved editor buffers never invalidate the cache.
    if node.element.working_copy {
        return NodeImpact::Ignore;
    }
    let structural = node.is_add_or_remove();
    let kind = node.element.kind;
    match kind {
        ElementKind::Model => {
            if structural || node.flags.intersects(DeltaFlags::CONTENT | DeltaFlags::PATH_ENTRY) {
                NodeImpact::Everything
            } else {
                NodeImpact::Descend
            }
        }
        _ if kind.is_container() => {
            if structural || node.flags.contains(DeltaFlags::PATH_ENTRY) {
                NodeImpact::Container
            } else {
                NodeImpact::Descend
            }
        }
        _ if kind.declares_types() => {
            if structural || node.flags.intersects(DeltaFlags::CONTENT | DeltaFlags::PATH_ENTRY)
            {
                NodeImpact::File
            } else {
                NodeImpact::Descend
            }
        }
        _ => NodeImpact::Ignore,
    }
}

/// Flush decision derived from one change tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invalidation {
    pub everything: bool,
    pub paths: BTreeSet<PathBuf>,
    pub containers: BTreeSet<PathBuf>,
}

impl Invalidation {
    pub fn is_empty(&self) -> bool {
        !self.everything && self.paths.is_empty() && self.containers.is_empty()
    }

    pub fn to_scope(&self) -> SearchScope {
        if self.everything {
            return SearchScope::workspace();
        }
        let mut scope = SearchScope::new();
        for path in &self.paths {
            scope.add_path(path.clone());
        }
        for dir in &self.containers {
            scope.add_container(dir.clone());
        }
        scope
    }

    /// The part of this invalidation that touches `project`, or `None` if it does not.
    pub fn for_project(&self, project: &Project) -> Option<SearchScope> {
        if self.everything {
            return Some(SearchScope::workspace());
        }
        let mut scope = SearchScope::new();
        for path in self.paths.iter().filter(|path| project.contains(path)) {
            scope.add_path(path.clone());
        }
        for dir in &self.containers {
            if project.root().starts_with(dir) {
                scope.add_project(project.clone());
            } else if project.contains(dir) {
                scope.add_container(dir.clone());
            }
        }
        (!scope.is_empty()).then_some(scope)
    }

    fn collect(&mut self, node: &ElementDelta) {
        if self.everything {
            return;
        }
        match node_impact(node) {
            NodeImpact::Ignore => {}
            NodeImpact::Everything => {
                self.everything = true;
                self.paths.clear();
                self.containers.clear();
            }
            NodeImpact::Container => {
                self.containers.insert(node.path().to_path_buf());
            }
            NodeImpact::File => {
                self.paths.insert(node.path().to_path_buf());
            }
            NodeImpact::Descend => {
                for child in &node.children {
                    self.collect(child);
                }
            }
        }
    }
}

/// Classifies a change tree.
pub fn classify(event: &ElementDelta) -> Invalidation {
    let mut invalidation = Invalidation::default();
    invalidation.collect(event);
    invalidation
}

/// Receives change-event batches and flushes affected caches synchronously before handing
/// the same scope to a fresh refresh.
#[derive(Clone)]
pub struct DeltaListener {
    manager: CacheManager,
}

impl DeltaListener {
    pub fn new(manager: CacheManager) -> Self {
        Self { manager }
    }

    /// Returns the number of project caches that were invalidated.
    pub fn element_changed(&self, event: &ElementDelta) -> usize {
        let invalidation = classify(event);
        if invalidation.is_empty() {
            return 0;
        }
        tracing::debug!(
            target: "cbrowse.typecache",
            everything = invalidation.everything,
            files = invalidation.paths.len(),
            containers = invalidation.containers.len(),
            "change event invalidates cache"
        );

        let mut touched = 0;
        for project in self.manager.projects() {
            if let Some(scope) = invalidation.for_project(&project) {
                self.manager.flush_and_restart(&project, scope);
                touched += 1;
            }
        }
        touched
    }
}

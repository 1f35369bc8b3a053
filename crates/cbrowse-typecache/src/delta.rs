use cbrowse_core::{ElementDelta, Project};
use cbrowse_scheduler::JobId;

use crate::listener;
use crate::scope::SearchScope;

/// A pending invalidation of one project's cache.
///
/// Carries an explicit scope, a raw change-event subtree, or both. Consumed by exactly one
/// refresh run, which records its [`JobId`] here while it owns the delta.
#[derive(Debug, Clone)]
pub struct CacheDelta {
    project: Project,
    scope: Option<SearchScope>,
    event: Option<ElementDelta>,
    job: Option<JobId>,
}

impl CacheDelta {
    pub fn for_scope(project: Project, scope: SearchScope) -> Self {
        Self {
            project,
            scope: Some(scope),
            event: None,
            job: None,
        }
    }

    /// Invalidates every file of `project`.
    pub fn for_project(project: Project) -> Self {
        let scope = SearchScope::for_project(project.clone());
        Self::for_scope(project, scope)
    }

    pub fn for_event(project: Project, event: ElementDelta) -> Self {
        Self {
            project,
            scope: None,
            event: Some(event),
            job: None,
        }
    }

    pub fn with_event(mut self, event: ElementDelta) -> Self {
        self.event = Some(event);
        self
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn scope(&self) -> Option<&SearchScope> {
        self.scope.as_ref()
    }

    pub fn event(&self) -> Option<&ElementDelta> {
        self.event.as_ref()
    }

    pub fn job(&self) -> Option<JobId> {
        self.job
    }

    pub(crate) fn assign_job(&mut self, job: JobId) {
        self.job = Some(job);
    }

    /// The same invalidation, no longer owned by any run.
    pub(crate) fn released(mut self) -> Self {
        self.job = None;
        self
    }

    /// Everything this delta invalidates: the explicit scope plus whatever the event tree
    /// classifies as affected.
    pub fn invalidation_scope(&self) -> SearchScope {
        let mut scope = self.scope.clone().unwrap_or_default();
        if let Some(event) = &self.event {
            scope.union(&listener::classify(event).to_scope());
        }
        scope
    }
}

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use cbrowse_core::Project;
use cbrowse_index::QueryFilter;

/// A set of files described by explicit paths, subtree containers, whole projects, or the
/// entire workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchScope {
    workspace: bool,
    paths: BTreeSet<PathBuf>,
    containers: BTreeSet<PathBuf>,
    projects: BTreeSet<Project>,
}

impl SearchScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workspace() -> Self {
        Self {
            workspace: true,
            ..Self::default()
        }
    }

    pub fn for_project(project: Project) -> Self {
        Self::new().with_project(project)
    }

    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self::new().with_path(path)
    }

    pub fn for_container(dir: impl Into<PathBuf>) -> Self {
        Self::new().with_container(dir)
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.add_path(path);
        self
    }

    pub fn with_container(mut self, dir: impl Into<PathBuf>) -> Self {
        self.add_container(dir);
        self
    }

    pub fn with_project(mut self, project: Project) -> Self {
        self.add_project(project);
        self
    }

    pub fn add_path(&mut self, path: impl Into<PathBuf>) {
        self.paths.insert(path.into());
    }

    pub fn add_container(&mut self, dir: impl Into<PathBuf>) {
        self.containers.insert(dir.into());
    }

    pub fn add_project(&mut self, project: Project) {
        self.projects.insert(project);
    }

    pub fn union(&mut self, other: &SearchScope) {
        self.workspace |= other.workspace;
        self.paths.extend(other.paths.iter().cloned());
        self.containers.extend(other.containers.iter().cloned());
        self.projects.extend(other.projects.iter().cloned());
    }

    pub fn is_workspace(&self) -> bool {
        self.workspace
    }

    pub fn is_empty(&self) -> bool {
        !self.workspace
            && self.paths.is_empty()
            && self.containers.is_empty()
            && self.projects.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    pub fn containers(&self) -> impl Iterator<Item = &Path> {
        self.containers.iter().map(PathBuf::as_path)
    }

    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.projects.iter()
    }

    pub fn encloses(&self, path: &Path) -> bool {
        self.workspace
            || self.paths.contains(path)
            || self.containers.iter().any(|dir| path.starts_with(dir))
            || self.projects.iter().any(|project| project.contains(path))
    }

    /// `true` if every file of `project` is inside the scope.
    pub fn encloses_project(&self, project: &Project) -> bool {
        self.workspace
            || self.projects.contains(project)
            || self.containers.iter().any(|dir| project.root().starts_with(dir))
    }

    /// The index filter selecting the same files.
    pub fn to_query_filter(&self) -> QueryFilter {
        if self.workspace {
            return QueryFilter::everything();
        }
        let mut filter = QueryFilter::new();
        for dir in &self.containers {
            filter = filter.with_root(dir.clone());
        }
        for project in &self.projects {
            filter = filter.with_root(project.root().to_path_buf());
        }
        for path in &self.paths {
            filter = filter.with_path(path.clone());
        }
        filter
    }
}

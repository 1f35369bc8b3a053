//! Core shared types for the C/C++ symbol browser.
//!
//! This crate is intentionally small and dependency-free.

mod delta;
mod fs;
mod path;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use delta::{DeltaFlags, DeltaKind, ElementDelta, ElementHandle, ElementKind};
pub use fs::{collect_files_with_extensions, has_extension};
pub use path::normalize_path;

/// Stable name of a workspace project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectId(Arc<str>);

impl ProjectId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A workspace project: a name plus the root directory its files live under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Project {
    id: ProjectId,
    root: PathBuf,
}

impl Project {
    pub fn new(id: impl Into<ProjectId>, root: impl AsRef<Path>) -> Self {
        Self {
            id: id.into(),
            root: normalize_path(root.as_ref()),
        }
    }

    pub fn id(&self) -> &ProjectId {
        &self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns `true` if `path` lies inside this project's tree.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Best-effort string rendering of a panic payload.
pub fn panic_payload_to_str(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}

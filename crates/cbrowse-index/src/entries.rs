use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Dense identifier of a file known to one index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexFileId(pub u32);

impl fmt::Display for IndexFileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file#{}", self.0)
    }
}

/// Where a declaration was recorded. The indexer stores exact offsets when it has them and
/// falls back to a 1-based line otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryLocation {
    Offset { offset: u32, length: u32 },
    Line(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryReference {
    pub file: IndexFileId,
    pub location: EntryLocation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexTypeKind {
    Class,
    Struct,
    Union,
    Enum,
    Typedef,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceEntry {
    pub name: String,
    /// Enclosing scopes, outermost first.
    pub enclosing: Vec<String>,
    pub references: Vec<EntryReference>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeEntry {
    pub kind: IndexTypeKind,
    pub name: String,
    pub enclosing: Vec<String>,
    pub references: Vec<EntryReference>,
}

/// A base type named in some inheritance clause. `references` point at the derivation sites.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedTypeEntry {
    pub base_name: String,
    pub base_enclosing: Vec<String>,
    pub references: Vec<EntryReference>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeEntry {
    pub included: PathBuf,
    pub includers: Vec<IndexFileId>,
}

/// Restricts a query to files under some roots or to an explicit set of files.
///
/// Entries are reported only with the references that fall inside the filter; an entry left
/// with no reference is dropped. Include entries are matched on the *included* path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryFilter {
    everything: bool,
    roots: Vec<PathBuf>,
    paths: Vec<PathBuf>,
}

impl QueryFilter {
    pub fn everything() -> Self {
        Self {
            everything: true,
            ..Self::default()
        }
    }

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.push(path.into());
        self
    }

    pub fn is_everything(&self) -> bool {
        self.everything
    }

    pub fn is_empty(&self) -> bool {
        !self.everything && self.roots.is_empty() && self.paths.is_empty()
    }

    pub fn matches(&self, path: &Path) -> bool {
        self.everything
            || self.paths.iter().any(|p| p == path)
            || self.roots.iter().any(|root| path.starts_with(root))
    }
}

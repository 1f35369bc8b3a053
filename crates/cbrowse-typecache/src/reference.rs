//! Declaration sites attached to [`crate::TypeInfo`].
//!
//! References produced by the index carry only the index's compact file id. Turning that id
//! into a path is deferred until someone asks for it and cached afterwards; references
//! produced by the fallback parser already know their file.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use cbrowse_core::Project;
use cbrowse_index::{EntryLocation, IndexFileId, SymbolIndex};
use cbrowse_parser::SourceSpan;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceLocation {
    Offset { offset: u32, length: u32 },
    /// 1-based line, used when the indexer did not record offsets.
    Line(u32),
}

impl ReferenceLocation {
    pub fn is_line_number(&self) -> bool {
        matches!(self, ReferenceLocation::Line(_))
    }
}

impl From<EntryLocation> for ReferenceLocation {
    fn from(location: EntryLocation) -> Self {
        match location {
            EntryLocation::Offset { offset, length } => {
                ReferenceLocation::Offset { offset, length }
            }
            EntryLocation::Line(line) => ReferenceLocation::Line(line),
        }
    }
}

impl From<SourceSpan> for ReferenceLocation {
    fn from(span: SourceSpan) -> Self {
        ReferenceLocation::Offset {
            offset: span.offset,
            length: span.length,
        }
    }
}

/// A materialized file identity: always absolute, plus the path relative to the owning
/// project's root when the file lives inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedPath {
    absolute: PathBuf,
    workspace_relative: Option<PathBuf>,
}

impl ResolvedPath {
    pub fn new(project: &Project, absolute: &Path) -> Self {
        let workspace_relative = absolute
            .strip_prefix(project.root())
            .ok()
            .map(Path::to_path_buf);
        Self {
            absolute: absolute.to_path_buf(),
            workspace_relative,
        }
    }

    pub fn absolute(&self) -> &Path {
        &self.absolute
    }

    pub fn workspace_relative(&self) -> Option<&Path> {
        self.workspace_relative.as_deref()
    }

    /// `true` for files outside the project tree (system headers, sibling checkouts).
    pub fn is_external(&self) -> bool {
        self.workspace_relative.is_none()
    }
}

/// Maps index file ids to paths for one index, caching every answer.
pub struct IndexFileResolver {
    project: Project,
    index: Arc<dyn SymbolIndex>,
    cache: Mutex<HashMap<IndexFileId, Option<Arc<ResolvedPath>>>>,
}

impl IndexFileResolver {
    pub fn new(project: Project, index: Arc<dyn SymbolIndex>) -> Arc<Self> {
        Arc::new(Self {
            project,
            index,
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn resolve(&self, file: IndexFileId) -> Option<Arc<ResolvedPath>> {
        if let Some(hit) = self.cache.lock().get(&file) {
            return hit.clone();
        }
        // Looked up without the cache lock; the index takes its own data lock.
        let resolved = self
            .index
            .file_path(file)
            .map(|path| Arc::new(ResolvedPath::new(&self.project, &path)));
        self.cache
            .lock()
            .entry(file)
            .or_insert(resolved)
            .clone()
    }
}

#[derive(Clone)]
enum FileRef {
    Resolved(Arc<ResolvedPath>),
    Indexed {
        file: IndexFileId,
        resolver: Arc<IndexFileResolver>,
        resolved: Arc<OnceLock<Option<Arc<ResolvedPath>>>>,
    },
}

/// One declaration (or derivation) site.
#[derive(Clone)]
pub struct TypeReference {
    location: ReferenceLocation,
    file: FileRef,
}

impl TypeReference {
    pub fn resolved(path: impl Into<Arc<ResolvedPath>>, location: ReferenceLocation) -> Self {
        Self {
            location,
            file: FileRef::Resolved(path.into()),
        }
    }

    /// A reference whose file is only known by its index id.
    pub fn indexed(
        resolver: Arc<IndexFileResolver>,
        file: IndexFileId,
        location: ReferenceLocation,
    ) -> Self {
        Self {
            location,
            file: FileRef::Indexed {
                file,
                resolver,
                resolved: Arc::new(OnceLock::new()),
            },
        }
    }

    pub fn location(&self) -> ReferenceLocation {
        self.location
    }

    pub fn is_line_number(&self) -> bool {
        self.location.is_line_number()
    }

    /// The file this reference points into, resolving it on first use.
    ///
    /// `None` if the index no longer knows the file id.
    pub fn path(&self) -> Option<Arc<ResolvedPath>> {
        match &self.file {
            FileRef::Resolved(path) => Some(path.clone()),
            FileRef::Indexed {
                file,
                resolver,
                resolved,
            } => resolved.get_or_init(|| resolver.resolve(*file)).clone(),
        }
    }

    pub fn absolute_path(&self) -> Option<PathBuf> {
        self.path().map(|path| path.absolute().to_path_buf())
    }

    /// Whether the file identity has been materialized yet.
    pub fn is_resolved(&self) -> bool {
        match &self.file {
            FileRef::Resolved(_) => true,
            FileRef::Indexed { resolved, .. } => resolved.get().is_some(),
        }
    }

    pub fn is_in(&self, path: &Path) -> bool {
        self.path().is_some_and(|resolved| resolved.absolute() == path)
    }

    /// Same location in the same file.
    pub fn same_site(&self, other: &TypeReference) -> bool {
        if self.location != other.location {
            return false;
        }
        match (&self.file, &other.file) {
            (
                FileRef::Indexed {
                    file: a,
                    resolver: ra,
                    ..
                },
                FileRef::Indexed {
                    file: b,
                    resolver: rb,
                    ..
                },
            ) if Arc::ptr_eq(ra, rb) => a == b,
            _ => match (self.path(), other.path()) {
                (Some(a), Some(b)) => a.absolute() == b.absolute(),
                _ => false,
            },
        }
    }
}

impl fmt::Debug for TypeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("TypeReference");
        s.field("location", &self.location);
        match &self.file {
            FileRef::Resolved(path) => s.field("path", &path.absolute()),
            FileRef::Indexed { file, resolved, .. } => match resolved.get() {
                Some(Some(path)) => s.field("path", &path.absolute()),
                _ => s.field("file", file),
            },
        };
        s.finish()
    }
}

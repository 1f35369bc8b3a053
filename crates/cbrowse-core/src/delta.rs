use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::path::{Path, PathBuf};

use crate::ProjectId;

/// Kind tag of an element in the source model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementKind {
    /// The whole workspace model.
    Model,
    Project,
    SourceRoot,
    Folder,
    /// A source or header file.
    TranslationUnit,
    Include,
    Namespace,
    Class,
    Struct,
    Union,
    Enum,
    Typedef,
    Function,
    Method,
    Field,
    Variable,
    Macro,
    Other,
}

impl ElementKind {
    /// Containers whose subtree is invalidated as a whole (project, source root, folder).
    pub fn is_container(self) -> bool {
        matches!(
            self,
            ElementKind::Project | ElementKind::SourceRoot | ElementKind::Folder
        )
    }

    /// Elements that can introduce or remove a type declaration in their file.
    pub fn declares_types(self) -> bool {
        matches!(
            self,
            ElementKind::TranslationUnit
                | ElementKind::Include
                | ElementKind::Namespace
                | ElementKind::Class
                | ElementKind::Struct
                | ElementKind::Union
                | ElementKind::Enum
                | ElementKind::Typedef
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeltaKind {
    Added,
    Removed,
    Changed,
}

/// Bit set describing which aspects of a changed element changed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeltaFlags(u32);

impl DeltaFlags {
    pub const NONE: DeltaFlags = DeltaFlags(0);
    /// The element's text content changed.
    pub const CONTENT: DeltaFlags = DeltaFlags(1 << 0);
    /// Include paths, macros or source roots affecting the element changed.
    pub const PATH_ENTRY: DeltaFlags = DeltaFlags(1 << 1);
    /// One or more children changed; see [`ElementDelta::children`].
    pub const CHILDREN: DeltaFlags = DeltaFlags(1 << 2);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: DeltaFlags) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub const fn intersects(self, other: DeltaFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for DeltaFlags {
    type Output = DeltaFlags;

    fn bitor(self, rhs: DeltaFlags) -> DeltaFlags {
        DeltaFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for DeltaFlags {
    fn bitor_assign(&mut self, rhs: DeltaFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for DeltaFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.intersects(DeltaFlags::CONTENT) {
            names.push("CONTENT");
        }
        if self.intersects(DeltaFlags::PATH_ENTRY) {
            names.push("PATH_ENTRY");
        }
        if self.intersects(DeltaFlags::CHILDREN) {
            names.push("CHILDREN");
        }
        write!(f, "DeltaFlags({})", names.join(" | "))
    }
}

/// Identity of the element a delta node talks about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    pub kind: ElementKind,
    /// Path of the resource enclosing the element (the file for declarations).
    pub path: PathBuf,
    /// Owning project; `None` only for the workspace model itself.
    pub project: Option<ProjectId>,
    /// Set for elements that live in an unsaved editor buffer.
    pub working_copy: bool,
}

impl ElementHandle {
    pub fn new(kind: ElementKind, path: impl Into<PathBuf>, project: Option<ProjectId>) -> Self {
        Self {
            kind,
            path: path.into(),
            project,
            working_copy: false,
        }
    }

    pub fn model() -> Self {
        Self::new(ElementKind::Model, PathBuf::new(), None)
    }

    pub fn in_working_copy(mut self) -> Self {
        self.working_copy = true;
        self
    }
}

/// A node of the tree-shaped change notification emitted by the source model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementDelta {
    pub element: ElementHandle,
    pub kind: DeltaKind,
    pub flags: DeltaFlags,
    pub children: Vec<ElementDelta>,
}

impl ElementDelta {
    pub fn added(element: ElementHandle) -> Self {
        Self::new(element, DeltaKind::Added, DeltaFlags::NONE)
    }

    pub fn removed(element: ElementHandle) -> Self {
        Self::new(element, DeltaKind::Removed, DeltaFlags::NONE)
    }

    pub fn changed(element: ElementHandle, flags: DeltaFlags) -> Self {
        Self::new(element, DeltaKind::Changed, flags)
    }

    fn new(element: ElementHandle, kind: DeltaKind, flags: DeltaFlags) -> Self {
        Self {
            element,
            kind,
            flags,
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: ElementDelta) -> Self {
        self.flags |= DeltaFlags::CHILDREN;
        self.children.push(child);
        self
    }

    pub fn path(&self) -> &Path {
        &self.element.path
    }

    /// `true` for additions and removals (as opposed to in-place changes).
    pub fn is_add_or_remove(&self) -> bool {
        matches!(self.kind, DeltaKind::Added | DeltaKind::Removed)
    }
}

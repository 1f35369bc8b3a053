use std::fmt;

use cbrowse_index::IndexTypeKind;
use cbrowse_parser::ClassKey;
use parking_lot::RwLock;

use crate::reference::TypeReference;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeKind {
    Namespace,
    Class,
    Struct,
    Union,
    Enum,
    Typedef,
}

impl TypeKind {
    /// Kinds that take part in inheritance.
    pub fn is_class_like(self) -> bool {
        matches!(self, TypeKind::Class | TypeKind::Struct | TypeKind::Union)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TypeKind::Namespace => "namespace",
            TypeKind::Class => "class",
            TypeKind::Struct => "struct",
            TypeKind::Union => "union",
            TypeKind::Enum => "enum",
            TypeKind::Typedef => "typedef",
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<IndexTypeKind> for TypeKind {
    fn from(kind: IndexTypeKind) -> Self {
        match kind {
            IndexTypeKind::Class => TypeKind::Class,
            IndexTypeKind::Struct => TypeKind::Struct,
            IndexTypeKind::Union => TypeKind::Union,
            IndexTypeKind::Enum => TypeKind::Enum,
            IndexTypeKind::Typedef => TypeKind::Typedef,
        }
    }
}

impl From<ClassKey> for TypeKind {
    fn from(key: ClassKey) -> Self {
        match key {
            ClassKey::Class => TypeKind::Class,
            ClassKey::Struct => TypeKind::Struct,
            ClassKey::Union => TypeKind::Union,
        }
    }
}

/// Declared kind of a cache entry.
///
/// `Pending` marks a base type that some inheritance clause names but whose declaration has
/// not been seen yet. A later declaration pass upgrades it in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeclKind {
    Type(TypeKind),
    Pending,
}

impl DeclKind {
    pub fn type_kind(self) -> Option<TypeKind> {
        match self {
            DeclKind::Type(kind) => Some(kind),
            DeclKind::Pending => None,
        }
    }

    pub fn is_pending(self) -> bool {
        matches!(self, DeclKind::Pending)
    }

    /// Placeholders only ever stand in for base classes, so they count as class-like.
    pub fn is_class_like(self) -> bool {
        match self {
            DeclKind::Type(kind) => kind.is_class_like(),
            DeclKind::Pending => true,
        }
    }
}

impl From<TypeKind> for DeclKind {
    fn from(kind: TypeKind) -> Self {
        DeclKind::Type(kind)
    }
}

impl fmt::Display for DeclKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclKind::Type(kind) => kind.fmt(f),
            DeclKind::Pending => f.write_str("<pending>"),
        }
    }
}

/// `::`-separated name, outermost scope first. Comparison is case-sensitive.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName(Vec<String>);

impl QualifiedName {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Parses `a::b::C`. A leading `::` (global qualifier) is ignored.
    pub fn parse(text: &str) -> Self {
        Self::new(
            text.split("::")
                .map(str::trim)
                .filter(|segment| !segment.is_empty()),
        )
    }

    /// `enclosing` followed by `name`.
    pub fn nested(enclosing: &[String], name: &str) -> Self {
        let mut segments = Vec::with_capacity(enclosing.len() + 1);
        segments.extend(enclosing.iter().cloned());
        segments.push(name.to_string());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn simple_name(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or("")
    }

    /// `true` when the innermost segment is empty (anonymous namespace, unnamed struct).
    pub fn is_anonymous(&self) -> bool {
        self.simple_name().is_empty()
    }

    pub fn enclosing(&self) -> QualifiedName {
        let len = self.0.len().saturating_sub(1);
        Self(self.0[..len].to_vec())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("::"))
    }
}

impl fmt::Debug for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QualifiedName({self})")
    }
}

impl From<&str> for QualifiedName {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

/// Identity of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey {
    pub kind: DeclKind,
    pub name: QualifiedName,
}

impl TypeKey {
    pub fn new(kind: impl Into<DeclKind>, name: impl Into<QualifiedName>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)
    }
}

#[derive(Debug, Default, Clone)]
struct TypeState {
    references: Vec<TypeReference>,
    derived_references: Vec<TypeReference>,
    super_types: Option<Vec<TypeKey>>,
    sub_types: Option<Vec<TypeKey>>,
}

/// A namespace or type known to the cache.
///
/// Two instances are equal iff their [`TypeKey`]s are equal. The cache hands out one shared
/// `Arc<TypeInfo>` per key; the mutable parts (references and resolved relations) live
/// behind a lock so resolution results recorded on that instance are visible to every holder.
///
/// Relations are `None` until resolved. `Some(vec![])` means "resolved, none found".
pub struct TypeInfo {
    key: TypeKey,
    state: RwLock<TypeState>,
}

impl TypeInfo {
    pub fn new(kind: impl Into<DeclKind>, name: impl Into<QualifiedName>) -> Self {
        Self::with_key(TypeKey::new(kind, name))
    }

    pub fn with_key(key: TypeKey) -> Self {
        Self {
            key,
            state: RwLock::new(TypeState::default()),
        }
    }

    /// A copy of `self` under a different identity, carrying every reference and relation.
    pub(crate) fn rekeyed(&self, key: TypeKey) -> Self {
        Self {
            key,
            state: RwLock::new(self.state.read().clone()),
        }
    }

    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    pub fn kind(&self) -> DeclKind {
        self.key.kind
    }

    pub fn name(&self) -> &QualifiedName {
        &self.key.name
    }

    pub fn is_placeholder(&self) -> bool {
        self.key.kind.is_pending()
    }

    pub fn references(&self) -> Vec<TypeReference> {
        self.state.read().references.clone()
    }

    /// The first recorded declaration site.
    pub fn primary_reference(&self) -> Option<TypeReference> {
        self.state.read().references.first().cloned()
    }

    pub fn has_references(&self) -> bool {
        !self.state.read().references.is_empty()
    }

    /// Records a declaration site. Returns `false` if the same site is already known.
    pub fn add_reference(&self, reference: TypeReference) -> bool {
        let mut state = self.state.write();
        push_unique(&mut state.references, reference)
    }

    /// Sites where some type derives from this one.
    pub fn derived_references(&self) -> Vec<TypeReference> {
        self.state.read().derived_references.clone()
    }

    pub fn add_derived_reference(&self, reference: TypeReference) -> bool {
        let mut state = self.state.write();
        push_unique(&mut state.derived_references, reference)
    }

    /// Copies references held by `other` into `self`.
    pub(crate) fn merge_references_from(&self, other: &TypeInfo) {
        if std::ptr::eq(self, other) {
            return;
        }
        let incoming = other.state.read().clone();
        let mut state = self.state.write();
        for reference in incoming.references {
            push_unique(&mut state.references, reference);
        }
        for reference in incoming.derived_references {
            push_unique(&mut state.derived_references, reference);
        }
    }

    /// Drops every reference located in `path`. Returns `true` if anything was removed.
    pub(crate) fn remove_references_in(&self, path: &std::path::Path) -> bool {
        let mut state = self.state.write();
        let before = state.references.len() + state.derived_references.len();
        state.references.retain(|r| !r.is_in(path));
        state.derived_references.retain(|r| !r.is_in(path));
        before != state.references.len() + state.derived_references.len()
    }

    pub fn super_types(&self) -> Option<Vec<TypeKey>> {
        self.state.read().super_types.clone()
    }

    pub fn set_super_types(&self, keys: Vec<TypeKey>) {
        self.state.write().super_types = Some(keys);
    }

    pub fn sub_types(&self) -> Option<Vec<TypeKey>> {
        self.state.read().sub_types.clone()
    }

    pub fn set_sub_types(&self, keys: Vec<TypeKey>) {
        self.state.write().sub_types = Some(keys);
    }

    pub fn has_resolved_super_types(&self) -> bool {
        self.state.read().super_types.is_some()
    }

    pub fn has_resolved_sub_types(&self) -> bool {
        self.state.read().sub_types.is_some()
    }
}

fn push_unique(list: &mut Vec<TypeReference>, reference: TypeReference) -> bool {
    if list.iter().any(|existing| existing.same_site(&reference)) {
        return false;
    }
    list.push(reference);
    true
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for TypeInfo {}

impl std::hash::Hash for TypeInfo {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("TypeInfo")
            .field("key", &self.key)
            .field("references", &state.references.len())
            .field("derived_references", &state.derived_references.len())
            .field("super_types", &state.super_types)
            .field("sub_types", &state.sub_types)
            .finish()
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.key.fmt(f)
    }
}

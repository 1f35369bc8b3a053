//! Parse-based resolution for questions the index cannot answer yet.
//!
//! Files are parsed one by one with the structural parser. Every declaration seen outside a
//! function body is recorded in the cache with an exact offset, the same way the index
//! populate job records index entries. The search ends as soon as the sought declaration
//! turns up, except for subtype searches which need every file.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cbrowse_parser::{ClassDecl, SourceSpan, SourceVisitor, StructuralParser, SymbolTable};
use cbrowse_scheduler::{CancellationToken, Cancelled};

use crate::error::TypeCacheError;
use crate::reference::{ReferenceLocation, ResolvedPath, TypeReference};
use crate::source::SourceProvider;
use crate::store::CacheStore;
use crate::types::{DeclKind, QualifiedName, TypeInfo, TypeKey, TypeKind};

/// What a locator run is looking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocateGoal {
    /// A precise declaration site of the type.
    Declaration(TypeKey),
    /// The base classes named by the type's definition.
    SuperTypes(TypeKey),
    /// Every class deriving directly from the type.
    SubTypes(TypeKey),
}

impl LocateGoal {
    pub fn key(&self) -> &TypeKey {
        match self {
            LocateGoal::Declaration(key) | LocateGoal::SuperTypes(key) | LocateGoal::SubTypes(key) => {
                key
            }
        }
    }

    fn stops_early(&self) -> bool {
        !matches!(self, LocateGoal::SubTypes(_))
    }

    /// `true` if a declaration of `key` satisfies the goal's type. A placeholder goal
    /// accepts any class-like declaration of the same name.
    fn matches(&self, key: &TypeKey) -> bool {
        let goal = self.key();
        goal.name == key.name
            && (goal.kind == key.kind || (goal.kind.is_pending() && key.kind.is_class_like()))
    }
}

impl fmt::Display for LocateGoal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocateGoal::Declaration(key) => write!(f, "declaration of {key}"),
            LocateGoal::SuperTypes(key) => write!(f, "supertypes of {key}"),
            LocateGoal::SubTypes(key) => write!(f, "subtypes of {key}"),
        }
    }
}

/// Result of a locator run. Relations are `None` when the run could not establish them.
#[derive(Debug, Clone, Default)]
pub struct LocateOutcome {
    pub reference: Option<TypeReference>,
    pub super_types: Option<Vec<TypeKey>>,
    pub sub_types: Option<Vec<TypeKey>>,
    pub files_parsed: usize,
}

pub(crate) struct LocatorTask {
    pub store: Arc<CacheStore>,
    pub sources: Arc<dyn SourceProvider>,
    pub parser: Arc<dyn StructuralParser>,
    pub symbols: Arc<SymbolTable>,
    pub goal: LocateGoal,
    /// Files to try before the rest of the project.
    pub hints: Vec<PathBuf>,
}

#[derive(Default)]
struct Findings {
    reference: Option<TypeReference>,
    super_types: Option<Vec<TypeKey>>,
    sub_types: BTreeSet<TypeKey>,
    found: bool,
}

impl LocatorTask {
    pub(crate) fn run(self, token: CancellationToken) -> Result<LocateOutcome, Cancelled> {
        Cancelled::check(&token)?;
        let project = self.store.project().clone();
        let files = self.candidate_files();
        let mut findings = Findings::default();
        let mut files_parsed = 0;

        for path in &files {
            Cancelled::check(&token)?;
            if findings.found && self.goal.stops_early() {
                break;
            }
            let text = match self.sources.read(path) {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!(
                        target: "cbrowse.typecache",
                        path = %path.display(),
                        error = %err,
                        "skipping unreadable source"
                    );
                    continue;
                }
            };
            let mut visitor = LocatorVisitor {
                store: &self.store,
                goal: &self.goal,
                token: &token,
                path,
                file: Arc::new(ResolvedPath::new(&project, path)),
                qualifier: Vec::new(),
                frames: Vec::new(),
                function_depth: 0,
                findings: &mut findings,
            };
            files_parsed += 1;
            if let Err(source) = self.parser.parse(path, &text, &self.symbols, &mut visitor) {
                // Whatever was reported before the error stays recorded.
                let err = TypeCacheError::Parse {
                    path: path.clone(),
                    source,
                };
                tracing::warn!(target: "cbrowse.typecache", error = %err, "fallback parse failed");
            }
        }
        Cancelled::check(&token)?;

        tracing::debug!(
            target: "cbrowse.typecache",
            project = %project,
            goal = %self.goal,
            files = files_parsed,
            found = findings.found,
            "fallback locator finished"
        );

        let sub_types = match self.goal {
            LocateGoal::SubTypes(_) => Some(findings.sub_types.into_iter().collect()),
            _ => None,
        };
        Ok(LocateOutcome {
            reference: findings.reference,
            super_types: findings.super_types,
            sub_types,
            files_parsed,
        })
    }

    fn candidate_files(&self) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();
        let known = if self.goal.stops_early() {
            self.store.paths_of(self.goal.key())
        } else {
            Vec::new()
        };
        for path in self.hints.iter().cloned().chain(known) {
            if seen.insert(path.clone()) {
                files.push(path);
            }
        }
        match self.sources.source_files(self.store.project()) {
            Ok(all) => files.extend(all.into_iter().filter(|path| seen.insert(path.clone()))),
            Err(err) => tracing::warn!(
                target: "cbrowse.typecache",
                project = %self.store.project(),
                error = %err,
                "failed to list project sources"
            ),
        }
        files
    }
}

struct LocatorVisitor<'a> {
    store: &'a CacheStore,
    goal: &'a LocateGoal,
    token: &'a CancellationToken,
    path: &'a Path,
    file: Arc<ResolvedPath>,
    qualifier: Vec<String>,
    /// Segments each open namespace or class pushed onto `qualifier`.
    frames: Vec<usize>,
    function_depth: usize,
    findings: &'a mut Findings,
}

impl LocatorVisitor<'_> {
    fn in_function(&self) -> bool {
        self.function_depth > 0
    }

    fn qualified(&self, name: &[String]) -> QualifiedName {
        QualifiedName::new(self.qualifier.iter().chain(name.iter()).cloned())
    }

    fn reference(&self, span: SourceSpan) -> TypeReference {
        TypeReference::resolved(self.file.clone(), ReferenceLocation::from(span))
    }

    fn push_scope(&mut self, segments: &[String]) {
        let pushed = if self.in_function() {
            0
        } else {
            self.qualifier.extend(segments.iter().cloned());
            segments.len()
        };
        self.frames.push(pushed);
    }

    fn pop_scope(&mut self) {
        if let Some(pushed) = self.frames.pop() {
            let keep = self.qualifier.len().saturating_sub(pushed);
            self.qualifier.truncate(keep);
        }
    }

    /// Records a declaration the way the index populate job does, with an exact offset.
    fn record(
        &mut self,
        kind: TypeKind,
        name: QualifiedName,
        span: SourceSpan,
    ) -> Option<Arc<TypeInfo>> {
        if name.is_anonymous() {
            return None;
        }
        if kind != TypeKind::Namespace {
            self.store.upgrade_placeholder(&name, kind);
        }
        let info = Arc::new(TypeInfo::new(kind, name));
        let reference = self.reference(span);
        info.add_reference(reference.clone());
        let canonical = self.store.insert(self.path, [info]).pop()?;

        if self.goal.matches(canonical.key()) {
            if let LocateGoal::Declaration(_) = self.goal {
                self.findings.reference = Some(reference);
                self.findings.found = true;
            }
        }
        Some(canonical)
    }

    /// Names `written` could refer to from the current scope, innermost first.
    fn candidates(&self, written: &[String]) -> Vec<QualifiedName> {
        (0..=self.qualifier.len())
            .rev()
            .map(|depth| {
                QualifiedName::new(self.qualifier[..depth].iter().chain(written.iter()).cloned())
            })
            .collect()
    }

    /// Resolves a base clause entry against the cache. Unknown bases become placeholders
    /// filed under the current file.
    fn resolve_base(&mut self, written: &[String], span: SourceSpan) -> TypeKey {
        for candidate in self.candidates(written) {
            if let Some(found) = self.store.find_class_like(&candidate) {
                self.store.add_derived_reference(&found, self.reference(span));
                return found.key().clone();
            }
        }
        let name = QualifiedName::new(written.iter().cloned());
        let placeholder = Arc::new(TypeInfo::new(DeclKind::Pending, name));
        placeholder.add_derived_reference(self.reference(span));
        let key = placeholder.key().clone();
        self.store.insert(self.path, [placeholder]);
        key
    }
}

impl SourceVisitor for LocatorVisitor<'_> {
    fn enter_namespace(&mut self, name: &str, span: SourceSpan) {
        if self.in_function() || name.is_empty() {
            self.frames.push(0);
            return;
        }
        let qualified = self.qualified(&[name.to_string()]);
        self.record(TypeKind::Namespace, qualified, span);
        self.push_scope(&[name.to_string()]);
    }

    fn exit_namespace(&mut self) {
        self.pop_scope();
    }

    fn enter_class(&mut self, decl: &ClassDecl) {
        if self.in_function() || decl.name.is_empty() {
            self.frames.push(0);
            return;
        }
        let kind = TypeKind::from(decl.key);
        let name = self.qualified(&decl.name);
        let key = TypeKey::new(kind, name.clone());

        let goal = self.goal;
        match goal {
            LocateGoal::SuperTypes(_) if goal.matches(&key) => {
                let bases = decl
                    .bases
                    .iter()
                    .map(|base| self.resolve_base(base, decl.span))
                    .collect();
                self.findings.super_types = Some(bases);
                self.findings.found = true;
            }
            LocateGoal::SubTypes(target) => {
                let derives = decl
                    .bases
                    .iter()
                    .any(|base| self.candidates(base).contains(&target.name));
                if derives {
                    self.findings.sub_types.insert(key.clone());
                }
            }
            _ => {}
        }

        self.record(kind, name, decl.span);
        self.push_scope(&decl.name);
    }

    fn exit_class(&mut self) {
        self.pop_scope();
    }

    fn declare_enum(&mut self, name: &[String], span: SourceSpan) {
        if !self.in_function() {
            let qualified = self.qualified(name);
            self.record(TypeKind::Enum, qualified, span);
        }
    }

    fn declare_typedef(&mut self, name: &str, span: SourceSpan) {
        if !self.in_function() {
            let qualified = self.qualified(&[name.to_string()]);
            self.record(TypeKind::Typedef, qualified, span);
        }
    }

    fn enter_function_body(&mut self) {
        self.function_depth += 1;
    }

    fn exit_function_body(&mut self) {
        self.function_depth = self.function_depth.saturating_sub(1);
    }

    fn should_stop(&self) -> bool {
        self.token.is_cancelled() || (self.findings.found && self.goal.stops_early())
    }
}

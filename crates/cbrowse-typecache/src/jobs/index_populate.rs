//! Refills a cache from the symbol index.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use cbrowse_index::{EntryReference, QueryFilter};
use cbrowse_scheduler::{CancellationToken, Cancelled};

use crate::error::Result;
use crate::jobs::IndexSession;
use crate::reference::{IndexFileResolver, TypeReference};
use crate::scope::SearchScope;
use crate::store::CacheStore;
use crate::types::{DeclKind, QualifiedName, TypeInfo, TypeKey, TypeKind};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PopulateReport {
    pub namespaces: usize,
    pub types: usize,
    pub derivations: usize,
    pub indexer_busy: bool,
}

/// Inserts namespaces, then types, then inheritance edges declared in files enclosed by
/// `scope`. A scope covering the whole project queries the index unfiltered.
pub(crate) fn populate(
    store: &CacheStore,
    session: &IndexSession<'_>,
    resolver: &Arc<IndexFileResolver>,
    scope: &SearchScope,
    token: &CancellationToken,
) -> Result<PopulateReport> {
    let mut report = PopulateReport {
        indexer_busy: session.is_busy(),
        ..PopulateReport::default()
    };
    let filter = if scope.encloses_project(store.project()) {
        QueryFilter::everything()
    } else {
        scope.to_query_filter()
    };
    let populator = Populator { store, resolver };

    Cancelled::check(token)?;
    for entry in session.query("namespaces", |index| index.namespaces(&filter))? {
        Cancelled::check(token)?;
        if entry.name.is_empty() {
            continue;
        }
        let name = QualifiedName::nested(&entry.enclosing, &entry.name);
        populator.declare(TypeKind::Namespace, name, &entry.references);
        report.namespaces += 1;
    }

    Cancelled::check(token)?;
    for entry in session.query("types", |index| index.types(&filter))? {
        Cancelled::check(token)?;
        if entry.name.is_empty() {
            continue;
        }
        let name = QualifiedName::nested(&entry.enclosing, &entry.name);
        populator.declare(entry.kind.into(), name, &entry.references);
        report.types += 1;
    }

    Cancelled::check(token)?;
    for entry in session.query("derived types", |index| index.derived_types(&filter))? {
        Cancelled::check(token)?;
        if entry.base_name.is_empty() {
            continue;
        }
        let base = QualifiedName::nested(&entry.base_enclosing, &entry.base_name);
        populator.derive(base, &entry.references);
        report.derivations += 1;
    }

    tracing::debug!(
        target: "cbrowse.typecache",
        project = %store.project(),
        namespaces = report.namespaces,
        types = report.types,
        derivations = report.derivations,
        busy = report.indexer_busy,
        "populated from index"
    );
    Ok(report)
}

struct Populator<'a> {
    store: &'a CacheStore,
    resolver: &'a Arc<IndexFileResolver>,
}

impl Populator<'_> {
    fn references(&self, entries: &[EntryReference]) -> Vec<TypeReference> {
        entries
            .iter()
            .map(|entry| {
                TypeReference::indexed(self.resolver.clone(), entry.file, entry.location.into())
            })
            .collect()
    }

    fn files(&self, entries: &[EntryReference]) -> BTreeSet<PathBuf> {
        entries
            .iter()
            .filter_map(|entry| self.resolver.resolve(entry.file))
            .map(|path| path.absolute().to_path_buf())
            .collect()
    }

    fn declare(&self, kind: TypeKind, name: QualifiedName, entries: &[EntryReference]) {
        let files = self.files(entries);
        if files.is_empty() {
            return;
        }
        if kind != TypeKind::Namespace {
            self.store.upgrade_placeholder(&name, kind);
        }
        let info = Arc::new(TypeInfo::new(kind, name));
        for reference in self.references(entries) {
            info.add_reference(reference);
        }
        for file in &files {
            self.store.insert(file, [info.clone()]);
        }
    }

    /// Records that the files in `entries` derive from `base`. An unknown base becomes a
    /// placeholder filed under the deriving files.
    fn derive(&self, base: QualifiedName, entries: &[EntryReference]) {
        if let Some(existing) = self.store.find_class_like(&base) {
            for reference in self.references(entries) {
                self.store.add_derived_reference(&existing, reference);
            }
            return;
        }

        let files = self.files(entries);
        if files.is_empty() {
            return;
        }
        let placeholder = self
            .store
            .get(&TypeKey::new(DeclKind::Pending, base.clone()))
            .unwrap_or_else(|| Arc::new(TypeInfo::new(DeclKind::Pending, base)));
        for reference in self.references(entries) {
            placeholder.add_derived_reference(reference);
        }
        for file in &files {
            self.store.insert(file, [placeholder.clone()]);
        }
    }
}

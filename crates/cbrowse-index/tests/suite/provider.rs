use std::sync::Arc;

use cbrowse_core::Project;
use cbrowse_index::{
    EntryLocation, FileFacts, IndexLookup, IndexProvider, IndexTypeKind, MemoryIndexProvider,
    QueryFilter,
};

#[test]
fn reuse_existing_never_creates_an_index() {
    let provider = MemoryIndexProvider::new();
    let project = Project::new("app", "/work/app");

    assert!(provider
        .index_for(&project, IndexLookup::ReuseExisting)
        .is_none());

    let created = provider
        .index_for(&project, IndexLookup::CreateIfMissing)
        .unwrap();
    let reused = provider
        .index_for(&project, IndexLookup::ReuseExisting)
        .unwrap();
    assert!(Arc::ptr_eq(&created, &reused));
}

#[test]
fn registered_memory_index_is_served_to_consumers() {
    let provider = MemoryIndexProvider::new();
    let project = Project::new("app", "/work/app");
    let index = provider.create(project.id().clone());
    index.add_file(
        "/work/app/a.h",
        FileFacts::new().ty(IndexTypeKind::Enum, "Color", EntryLocation::Line(1)),
    );

    let served = provider
        .index_for(&project, IndexLookup::ReuseExisting)
        .unwrap();
    let _read = served.monitor().read();
    let types = served.types(&QueryFilter::everything()).unwrap();
    assert_eq!(types[0].name, "Color");

    assert!(provider.unregister(project.id()));
    assert!(provider
        .index_for(&project, IndexLookup::ReuseExisting)
        .is_none());
}

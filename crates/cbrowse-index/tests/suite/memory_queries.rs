use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cbrowse_index::{
    BuilderState, EntryLocation, FileFacts, IndexTypeKind, MemoryIndex, QueryFilter, SymbolIndex,
};

fn sample_index() -> MemoryIndex {
    let index = MemoryIndex::new();
    index.add_file(
        "/p/src/shapes.h",
        FileFacts::new()
            .namespace("geo", EntryLocation::Line(1))
            .ty(IndexTypeKind::Class, "geo::Shape", EntryLocation::Line(3))
            .ty(
                IndexTypeKind::Struct,
                "geo::Point",
                EntryLocation::Offset {
                    offset: 120,
                    length: 5,
                },
            ),
    );
    index.add_file(
        "/p/src/circle.cpp",
        FileFacts::new()
            .includes("/p/src/shapes.h")
            .namespace("geo", EntryLocation::Line(2))
            .ty(IndexTypeKind::Class, "geo::Circle", EntryLocation::Line(4))
            .derives_from("geo::Shape", EntryLocation::Line(4)),
    );
    index.add_file(
        "/p/test/circle_test.cpp",
        FileFacts::new()
            .includes("/p/src/shapes.h")
            .ty(IndexTypeKind::Typedef, "CircleFixture", EntryLocation::Line(7)),
    );
    index
}

#[test]
fn namespace_references_are_merged_across_files() {
    let index = sample_index();
    let _read = index.monitor().read();

    let namespaces = index.namespaces(&QueryFilter::everything()).unwrap();
    assert_eq!(namespaces.len(), 1);
    assert_eq!(namespaces[0].name, "geo");
    assert!(namespaces[0].enclosing.is_empty());
    assert_eq!(namespaces[0].references.len(), 2);
}

#[test]
fn type_queries_only_report_references_inside_the_filter() {
    let index = sample_index();
    let _read = index.monitor().read();

    let filter = QueryFilter::new().with_root("/p/src");
    let mut names: Vec<_> = index
        .types(&filter)
        .unwrap()
        .into_iter()
        .map(|entry| (entry.kind, entry.enclosing.join("::"), entry.name))
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            (IndexTypeKind::Class, "geo".to_string(), "Circle".to_string()),
            (IndexTypeKind::Class, "geo".to_string(), "Shape".to_string()),
            (IndexTypeKind::Struct, "geo".to_string(), "Point".to_string()),
        ]
    );

    let only_test = QueryFilter::new().with_path("/p/test/circle_test.cpp");
    let types = index.types(&only_test).unwrap();
    assert_eq!(types.len(), 1);
    assert_eq!(types[0].name, "CircleFixture");
    assert_eq!(
        index.file_path(types[0].references[0].file).as_deref(),
        Some(Path::new("/p/test/circle_test.cpp"))
    );
}

#[test]
fn derived_entries_name_the_base_and_point_at_the_derivation() {
    let index = sample_index();
    let _read = index.monitor().read();

    let derived = index.derived_types(&QueryFilter::everything()).unwrap();
    assert_eq!(derived.len(), 1);
    assert_eq!(derived[0].base_name, "Shape");
    assert_eq!(derived[0].base_enclosing, vec!["geo".to_string()]);
    let site = index.file_path(derived[0].references[0].file).unwrap();
    assert_eq!(site, PathBuf::from("/p/src/circle.cpp"));
}

#[test]
fn include_queries_match_on_the_included_path() {
    let index = sample_index();
    let _read = index.monitor().read();

    let includes = index
        .includes(&QueryFilter::new().with_path("/p/src/shapes.h"))
        .unwrap();
    assert_eq!(includes.len(), 1);
    let mut includers: Vec<_> = includes[0]
        .includers
        .iter()
        .filter_map(|id| index.file_path(*id))
        .collect();
    includers.sort();
    assert_eq!(
        includers,
        vec![
            PathBuf::from("/p/src/circle.cpp"),
            PathBuf::from("/p/test/circle_test.cpp"),
        ]
    );

    assert!(index
        .includes(&QueryFilter::new().with_root("/p/test"))
        .unwrap()
        .is_empty());
}

#[test]
fn removing_a_file_drops_its_facts() {
    let index = sample_index();
    assert!(index.remove_file("/p/src/circle.cpp"));

    let _read = index.monitor().read();
    assert!(index
        .derived_types(&QueryFilter::everything())
        .unwrap()
        .is_empty());
    let namespaces = index.namespaces(&QueryFilter::everything()).unwrap();
    assert_eq!(namespaces[0].references.len(), 1);
}

#[test]
fn persist_bumps_generation_and_clears_changes() {
    let index = sample_index();
    assert!(index.has_changed());
    assert_eq!(index.persist().unwrap(), 1);
    assert!(!index.has_changed());
    assert_eq!(index.generation(), 1);

    index.set_builder_state(BuilderState::Busy);
    assert_eq!(index.builder_state(), BuilderState::Busy);
}

#[test]
fn writers_wait_for_readers_holding_the_monitor() {
    let index = Arc::new(MemoryIndex::new());
    let read = index.monitor().read();

    let writer = {
        let index = index.clone();
        thread::spawn(move || {
            index.add_file("/p/a.cpp", FileFacts::new());
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert_eq!(index.file_count(), 0);
    drop(read);

    writer.join().unwrap();
    assert_eq!(index.file_count(), 1);
}

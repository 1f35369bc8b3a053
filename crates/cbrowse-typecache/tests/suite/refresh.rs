use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use cbrowse_core::{DeltaFlags, ElementDelta, ElementHandle, ElementKind, Project};
use cbrowse_index::{BuilderState, FileFacts, IndexTypeKind, MemoryIndex, MemoryIndexProvider};
use cbrowse_scheduler::{CancellationToken, JobPriority, TaskError};
use cbrowse_typecache::{
    CacheDelta, RefreshOutcome, SearchScope, SkipReason, TypeInfo, TypeKey, TypeKind,
    LOCATOR_FAMILY, REFRESH_FAMILY,
};

use super::support::{self, eventually, line, FailingIndex, GatedIndex, WAIT};

fn app() -> Project {
    Project::new("app", "/w/app")
}

fn class(name: &str) -> TypeKey {
    TypeKey::new(TypeKind::Class, name)
}

#[test]
fn reconcile_fills_a_new_cache_from_the_index() {
    let provider = Arc::new(MemoryIndexProvider::new());
    let project = app();
    let index = provider.create(project.id().clone());
    index.add_file(
        "/w/app/shapes.h",
        FileFacts::new()
            .namespace("geo", line(1))
            .ty(IndexTypeKind::Class, "geo::Shape", line(2))
            .ty(IndexTypeKind::Struct, "geo::Circle", line(6))
            .derives_from("geo::Shape", line(6)),
    );
    let manager = support::manager(support::config(0), &provider);
    let store = manager.get_cache(&project);

    let outcomes = manager
        .reconcile_and_wait(true, JobPriority::Long, None)
        .unwrap();
    assert!(matches!(
        outcomes.get(project.id()),
        Some(RefreshOutcome::Completed {
            indexer_busy: false,
            ..
        })
    ));
    assert!(store.is_up_to_date());
    assert!(store.is_populated());

    let shape = store.get(&class("geo::Shape")).expect("indexed");
    assert_eq!(shape.derived_references().len(), 1);
    assert!(shape.primary_reference().unwrap().is_line_number());
    assert!(store.get_type(TypeKind::Namespace, &"geo".into()).is_some());
    assert_eq!(store.all_files(), vec![PathBuf::from("/w/app/shapes.h")]);

    // Nothing left to do.
    assert!(manager
        .reconcile_and_wait(true, JobPriority::Long, None)
        .unwrap()
        .is_empty());
    assert_eq!(manager.refresh_stats(project.id()).unwrap().succeeded, 1);
}

#[test]
fn changed_header_refreshes_every_file_including_it() {
    let provider = Arc::new(MemoryIndexProvider::new());
    let project = app();
    let index = provider.create(project.id().clone());
    index.add_file(
        "/w/app/a.h",
        FileFacts::new().ty(IndexTypeKind::Class, "A", line(1)),
    );
    index.add_file(
        "/w/app/b.h",
        FileFacts::new()
            .includes("/w/app/a.h")
            .ty(IndexTypeKind::Class, "B", line(2)),
    );
    index.add_file(
        "/w/app/c.cpp",
        FileFacts::new()
            .includes("/w/app/b.h")
            .ty(IndexTypeKind::Class, "C", line(2)),
    );
    index.add_file(
        "/w/app/d.cpp",
        FileFacts::new().ty(IndexTypeKind::Class, "D", line(1)),
    );
    let manager = support::manager(support::config(0), &provider);
    let store = manager.get_cache(&project);
    manager
        .reconcile_and_wait(true, JobPriority::Long, None)
        .unwrap();

    // Something only the cache knows about, attached to a dependent and an unrelated file.
    let stale = Arc::new(TypeInfo::new(TypeKind::Class, "Stale"));
    store.insert(Path::new("/w/app/c.cpp"), [stale.clone()]);
    store.insert(Path::new("/w/app/d.cpp"), [stale]);

    index.add_file(
        "/w/app/a.h",
        FileFacts::new().ty(IndexTypeKind::Class, "A2", line(1)),
    );
    manager.add_delta(CacheDelta::for_scope(
        project.clone(),
        SearchScope::for_path("/w/app/a.h"),
    ));
    manager
        .reconcile_and_wait(true, JobPriority::Long, None)
        .unwrap();

    assert!(store.get(&class("A")).is_none());
    assert!(store.get(&class("A2")).is_some());
    assert!(store.get(&class("B")).is_some());
    assert!(store.get(&class("C")).is_some());
    assert_eq!(
        store.paths_of(&class("Stale")),
        vec![PathBuf::from("/w/app/d.cpp")]
    );
    assert!(store.is_consistent());

    let stats = manager.refresh_stats(project.id()).unwrap();
    assert_eq!(stats.succeeded, 2);
    let applied: Vec<PathBuf> = stats
        .last_scope
        .expect("completed run")
        .paths()
        .map(Path::to_path_buf)
        .collect();
    assert_eq!(applied, vec![PathBuf::from("/w/app/a.h")]);
}

#[test]
fn busy_indexer_leaves_the_cache_dirty_until_a_later_pass() {
    let provider = Arc::new(MemoryIndexProvider::new());
    let project = app();
    let index = provider.create(project.id().clone());
    index.add_file(
        "/w/app/a.h",
        FileFacts::new().ty(IndexTypeKind::Class, "A", line(1)),
    );
    index.set_builder_state(BuilderState::Busy);
    let manager = support::manager(support::config(0), &provider);
    let store = manager.get_cache(&project);

    let outcomes = manager
        .reconcile_and_wait(true, JobPriority::Long, None)
        .unwrap();
    assert!(matches!(
        outcomes.get(project.id()),
        Some(RefreshOutcome::Completed {
            indexer_busy: true,
            ..
        })
    ));
    // Best effort still found what was there.
    assert!(store.get(&class("A")).is_some());
    assert!(store.is_dirty());
    assert!(manager.refresh_stats(project.id()).unwrap().last_indexer_busy);

    index.set_builder_state(BuilderState::Idle);
    manager
        .reconcile_and_wait(true, JobPriority::Long, None)
        .unwrap();
    assert!(store.is_up_to_date());
    assert!(!manager.refresh_stats(project.id()).unwrap().last_indexer_busy);
}

#[test]
fn refresh_without_a_usable_index_keeps_what_is_cached() {
    let provider = Arc::new(MemoryIndexProvider::new());
    let indexed = Project::new("indexed", "/w/indexed");
    provider.create(indexed.id().clone());
    let unindexed = app();
    let manager = support::manager(support::config(0), &provider);

    let store = manager.get_cache(&unindexed);
    store.insert(
        Path::new("/w/app/a.h"),
        [Arc::new(TypeInfo::new(TypeKind::Class, "A"))],
    );
    let outcomes = manager
        .reconcile_and_wait(true, JobPriority::Long, None)
        .unwrap();
    assert!(matches!(
        outcomes.get(unindexed.id()),
        Some(RefreshOutcome::Skipped {
            reason: SkipReason::NoIndex,
            ..
        })
    ));
    assert!(store.get(&class("A")).is_some());
    assert!(store.is_dirty());

    manager.get_cache(&indexed);
    let outcomes = manager
        .reconcile_and_wait(false, JobPriority::Long, None)
        .unwrap();
    assert!(matches!(
        outcomes.get(indexed.id()),
        Some(RefreshOutcome::Skipped {
            reason: SkipReason::IndexingDisabled,
            ..
        })
    ));
    assert!(manager.refresh_stats(indexed.id()).unwrap().skipped >= 1);
}

#[test]
fn cancelled_monitor_stops_a_blocking_reconcile() {
    let provider = Arc::new(MemoryIndexProvider::new());
    let project = app();
    provider.create(project.id().clone());
    let manager = support::manager(support::config(0), &provider);
    let store = manager.get_cache(&project);

    let monitor = CancellationToken::new();
    monitor.cancel();
    let err = manager
        .reconcile_and_wait(true, JobPriority::Long, Some(&monitor))
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(!store.is_up_to_date());
}

#[test]
fn change_events_routed_by_the_manager_refresh_the_file() {
    let provider = Arc::new(MemoryIndexProvider::new());
    let project = app();
    let index = provider.create(project.id().clone());
    index.add_file(
        "/w/app/a.h",
        FileFacts::new().ty(IndexTypeKind::Class, "Old", line(1)),
    );
    let manager = support::manager(support::config(0), &provider);
    let store = manager.get_cache(&project);
    manager
        .reconcile_and_wait(true, JobPriority::Long, None)
        .unwrap();

    index.add_file(
        "/w/app/a.h",
        FileFacts::new().ty(IndexTypeKind::Struct, "New", line(1)),
    );
    let event = ElementDelta::changed(ElementHandle::model(), DeltaFlags::CHILDREN).with_child(
        ElementDelta::changed(
            ElementHandle::new(ElementKind::TranslationUnit, "/w/app/a.h", None),
            DeltaFlags::CONTENT,
        ),
    );
    assert_eq!(manager.process_delta(&event), 1);
    manager
        .reconcile_and_wait(true, JobPriority::Long, None)
        .unwrap();

    assert!(store.get(&class("Old")).is_none());
    assert!(store
        .get(&TypeKey::new(TypeKind::Struct, "New"))
        .is_some());
}

#[test]
fn deltas_arriving_mid_refresh_are_applied_by_one_run() {
    let provider = Arc::new(MemoryIndexProvider::new());
    let project = app();
    let memory = Arc::new(MemoryIndex::new());
    for (path, name) in [
        ("/w/app/a.h", "A"),
        ("/w/app/b.h", "B"),
        ("/w/app/c.h", "C"),
    ] {
        memory.add_file(path, FileFacts::new().ty(IndexTypeKind::Class, name, line(1)));
    }
    let (gated, gate) = GatedIndex::new(memory);
    provider.register(project.id().clone(), gated.clone());
    let manager = support::manager(support::config(0), &provider);
    let store = manager.get_cache(&project);
    manager
        .reconcile_and_wait(true, JobPriority::Long, None)
        .unwrap();
    let before = manager.refresh_stats(project.id()).unwrap();

    gated.arm();
    manager.add_delta(CacheDelta::for_scope(
        project.clone(),
        SearchScope::for_path("/w/app/a.h"),
    ));
    gate.entered
        .recv_timeout(WAIT)
        .expect("first refresh reached the index");
    manager.add_delta(CacheDelta::for_scope(
        project.clone(),
        SearchScope::for_path("/w/app/b.h"),
    ));
    manager.add_delta(CacheDelta::for_scope(
        project.clone(),
        SearchScope::for_path("/w/app/c.h"),
    ));
    gate.release.send(()).unwrap();
    manager
        .reconcile_and_wait(true, JobPriority::Long, None)
        .unwrap();

    let after = manager.refresh_stats(project.id()).unwrap();
    assert_eq!(after.succeeded - before.succeeded, 1);
    assert_eq!(after.cancelled - before.cancelled, 1);
    let applied: Vec<PathBuf> = after
        .last_scope
        .expect("completed run")
        .paths()
        .map(Path::to_path_buf)
        .collect();
    assert_eq!(
        applied,
        vec![
            PathBuf::from("/w/app/a.h"),
            PathBuf::from("/w/app/b.h"),
            PathBuf::from("/w/app/c.h"),
        ]
    );
    assert!(store.is_up_to_date());
    assert_eq!(store.all_types().len(), 3);
    assert_eq!(manager.scheduler().jobs().active_count(REFRESH_FAMILY), 0);
}

#[test]
fn dropping_an_inheritance_clears_the_derived_reference() {
    let provider = Arc::new(MemoryIndexProvider::new());
    let project = app();
    let index = provider.create(project.id().clone());
    index.add_file(
        "/w/app/base.h",
        FileFacts::new().ty(IndexTypeKind::Class, "Base", line(1)),
    );
    index.add_file(
        "/w/app/derived.h",
        FileFacts::new()
            .ty(IndexTypeKind::Class, "Derived", line(2))
            .derives_from("Base", line(2)),
    );
    let manager = support::manager(support::config(0), &provider);
    let store = manager.get_cache(&project);
    manager
        .reconcile_and_wait(true, JobPriority::Long, None)
        .unwrap();
    let base = store.get(&class("Base")).expect("indexed");
    assert_eq!(base.derived_references().len(), 1);

    index.add_file(
        "/w/app/derived.h",
        FileFacts::new().ty(IndexTypeKind::Class, "Derived", line(2)),
    );
    manager.add_delta(CacheDelta::for_scope(
        project.clone(),
        SearchScope::for_path("/w/app/derived.h"),
    ));
    manager
        .reconcile_and_wait(true, JobPriority::Long, None)
        .unwrap();

    let base = store.get(&class("Base")).expect("still declared in base.h");
    assert_eq!(base.derived_references().len(), 0);
    assert!(store.get(&class("Derived")).is_some());
    assert_eq!(
        store.paths_of(&class("Base")),
        vec![PathBuf::from("/w/app/base.h")]
    );
}

#[test]
fn a_delta_during_a_blocking_reconcile_does_not_abort_it() {
    let provider = Arc::new(MemoryIndexProvider::new());
    let first = Project::new("a", "/w/a");
    let second = Project::new("b", "/w/b");
    let memory = Arc::new(MemoryIndex::new());
    memory.add_file(
        "/w/a/a.h",
        FileFacts::new().ty(IndexTypeKind::Class, "A", line(1)),
    );
    let (gated, gate) = GatedIndex::new(memory);
    provider.register(first.id().clone(), gated.clone());
    provider.create(second.id().clone()).add_file(
        "/w/b/b.h",
        FileFacts::new().ty(IndexTypeKind::Class, "B", line(1)),
    );
    let manager = support::manager(support::config(0), &provider);
    let first_store = manager.get_cache(&first);
    let second_store = manager.get_cache(&second);

    gated.arm();
    let result = std::thread::scope(|s| {
        let waiter = s.spawn(|| manager.reconcile_and_wait(true, JobPriority::Long, None));
        gate.entered
            .recv_timeout(WAIT)
            .expect("refresh of a reached the index");
        manager.add_delta(CacheDelta::for_scope(
            first.clone(),
            SearchScope::for_path("/w/a/a.h"),
        ));
        gate.release.send(()).unwrap();
        waiter.join().unwrap()
    });

    let outcomes = result.expect("only the caller's monitor may cancel");
    // The superseding run may finish the first project on its own.
    assert!(!matches!(
        outcomes.get(first.id()),
        Some(RefreshOutcome::Failed { .. })
    ));
    assert!(matches!(
        outcomes.get(second.id()),
        Some(RefreshOutcome::Completed { .. })
    ));
    assert!(first_store.is_up_to_date());
    assert!(second_store.is_up_to_date());
    assert!(first_store.get(&class("A")).is_some());
    assert!(second_store.get(&class("B")).is_some());
    assert!(manager.refresh_stats(first.id()).unwrap().cancelled >= 1);
    assert!(eventually(|| {
        manager.scheduler().jobs().active_count(REFRESH_FAMILY) == 0
    }));
}

#[test]
fn failing_index_query_marks_the_run_failed() {
    let provider = Arc::new(MemoryIndexProvider::new());
    let project = app();
    let memory = Arc::new(MemoryIndex::new());
    memory.add_file(
        "/w/app/a.h",
        FileFacts::new().ty(IndexTypeKind::Class, "A", line(1)),
    );
    provider.register(project.id().clone(), FailingIndex::new(memory));
    let manager = support::manager(support::config(0), &provider);
    let store = manager.get_cache(&project);

    let outcomes = manager
        .reconcile_and_wait(true, JobPriority::Long, None)
        .expect("index failures stay inside the refresh");
    match outcomes.get(project.id()) {
        Some(RefreshOutcome::Failed { error, .. }) => {
            assert!(error.contains("type table truncated"), "{error}");
        }
        other => panic!("expected a failed run, got {other:?}"),
    }
    assert!(store.is_dirty());
    assert!(!store.is_up_to_date());
    assert!(store.get(&class("A")).is_none());

    let stats = manager.refresh_stats(project.id()).unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.succeeded, 0);
    assert!(stats
        .last_error
        .as_deref()
        .is_some_and(|error| error.contains("type table truncated")));
}

#[test]
fn cancel_jobs_stops_refreshes_and_locators() {
    let provider = Arc::new(MemoryIndexProvider::new());
    let project = app();
    let memory = Arc::new(MemoryIndex::new());
    memory.add_file(
        "/w/app/a.h",
        FileFacts::new().ty(IndexTypeKind::Class, "A", line(1)),
    );
    let (gated, gate) = GatedIndex::new(memory);
    provider.register(project.id().clone(), gated.clone());
    let manager = support::manager(support::config(0), &provider);
    let store = manager.get_cache(&project);
    let jobs = manager.scheduler().jobs();

    gated.arm();
    assert_eq!(manager.reconcile(true, JobPriority::Long, Duration::ZERO), 1);
    gate.entered
        .recv_timeout(WAIT)
        .expect("refresh reached the index");

    // The locator queues behind the running refresh on the project's rule.
    let pending = Arc::new(TypeInfo::new(TypeKind::Class, "Pending"));
    store.insert(Path::new("/w/app/pending.h"), [pending.clone()]);
    let locator = manager
        .locate_type(&pending, JobPriority::Short, Duration::ZERO)
        .expect("owned by the project");
    assert_eq!(jobs.active_count(REFRESH_FAMILY), 1);
    assert_eq!(jobs.active_count(LOCATOR_FAMILY), 1);

    assert_eq!(manager.cancel_jobs(), 2);
    gate.release.send(()).unwrap();

    assert!(matches!(locator.join_blocking(), Err(TaskError::Cancelled)));
    assert!(eventually(|| {
        jobs.active_count(REFRESH_FAMILY) == 0 && jobs.active_count(LOCATOR_FAMILY) == 0
    }));
    assert_eq!(manager.refresh_stats(project.id()).unwrap().cancelled, 1);
    assert!(!store.is_up_to_date());
}

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pretty_assertions::assert_eq;

use cbrowse_core::{DeltaFlags, ElementDelta, ElementHandle, ElementKind, Project, ProjectId};
use cbrowse_index::MemoryIndexProvider;
use cbrowse_typecache::{classify, CacheStore, DeltaListener, TypeInfo, TypeKind};

use super::support;

fn unit(path: &str) -> ElementHandle {
    ElementHandle::new(ElementKind::TranslationUnit, path, Some(ProjectId::new("app")))
}

fn seeded() -> (cbrowse_typecache::CacheManager, Project, Arc<CacheStore>) {
    // Long enough that no background refresh runs while the test inspects the store.
    let manager = support::manager(support::config(60_000), &Arc::new(MemoryIndexProvider::new()));
    let project = Project::new("app", "/w/app");
    let store = manager.get_cache(&project);
    store.insert(
        Path::new("/w/app/a.cpp"),
        [Arc::new(TypeInfo::new(TypeKind::Class, "Widget"))],
    );
    store.insert(
        Path::new("/w/app/b.h"),
        [Arc::new(TypeInfo::new(TypeKind::Struct, "Point"))],
    );
    (manager, project, store)
}

#[test]
fn added_unit_flushes_only_that_file() {
    let (manager, project, store) = seeded();
    let event = ElementDelta::changed(ElementHandle::model(), DeltaFlags::CHILDREN)
        .with_child(ElementDelta::added(unit("/w/app/a.cpp")));

    let invalidation = classify(&event);
    assert!(!invalidation.everything);
    assert_eq!(
        invalidation.paths.iter().cloned().collect::<Vec<_>>(),
        vec![PathBuf::from("/w/app/a.cpp")]
    );
    let scope = invalidation.for_project(&project).expect("touches app");
    assert!(scope.encloses(Path::new("/w/app/a.cpp")));
    assert!(!scope.encloses_project(&project));

    let listener = DeltaListener::new(manager.clone());
    assert_eq!(listener.element_changed(&event), 1);
    assert_eq!(store.all_files(), vec![PathBuf::from("/w/app/b.h")]);
    assert!(store.has_pending_deltas());
    manager.cancel_jobs();
}

#[test]
fn model_content_change_flushes_everything() {
    let (manager, project, store) = seeded();
    let event = ElementDelta::changed(ElementHandle::model(), DeltaFlags::CONTENT);

    let invalidation = classify(&event);
    assert!(invalidation.everything);
    assert!(invalidation
        .for_project(&project)
        .expect("everything touches every project")
        .encloses(Path::new("/w/app/b.h")));

    let listener = DeltaListener::new(manager.clone());
    assert_eq!(listener.element_changed(&event), 1);
    assert!(store.all_files().is_empty());
    assert!(store.is_empty());
    manager.cancel_jobs();
}

#[test]
fn unsaved_buffers_and_members_do_not_invalidate() {
    let (manager, _project, store) = seeded();
    let event = ElementDelta::changed(ElementHandle::model(), DeltaFlags::CHILDREN)
        .with_child(ElementDelta::changed(
            unit("/w/app/a.cpp").in_working_copy(),
            DeltaFlags::CONTENT,
        ))
        .with_child(
            ElementDelta::changed(unit("/w/app/b.h"), DeltaFlags::CHILDREN).with_child(
                ElementDelta::added(ElementHandle::new(
                    ElementKind::Field,
                    "/w/app/b.h",
                    Some(ProjectId::new("app")),
                )),
            ),
        );

    assert!(classify(&event).is_empty());
    let listener = DeltaListener::new(manager.clone());
    assert_eq!(listener.element_changed(&event), 0);
    assert_eq!(store.all_files().len(), 2);
    assert!(!store.has_pending_deltas());
}

#[test]
fn folder_removal_flushes_its_subtree() {
    let (manager, _project, store) = seeded();
    store.insert(
        Path::new("/w/app/gen/c.h"),
        [Arc::new(TypeInfo::new(TypeKind::Enum, "Mode"))],
    );
    let event = ElementDelta::removed(ElementHandle::new(
        ElementKind::Folder,
        "/w/app/gen",
        Some(ProjectId::new("app")),
    ));

    let listener = DeltaListener::new(manager.clone());
    assert_eq!(listener.element_changed(&event), 1);
    assert_eq!(
        store.all_files(),
        vec![PathBuf::from("/w/app/a.cpp"), PathBuf::from("/w/app/b.h")]
    );
    manager.cancel_jobs();
}

#[test]
fn events_outside_every_project_touch_nothing() {
    let (manager, _project, store) = seeded();
    let event = ElementDelta::added(ElementHandle::new(
        ElementKind::TranslationUnit,
        "/elsewhere/x.cpp",
        None,
    ));
    let listener = DeltaListener::new(manager);
    assert_eq!(listener.element_changed(&event), 0);
    assert_eq!(store.all_files().len(), 2);
}

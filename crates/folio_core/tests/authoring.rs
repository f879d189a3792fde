use folio_core::db::open_db_in_memory;
use folio_core::duplication::{ComponentTypeRegistry, SqlitePermaIdAllocator};
use folio_core::model::component::ROOT_COLLECTION;
use folio_core::model::entry::RevisionState;
use folio_core::repo::component_repo::{ComponentRepository, SqliteComponentRepository};
use folio_core::repo::entry_repo::{EntryRepository, SqliteEntryRepository};
use folio_core::{AuthoringError, AuthoringService};
use serde_json::json;

fn setup() -> (rusqlite::Connection, ComponentTypeRegistry) {
    (
        open_db_in_memory().unwrap(),
        ComponentTypeRegistry::story_defaults().unwrap(),
    )
}

#[test]
fn create_entry_opens_a_draft_revision() {
    let (conn, registry) = setup();
    let authoring = AuthoringService::new(&conn, &registry);

    let (entry, draft) = authoring.create_entry("  Field notes ").unwrap();

    assert_eq!(entry.title, "Field notes");
    assert_eq!(draft.entry_id, entry.id);
    assert_eq!(draft.state, RevisionState::Draft);
    assert!(draft.published_at.is_none());
    assert!(matches!(
        authoring.create_entry("   "),
        Err(AuthoringError::InvalidTitle)
    ));
}

#[test]
fn components_get_sequential_perma_ids_and_declared_child_types() {
    let (conn, registry) = setup();
    let authoring = AuthoringService::new(&conn, &registry);
    let (entry, draft) = authoring.create_entry("Story").unwrap();

    let story = authoring
        .add_root(draft.id, "story", json!({ "title": "Story" }))
        .unwrap();
    let chapter = authoring.add_child(story.id, "chapters", json!({})).unwrap();
    let first = authoring.add_child(chapter.id, "sections", json!({})).unwrap();
    let second = authoring.add_child(chapter.id, "sections", json!({})).unwrap();

    assert_eq!(
        [story.perma_id, chapter.perma_id, first.perma_id, second.perma_id],
        [1, 2, 3, 4]
    );
    assert_eq!(story.collection, ROOT_COLLECTION);
    assert_eq!(chapter.component_type, "chapter");
    assert_eq!(second.component_type, "section");
    assert_eq!((first.position, second.position), (0, 1));
    assert_eq!(
        SqlitePermaIdAllocator::new(&conn)
            .last_issued(entry.id)
            .unwrap(),
        4
    );
}

#[test]
fn undeclared_types_collections_and_payloads_are_rejected() {
    let (conn, registry) = setup();
    let authoring = AuthoringService::new(&conn, &registry);
    let (_, draft) = authoring.create_entry("Story").unwrap();
    let story = authoring.add_root(draft.id, "story", json!({})).unwrap();

    assert!(matches!(
        authoring.add_root(draft.id, "widget", json!({})),
        Err(AuthoringError::UndeclaredType(component_type)) if component_type == "widget"
    ));
    assert!(matches!(
        authoring.add_child(story.id, "sections", json!({})),
        Err(AuthoringError::UndeclaredCollection { component_type, collection })
            if component_type == "story" && collection == "sections"
    ));
    assert!(matches!(
        authoring.add_child(story.id, "chapters", json!([1, 2])),
        Err(AuthoringError::InvalidConfiguration)
    ));
    assert!(matches!(
        authoring.add_child(9_999, "chapters", json!({})),
        Err(AuthoringError::ComponentNotFound(9_999))
    ));
    assert!(matches!(
        authoring.add_root(9_999, "story", json!({})),
        Err(AuthoringError::RevisionNotFound(9_999))
    ));
}

#[test]
fn published_revisions_are_frozen() {
    let (conn, registry) = setup();
    let authoring = AuthoringService::new(&conn, &registry);
    let (entry, _) = authoring.create_entry("Story").unwrap();
    let published = SqliteEntryRepository::new(&conn)
        .create_revision(entry.id, RevisionState::Published)
        .unwrap();
    assert!(published.published_at.is_some());

    let err = authoring
        .add_root(published.id, "story", json!({}))
        .unwrap_err();
    assert!(matches!(err, AuthoringError::RevisionFrozen(id) if id == published.id));
    assert_eq!(
        SqliteComponentRepository::new(&conn)
            .count_in_revision(published.id)
            .unwrap(),
        0
    );
}

#[test]
fn update_and_delete_work_on_draft_subtrees() {
    let (conn, registry) = setup();
    let authoring = AuthoringService::new(&conn, &registry);
    let (_, draft) = authoring.create_entry("Story").unwrap();
    let story = authoring.add_root(draft.id, "story", json!({})).unwrap();
    let chapter = authoring.add_child(story.id, "chapters", json!({})).unwrap();
    let section = authoring.add_child(chapter.id, "sections", json!({})).unwrap();

    let updated = authoring
        .update_configuration(section.id, json!({ "link": chapter.perma_id }))
        .unwrap();
    assert_eq!(updated.configuration, json!({ "link": 2 }));

    authoring.delete_component(chapter.id).unwrap();
    let components = SqliteComponentRepository::new(&conn);
    assert!(components.get_component(section.id).unwrap().is_none());
    assert_eq!(components.count_in_revision(draft.id).unwrap(), 1);
    assert!(matches!(
        authoring.delete_component(chapter.id),
        Err(AuthoringError::ComponentNotFound(_))
    ));
}

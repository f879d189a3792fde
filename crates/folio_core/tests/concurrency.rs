use folio_core::db::open_db;
use folio_core::duplication::{ComponentTypeRegistry, DuplicateOptions, SqlitePermaIdAllocator};
use folio_core::repo::component_repo::{ComponentRepository, SqliteComponentRepository};
use folio_core::{AuthoringService, PublicationService};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

const RUNS_PER_THREAD: usize = 5;

#[test]
fn concurrent_reset_duplications_never_share_perma_ids() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("folio.db");
    let registry = Arc::new(ComponentTypeRegistry::story_defaults().unwrap());

    let (entry_id, draft_id, chapter_id) = {
        let conn = open_db(&path).unwrap();
        let authoring = AuthoringService::new(&conn, &registry);
        let (entry, draft) = authoring.create_entry("Shared").unwrap();
        let story = authoring.add_root(draft.id, "story", json!({})).unwrap();
        let chapter = authoring.add_child(story.id, "chapters", json!({})).unwrap();
        let section = authoring.add_child(chapter.id, "sections", json!({})).unwrap();
        authoring
            .update_configuration(section.id, json!({ "link": section.perma_id }))
            .unwrap();
        (entry.id, draft.id, chapter.id)
    };

    let handles = (0..2)
        .map(|_| {
            let path = path.clone();
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let publication = PublicationService::new(&conn, &registry);
                for _ in 0..RUNS_PER_THREAD {
                    publication
                        .duplicate_component(chapter_id, DuplicateOptions::reset_perma_ids())
                        .unwrap();
                }
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.join().expect("worker should not panic");
    }

    let conn = open_db(&path).unwrap();
    let components = SqliteComponentRepository::new(&conn);
    let expected = 3 + 2 * RUNS_PER_THREAD as i64 * 2;
    assert_eq!(components.count_in_revision(draft_id).unwrap(), expected);

    let mut stmt = conn
        .prepare("SELECT perma_id FROM components WHERE revision_id = ?1;")
        .unwrap();
    let perma_ids = stmt
        .query_map([draft_id], |row| row.get::<_, i64>(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let unique = perma_ids.iter().copied().collect::<HashSet<_>>();
    assert_eq!(unique.len(), perma_ids.len());
    assert_eq!(
        SqlitePermaIdAllocator::new(&conn)
            .last_issued(entry_id)
            .unwrap(),
        *perma_ids.iter().max().unwrap()
    );

    let mut stmt = conn
        .prepare("SELECT id FROM components WHERE revision_id = ?1 AND component_type = 'section';")
        .unwrap();
    let section_ids = stmt
        .query_map([draft_id], |row| row.get::<_, i64>(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(section_ids.len(), 1 + 2 * RUNS_PER_THREAD);
    for section_id in section_ids {
        let section = components.get_component(section_id).unwrap().unwrap();
        assert_eq!(section.configuration["link"], json!(section.perma_id));
    }
}

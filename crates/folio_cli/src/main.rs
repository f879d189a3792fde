//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `folio_core` wiring end to end:
//!   config, logging, database open, authoring, and the copy workflows.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `folio_cli [ping | seed <title> | publish <entry_id> |
//! copy <entry_id> <title>]`. Settings come from `FOLIO_*` variables.

use folio_core::duplication::registry::{global, install_global};
use folio_core::{
    open_db_in_memory, open_db_with_timeout, AuthoringService, ComponentTypeRegistry, Connection,
    CoreConfig, EntryId, PublicationService,
};
use log::info;
use serde_json::json;
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run(std::env::args().skip(1).collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Vec<String>) -> Result<(), Box<dyn Error>> {
    let config = CoreConfig::from_env()?;
    folio_core::init_from_config(&config)?;

    let registry = match global() {
        Some(registry) => registry,
        None => install_global(ComponentTypeRegistry::story_defaults()?)?,
    };
    let conn = match config.database_path.as_deref() {
        Some(path) => open_db_with_timeout(path, config.busy_timeout())?,
        None => open_db_in_memory()?,
    };

    let args = args.iter().map(String::as_str).collect::<Vec<_>>();
    match args.as_slice() {
        [] | ["ping"] => {
            println!("folio_core ping={}", folio_core::ping());
            println!("folio_core version={}", folio_core::core_version());
        }
        ["seed", title] => {
            let entry_id = seed_story(&conn, registry, title)?;
            println!("seeded entry={entry_id}");
        }
        ["publish", entry_id] => {
            let revision = PublicationService::new(&conn, registry).publish(entry_id.parse()?)?;
            println!("published revision={}", revision.id);
        }
        ["copy", entry_id, title] => {
            let (entry, draft) =
                PublicationService::new(&conn, registry).copy_entry(entry_id.parse()?, title)?;
            println!("copied entry={} draft={}", entry.id, draft.id);
        }
        other => return Err(format!("unknown command: {}", other.join(" ")).into()),
    }
    Ok(())
}

fn seed_story(
    conn: &Connection,
    registry: &ComponentTypeRegistry,
    title: &str,
) -> Result<EntryId, Box<dyn Error>> {
    let authoring = AuthoringService::new(conn, registry);
    let (entry, draft) = authoring.create_entry(title)?;
    let story = authoring.add_root(draft.id, "story", json!({ "title": title }))?;
    let chapter = authoring.add_child(story.id, "chapters", json!({ "title": "Chapter 1" }))?;
    let section = authoring.add_child(chapter.id, "sections", json!({}))?;
    authoring.update_configuration(section.id, json!({ "link": section.perma_id }))?;
    authoring.add_child(section.id, "content_elements", json!({ "text": "Hello" }))?;
    info!(
        "event=cli_seed module=cli status=ok entry_id={} revision_id={}",
        entry.id, draft.id
    );
    Ok(entry.id)
}

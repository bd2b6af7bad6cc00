use crate::ai::{AiAction, AiService};
use crate::config::Config;
use crate::model::Note;
use crate::storage::{init_project_store, locate_store, JsonFileStorage, StoreLocation};
use crate::store::{Confirm, NoteStore};
use crate::ui;
use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::io::{self, BufRead, Write};

/// Where notes live and how the app is configured for this invocation.
pub struct Session {
    pub location: StoreLocation,
    pub config: Config,
}

impl Session {
    fn open_store(&self) -> Result<NoteStore> {
        let storage = JsonFileStorage::new(&self.location);
        match NoteStore::open(Box::new(storage)) {
            Ok(store) => Ok(store),
            Err(err) if err.is_malformed() => Err(anyhow!(err).context(
                "stored notes are corrupt; run `cybernotes reset` to move them aside",
            )),
            Err(err) => Err(anyhow!(err).context("loading notes")),
        }
    }
}

pub fn resolve_location(config: &Config) -> Result<StoreLocation> {
    let cwd = env::current_dir()?;
    locate_store(&cwd, config.data_dir.as_deref()).context("locating note store")
}

pub fn init() -> Result<()> {
    let cwd = env::current_dir()?;
    let location = init_project_store(&cwd)?;
    println!("Initialized note store at {}", location.data_path().display());
    Ok(())
}

pub fn list(session: &Session, search: Option<String>) -> Result<()> {
    let store = session.open_store()?;
    println!(
        "{} ({})",
        session.location.data_path().display(),
        session.location.scope.label()
    );
    let notes: Vec<&Note> = match search.as_deref() {
        Some(term) => store.filter(term),
        None => store.notes().iter().collect(),
    };
    if notes.is_empty() {
        println!("  NO DATA FOUND");
    }
    for note in notes {
        print_summary(note);
    }
    Ok(())
}

pub fn new(session: &Session, title: Option<String>, content: Option<String>) -> Result<()> {
    let mut store = session.open_store()?;
    let id = store.create_note()?;
    if title.is_some() || content.is_some() {
        let mut note = store
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow!("created note {} vanished", id))?;
        note.title = title.unwrap_or_default();
        note.content = content.unwrap_or_default();
        note.touch();
        store.update_note(note)?;
    }
    println!("Created note {}", id);
    Ok(())
}

pub fn show(session: &Session, note_id: String) -> Result<()> {
    let store = session.open_store()?;
    let note = store
        .get(&note_id)
        .ok_or_else(|| anyhow!("note {} not found", note_id))?;
    print_summary(note);
    println!();
    println!("{}", note.content);
    Ok(())
}

pub fn edit(
    session: &Session,
    note_id: String,
    title: Option<String>,
    content: Option<String>,
) -> Result<()> {
    if title.is_none() && content.is_none() {
        bail!("nothing to change: pass --title and/or --content");
    }
    let mut store = session.open_store()?;
    let mut note = store
        .get(&note_id)
        .cloned()
        .ok_or_else(|| anyhow!("note {} not found", note_id))?;
    if let Some(t) = title {
        note.title = t;
    }
    if let Some(c) = content {
        note.content = c;
    }
    note.touch();
    store.update_note(note)?;
    println!("Updated note {}", note_id);
    Ok(())
}

pub fn delete(session: &Session, note_id: String, force: bool) -> Result<()> {
    let mut store = session.open_store()?;
    if store.get(&note_id).is_none() {
        bail!("note {} not found", note_id);
    }
    let removed = if force {
        store.delete_note(&note_id, &mut true)?
    } else {
        store.delete_note(&note_id, &mut StdinConfirm)?
    };
    if removed {
        println!("Purged note {}", note_id);
    } else {
        println!("Purge aborted");
    }
    Ok(())
}

pub fn ai(session: &Session, note_id: String, action: AiAction, apply: bool) -> Result<()> {
    let mut store = session.open_store()?;
    let mut note = store
        .get(&note_id)
        .cloned()
        .ok_or_else(|| anyhow!("note {} not found", note_id))?;
    if note.content.trim().is_empty() {
        println!("Nothing to process: data stream is empty");
        return Ok(());
    }
    let service = AiService::new(session.config.ai.clone());
    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
    let result = runtime.block_on(service.process(&note.content, action));
    println!("{}", result);
    if apply {
        note.content = action.merge_policy().apply(&note.content, &result);
        note.touch();
        store.update_note(note)?;
        println!("Applied {} to {}", action.label(), note_id);
    }
    Ok(())
}

pub fn reset(session: &Session) -> Result<()> {
    let storage = JsonFileStorage::new(&session.location);
    match storage.quarantine()? {
        Some(moved) => println!("Moved {} to {}", storage.path().display(), moved.display()),
        None => println!("No stored notes at {}", storage.path().display()),
    }
    Ok(())
}

pub fn tui(session: Session) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
    ui::run(session.location, session.config, runtime.handle().clone())
}

/// Asks on the controlling terminal; anything but y/yes declines.
struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&mut self, message: &str) -> bool {
        print!("{} [y/N] ", message);
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        is_yes(&answer)
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn print_summary(note: &Note) {
    let stamp = note
        .updated_local()
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    println!("  - {}: {}  [{}]", note.id, note.display_title(), stamp);
}

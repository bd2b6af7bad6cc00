use crate::model::{generate_id, Note, NoteId};
use crate::storage::{Persistence, StorageError};
use log::{debug, info};

pub const DELETE_PROMPT: &str = "PURGING DATA NODE. CONFIRM?";

/// Blocking yes/no question asked before a destructive change.
pub trait Confirm {
    fn confirm(&mut self, message: &str) -> bool;
}

/// An answer already collected elsewhere (a modal, a `--force` flag).
impl Confirm for bool {
    fn confirm(&mut self, _message: &str) -> bool {
        *self
    }
}

/// Owns the note collection and selection state. Every mutation is
/// mirrored to the backing [`Persistence`] before returning.
pub struct NoteStore {
    notes: Vec<Note>,
    active_note_id: Option<NoteId>,
    search_term: String,
    persistence: Box<dyn Persistence>,
}

impl NoteStore {
    pub fn open(persistence: Box<dyn Persistence>) -> Result<Self, StorageError> {
        let notes = persistence.load()?;
        Ok(NoteStore {
            notes,
            active_note_id: None,
            search_term: String::new(),
            persistence,
        })
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }

    pub fn active_note_id(&self) -> Option<&str> {
        self.active_note_id.as_deref()
    }

    pub fn active_note(&self) -> Option<&Note> {
        self.active_note_id.as_deref().and_then(|id| self.get(id))
    }

    pub fn select(&mut self, id: &str) {
        if self.get(id).is_some() {
            self.active_note_id = Some(id.to_string());
        }
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.search_term = term.into();
    }

    pub fn create_note(&mut self) -> Result<NoteId, StorageError> {
        let mut id = generate_id();
        while self.get(&id).is_some() {
            id = generate_id();
        }
        self.notes.insert(0, Note::new(id.clone()));
        self.active_note_id = Some(id.clone());
        info!("created note {}", id);
        self.persist()?;
        Ok(id)
    }

    /// Replaces the stored note sharing `note.id`. Unknown ids are ignored.
    pub fn update_note(&mut self, note: Note) -> Result<bool, StorageError> {
        let Some(idx) = self.notes.iter().position(|n| n.id == note.id) else {
            debug!("update for unknown note {} ignored", note.id);
            return Ok(false);
        };
        debug!("updating note {}", note.id);
        self.notes[idx] = note;
        self.persist()?;
        Ok(true)
    }

    pub fn delete_note<C>(&mut self, id: &str, confirm: &mut C) -> Result<bool, StorageError>
    where
        C: Confirm + ?Sized,
    {
        if !confirm.confirm(DELETE_PROMPT) {
            debug!("delete of {} declined", id);
            return Ok(false);
        }
        let before = self.notes.len();
        self.notes.retain(|n| n.id != id);
        if self.active_note_id.as_deref() == Some(id) {
            self.active_note_id = None;
        }
        let removed = self.notes.len() != before;
        if removed {
            info!("deleted note {}", id);
        }
        self.persist()?;
        Ok(removed)
    }

    pub fn filter(&self, term: &str) -> Vec<&Note> {
        let needle = term.to_lowercase();
        self.notes.iter().filter(|n| n.matches(&needle)).collect()
    }

    pub fn visible_notes(&self) -> Vec<&Note> {
        self.filter(&self.search_term)
    }

    fn persist(&mut self) -> Result<(), StorageError> {
        self.persistence.save(&self.notes)
    }
}

use chrono::{DateTime, Local, TimeZone, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

pub type NoteId = String;

const ID_LEN: usize = 12;

/// A single data node. Field names and layout match the persisted blob.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Milliseconds since the Unix epoch.
    pub updated_at: i64,
}

impl Note {
    pub fn new(id: NoteId) -> Self {
        let now = now_millis();
        Note {
            id,
            title: String::new(),
            content: String::new(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Refreshes `updated_at`, always moving it strictly forward.
    pub fn touch(&mut self) {
        self.updated_at = now_millis().max(self.updated_at.saturating_add(1));
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "UNTITLED DATA"
        } else {
            &self.title
        }
    }

    pub fn updated_local(&self) -> Option<DateTime<Local>> {
        Utc.timestamp_millis_opt(self.updated_at)
            .single()
            .map(|dt| dt.with_timezone(&Local))
    }

    /// Case-insensitive substring match over title and content.
    pub fn matches(&self, needle_lower: &str) -> bool {
        needle_lower.is_empty()
            || self.title.to_lowercase().contains(needle_lower)
            || self.content.to_lowercase().contains(needle_lower)
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn generate_id() -> NoteId {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LEN)
        .map(char::from)
        .collect()
}

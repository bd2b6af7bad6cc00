use crate::ai::AiAction;
use crate::model::{Note, NoteId};
use std::time::{Duration, Instant};

/// A text buffer with a byte-offset cursor.
#[derive(Clone, Debug, Default)]
pub struct FieldValue {
    pub value: String,
    pub cursor: usize,
}

impl FieldValue {
    pub fn new(value: &str) -> Self {
        FieldValue {
            value: value.to_string(),
            cursor: value.len(),
        }
    }

    pub fn set(&mut self, value: String) {
        self.cursor = value.len();
        self.value = value;
    }

    pub fn move_left(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor = prev_char(self.cursor, &self.value);
    }

    pub fn move_right(&mut self) {
        if self.cursor >= self.value.len() {
            return;
        }
        self.cursor = next_char(self.cursor, &self.value);
    }

    pub fn move_up(&mut self) {
        let (line_starts, line_idx, col) = line_state(&self.value, self.cursor);
        if line_idx == 0 {
            return;
        }
        let target_start = line_starts[line_idx - 1];
        self.cursor = index_at_col(&self.value, target_start, col);
    }

    pub fn move_down(&mut self) {
        let (line_starts, line_idx, col) = line_state(&self.value, self.cursor);
        if line_idx + 1 >= line_starts.len() {
            return;
        }
        let target_start = line_starts[line_idx + 1];
        self.cursor = index_at_col(&self.value, target_start, col);
    }

    pub fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        let prev = prev_char(self.cursor, &self.value);
        self.value.drain(prev..self.cursor);
        self.cursor = prev;
        true
    }

    pub fn insert_char(&mut self, ch: char) {
        self.value.insert(self.cursor, ch);
        self.cursor += ch.len_utf8();
    }

    pub fn with_caret(&self) -> String {
        let mut text = self.value.clone();
        text.insert_str(self.cursor, "▌");
        text
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum EditorField {
    Title,
    Content,
}

/// Everything the background task needs to run one AI action.
#[derive(Debug, Clone)]
pub struct AiRequest {
    pub note_id: NoteId,
    pub content: String,
    pub action: AiAction,
}

#[derive(Debug, Clone)]
pub struct AiOutcome {
    pub note_id: NoteId,
    pub action: AiAction,
    pub text: String,
}

/// Edit buffers for the active note.
///
/// Keystrokes only touch the buffers; the store sees them through
/// [`EditorState::commit`] (explicit save) or [`EditorState::due_commit`]
/// once the buffers have been idle long enough.
pub struct EditorState {
    note_id: Option<NoteId>,
    pub title: FieldValue,
    pub content: FieldValue,
    pub field: EditorField,
    last_edit: Option<Instant>,
    ai_in_flight: Option<AiAction>,
}

impl Default for EditorState {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorState {
    pub fn new() -> Self {
        EditorState {
            note_id: None,
            title: FieldValue::default(),
            content: FieldValue::default(),
            field: EditorField::Title,
            last_edit: None,
            ai_in_flight: None,
        }
    }

    pub fn note_id(&self) -> Option<&str> {
        self.note_id.as_deref()
    }

    /// Resets the buffers when `note` is a different note from the one loaded.
    pub fn load(&mut self, note: Option<&Note>) {
        let incoming = note.map(|n| n.id.as_str());
        if incoming == self.note_id.as_deref() {
            return;
        }
        match note {
            Some(note) => {
                self.note_id = Some(note.id.clone());
                self.title = FieldValue::new(&note.title);
                self.content = FieldValue::new(&note.content);
            }
            None => {
                self.note_id = None;
                self.title = FieldValue::default();
                self.content = FieldValue::default();
            }
        }
        self.field = EditorField::Title;
        self.last_edit = None;
    }

    pub fn has_pending(&self) -> bool {
        self.last_edit.is_some()
    }

    pub fn next_field(&mut self) {
        self.field = match self.field {
            EditorField::Title => EditorField::Content,
            EditorField::Content => EditorField::Title,
        };
    }

    pub fn active_field_mut(&mut self) -> &mut FieldValue {
        match self.field {
            EditorField::Title => &mut self.title,
            EditorField::Content => &mut self.content,
        }
    }

    pub fn insert_char(&mut self, ch: char, now: Instant) {
        if self.field == EditorField::Title && ch == '\n' {
            return;
        }
        self.active_field_mut().insert_char(ch);
        self.last_edit = Some(now);
    }

    pub fn backspace(&mut self, now: Instant) {
        if self.active_field_mut().backspace() {
            self.last_edit = Some(now);
        }
    }

    /// Buffers merged into `stored`, with a fresh `updated_at`, when they differ.
    pub fn commit(&mut self, stored: &Note) -> Option<Note> {
        if self.note_id.as_deref() != Some(stored.id.as_str()) {
            return None;
        }
        self.last_edit = None;
        if self.title.value == stored.title && self.content.value == stored.content {
            return None;
        }
        let mut updated = stored.clone();
        updated.title = self.title.value.clone();
        updated.content = self.content.value.clone();
        updated.touch();
        Some(updated)
    }

    /// Like [`commit`](Self::commit), but only once `idle` has passed since
    /// the last edit.
    pub fn due_commit(&mut self, stored: &Note, now: Instant, idle: Duration) -> Option<Note> {
        let last = self.last_edit?;
        if now.saturating_duration_since(last) < idle {
            return None;
        }
        self.commit(stored)
    }

    pub fn ai_in_flight(&self) -> Option<AiAction> {
        self.ai_in_flight
    }

    /// Starts an AI action unless content is blank or one is already running.
    pub fn begin_ai(&mut self, action: AiAction) -> Option<AiRequest> {
        if self.ai_in_flight.is_some() || self.content.value.trim().is_empty() {
            return None;
        }
        let note_id = self.note_id.clone()?;
        self.ai_in_flight = Some(action);
        Some(AiRequest {
            note_id,
            content: self.content.value.clone(),
            action,
        })
    }

    /// Clears the in-flight flag and merges the result into the content
    /// buffer. Returns false when the outcome belongs to a note that is no
    /// longer loaded; the caller then merges it into the stored note.
    pub fn finish_ai(&mut self, outcome: &AiOutcome, now: Instant) -> bool {
        self.ai_in_flight = None;
        if self.note_id.as_deref() != Some(outcome.note_id.as_str()) {
            return false;
        }
        let merged = outcome
            .action
            .merge_policy()
            .apply(&self.content.value, &outcome.text);
        self.content.set(merged);
        self.last_edit = Some(now);
        true
    }

    pub fn line_count(&self) -> usize {
        self.content.value.split('\n').count()
    }

    pub fn char_count(&self) -> usize {
        self.content.value.chars().count()
    }

    pub fn is_stable(&self) -> bool {
        !self.title.value.is_empty() && !self.content.value.is_empty()
    }
}

fn prev_char(cursor: usize, text: &str) -> usize {
    if cursor == 0 {
        return 0;
    }
    let mut prev = 0;
    for (idx, _) in text.char_indices() {
        if idx >= cursor {
            break;
        }
        prev = idx;
    }
    prev
}

fn next_char(cursor: usize, text: &str) -> usize {
    for (idx, ch) in text.char_indices() {
        if idx > cursor {
            return idx;
        }
        if idx == cursor {
            return cursor + ch.len_utf8();
        }
    }
    text.len()
}

fn line_state(text: &str, cursor: usize) -> (Vec<usize>, usize, usize) {
    let mut starts = vec![0];
    for (idx, ch) in text.char_indices() {
        if ch == '\n' {
            starts.push(idx + 1);
        }
    }
    let line_idx = starts
        .iter()
        .rposition(|start| *start <= cursor)
        .unwrap_or(0);
    let col = text[starts[line_idx]..cursor].chars().count();
    (starts, line_idx, col)
}

fn index_at_col(text: &str, start: usize, target_col: usize) -> usize {
    let slice = &text[start..];
    let limit = slice.find('\n').unwrap_or(slice.len());
    slice[..limit]
        .char_indices()
        .nth(target_col)
        .map(|(idx, _)| start + idx)
        .unwrap_or(start + limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{LINK_FAILURE_FALLBACK, SUMMARY_SEPARATOR};

    const IDLE: Duration = Duration::from_millis(1000);

    fn stored(id: &str, title: &str, content: &str) -> Note {
        Note {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            tags: vec![],
            created_at: 100,
            updated_at: 100,
        }
    }

    fn type_str(editor: &mut EditorState, text: &str, at: Instant) {
        for ch in text.chars() {
            editor.insert_char(ch, at);
        }
    }

    #[test]
    fn load_only_resets_on_identity_change() {
        let mut editor = EditorState::new();
        let note = stored("a", "Log", "System boot");
        editor.load(Some(&note));
        editor.field = EditorField::Content;
        type_str(&mut editor, "!", Instant::now());

        let mut refreshed = note.clone();
        refreshed.updated_at = 200;
        editor.load(Some(&refreshed));
        assert_eq!(editor.content.value, "System boot!");

        editor.load(Some(&stored("b", "Other", "x")));
        assert_eq!(editor.title.value, "Other");
        assert!(!editor.has_pending());
    }

    #[test]
    fn nothing_commits_before_idle_period() {
        let mut editor = EditorState::new();
        let note = stored("a", "Log", "System boot");
        editor.load(Some(&note));
        editor.field = EditorField::Content;
        let t0 = Instant::now();
        type_str(&mut editor, " ok", t0);
        assert!(editor
            .due_commit(&note, t0 + Duration::from_millis(400), IDLE)
            .is_none());
        assert!(editor.has_pending());
    }

    #[test]
    fn commits_after_idle_period_with_newer_timestamp() {
        let mut editor = EditorState::new();
        let note = stored("a", "Log", "System boot");
        editor.load(Some(&note));
        editor.field = EditorField::Content;
        let t0 = Instant::now();
        type_str(&mut editor, " ok", t0);
        let updated = editor.due_commit(&note, t0 + IDLE, IDLE).unwrap();
        assert_eq!(updated.content, "System boot ok");
        assert_eq!(updated.title, "Log");
        assert!(updated.updated_at > note.updated_at);
        assert_eq!(updated.created_at, note.created_at);
        assert!(!editor.has_pending());
    }

    #[test]
    fn later_keystroke_restarts_idle_window() {
        let mut editor = EditorState::new();
        let note = stored("a", "", "");
        editor.load(Some(&note));
        let t0 = Instant::now();
        editor.insert_char('x', t0);
        editor.insert_char('y', t0 + Duration::from_millis(800));
        assert!(editor.due_commit(&note, t0 + IDLE, IDLE).is_none());
        assert!(editor
            .due_commit(&note, t0 + Duration::from_millis(1800), IDLE)
            .is_some());
    }

    #[test]
    fn unchanged_buffers_do_not_commit() {
        let mut editor = EditorState::new();
        let note = stored("a", "Log", "");
        editor.load(Some(&note));
        let t0 = Instant::now();
        editor.insert_char('x', t0);
        editor.backspace(t0);
        assert!(editor.due_commit(&note, t0 + IDLE, IDLE).is_none());
        assert!(editor.commit(&note).is_none());
    }

    #[test]
    fn manual_commit_skips_the_wait() {
        let mut editor = EditorState::new();
        let note = stored("a", "", "");
        editor.load(Some(&note));
        type_str(&mut editor, "Title", Instant::now());
        let updated = editor.commit(&note).unwrap();
        assert_eq!(updated.title, "Title");
    }

    #[test]
    fn title_rejects_newlines() {
        let mut editor = EditorState::new();
        editor.load(Some(&stored("a", "", "")));
        editor.insert_char('\n', Instant::now());
        assert!(editor.title.value.is_empty());
        editor.next_field();
        editor.insert_char('\n', Instant::now());
        assert_eq!(editor.content.value, "\n");
    }

    #[test]
    fn ai_guard_blocks_blank_content_and_second_request() {
        let mut editor = EditorState::new();
        editor.load(Some(&stored("a", "t", "   ")));
        assert!(editor.begin_ai(AiAction::Expand).is_none());

        editor.load(Some(&stored("b", "t", "text")));
        let request = editor.begin_ai(AiAction::Expand).unwrap();
        assert_eq!(request.note_id, "b");
        assert_eq!(request.content, "text");
        assert!(editor.begin_ai(AiAction::Summarize).is_none());
        assert_eq!(editor.ai_in_flight(), Some(AiAction::Expand));
    }

    #[test]
    fn summarize_result_is_appended() {
        let mut editor = EditorState::new();
        editor.load(Some(&stored("a", "t", "long text")));
        editor.begin_ai(AiAction::Summarize).unwrap();
        let applied = editor.finish_ai(
            &AiOutcome {
                note_id: "a".into(),
                action: AiAction::Summarize,
                text: "short".into(),
            },
            Instant::now(),
        );
        assert!(applied);
        assert_eq!(
            editor.content.value,
            format!("long text{}short", SUMMARY_SEPARATOR)
        );
        assert!(editor.has_pending());
        assert!(editor.ai_in_flight().is_none());
    }

    #[test]
    fn fallback_replaces_content_for_rewrite_actions() {
        let mut editor = EditorState::new();
        editor.load(Some(&stored("a", "t", "draft")));
        editor.begin_ai(AiAction::CyberpunkStyle).unwrap();
        editor.finish_ai(
            &AiOutcome {
                note_id: "a".into(),
                action: AiAction::CyberpunkStyle,
                text: LINK_FAILURE_FALLBACK.into(),
            },
            Instant::now(),
        );
        assert_eq!(editor.content.value, LINK_FAILURE_FALLBACK);
    }

    #[test]
    fn outcome_for_other_note_is_not_applied() {
        let mut editor = EditorState::new();
        editor.load(Some(&stored("a", "t", "draft")));
        editor.begin_ai(AiAction::Expand).unwrap();
        editor.load(Some(&stored("b", "t", "other")));
        let applied = editor.finish_ai(
            &AiOutcome {
                note_id: "a".into(),
                action: AiAction::Expand,
                text: "more".into(),
            },
            Instant::now(),
        );
        assert!(!applied);
        assert_eq!(editor.content.value, "other");
        assert!(editor.ai_in_flight().is_none());
    }

    #[test]
    fn cursor_moves_across_lines() {
        let mut field = FieldValue::new("abc\nde\nfghi");
        field.move_up();
        assert_eq!(field.cursor, "abc\nde".len());
        field.move_up();
        assert_eq!(field.cursor, 2);
        field.move_down();
        field.move_down();
        assert_eq!(field.cursor, "abc\nde\nfg".len());
        field.move_left();
        field.insert_char('é');
        assert_eq!(field.value, "abc\nde\nféghi");
        assert!(field.backspace());
        assert_eq!(field.value, "abc\nde\nfghi");
    }

    #[test]
    fn status_helpers() {
        let mut editor = EditorState::new();
        editor.load(Some(&stored("a", "", "one\ntwo")));
        assert_eq!(editor.line_count(), 2);
        assert_eq!(editor.char_count(), 7);
        assert!(!editor.is_stable());
        editor.insert_char('T', Instant::now());
        assert!(editor.is_stable());
    }
}

use crate::ai::{AiAction, AiService};
use crate::config::Config;
use crate::editor::{AiOutcome, EditorField, EditorState, FieldValue};
use crate::model::Note;
use crate::storage::{JsonFileStorage, StorageError, StoreLocation};
use crate::store::{NoteStore, DELETE_PROMPT};
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use log::{error, info};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::{Alignment, Color, Modifier, Rect, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Terminal;
use std::io::{stdout, Stdout};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

const ACCENT: Color = Color::Cyan;
const NEON: Color = Color::LightMagenta;
const BACKGROUND: Color = Color::Rgb(2, 6, 23);
const SIDEBAR_WIDTH: u16 = 36;

pub fn run(location: StoreLocation, config: Config, runtime: Handle) -> Result<()> {
    let mut terminal = setup_terminal()?;
    let mut app = App::new(location, config, runtime);
    let result = app.event_loop(&mut terminal);
    app.flush_editor();
    teardown_terminal(&mut terminal)?;
    result
}

struct App {
    location: StoreLocation,
    config: Config,
    store: Option<NoteStore>,
    failure: Option<String>,
    editor: EditorState,
    focus: Focus,
    mode: Mode,
    selected: usize,
    list_offset: usize,
    last_save: Option<Instant>,
    status: String,
    ai: AiService,
    runtime: Handle,
    ai_tx: Sender<AiOutcome>,
    ai_rx: Receiver<AiOutcome>,
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Focus {
    Sidebar,
    Search,
    Editor,
}

enum Mode {
    Normal,
    AiPanel,
    ConfirmDelete { note_id: String },
}

impl App {
    fn new(location: StoreLocation, config: Config, runtime: Handle) -> Self {
        let (ai_tx, ai_rx) = mpsc::channel();
        let ai = AiService::new(config.ai.clone());
        let mut app = App {
            location,
            config,
            store: None,
            failure: None,
            editor: EditorState::new(),
            focus: Focus::Sidebar,
            mode: Mode::Normal,
            selected: 0,
            list_offset: 0,
            last_save: None,
            status: String::new(),
            ai,
            runtime,
            ai_tx,
            ai_rx,
        };
        app.boot();
        app
    }

    /// (Re)loads the collection from disk. A failed load leaves the app on
    /// the failure screen instead of exiting.
    fn boot(&mut self) {
        let storage = JsonFileStorage::new(&self.location);
        match NoteStore::open(Box::new(storage)) {
            Ok(store) => {
                self.status = format!(
                    "> SYSTEM READY  •  {} nodes from {}",
                    store.len(),
                    self.location.data_path().display()
                );
                self.store = Some(store);
                self.failure = None;
            }
            Err(err) => {
                error!("failed to load notes: {}", err);
                self.store = None;
                self.failure = Some(err.to_string());
            }
        }
        self.editor = EditorState::new();
        self.focus = Focus::Sidebar;
        self.mode = Mode::Normal;
        self.selected = 0;
        self.list_offset = 0;
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        loop {
            self.tick(Instant::now());
            terminal.draw(|f| self.draw(f))?;
            if event::poll(Duration::from_millis(200))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key) {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Timer work: finished AI requests, then the idle auto-commit.
    fn tick(&mut self, now: Instant) {
        while let Ok(outcome) = self.ai_rx.try_recv() {
            self.apply_ai_outcome(outcome, now);
        }
        let idle = self.config.autosave_idle();
        let Some(store) = self.store.as_mut() else {
            return;
        };
        let Some(active) = store.active_note() else {
            return;
        };
        if let Some(updated) = self.editor.due_commit(active, now, idle) {
            let result = store.update_note(updated).map(|_| ());
            self.after_write(result, "Auto-saved");
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if ctrl && matches!(key.code, KeyCode::Char('q') | KeyCode::Char('c')) {
            return true;
        }
        if self.failure.is_some() {
            return self.handle_failure_key(key);
        }
        match self.mode {
            Mode::ConfirmDelete { .. } => {
                self.handle_confirm_key(key);
                false
            }
            Mode::AiPanel => {
                self.handle_ai_panel_key(key);
                false
            }
            Mode::Normal => match self.focus {
                Focus::Sidebar => self.handle_sidebar_key(key),
                Focus::Search => {
                    self.handle_search_key(key);
                    false
                }
                Focus::Editor => {
                    self.handle_editor_key(key);
                    false
                }
            },
        }
    }

    fn handle_failure_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('r') | KeyCode::Enter => {
                info!("rebooting after load failure");
                self.boot();
            }
            KeyCode::Char('x') => {
                match JsonFileStorage::new(&self.location).quarantine() {
                    Ok(moved) => {
                        self.boot();
                        if let Some(path) = moved {
                            self.status = format!("Corrupt data moved to {}", path.display());
                        }
                    }
                    Err(err) => self.failure = Some(err.to_string()),
                }
            }
            _ => {}
        }
        false
    }

    fn handle_sidebar_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('n') => self.create_note(),
            KeyCode::Char('/') => {
                self.focus = Focus::Search;
                self.status = "SCAN DATABASE... (Enter/Esc to finish)".into();
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = self.selected.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.selected += 1;
                self.clamp_selection();
            }
            KeyCode::Enter | KeyCode::Right | KeyCode::Char('l') => {
                if let Some(id) = self.highlighted_id() {
                    self.open_note(&id);
                }
            }
            KeyCode::Tab => {
                if self.editor.note_id().is_some() {
                    self.focus = Focus::Editor;
                }
            }
            KeyCode::Char('d') | KeyCode::Delete => {
                if let Some(id) = self.highlighted_id() {
                    self.mode = Mode::ConfirmDelete { note_id: id };
                } else {
                    self.status = "No data node selected".into();
                }
            }
            _ => {}
        }
        false
    }

    fn handle_search_key(&mut self, key: KeyEvent) {
        let Some(store) = self.store.as_mut() else {
            return;
        };
        let mut term = store.search_term().to_string();
        match key.code {
            KeyCode::Esc | KeyCode::Enter | KeyCode::Down | KeyCode::Tab => {
                self.focus = Focus::Sidebar;
                self.status.clear();
                return;
            }
            KeyCode::Backspace => {
                term.pop();
            }
            KeyCode::Char(c) => {
                if key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
                {
                    return;
                }
                term.push(c);
            }
            _ => return,
        }
        store.set_search_term(term);
        self.clamp_selection();
    }

    fn handle_editor_key(&mut self, key: KeyEvent) {
        let now = Instant::now();
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => {
                self.focus = Focus::Sidebar;
            }
            KeyCode::Char('s') if ctrl => self.save_active(),
            KeyCode::Char('a') if ctrl => self.open_ai_panel(),
            KeyCode::F(2) => self.open_ai_panel(),
            KeyCode::Tab | KeyCode::BackTab => self.editor.next_field(),
            KeyCode::Left => self.editor.active_field_mut().move_left(),
            KeyCode::Right => self.editor.active_field_mut().move_right(),
            KeyCode::Up => self.editor.active_field_mut().move_up(),
            KeyCode::Down => self.editor.active_field_mut().move_down(),
            KeyCode::Enter => match self.editor.field {
                EditorField::Title => self.editor.next_field(),
                EditorField::Content => self.editor.insert_char('\n', now),
            },
            KeyCode::Backspace => self.editor.backspace(now),
            KeyCode::Char(c) => {
                if !key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
                {
                    self.editor.insert_char(c, now);
                }
            }
            _ => {}
        }
    }

    fn handle_ai_panel_key(&mut self, key: KeyEvent) {
        let action = match key.code {
            KeyCode::Esc => {
                self.mode = Mode::Normal;
                return;
            }
            KeyCode::Char('1') | KeyCode::Char('g') => AiAction::FixGrammar,
            KeyCode::Char('2') | KeyCode::Char('e') => AiAction::Expand,
            KeyCode::Char('3') | KeyCode::Char('s') => AiAction::Summarize,
            KeyCode::Char('4') | KeyCode::Char('c') => AiAction::CyberpunkStyle,
            _ => return,
        };
        self.mode = Mode::Normal;
        self.start_ai(action);
    }

    fn handle_confirm_key(&mut self, key: KeyEvent) {
        let note_id = match &self.mode {
            Mode::ConfirmDelete { note_id } => note_id.clone(),
            _ => return,
        };
        let mut answer = match key.code {
            KeyCode::Char('y') | KeyCode::Enter => true,
            KeyCode::Char('n') | KeyCode::Esc => false,
            _ => return,
        };
        self.mode = Mode::Normal;
        let Some(store) = self.store.as_mut() else {
            return;
        };
        match store.delete_note(&note_id, &mut answer) {
            Ok(true) => {
                self.last_save = Some(Instant::now());
                self.status = "Data node purged".into();
            }
            Ok(false) => self.status = "Purge aborted".into(),
            Err(err) => {
                error!("delete of {} failed to persist: {}", note_id, err);
                self.status = format!("Write failed: {}", err);
            }
        }
        self.sync_editor();
        self.clamp_selection();
    }

    fn open_ai_panel(&mut self) {
        if self.editor.ai_in_flight().is_some() {
            self.status = "PROCESSING... neural link busy".into();
            return;
        }
        self.mode = Mode::AiPanel;
    }

    fn start_ai(&mut self, action: AiAction) {
        let Some(request) = self.editor.begin_ai(action) else {
            if self.editor.ai_in_flight().is_none() {
                self.status = "Nothing to process: data stream is empty".into();
            }
            return;
        };
        info!("starting AI action {:?} on {}", action, request.note_id);
        self.status = format!("{} ... PROCESSING", action.label());
        let service = self.ai.clone();
        let tx = self.ai_tx.clone();
        self.runtime.spawn(async move {
            let text = service.process(&request.content, request.action).await;
            // The receiver only disappears when the UI has exited.
            let _ = tx.send(AiOutcome {
                note_id: request.note_id,
                action: request.action,
                text,
            });
        });
    }

    fn apply_ai_outcome(&mut self, outcome: AiOutcome, now: Instant) {
        self.status = format!("{} complete", outcome.action.label());
        if self.editor.finish_ai(&outcome, now) {
            return;
        }
        // The editor moved on; merge straight into the note the request was for.
        let Some(store) = self.store.as_mut() else {
            return;
        };
        let Some(mut note) = store.get(&outcome.note_id).cloned() else {
            return;
        };
        note.content = outcome
            .action
            .merge_policy()
            .apply(&note.content, &outcome.text);
        note.touch();
        let result = store.update_note(note).map(|_| ());
        self.after_write(result, format!("{} merged into background node", outcome.action.label()));
    }

    fn create_note(&mut self) {
        self.flush_editor();
        let Some(store) = self.store.as_mut() else {
            return;
        };
        let result = store.create_note().map(|_| ());
        self.after_write(result, "New data node initialized");
        self.sync_editor();
        self.select_active_in_list();
        self.focus = Focus::Editor;
    }

    fn open_note(&mut self, id: &str) {
        if self.editor.note_id() != Some(id) {
            self.flush_editor();
        }
        if let Some(store) = self.store.as_mut() {
            store.select(id);
        }
        self.sync_editor();
        self.focus = Focus::Editor;
    }

    fn save_active(&mut self) {
        let Some(store) = self.store.as_mut() else {
            return;
        };
        let Some(active) = store.active_note() else {
            return;
        };
        match self.editor.commit(active) {
            Some(updated) => {
                let result = store.update_note(updated).map(|_| ());
                self.after_write(result, "Saved");
            }
            None => self.status = "No changes to save".into(),
        }
    }

    /// Commits pending buffer edits for the loaded note right away.
    fn flush_editor(&mut self) {
        if !self.editor.has_pending() {
            return;
        }
        let Some(store) = self.store.as_mut() else {
            return;
        };
        let Some(loaded) = self.editor.note_id().and_then(|id| store.get(id)) else {
            return;
        };
        if let Some(updated) = self.editor.commit(loaded) {
            let result = store.update_note(updated).map(|_| ());
            self.after_write(result, "Saved");
        }
    }

    fn sync_editor(&mut self) {
        let active = self.store.as_ref().and_then(|s| s.active_note());
        self.editor.load(active);
        if active.is_none() && self.focus == Focus::Editor {
            self.focus = Focus::Sidebar;
        }
    }

    fn after_write(&mut self, result: Result<(), StorageError>, message: impl Into<String>) {
        match result {
            Ok(()) => {
                self.last_save = Some(Instant::now());
                self.status = message.into();
            }
            Err(err) => {
                error!("persisting notes failed: {}", err);
                self.status = format!("Write failed: {}", err);
            }
        }
    }

    fn visible_ids(&self) -> Vec<String> {
        self.store
            .as_ref()
            .map(|s| s.visible_notes().iter().map(|n| n.id.clone()).collect())
            .unwrap_or_default()
    }

    fn highlighted_id(&self) -> Option<String> {
        self.visible_ids().get(self.selected).cloned()
    }

    fn clamp_selection(&mut self) {
        let len = self.visible_ids().len();
        self.selected = self.selected.min(len.saturating_sub(1));
    }

    fn select_active_in_list(&mut self) {
        let active = self.editor.note_id().map(str::to_string);
        if let Some(idx) = active.and_then(|id| self.visible_ids().iter().position(|v| *v == id)) {
            self.selected = idx;
        }
    }

    fn draw(&mut self, f: &mut ratatui::Frame<'_>) {
        let full = f.size();
        f.render_widget(Block::default().style(Style::default().bg(BACKGROUND)), full);

        if let Some(message) = self.failure.clone() {
            self.draw_failure(f, full, &message);
            return;
        }

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(8), Constraint::Length(2)])
            .split(full);
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(20)])
            .split(rows[0]);

        self.draw_sidebar(f, columns[0]);
        if self.editor.note_id().is_some() {
            self.draw_editor(f, columns[1]);
        } else {
            self.draw_welcome(f, columns[1]);
        }
        self.draw_footer(f, rows[1]);

        match &self.mode {
            Mode::ConfirmDelete { note_id } => self.draw_confirm(f, note_id),
            Mode::AiPanel | Mode::Normal => {}
        }
    }

    fn draw_sidebar(&mut self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let sections = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(2),
                Constraint::Length(3),
                Constraint::Min(3),
                Constraint::Length(1),
            ])
            .split(area);

        let header = Paragraph::new(Line::from(vec![
            Span::styled(
                "CYBER",
                Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                "NOTES",
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            ),
            Span::styled("  [n] New Data Node", Style::default().fg(Color::DarkGray)),
        ]))
        .block(
            Block::default()
                .borders(Borders::BOTTOM)
                .border_style(Style::default().fg(Color::DarkGray)),
        );
        f.render_widget(header, sections[0]);

        let search_focused = self.focus == Focus::Search;
        let term = self
            .store
            .as_ref()
            .map(|s| s.search_term().to_string())
            .unwrap_or_default();
        let search_line = if term.is_empty() && !search_focused {
            Line::from(Span::styled(
                "SCAN DATABASE... [/]",
                Style::default().fg(Color::DarkGray),
            ))
        } else {
            let shown = if search_focused {
                format!("{}▌", term)
            } else {
                term
            };
            Line::from(Span::styled(shown, Style::default().fg(Color::LightCyan)))
        };
        let search = Paragraph::new(search_line).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(if search_focused {
                    ACCENT
                } else {
                    Color::DarkGray
                })),
        );
        f.render_widget(search, sections[1]);

        self.draw_note_list(f, sections[2]);

        let count = self.store.as_ref().map(|s| s.visible_notes().len()).unwrap_or(0);
        let footer = Paragraph::new(Line::from(vec![
            Span::styled(
                format!("MEM: {} NODES", count),
                Style::default().fg(Color::DarkGray),
            ),
            Span::raw("   "),
            Span::styled("SYS: ONLINE", Style::default().fg(Color::DarkGray)),
        ]));
        f.render_widget(footer, sections[3]);
    }

    fn draw_note_list(&mut self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let focused = self.focus == Focus::Sidebar;
        let block = Block::default()
            .borders(Borders::RIGHT)
            .border_style(Style::default().fg(if focused { ACCENT } else { Color::DarkGray }));
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let notes = store.visible_notes();
        if notes.is_empty() {
            let empty = Paragraph::new(vec![
                Line::from(""),
                Line::from(Span::styled(
                    "NO DATA FOUND",
                    Style::default().fg(Color::DarkGray),
                )),
            ])
            .alignment(Alignment::Center)
            .block(block);
            f.render_widget(empty, area);
            return;
        }

        let width = area.width.saturating_sub(3) as usize;
        let active = store.active_note_id();
        let items = notes
            .iter()
            .map(|note| note_item(note, width, active == Some(note.id.as_str())))
            .collect::<Vec<_>>();
        let selected = self.selected.min(items.len().saturating_sub(1));
        let viewport = (area.height as usize) / 3;
        let offset = adjust_offset(selected, self.list_offset, viewport, 1, items.len());

        let mut state = ListState::default();
        *state.offset_mut() = offset;
        state.select(Some(selected));
        let list = List::new(items).block(block).highlight_style(
            Style::default()
                .bg(Color::Rgb(8, 51, 68))
                .add_modifier(Modifier::BOLD),
        );
        f.render_stateful_widget(list, area, &mut state);
        self.list_offset = offset;
    }

    fn draw_editor(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let ai_open = matches!(self.mode, Mode::AiPanel);
        let sections = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(if ai_open { 4 } else { 0 }),
                Constraint::Min(3),
                Constraint::Length(1),
            ])
            .split(area);

        let editing = self.focus == Focus::Editor;
        let title_active = editing && self.editor.field == EditorField::Title;
        let busy = self.editor.ai_in_flight().is_some();
        let title_text = field_text(&self.editor.title, title_active);
        let title = Paragraph::new(if title_text.is_empty() {
            Line::from(Span::styled(
                "ENTER NODE TITLE...",
                Style::default().fg(Color::DarkGray),
            ))
        } else {
            Line::from(Span::styled(
                title_text.to_uppercase(),
                Style::default()
                    .fg(Color::LightCyan)
                    .add_modifier(Modifier::BOLD),
            ))
        })
        .block(
            Block::default()
                .borders(Borders::BOTTOM)
                .border_style(Style::default().fg(if title_active { ACCENT } else { Color::DarkGray }))
                .title(Span::styled(
                    if busy { " PROCESSING... " } else { " AI LINK [Ctrl+A] " },
                    Style::default().fg(NEON).add_modifier(if busy {
                        Modifier::BOLD | Modifier::SLOW_BLINK
                    } else {
                        Modifier::BOLD
                    }),
                ))
                .title_alignment(Alignment::Right),
        );
        f.render_widget(title, sections[0]);

        if ai_open {
            self.draw_ai_panel(f, sections[1]);
        }

        let content_active = editing && self.editor.field == EditorField::Content;
        let content_text = field_text(&self.editor.content, content_active);
        let content_lines: Vec<Line<'static>> = if content_text.is_empty() {
            vec![Line::from(Span::styled(
                "Initialize data stream...",
                Style::default().fg(Color::DarkGray),
            ))]
        } else {
            content_text
                .split('\n')
                .map(|l| Line::from(Span::styled(l.to_string(), Style::default().fg(Color::Gray))))
                .collect()
        };
        let cursor_line = self.editor.content.value[..self.editor.content.cursor]
            .matches('\n')
            .count();
        let height = sections[2].height.saturating_sub(2) as usize;
        let scroll = cursor_line.saturating_sub(height.saturating_sub(1)) as u16;
        let content = Paragraph::new(content_lines)
            .wrap(Wrap { trim: false })
            .scroll((scroll, 0))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(if content_active {
                        ACCENT
                    } else {
                        Color::DarkGray
                    })),
            );
        f.render_widget(content, sections[2]);

        let (indicator, indicator_color) = if self.editor.is_stable() {
            ("● SYSTEM STABLE", Color::LightGreen)
        } else {
            ("● WAITING FOR INPUT", Color::Yellow)
        };
        let status_bar = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(sections[3]);
        f.render_widget(
            Paragraph::new(Span::styled(
                format!(
                    "Ln {}, Col {}",
                    self.editor.line_count(),
                    self.editor.char_count()
                ),
                Style::default().fg(Color::DarkGray),
            )),
            status_bar[0],
        );
        f.render_widget(
            Paragraph::new(Span::styled(indicator, Style::default().fg(indicator_color)))
                .alignment(Alignment::Right),
            status_bar[1],
        );
    }

    fn draw_ai_panel(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let mut spans = Vec::new();
        for (idx, action) in AiAction::ALL.iter().enumerate() {
            spans.push(Span::styled(
                format!("[{}] ", idx + 1),
                Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
            ));
            let color = if *action == AiAction::CyberpunkStyle {
                NEON
            } else {
                Color::White
            };
            spans.push(Span::styled(action.label(), Style::default().fg(color)));
            spans.push(Span::raw("   "));
        }
        let panel = Paragraph::new(vec![
            Line::from(spans),
            Line::from(Span::styled(
                "Esc to close",
                Style::default().fg(Color::DarkGray),
            )),
        ])
        .block(
            Block::default()
                .borders(Borders::BOTTOM)
                .border_style(Style::default().fg(NEON)),
        );
        f.render_widget(Clear, area);
        f.render_widget(panel, area);
    }

    fn draw_welcome(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let empty = self.store.as_ref().map_or(true, |s| s.is_empty());
        let lines = vec![
            Line::from(""),
            Line::from(vec![
                Span::styled(
                    "CYBER",
                    Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
                ),
                Span::styled(
                    "NOTES",
                    Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
                ),
            ]),
            Line::from(""),
            Line::from(Span::styled("> SYSTEM READY", Style::default().fg(Color::DarkGray))),
            Line::from(Span::styled(
                "> NEURAL LINK ESTABLISHED",
                Style::default().fg(Color::DarkGray),
            )),
            Line::from(Span::styled(
                if empty {
                    "> PRESS [n] TO INITIALIZE A DATA NODE"
                } else {
                    "> SELECT A DATA NODE TO BEGIN"
                },
                Style::default().fg(Color::DarkGray),
            )),
        ];
        let area = centered_rect(60, 50, area);
        f.render_widget(Paragraph::new(lines).alignment(Alignment::Center), area);
    }

    fn draw_footer(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let help = match (&self.mode, self.focus) {
            (Mode::AiPanel, _) => "1-4 choose action • Esc close",
            (Mode::ConfirmDelete { .. }, _) => "y confirm • n/Esc cancel",
            (_, Focus::Sidebar) => {
                "↑↓/jk browse • Enter open • n new • d delete • / search • Tab editor • q quit"
            }
            (_, Focus::Search) => "type to filter • Enter/Esc done",
            (_, Focus::Editor) => {
                "Tab field • Ctrl+S save • Ctrl+A AI link • Esc list • Ctrl+Q quit"
            }
        };
        let saved = self
            .last_save
            .map(|t| format!("saved {}", format_elapsed(t)))
            .unwrap_or_else(|| "not saved yet".into());
        let bottom = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(area);
        let status = Paragraph::new(Line::from(vec![
            Span::styled(self.status.clone(), Style::default().fg(Color::Gray)),
            Span::raw("  •  "),
            Span::styled(saved, Style::default().fg(Color::DarkGray)),
            Span::raw("  •  "),
            Span::styled(self.location.scope.label(), Style::default().fg(Color::Green)),
        ]))
        .block(
            Block::default()
                .borders(Borders::TOP)
                .border_style(Style::default().fg(Color::DarkGray)),
        );
        f.render_widget(status, bottom[0]);
        let help_bar = Paragraph::new(Span::styled(help, Style::default().fg(Color::LightCyan)))
            .alignment(Alignment::Right)
            .block(
                Block::default()
                    .borders(Borders::TOP)
                    .border_style(Style::default().fg(Color::DarkGray)),
            );
        f.render_widget(help_bar, bottom[1]);
    }

    fn draw_confirm(&self, f: &mut ratatui::Frame<'_>, note_id: &str) {
        let area = centered_rect(50, 30, f.size());
        let title = self
            .store
            .as_ref()
            .and_then(|s| s.get(note_id))
            .map(|n| n.display_title().to_string())
            .unwrap_or_else(|| note_id.to_string());
        let body = vec![
            Line::from(Span::styled(
                DELETE_PROMPT,
                Style::default()
                    .fg(Color::LightRed)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(Span::styled(title, Style::default().fg(Color::Gray))),
            Line::from(""),
            Line::from("Press y to confirm, n or Esc to cancel"),
        ];
        let dialog = Paragraph::new(body).alignment(Alignment::Center).block(
            Block::default()
                .title(Span::styled(
                    "Confirm Purge",
                    Style::default()
                        .fg(Color::LightRed)
                        .add_modifier(Modifier::BOLD),
                ))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::LightRed)),
        );
        f.render_widget(Clear, area);
        f.render_widget(dialog, area);
    }

    fn draw_failure(&self, f: &mut ratatui::Frame<'_>, area: Rect, message: &str) {
        let area = centered_rect(70, 60, area);
        let lines = vec![
            Line::from(Span::styled(
                "SYSTEM FAILURE",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(Span::styled(
                "CRITICAL ERROR DETECTED IN KERNEL.",
                Style::default().fg(Color::LightRed),
            )),
            Line::from(""),
            Line::from(Span::styled(
                message.to_string(),
                Style::default().fg(Color::LightRed).add_modifier(Modifier::DIM),
            )),
            Line::from(""),
            Line::from(vec![
                Span::styled("[r]", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
                Span::raw(" REBOOT SYSTEM   "),
                Span::styled("[x]", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
                Span::raw(" PURGE CORRUPT DATA   "),
                Span::styled("[q]", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
                Span::raw(" QUIT"),
            ]),
        ];
        let panel = Paragraph::new(lines)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Red)),
            );
        f.render_widget(Clear, area);
        f.render_widget(panel, area);
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn teardown_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn adjust_offset(
    selected: usize,
    current_offset: usize,
    viewport: usize,
    scrolloff: usize,
    len: usize,
) -> usize {
    if viewport == 0 || len == 0 {
        return 0;
    }
    let max_offset = len.saturating_sub(viewport);
    let margin = scrolloff.min(viewport.saturating_sub(1));
    let mut offset = current_offset.min(max_offset);
    if selected < offset.saturating_add(margin) {
        offset = selected.saturating_sub(margin);
    } else {
        let upper = offset
            .saturating_add(viewport.saturating_sub(1))
            .saturating_sub(margin);
        if selected > upper {
            offset = selected.saturating_add(margin + 1).saturating_sub(viewport);
        }
    }
    offset.min(max_offset)
}

fn field_text(field: &FieldValue, active: bool) -> String {
    if active {
        field.with_caret()
    } else {
        field.value.clone()
    }
}

fn truncate_text(text: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

fn note_item(note: &Note, width: usize, active: bool) -> ListItem<'static> {
    let marker = if active { "▌" } else { " " };
    let title_style = Style::default()
        .fg(if active { Color::LightCyan } else { Color::Gray })
        .add_modifier(Modifier::BOLD);
    let stamp = note
        .updated_local()
        .map(|dt| dt.format("%Y-%m-%d // %H:%M").to_string())
        .unwrap_or_default();
    let preview = if note.content.is_empty() {
        "Empty data node...".to_string()
    } else {
        note.content.replace('\n', " ")
    };
    let lines = vec![
        Line::from(vec![
            Span::styled(marker, Style::default().fg(ACCENT)),
            Span::styled(truncate_text(note.display_title(), width), title_style),
        ]),
        Line::from(vec![
            Span::styled(marker, Style::default().fg(ACCENT)),
            Span::styled(stamp, Style::default().fg(Color::DarkGray)),
        ]),
        Line::from(vec![
            Span::styled(marker, Style::default().fg(ACCENT)),
            Span::styled(
                truncate_text(&preview, width),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::DIM),
            ),
        ]),
    ];
    ListItem::new(lines)
}

fn format_elapsed(last: Instant) -> String {
    let secs = last.elapsed().as_secs();
    if secs < 60 {
        format!("{}s ago", secs)
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else {
        format!("{}h ago", secs / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{LINK_FAILURE_FALLBACK, SUMMARY_SEPARATOR};
    use crate::config::AiConfig;
    use crate::storage::Persistence;
    use tempfile::{tempdir, TempDir};
    use tokio::runtime::Runtime;

    /// A headless app over a fresh store; the AI endpoint is never reachable.
    fn headless() -> (App, TempDir, Runtime) {
        let dir = tempdir().unwrap();
        let runtime = Runtime::new().unwrap();
        let config = Config {
            ai: AiConfig {
                base_url: "http://127.0.0.1:1".into(),
                api_key_env: "CYBERNOTES_UI_TEST_KEY_NEVER_SET".into(),
                ..AiConfig::default()
            },
            ..Config::default()
        };
        let app = App::new(StoreLocation::custom(dir.path()), config, runtime.handle().clone());
        (app, dir, runtime)
    }

    fn type_content(app: &mut App, text: &str, at: Instant) {
        app.editor.field = EditorField::Content;
        for ch in text.chars() {
            app.editor.insert_char(ch, at);
        }
    }

    fn stored_content(app: &App, id: &str) -> String {
        app.store.as_ref().unwrap().get(id).unwrap().content.clone()
    }

    fn on_disk(dir: &TempDir, id: &str) -> Note {
        let storage = JsonFileStorage::new(&StoreLocation::custom(dir.path()));
        let notes = storage.load().unwrap();
        notes.into_iter().find(|n| n.id == id).unwrap()
    }

    #[test]
    fn switching_notes_flushes_pending_edits() {
        let (mut app, dir, _rt) = headless();
        app.create_note();
        let first = app.editor.note_id().unwrap().to_string();
        app.create_note();
        let second = app.editor.note_id().unwrap().to_string();

        app.open_note(&first);
        type_content(&mut app, "Z", Instant::now());
        app.open_note(&second);

        assert_eq!(app.editor.note_id(), Some(second.as_str()));
        assert_eq!(on_disk(&dir, &first).content, "Z");
    }

    #[test]
    fn store_sees_edits_only_after_idle_period() {
        let (mut app, dir, _rt) = headless();
        app.create_note();
        let id = app.editor.note_id().unwrap().to_string();
        let start = Instant::now();
        type_content(&mut app, "Q", start);

        app.tick(start + Duration::from_millis(500));
        assert_eq!(stored_content(&app, &id), "");

        app.tick(start + Duration::from_millis(1000));
        assert_eq!(stored_content(&app, &id), "Q");
        assert_eq!(on_disk(&dir, &id).content, "Q");
    }

    #[test]
    fn late_ai_result_merges_into_the_note_it_was_for() {
        let (mut app, _dir, _rt) = headless();
        app.create_note();
        let first = app.editor.note_id().unwrap().to_string();
        type_content(&mut app, "x", Instant::now());
        app.save_active();
        app.start_ai(AiAction::Summarize);

        app.create_note();
        let outcome = app.ai_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(outcome.note_id, first);
        app.apply_ai_outcome(outcome, Instant::now());

        assert_ne!(app.editor.note_id(), Some(first.as_str()));
        assert_eq!(
            stored_content(&app, &first),
            format!("x{}{}", SUMMARY_SEPARATOR, LINK_FAILURE_FALLBACK)
        );
        assert!(app.editor.content.value.is_empty());
    }

    #[test]
    fn one_ai_request_at_a_time_across_notes() {
        let (mut app, _dir, _rt) = headless();
        app.create_note();
        type_content(&mut app, "first", Instant::now());
        app.start_ai(AiAction::Summarize);

        app.create_note();
        type_content(&mut app, "second", Instant::now());
        app.start_ai(AiAction::Expand);
        assert_eq!(app.editor.ai_in_flight(), Some(AiAction::Summarize));

        let outcome = app.ai_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(outcome.action, AiAction::Summarize);
        app.apply_ai_outcome(outcome, Instant::now());
        assert_eq!(app.editor.ai_in_flight(), None);
        assert!(app.ai_rx.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[test]
    fn offset_keeps_selection_visible() {
        assert_eq!(adjust_offset(0, 0, 5, 1, 20), 0);
        assert_eq!(adjust_offset(10, 0, 5, 1, 20), 7);
        assert_eq!(adjust_offset(2, 7, 5, 1, 20), 1);
        assert_eq!(adjust_offset(19, 0, 5, 1, 20), 15);
        assert_eq!(adjust_offset(3, 0, 0, 1, 20), 0);
    }

    #[test]
    fn truncation_marks_cut_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("a much longer title", 10), "a much ...");
        assert_eq!(truncate_text("anything", 0), "");
    }
}

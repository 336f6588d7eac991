//! The interactive ledger: a record table over the lazily-growing list, with
//! per-row editors, confirmation-gated deletes and a taxonomy prompt.
//!
//! Input handling is synchronous and never blocks on the store. Key handlers
//! queue [`Effect`]s; between frames the effects are spawned onto the runtime
//! and their completions come back over a channel as [`StoreEvent`]s, so every
//! state transition lives in plain sequential code that tests can drive
//! without a terminal.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Cell, Paragraph, Row, Table, TableState},
    Frame,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::debug;

use crate::cache::{CacheKey, QueryCache};
use crate::deleter::{DeleteFlow, DeleteState, MIN_WAIT};
use crate::error::Result;
use crate::fmt::display_date;
use crate::models::{Field, Record};
use crate::records::RecordList;
use crate::row::{Draft, DraftField, EditAction, FieldOptions, RowEditor};
use crate::store::StoreRef;
use crate::tags::{self, TagPager};
use crate::taxonomy::TaxonomyStore;
use crate::tui::{
    install_panic_hook, money_span, FIELD_LABEL_STYLE, FOOTER_STYLE, HEADER_STYLE, SELECTED_STYLE,
    STATUS_STYLE,
};

/// Poll timeout for the event loop; one status tick per timeout.
const TICK: Duration = Duration::from_millis(50);
/// Ticks before a status message clears, about three seconds.
const STATUS_TTL: u16 = 60;
/// Rows jumped by PageUp/PageDown.
const JUMP: usize = 10;
/// Height of the edit panel under the table.
const PANEL_HEIGHT: u16 = 12;

pub enum LedgerAction {
    Continue,
    Close,
}

/// Where a commit completion should land once the store answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotKey {
    New,
    Row(i64),
}

/// Completions flowing back from spawned store work.
#[derive(Debug)]
pub enum StoreEvent {
    PageLoaded(std::result::Result<usize, String>),
    ListRefreshed(std::result::Result<(), String>),
    TaxonomyLoaded {
        field: Field,
        result: std::result::Result<(), String>,
    },
    ValueAdded {
        field: Field,
        value: String,
        result: std::result::Result<(), String>,
    },
    CommitFinished {
        generation: u64,
        result: std::result::Result<(), String>,
    },
    DeleteFinished {
        id: i64,
        attempt: u32,
        result: std::result::Result<(), String>,
    },
    DeleteTimerElapsed {
        id: i64,
        attempt: u32,
    },
}

/// Store work queued by the input handlers, spawned between frames.
#[derive(Debug, Clone, PartialEq)]
enum Effect {
    FetchNextPage,
    Refetch,
    LoadTaxonomies,
    AddValue { field: Field, value: String },
    Commit { generation: u64, record: Record },
    Delete { id: i64, attempt: u32 },
    DeleteTimer { id: i64, attempt: u32 },
}

enum Mode {
    Table,
    /// One-line prompt appending a value to the taxonomy picked with Left/Right.
    AddValue { field_idx: usize, input: String },
}

pub struct LedgerView {
    store: StoreRef,
    list: Arc<RecordList>,
    taxonomies: Arc<TaxonomyStore>,
    cache: Arc<QueryCache>,
    rows: Vec<Record>,
    selected: usize,
    scroll_offset: usize,
    last_visible_rows: usize,
    table_state: TableState,
    mode: Mode,
    editors: HashMap<i64, RowEditor>,
    new_editor: Option<RowEditor>,
    deletes: HashMap<i64, DeleteFlow>,
    commit_seq: u64,
    pending_commits: HashMap<u64, SlotKey>,
    pending_effects: Vec<Effect>,
    fetch_in_flight: bool,
    status: Option<String>,
    status_ttl: u16,
    events: mpsc::UnboundedReceiver<StoreEvent>,
    events_tx: mpsc::UnboundedSender<StoreEvent>,
}

impl LedgerView {
    pub fn new(store: StoreRef, cache: Arc<QueryCache>) -> Self {
        let list = Arc::new(RecordList::new(Arc::clone(&store), Arc::clone(&cache)));
        let taxonomies = Arc::new(TaxonomyStore::new(Arc::clone(&store), Arc::clone(&cache)));
        let (events_tx, events) = mpsc::unbounded_channel();
        Self {
            store,
            list,
            taxonomies,
            cache,
            rows: Vec::new(),
            selected: 0,
            scroll_offset: 0,
            last_visible_rows: 20,
            table_state: TableState::default(),
            mode: Mode::Table,
            editors: HashMap::new(),
            new_editor: None,
            deletes: HashMap::new(),
            commit_seq: 0,
            pending_commits: HashMap::new(),
            pending_effects: Vec::new(),
            fetch_in_flight: false,
            status: None,
            status_ttl: 0,
            events,
            events_tx,
        }
    }

    // -----------------------------------------------------------------------
    // Slot bookkeeping
    // -----------------------------------------------------------------------

    /// Visible slots: the new-record slot (when open) pinned above the rows.
    fn slot_count(&self) -> usize {
        self.rows.len() + usize::from(self.new_editor.is_some())
    }

    fn record_at(&self, slot: usize) -> Option<&Record> {
        let idx = if self.new_editor.is_some() {
            slot.checked_sub(1)?
        } else {
            slot
        };
        self.rows.get(idx)
    }

    fn selected_record(&self) -> Option<&Record> {
        self.record_at(self.selected)
    }

    fn selected_editor(&self) -> Option<&RowEditor> {
        if self.new_editor.is_some() && self.selected == 0 {
            return self.new_editor.as_ref();
        }
        let id = self.selected_record().and_then(|r| r.id)?;
        self.editors.get(&id)
    }

    fn selected_editor_mut(&mut self) -> Option<&mut RowEditor> {
        if self.new_editor.is_some() && self.selected == 0 {
            return self.new_editor.as_mut();
        }
        let id = self.selected_record().and_then(|r| r.id)?;
        self.editors.get_mut(&id)
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some(message.into());
        self.status_ttl = STATUS_TTL;
    }

    fn tick(&mut self) {
        if self.status_ttl > 0 {
            self.status_ttl -= 1;
            if self.status_ttl == 0 {
                self.status = None;
            }
        }
    }

    /// Pull the list snapshot and drop per-row state whose record vanished.
    fn sync_rows(&mut self) {
        self.rows = self.list.rows();
        let ids: Vec<i64> = self.rows.iter().filter_map(|r| r.id).collect();
        self.editors.retain(|id, _| ids.contains(id));
        self.deletes.retain(|id, _| ids.contains(id));
        self.selected = self.selected.min(self.slot_count().saturating_sub(1));
    }

    fn ensure_visible(&mut self, visible_rows: usize) {
        if visible_rows == 0 {
            return;
        }
        if self.selected < self.scroll_offset {
            self.scroll_offset = self.selected;
        } else if self.selected >= self.scroll_offset + visible_rows {
            self.scroll_offset = self.selected - visible_rows + 1;
        }
    }

    // -----------------------------------------------------------------------
    // Input
    // -----------------------------------------------------------------------

    pub fn handle_key_event(&mut self, code: KeyCode) -> LedgerAction {
        if let Mode::AddValue { .. } = self.mode {
            self.handle_prompt_key(code);
            return LedgerAction::Continue;
        }

        // Page jumps always move the selection, even off an open editor.
        match code {
            KeyCode::PageDown => {
                self.move_selection(JUMP as isize);
                return LedgerAction::Continue;
            }
            KeyCode::PageUp => {
                self.move_selection(-(JUMP as isize));
                return LedgerAction::Continue;
            }
            _ => {}
        }

        if self.selected_editor().is_some() {
            self.forward_to_editor(code);
            return LedgerAction::Continue;
        }

        if matches!(code, KeyCode::Up | KeyCode::Down) {
            self.move_selection(if code == KeyCode::Up { -1 } else { 1 });
            return LedgerAction::Continue;
        }

        if let Some(id) = self.selected_record().and_then(|r| r.id) {
            if self.delete_prompt_open(id) {
                self.handle_delete_prompt_key(code, id);
                return LedgerAction::Continue;
            }
        }

        self.handle_table_key(code)
    }

    fn move_selection(&mut self, delta: isize) {
        let count = self.slot_count();
        if count == 0 {
            return;
        }
        if delta > 0 && self.selected == count - 1 {
            // Walked off the loaded extent; ask for another page.
            self.request_next_page();
        }
        let target = (self.selected as isize + delta).clamp(0, count as isize - 1);
        self.selected = target as usize;
        self.ensure_visible(self.last_visible_rows);
    }

    fn request_next_page(&mut self) {
        if self.fetch_in_flight || self.list.is_exhausted() {
            return;
        }
        self.fetch_in_flight = true;
        self.pending_effects.push(Effect::FetchNextPage);
    }

    fn handle_table_key(&mut self, code: KeyCode) -> LedgerAction {
        match code {
            KeyCode::Char('q') => return LedgerAction::Close,
            KeyCode::Enter | KeyCode::Char('e') => self.open_editor(),
            KeyCode::Char('n') => {
                if self.new_editor.is_none() {
                    self.new_editor = Some(RowEditor::create());
                }
                self.selected = 0;
                self.scroll_offset = 0;
            }
            KeyCode::Char('d') => {
                if let Some(id) = self.selected_record().and_then(|r| r.id) {
                    self.deletes.entry(id).or_insert_with(DeleteFlow::new).request();
                }
            }
            KeyCode::Char('m') => self.request_next_page(),
            KeyCode::Char('a') => {
                self.mode = Mode::AddValue {
                    field_idx: 0,
                    input: String::new(),
                };
            }
            _ => {}
        }
        LedgerAction::Continue
    }

    fn open_editor(&mut self) {
        let Some(record) = self.selected_record().cloned() else {
            return;
        };
        let Some(id) = record.id else { return };
        if self.deletes.contains_key(&id) {
            return;
        }
        self.editors.entry(id).or_insert_with(|| RowEditor::edit(&record));
    }

    fn forward_to_editor(&mut self, code: KeyCode) {
        let categories = self.taxonomies.values(Field::Category);
        let banks = self.taxonomies.values(Field::Bank);
        let types = self.taxonomies.values(Field::TransactionType);
        let options = FieldOptions {
            categories: &categories,
            banks: &banks,
            types: &types,
        };

        let was_new = self.new_editor.is_some() && self.selected == 0;
        let action = match self.selected_editor_mut() {
            Some(editor) => editor.handle_key(code, &options),
            None => return,
        };

        match action {
            EditAction::Consumed => {}
            EditAction::Cancelled => {
                if was_new {
                    self.new_editor = None;
                    self.drop_pending_for(SlotKey::New);
                    self.selected = self.selected.min(self.slot_count().saturating_sub(1));
                } else if let Some(id) = self.selected_record().and_then(|r| r.id) {
                    self.editors.remove(&id);
                    self.drop_pending_for(SlotKey::Row(id));
                }
            }
            EditAction::Commit(record) => {
                let key = match record.id {
                    Some(id) => SlotKey::Row(id),
                    None => SlotKey::New,
                };
                self.commit_seq += 1;
                self.pending_commits.insert(self.commit_seq, key);
                self.pending_effects.push(Effect::Commit {
                    generation: self.commit_seq,
                    record,
                });
            }
            EditAction::Invalid(message) => self.set_status(message),
        }
    }

    /// A cancelled slot must never receive a completion meant for its old
    /// draft, so forget any commit still in flight for it.
    fn drop_pending_for(&mut self, key: SlotKey) {
        self.pending_commits.retain(|_, k| *k != key);
    }

    fn delete_prompt_open(&self, id: i64) -> bool {
        matches!(
            self.deletes.get(&id).map(DeleteFlow::state),
            Some(DeleteState::ConfirmPending) | Some(DeleteState::Failed(_))
        )
    }

    fn handle_delete_prompt_key(&mut self, code: KeyCode, id: i64) {
        match code {
            KeyCode::Char('y') => {
                let attempt = self.deletes.get_mut(&id).and_then(|f| f.confirm());
                self.launch_delete(id, attempt);
            }
            KeyCode::Char('r') => {
                let attempt = self.deletes.get_mut(&id).and_then(|f| f.retry());
                self.launch_delete(id, attempt);
            }
            KeyCode::Char('n') | KeyCode::Esc => {
                let cancelled = self.deletes.get_mut(&id).map(|f| f.cancel()).unwrap_or(false);
                if cancelled {
                    self.deletes.remove(&id);
                }
            }
            _ => {}
        }
    }

    fn launch_delete(&mut self, id: i64, attempt: Option<u32>) {
        if let Some(attempt) = attempt {
            self.pending_effects.push(Effect::Delete { id, attempt });
            self.pending_effects.push(Effect::DeleteTimer { id, attempt });
        }
    }

    fn handle_prompt_key(&mut self, code: KeyCode) {
        let Mode::AddValue { field_idx, input } = &mut self.mode else {
            return;
        };
        match code {
            KeyCode::Esc => self.mode = Mode::Table,
            KeyCode::Left | KeyCode::BackTab => {
                *field_idx = (*field_idx + Field::ALL.len() - 1) % Field::ALL.len();
            }
            KeyCode::Right | KeyCode::Tab => {
                *field_idx = (*field_idx + 1) % Field::ALL.len();
            }
            KeyCode::Char(c) => input.push(c),
            KeyCode::Backspace => {
                input.pop();
            }
            KeyCode::Enter => {
                let field = Field::ALL[*field_idx];
                let value = input.trim().to_string();
                if value.is_empty() {
                    self.set_status(format!("A {} name is required", field.label()));
                } else {
                    self.pending_effects.push(Effect::AddValue { field, value });
                }
                self.mode = Mode::Table;
            }
            _ => {}
        }
    }

    // -----------------------------------------------------------------------
    // Store completions
    // -----------------------------------------------------------------------

    pub fn apply_store_event(&mut self, event: StoreEvent) {
        match event {
            StoreEvent::PageLoaded(result) => {
                self.fetch_in_flight = false;
                match result {
                    Ok(_) => self.sync_rows(),
                    Err(e) => self.set_status(e),
                }
            }
            StoreEvent::ListRefreshed(result) => {
                if let Err(e) = result {
                    self.set_status(e);
                }
                self.sync_rows();
            }
            StoreEvent::TaxonomyLoaded { result, .. } => {
                if let Err(e) = result {
                    self.set_status(e);
                }
                self.clamp_editors();
            }
            StoreEvent::ValueAdded { field, value, result } => match result {
                Ok(()) => {
                    self.set_status(format!("Added {}: {value}", field.label()));
                    self.clamp_editors();
                }
                Err(e) => self.set_status(e),
            },
            StoreEvent::CommitFinished { generation, result } => {
                self.finish_commit(generation, result);
            }
            StoreEvent::DeleteFinished { id, attempt, result } => {
                if let Some(flow) = self.deletes.get_mut(&id) {
                    match result {
                        Ok(()) => flow.call_succeeded(attempt),
                        Err(e) => flow.call_failed(attempt, e),
                    }
                } else {
                    debug!(id, attempt, "delete completion for a vanished row");
                }
                self.reap_delete(id);
            }
            StoreEvent::DeleteTimerElapsed { id, attempt } => {
                if let Some(flow) = self.deletes.get_mut(&id) {
                    flow.timer_elapsed(attempt);
                }
                self.reap_delete(id);
            }
        }
    }

    fn finish_commit(&mut self, generation: u64, result: std::result::Result<(), String>) {
        let Some(key) = self.pending_commits.remove(&generation) else {
            // The draft was cancelled while the call was in flight. The write
            // may still have landed, so refresh, but touch no editor.
            debug!(generation, "dropping completion for an abandoned commit");
            if result.is_ok() {
                self.cache.invalidate(CacheKey::Records);
                self.pending_effects.push(Effect::Refetch);
            }
            return;
        };

        match result {
            Ok(()) => {
                match key {
                    SlotKey::New => {
                        self.new_editor = None;
                        self.selected = self.selected.min(self.slot_count().saturating_sub(1));
                    }
                    SlotKey::Row(id) => {
                        self.editors.remove(&id);
                    }
                }
                self.cache.invalidate(CacheKey::Records);
                self.pending_effects.push(Effect::Refetch);
                self.set_status("Saved");
            }
            Err(e) => {
                let editor = match key {
                    SlotKey::New => self.new_editor.as_mut(),
                    SlotKey::Row(id) => self.editors.get_mut(&id),
                };
                match editor {
                    Some(editor) => editor.commit_failed(),
                    None => debug!(generation, "commit failed for a closed editor"),
                }
                self.set_status(e);
            }
        }
    }

    fn reap_delete(&mut self, id: i64) {
        if self.deletes.get(&id).map(|f| f.is_done()).unwrap_or(false) {
            self.deletes.remove(&id);
            self.cache.invalidate(CacheKey::Records);
            self.pending_effects.push(Effect::Refetch);
            self.set_status("Record deleted");
        }
    }

    fn clamp_editors(&mut self) {
        let total = self.taxonomies.values(Field::TransactionType).len();
        for editor in self.editors.values_mut() {
            editor.clamp_tags(total);
        }
        if let Some(editor) = self.new_editor.as_mut() {
            editor.clamp_tags(total);
        }
    }

    // -----------------------------------------------------------------------
    // Effects
    // -----------------------------------------------------------------------

    /// Spawn queued store work onto the runtime; completions come back on the
    /// event channel.
    fn run_effects(&mut self, handle: &Handle) {
        for effect in std::mem::take(&mut self.pending_effects) {
            let tx = self.events_tx.clone();
            match effect {
                Effect::FetchNextPage => {
                    let list = Arc::clone(&self.list);
                    handle.spawn(async move {
                        let result = list.fetch_next_page().await.map_err(|e| e.to_string());
                        let _ = tx.send(StoreEvent::PageLoaded(result));
                    });
                }
                Effect::Refetch => {
                    let list = Arc::clone(&self.list);
                    handle.spawn(async move {
                        let result = list.refetch().await.map_err(|e| e.to_string());
                        let _ = tx.send(StoreEvent::ListRefreshed(result));
                    });
                }
                Effect::LoadTaxonomies => {
                    let taxonomies = Arc::clone(&self.taxonomies);
                    handle.spawn(async move {
                        for field in Field::ALL {
                            let result = taxonomies
                                .ensure_loaded(field)
                                .await
                                .map(|_| ())
                                .map_err(|e| e.to_string());
                            let _ = tx.send(StoreEvent::TaxonomyLoaded { field, result });
                        }
                    });
                }
                Effect::AddValue { field, value } => {
                    let taxonomies = Arc::clone(&self.taxonomies);
                    handle.spawn(async move {
                        let result = taxonomies
                            .add_value(field, &value)
                            .await
                            .map_err(|e| e.to_string());
                        let _ = tx.send(StoreEvent::ValueAdded { field, value, result });
                    });
                }
                Effect::Commit { generation, record } => {
                    let store = Arc::clone(&self.store);
                    handle.spawn(async move {
                        let result = if record.id.is_some() {
                            store.edit_record(&record).await
                        } else {
                            store.create_record(&record).await
                        };
                        let result = result.map_err(|e| e.to_string());
                        let _ = tx.send(StoreEvent::CommitFinished { generation, result });
                    });
                }
                Effect::Delete { id, attempt } => {
                    let store = Arc::clone(&self.store);
                    handle.spawn(async move {
                        let result = store.delete_record(id).await.map_err(|e| e.to_string());
                        let _ = tx.send(StoreEvent::DeleteFinished { id, attempt, result });
                    });
                }
                Effect::DeleteTimer { id, attempt } => {
                    handle.spawn(async move {
                        tokio::time::sleep(MIN_WAIT).await;
                        let _ = tx.send(StoreEvent::DeleteTimerElapsed { id, attempt });
                    });
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Event loop
    // -----------------------------------------------------------------------

    pub fn run(mut self, handle: &Handle) -> Result<()> {
        install_panic_hook();
        let mut terminal = ratatui::init();
        self.pending_effects.push(Effect::LoadTaxonomies);
        self.request_next_page();

        let exit = loop {
            self.tick();
            while let Ok(event) = self.events.try_recv() {
                self.apply_store_event(event);
            }
            self.run_effects(handle);

            if let Err(e) = terminal.draw(|frame| self.draw_frame(frame)) {
                break Err(e.into());
            }

            match event::poll(TICK) {
                Err(e) => break Err(e.into()),
                Ok(false) => continue,
                Ok(true) => match event::read() {
                    Err(e) => break Err(e.into()),
                    Ok(Event::Key(key)) => {
                        if key.kind != KeyEventKind::Press {
                            continue;
                        }
                        if key.modifiers.contains(KeyModifiers::CONTROL)
                            && key.code == KeyCode::Char('c')
                        {
                            break Ok(());
                        }
                        if let LedgerAction::Close = self.handle_key_event(key.code) {
                            break Ok(());
                        }
                    }
                    Ok(_) => {}
                },
            }
        };

        drop(terminal);
        ratatui::restore();
        exit
    }

    // -----------------------------------------------------------------------
    // Drawing
    // -----------------------------------------------------------------------

    fn draw_frame(&mut self, frame: &mut Frame) {
        let area = frame.area();
        let panel_open = self.selected_editor().is_some();
        let panel_height = if panel_open { PANEL_HEIGHT } else { 0 };

        let [header_area, sep_area, table_area, panel_area, status_area, hints_area] =
            Layout::vertical([
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Fill(1),
                Constraint::Length(panel_height),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .areas(area);

        frame.render_widget(Paragraph::new(" Tally ledger").style(HEADER_STYLE), header_area);
        let sep = "\u{2501}".repeat(area.width as usize);
        frame.render_widget(
            Paragraph::new(sep.as_str()).style(Style::default().fg(Color::DarkGray)),
            sep_area,
        );

        self.draw_table(frame, table_area);
        if panel_open {
            self.draw_editor_panel(frame, panel_area);
        }
        self.draw_status(frame, status_area);
        self.draw_hints(frame, hints_area);
    }

    fn draw_table(&mut self, frame: &mut Frame, area: Rect) {
        // Header row plus its bottom margin.
        let overhead = 2usize;
        self.last_visible_rows = (area.height as usize).saturating_sub(overhead).max(1);
        self.ensure_visible(self.last_visible_rows);

        let end = (self.scroll_offset + self.last_visible_rows).min(self.slot_count());
        let rendered: Vec<Row> = (self.scroll_offset..end).map(|slot| self.slot_row(slot)).collect();

        let widths = vec![
            Constraint::Length(2),
            Constraint::Length(10),
            Constraint::Fill(1),
            Constraint::Length(14),
            Constraint::Length(22),
            Constraint::Length(14),
            Constraint::Length(12),
        ];
        let header_cells = vec!["", "Date", "Name", "Category", "Types", "Bank", "Amount"];

        let highlight = if self.slot_count() == 0 {
            None
        } else {
            self.selected.checked_sub(self.scroll_offset)
        };
        self.table_state.select(highlight);

        let table = Table::new(rendered, widths)
            .header(Row::new(header_cells).style(HEADER_STYLE).bottom_margin(1))
            .column_spacing(1)
            .row_highlight_style(SELECTED_STYLE);
        frame.render_stateful_widget(table, area, &mut self.table_state);
    }

    fn slot_row(&self, slot: usize) -> Row<'static> {
        if self.new_editor.is_some() && slot == 0 {
            return Row::new(vec![
                Cell::from("+"),
                Cell::from(""),
                Cell::from(Span::styled("(new record)", Style::default().fg(Color::Cyan))),
                Cell::from(""),
                Cell::from(""),
                Cell::from(""),
                Cell::from(""),
            ]);
        }
        let Some(record) = self.record_at(slot) else {
            return Row::new(Vec::<Cell>::new());
        };
        let id = record.id.unwrap_or_default();
        let marker = if self.editors.contains_key(&id) {
            "*"
        } else if self.deletes.contains_key(&id) {
            "!"
        } else {
            ""
        };
        Row::new(vec![
            Cell::from(marker),
            Cell::from(display_date(record.date)),
            Cell::from(record.name.clone()),
            Cell::from(record.category.clone()),
            Cell::from(record.transaction_types.join("/")),
            Cell::from(record.bank.clone()),
            Cell::from(money_span(record.amount)),
        ])
    }

    fn draw_editor_panel(&self, frame: &mut Frame, area: Rect) {
        let Some(editor) = self.selected_editor() else {
            return;
        };
        let Some(draft) = editor.draft() else { return };
        let types = self.taxonomies.values(Field::TransactionType);

        let title = if editor.is_new() { "New record" } else { "Edit record" };
        let mut lines = vec![
            Line::from(""),
            Line::from(Span::styled(
                format!(" {title}"),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
        ];

        for field in DraftField::ORDER {
            lines.push(field_line(editor, draft, field, &types));
        }

        lines.push(Line::from(vec![
            Span::styled(format!("   {:<10} ", "Selected"), FIELD_LABEL_STYLE),
            Span::raw(tags::summary(&draft.transaction_types)),
        ]));

        if editor.is_commit_pending() {
            lines.push(Line::from(Span::styled("   saving\u{2026}", STATUS_STYLE)));
        }

        frame.render_widget(Paragraph::new(lines), area);
    }

    fn draw_status(&self, frame: &mut Frame, area: Rect) {
        let count = self.slot_count();
        let from = if count == 0 { 0 } else { self.scroll_offset + 1 };
        let to = (self.scroll_offset + self.last_visible_rows).min(count);
        let tail = if self.list.is_exhausted() { " (all loaded)" } else { "" };
        let mut line = format!("Rows {from}-{to} of {count}{tail}");
        if self.fetch_in_flight {
            line.push_str(" | loading\u{2026}");
        }
        let (text, style) = match &self.status {
            Some(message) => (format!(" {line} | {message}"), STATUS_STYLE),
            None => (format!(" {line}"), FOOTER_STYLE),
        };
        frame.render_widget(Paragraph::new(text).style(style), area);
    }

    fn draw_hints(&self, frame: &mut Frame, area: Rect) {
        if let Mode::AddValue { field_idx, input } = &self.mode {
            let field = Field::ALL[*field_idx];
            frame.render_widget(
                Paragraph::new(format!(
                    " New {} value: {input}\u{2588}   \u{2190}/\u{2192}=pick field  Enter=save  Esc=cancel",
                    field.label()
                ))
                .style(STATUS_STYLE),
                area,
            );
            return;
        }

        if let Some(prompt) = self.delete_hint() {
            frame.render_widget(Paragraph::new(prompt).style(STATUS_STYLE), area);
            return;
        }

        let hints = if self.selected_editor().is_some() {
            " Tab=next field  \u{2190}/\u{2192}=cursor or cycle  [/]=tag pages  Space=toggle  Enter=save  Esc=cancel"
        } else {
            " \u{2191}/\u{2193}=move  Enter=edit  n=new  d=delete  a=add value  m=load more  q=quit"
        };
        frame.render_widget(Paragraph::new(hints).style(FOOTER_STYLE), area);
    }

    fn delete_hint(&self) -> Option<String> {
        let record = self.selected_record()?;
        let flow = self.deletes.get(&record.id?)?;
        match flow.state() {
            DeleteState::ConfirmPending => {
                Some(format!(" Delete '{}'? y=yes  n=no", record.name))
            }
            DeleteState::Failed(reason) => {
                Some(format!(" Delete failed: {reason}  r=retry  n=dismiss"))
            }
            DeleteState::InFlight { .. } | DeleteState::MinWaitPending => {
                Some(" Deleting\u{2026}".to_string())
            }
            _ => None,
        }
    }
}

fn field_line(
    editor: &RowEditor,
    draft: &Draft,
    field: DraftField,
    types: &[String],
) -> Line<'static> {
    let focused = editor.focus() == field;
    let label_style = if focused {
        FIELD_LABEL_STYLE.add_modifier(Modifier::BOLD)
    } else {
        FIELD_LABEL_STYLE
    };
    let label = Span::styled(format!("   {:<10} ", field.label()), label_style);

    let value = match field {
        DraftField::Date => text_span(&draft.date_text, focused, editor.cursor()),
        DraftField::Name => text_span(&draft.name, focused, editor.cursor()),
        DraftField::Amount => text_span(&draft.amount_text, focused, editor.cursor()),
        DraftField::Category => selector_span(&draft.category, focused),
        DraftField::Bank => selector_span(&draft.bank, focused),
        DraftField::Types => return tags_line(label, editor, draft, types, focused),
    };
    Line::from(vec![label, value])
}

fn text_span(text: &str, focused: bool, cursor: usize) -> Span<'static> {
    if !focused {
        return Span::raw(text.to_string());
    }
    let byte = text
        .char_indices()
        .nth(cursor)
        .map(|(b, _)| b)
        .unwrap_or(text.len());
    let shown = format!("{}\u{2588}{}", &text[..byte], &text[byte..]);
    Span::styled(shown, Style::default().fg(Color::Cyan))
}

fn selector_span(value: &str, focused: bool) -> Span<'static> {
    let shown = if value.is_empty() { "(none)" } else { value };
    if focused {
        Span::styled(format!("< {shown} >"), Style::default().fg(Color::Cyan))
    } else {
        Span::raw(shown.to_string())
    }
}

fn tags_line(
    label: Span<'static>,
    editor: &RowEditor,
    draft: &Draft,
    types: &[String],
    focused: bool,
) -> Line<'static> {
    let mut spans = vec![label];
    if types.is_empty() {
        spans.push(Span::raw("(no types yet; press 'a' in the table to add one)"));
        return Line::from(spans);
    }
    let pager = editor.tags();
    for (i, value) in pager.visible(types).iter().enumerate() {
        let checked = draft.transaction_types.iter().any(|t| t == value);
        let mark = if checked { "[x]" } else { "[ ]" };
        let style = if focused && i == pager.slot() {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default()
        };
        let pointer = if focused && i == pager.slot() { ">" } else { " " };
        spans.push(Span::styled(format!("{pointer}{mark} {value}  "), style));
    }
    spans.push(Span::styled(
        format!("page {}/{}", pager.page(), TagPager::page_count(types.len())),
        FOOTER_STYLE,
    ));
    Line::from(spans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::RowState;
    use crate::store::testing::MemoryStore;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn sample(id: i64, day: u32, name: &str) -> Record {
        Record {
            id: Some(id),
            date: NaiveDate::from_ymd_opt(2025, 6, day).unwrap(),
            name: name.to_string(),
            category: "Food".to_string(),
            transaction_types: Vec::new(),
            bank: "First National".to_string(),
            amount: Decimal::new(-1250, 2),
        }
    }

    fn view_with_rows(rows: Vec<Record>) -> LedgerView {
        let store: StoreRef = Arc::new(MemoryStore::new());
        let mut view = LedgerView::new(store, Arc::new(QueryCache::new()));
        view.rows = rows;
        view
    }

    fn type_text(view: &mut LedgerView, text: &str) {
        for c in text.chars() {
            view.handle_key_event(KeyCode::Char(c));
        }
    }

    fn commit_effect(view: &LedgerView) -> Option<(u64, Record)> {
        view.pending_effects.iter().find_map(|e| match e {
            Effect::Commit { generation, record } => Some((*generation, record.clone())),
            _ => None,
        })
    }

    #[test]
    fn test_new_row_commit_round_trip() {
        let mut view = view_with_rows(Vec::new());
        view.handle_key_event(KeyCode::Char('n'));
        assert!(view.new_editor.is_some());

        view.handle_key_event(KeyCode::Tab); // Date -> Name
        type_text(&mut view, "Coffee");
        for _ in 0..4 {
            view.handle_key_event(KeyCode::Tab); // -> Amount
        }
        type_text(&mut view, "-4.20");
        view.handle_key_event(KeyCode::Enter);

        let (generation, record) = commit_effect(&view).unwrap();
        assert_eq!(record.name, "Coffee");
        assert_eq!(record.amount, Decimal::new(-420, 2));
        assert!(record.id.is_none());

        view.apply_store_event(StoreEvent::CommitFinished {
            generation,
            result: Ok(()),
        });
        assert!(view.new_editor.is_none());
        assert!(view.pending_effects.contains(&Effect::Refetch));
        assert_eq!(view.status.as_deref(), Some("Saved"));
    }

    #[test]
    fn test_unparsable_amount_stays_in_creating_new() {
        let mut view = view_with_rows(Vec::new());
        view.handle_key_event(KeyCode::Char('n'));
        view.handle_key_event(KeyCode::Tab);
        type_text(&mut view, "Mystery");
        for _ in 0..4 {
            view.handle_key_event(KeyCode::Tab);
        }
        type_text(&mut view, "abc");
        view.handle_key_event(KeyCode::Enter);

        assert!(commit_effect(&view).is_none());
        let editor = view.new_editor.as_ref().unwrap();
        assert!(matches!(editor.state(), RowState::CreatingNew(_)));
        assert!(view.status.as_deref().unwrap().contains("abc"));
    }

    #[test]
    fn test_stale_commit_completion_leaves_the_new_draft_alone() {
        let mut view = view_with_rows(Vec::new());
        view.handle_key_event(KeyCode::Char('n'));
        view.handle_key_event(KeyCode::Tab);
        type_text(&mut view, "One");
        for _ in 0..4 {
            view.handle_key_event(KeyCode::Tab);
        }
        type_text(&mut view, "-1");
        view.handle_key_event(KeyCode::Enter);
        let (generation, _) = commit_effect(&view).unwrap();

        view.handle_key_event(KeyCode::Esc);
        assert!(view.new_editor.is_none());
        view.handle_key_event(KeyCode::Char('n'));

        view.apply_store_event(StoreEvent::CommitFinished {
            generation,
            result: Ok(()),
        });
        // The write landed, so the list refreshes, but the fresh draft stays.
        assert!(view.new_editor.is_some());
        assert!(view.pending_effects.contains(&Effect::Refetch));
        assert_ne!(view.status.as_deref(), Some("Saved"));
    }

    #[test]
    fn test_edit_commit_carries_the_id() {
        let mut view = view_with_rows(vec![sample(7, 10, "Lunch")]);
        view.handle_key_event(KeyCode::Enter);
        assert!(view.editors.contains_key(&7));

        view.handle_key_event(KeyCode::Tab); // Date -> Name
        for _ in 0.."Lunch".len() {
            view.handle_key_event(KeyCode::Backspace);
        }
        type_text(&mut view, "Dinner");
        view.handle_key_event(KeyCode::Enter);

        let (generation, record) = commit_effect(&view).unwrap();
        assert_eq!(record.id, Some(7));
        assert_eq!(record.name, "Dinner");

        view.apply_store_event(StoreEvent::CommitFinished {
            generation,
            result: Ok(()),
        });
        assert!(view.editors.is_empty());
        assert!(view.pending_effects.contains(&Effect::Refetch));
    }

    #[test]
    fn test_commit_failure_keeps_the_editor_for_retry() {
        let mut view = view_with_rows(vec![sample(7, 10, "Lunch")]);
        view.handle_key_event(KeyCode::Enter);
        view.handle_key_event(KeyCode::Enter); // draft unchanged, still valid
        let (generation, _) = commit_effect(&view).unwrap();

        // A second Enter while the call is out must not queue another commit.
        view.handle_key_event(KeyCode::Enter);
        let commits = view
            .pending_effects
            .iter()
            .filter(|e| matches!(e, Effect::Commit { .. }))
            .count();
        assert_eq!(commits, 1);

        view.apply_store_event(StoreEvent::CommitFinished {
            generation,
            result: Err("Store refused: edit_record".to_string()),
        });
        assert!(view.editors.contains_key(&7));
        assert!(view.status.as_deref().unwrap().contains("refused"));

        view.handle_key_event(KeyCode::Enter);
        let (retry_generation, _) = commit_effect(&view).unwrap();
        assert!(retry_generation > generation);
    }

    #[test]
    fn test_delete_needs_both_call_and_timer() {
        let mut view = view_with_rows(vec![sample(7, 10, "Lunch")]);
        view.handle_key_event(KeyCode::Char('d'));
        assert!(matches!(
            view.deletes.get(&7).map(DeleteFlow::state),
            Some(DeleteState::ConfirmPending)
        ));

        view.handle_key_event(KeyCode::Char('y'));
        assert!(view.pending_effects.contains(&Effect::Delete { id: 7, attempt: 1 }));
        assert!(view.pending_effects.contains(&Effect::DeleteTimer { id: 7, attempt: 1 }));

        view.apply_store_event(StoreEvent::DeleteFinished {
            id: 7,
            attempt: 1,
            result: Ok(()),
        });
        assert!(view.deletes.contains_key(&7), "must wait for the timer");

        view.apply_store_event(StoreEvent::DeleteTimerElapsed { id: 7, attempt: 1 });
        assert!(!view.deletes.contains_key(&7));
        assert!(view.pending_effects.contains(&Effect::Refetch));
    }

    #[test]
    fn test_delete_cancel_issues_no_store_call() {
        let mut view = view_with_rows(vec![sample(7, 10, "Lunch")]);
        view.handle_key_event(KeyCode::Char('d'));
        view.handle_key_event(KeyCode::Char('n'));

        assert!(view.deletes.is_empty());
        assert!(!view
            .pending_effects
            .iter()
            .any(|e| matches!(e, Effect::Delete { .. })));
    }

    #[test]
    fn test_failed_delete_retries_with_a_fresh_attempt() {
        let mut view = view_with_rows(vec![sample(7, 10, "Lunch")]);
        view.handle_key_event(KeyCode::Char('d'));
        view.handle_key_event(KeyCode::Char('y'));

        view.apply_store_event(StoreEvent::DeleteFinished {
            id: 7,
            attempt: 1,
            result: Err("boom".to_string()),
        });
        assert!(matches!(
            view.deletes.get(&7).map(DeleteFlow::state),
            Some(DeleteState::Failed(_))
        ));

        // The first attempt's timer must not disturb the failed state.
        view.apply_store_event(StoreEvent::DeleteTimerElapsed { id: 7, attempt: 1 });
        assert!(matches!(
            view.deletes.get(&7).map(DeleteFlow::state),
            Some(DeleteState::Failed(_))
        ));

        view.handle_key_event(KeyCode::Char('r'));
        assert!(view.pending_effects.contains(&Effect::Delete { id: 7, attempt: 2 }));

        view.apply_store_event(StoreEvent::DeleteTimerElapsed { id: 7, attempt: 2 });
        view.apply_store_event(StoreEvent::DeleteFinished {
            id: 7,
            attempt: 2,
            result: Ok(()),
        });
        assert!(!view.deletes.contains_key(&7));
    }

    #[test]
    fn test_add_value_prompt_queues_the_store_write() {
        let mut view = view_with_rows(Vec::new());
        view.handle_key_event(KeyCode::Char('a'));
        assert!(matches!(view.mode, Mode::AddValue { .. }));

        view.handle_key_event(KeyCode::Right); // category -> bank
        type_text(&mut view, "Chase");
        view.handle_key_event(KeyCode::Enter);

        assert!(matches!(view.mode, Mode::Table));
        assert!(view.pending_effects.contains(&Effect::AddValue {
            field: Field::Bank,
            value: "Chase".to_string(),
        }));

        view.apply_store_event(StoreEvent::ValueAdded {
            field: Field::Bank,
            value: "Chase".to_string(),
            result: Ok(()),
        });
        assert_eq!(view.status.as_deref(), Some("Added bank: Chase"));
    }

    #[test]
    fn test_down_past_the_last_row_requests_a_page() {
        let mut view = view_with_rows(vec![sample(1, 1, "a"), sample(2, 2, "b")]);
        view.handle_key_event(KeyCode::Down);
        assert!(view.pending_effects.is_empty());

        view.handle_key_event(KeyCode::Down);
        assert!(view.pending_effects.contains(&Effect::FetchNextPage));

        let queued = view.pending_effects.len();
        view.handle_key_event(KeyCode::Down);
        assert_eq!(view.pending_effects.len(), queued, "fetch already in flight");
    }

    #[test]
    fn test_page_keys_escape_an_open_editor() {
        let rows: Vec<Record> = (1..=12).map(|i| sample(i, i as u32, "r")).collect();
        let mut view = view_with_rows(rows);
        view.handle_key_event(KeyCode::Enter);
        assert!(view.editors.contains_key(&1));

        view.handle_key_event(KeyCode::PageDown);
        assert_eq!(view.selected, 10);
        assert!(view.editors.contains_key(&1), "editor stays open behind");

        view.handle_key_event(KeyCode::Down);
        assert_eq!(view.selected, 11);
    }

    #[tokio::test]
    async fn test_fetch_effect_fills_the_table() {
        let store: StoreRef = Arc::new(MemoryStore::with_records(vec![
            sample(1, 1, "a"),
            sample(2, 2, "b"),
        ]));
        let mut view = LedgerView::new(store, Arc::new(QueryCache::new()));
        view.request_next_page();
        view.run_effects(&Handle::current());

        let event = view.events.recv().await.unwrap();
        view.apply_store_event(event);
        assert_eq!(view.rows.len(), 2);
        assert!(!view.fetch_in_flight);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_delete_respects_the_minimum_wait() {
        let store: StoreRef = Arc::new(MemoryStore::with_records(vec![sample(7, 10, "Lunch")]));
        let mut view = LedgerView::new(store, Arc::new(QueryCache::new()));
        view.rows = vec![sample(7, 10, "Lunch")];

        view.handle_key_event(KeyCode::Char('d'));
        view.handle_key_event(KeyCode::Char('y'));
        let started = tokio::time::Instant::now();
        view.run_effects(&Handle::current());

        let first = view.events.recv().await.unwrap();
        assert!(matches!(
            &first,
            StoreEvent::DeleteFinished { id: 7, attempt: 1, result: Ok(()) }
        ));
        view.apply_store_event(first);
        assert!(
            view.deletes.contains_key(&7),
            "call success alone must not finish the delete"
        );

        let second = view.events.recv().await.unwrap();
        assert!(matches!(&second, StoreEvent::DeleteTimerElapsed { id: 7, attempt: 1 }));
        assert!(tokio::time::Instant::now() - started >= MIN_WAIT);
        view.apply_store_event(second);
        assert!(!view.deletes.contains_key(&7));
    }
}

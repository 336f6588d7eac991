//! Per-row editing state machine. Every visible record slot owns at most one
//! editor; a draft never leaves its editor until commit hands a validated
//! record to the store. Date and amount are held as the text the user typed
//! and parsed only at commit, so half-typed values like "-" or "1." never
//! error at keystroke time.

use chrono::{Local, NaiveDate};
use crossterm::event::KeyCode;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::error::{Result, TallyError};
use crate::models::Record;
use crate::tags::{self, TagPager};

/// Dates are typed and shown in the editor as `YYYY-MM-DD`.
pub const EDIT_DATE_FMT: &str = "%Y-%m-%d";

/// Mutable working copy of a record's fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub date_text: String,
    pub name: String,
    pub category: String,
    pub transaction_types: Vec<String>,
    pub bank: String,
    pub amount_text: String,
}

impl Draft {
    /// Seed from a committed record to begin editing it.
    pub fn from_record(record: &Record) -> Self {
        Self {
            date_text: record.date.format(EDIT_DATE_FMT).to_string(),
            name: record.name.clone(),
            category: record.category.clone(),
            transaction_types: record.transaction_types.clone(),
            bank: record.bank.clone(),
            amount_text: record.amount.to_string(),
        }
    }

    /// Blank draft for a brand-new record, dated today.
    pub fn empty() -> Self {
        Self {
            date_text: Local::now().date_naive().format(EDIT_DATE_FMT).to_string(),
            name: String::new(),
            category: String::new(),
            transaction_types: Vec::new(),
            bank: String::new(),
            amount_text: String::new(),
        }
    }

    /// Validate and convert into a record carrying `id`. Failures leave the
    /// draft untouched so the user can fix the offending field.
    pub fn to_record(&self, id: Option<i64>) -> Result<Record> {
        let date = NaiveDate::parse_from_str(self.date_text.trim(), EDIT_DATE_FMT)
            .map_err(|_| TallyError::BadDate(self.date_text.trim().to_string()))?;
        if self.name.trim().is_empty() {
            return Err(TallyError::Validation("Name is required".to_string()));
        }
        let amount = parse_amount(&self.amount_text)
            .ok_or_else(|| TallyError::BadAmount(self.amount_text.trim().to_string()))?;
        Ok(Record {
            id,
            date,
            name: self.name.trim().to_string(),
            category: self.category.clone(),
            transaction_types: self.transaction_types.clone(),
            bank: self.bank.clone(),
            amount,
        })
    }
}

/// Amounts accept anything `Decimal` parses, plus trailing-dot forms like
/// "12." that people type before the cents.
pub(crate) fn parse_amount(text: &str) -> Option<Decimal> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(amount) = trimmed.parse::<Decimal>() {
        return Some(amount);
    }
    trimmed.parse::<f64>().ok().and_then(Decimal::from_f64)
}

/// Editing state of one slot, tagged so consumers dispatch on a single match.
#[derive(Debug, Clone, PartialEq)]
pub enum RowState {
    Viewing,
    Editing(Draft),
    CreatingNew(Draft),
}

/// Draft fields in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftField {
    Date,
    Name,
    Category,
    Types,
    Bank,
    Amount,
}

impl DraftField {
    pub const ORDER: [DraftField; 6] = [
        DraftField::Date,
        DraftField::Name,
        DraftField::Category,
        DraftField::Types,
        DraftField::Bank,
        DraftField::Amount,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DraftField::Date => "Date",
            DraftField::Name => "Name",
            DraftField::Category => "Category",
            DraftField::Types => "Types",
            DraftField::Bank => "Bank",
            DraftField::Amount => "Amount",
        }
    }

    fn position(self) -> usize {
        DraftField::ORDER.iter().position(|f| *f == self).unwrap_or(0)
    }

    pub fn next(self) -> Self {
        DraftField::ORDER[(self.position() + 1) % DraftField::ORDER.len()]
    }

    pub fn prev(self) -> Self {
        let len = DraftField::ORDER.len();
        DraftField::ORDER[(self.position() + len - 1) % len]
    }
}

/// Taxonomy values available to the selector fields while editing.
pub struct FieldOptions<'a> {
    pub categories: &'a [String],
    pub banks: &'a [String],
    pub types: &'a [String],
}

/// What the owner should do after a key lands on an editor.
#[derive(Debug, PartialEq)]
pub enum EditAction {
    Consumed,
    /// Draft discarded; the slot leaves edit mode.
    Cancelled,
    /// Draft validated; issue the store call for this record.
    Commit(Record),
    /// Commit-time validation failed; show the message, keep editing.
    Invalid(String),
}

pub struct RowEditor {
    record_id: Option<i64>,
    state: RowState,
    focus: DraftField,
    cursor: usize,
    tags: TagPager,
    commit_pending: bool,
}

impl RowEditor {
    /// Begin editing a committed record.
    pub fn edit(record: &Record) -> Self {
        let draft = Draft::from_record(record);
        let cursor = draft.date_text.chars().count();
        Self {
            record_id: record.id,
            state: RowState::Editing(draft),
            focus: DraftField::Date,
            cursor,
            tags: TagPager::new(),
            commit_pending: false,
        }
    }

    /// Open the draft slot for a brand-new record.
    pub fn create() -> Self {
        let draft = Draft::empty();
        let cursor = draft.date_text.chars().count();
        Self {
            record_id: None,
            state: RowState::CreatingNew(draft),
            focus: DraftField::Date,
            cursor,
            tags: TagPager::new(),
            commit_pending: false,
        }
    }

    pub fn state(&self) -> &RowState {
        &self.state
    }

    pub fn draft(&self) -> Option<&Draft> {
        self.state.draft()
    }

    pub fn focus(&self) -> DraftField {
        self.focus
    }

    /// Character position of the text cursor within the focused field.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn tags(&self) -> &TagPager {
        &self.tags
    }

    pub fn is_new(&self) -> bool {
        self.record_id.is_none()
    }

    pub fn is_commit_pending(&self) -> bool {
        self.commit_pending
    }

    /// The store rejected the commit; unlock the row for another attempt.
    pub fn commit_failed(&mut self) {
        self.commit_pending = false;
    }

    /// Re-clamp the tag page after the type list changed size.
    pub fn clamp_tags(&mut self, total: usize) {
        self.tags.clamp(total);
    }

    pub fn handle_key(&mut self, code: KeyCode, options: &FieldOptions) -> EditAction {
        match code {
            KeyCode::Esc => {
                self.state = RowState::Viewing;
                self.commit_pending = false;
                EditAction::Cancelled
            }
            KeyCode::Enter => self.try_commit(),
            KeyCode::Tab | KeyCode::Down => {
                self.set_focus(self.focus.next());
                EditAction::Consumed
            }
            KeyCode::BackTab | KeyCode::Up => {
                self.set_focus(self.focus.prev());
                EditAction::Consumed
            }
            other => self.handle_field_key(other, options),
        }
    }

    fn try_commit(&mut self) -> EditAction {
        if self.commit_pending {
            return EditAction::Consumed;
        }
        let Some(draft) = self.state.draft() else {
            return EditAction::Consumed;
        };
        match draft.to_record(self.record_id) {
            Ok(record) => {
                self.commit_pending = true;
                EditAction::Commit(record)
            }
            Err(e) => EditAction::Invalid(e.to_string()),
        }
    }

    fn set_focus(&mut self, focus: DraftField) {
        self.focus = focus;
        self.cursor = self
            .state
            .draft()
            .and_then(|draft| text_of(draft, focus))
            .map(|text| text.chars().count())
            .unwrap_or(0);
    }

    fn handle_field_key(&mut self, code: KeyCode, options: &FieldOptions) -> EditAction {
        match self.focus {
            DraftField::Date | DraftField::Name | DraftField::Amount => self.handle_text_key(code),
            DraftField::Category => self.handle_selector_key(code, options.categories),
            DraftField::Bank => self.handle_selector_key(code, options.banks),
            DraftField::Types => self.handle_tags_key(code, options.types),
        }
    }

    fn handle_text_key(&mut self, code: KeyCode) -> EditAction {
        let focus = self.focus;
        let cursor = &mut self.cursor;
        let Some(draft) = self.state.draft_mut() else {
            return EditAction::Consumed;
        };
        let Some(text) = text_of_mut(draft, focus) else {
            return EditAction::Consumed;
        };
        match code {
            KeyCode::Char(c) => {
                text.insert(byte_pos(text, *cursor), c);
                *cursor += 1;
            }
            KeyCode::Backspace => {
                if *cursor > 0 {
                    let pos = byte_pos(text, *cursor - 1);
                    text.remove(pos);
                    *cursor -= 1;
                }
            }
            KeyCode::Delete => {
                if *cursor < text.chars().count() {
                    let pos = byte_pos(text, *cursor);
                    text.remove(pos);
                }
            }
            KeyCode::Left => *cursor = cursor.saturating_sub(1),
            KeyCode::Right => *cursor = (*cursor + 1).min(text.chars().count()),
            _ => {}
        }
        EditAction::Consumed
    }

    fn handle_selector_key(&mut self, code: KeyCode, choices: &[String]) -> EditAction {
        let focus = self.focus;
        let Some(draft) = self.state.draft_mut() else {
            return EditAction::Consumed;
        };
        let current = match focus {
            DraftField::Category => &mut draft.category,
            _ => &mut draft.bank,
        };
        let step: i32 = match code {
            KeyCode::Right => 1,
            KeyCode::Left => -1,
            _ => return EditAction::Consumed,
        };
        if let Some(next) = cycle(choices, current, step) {
            *current = next;
        }
        EditAction::Consumed
    }

    fn handle_tags_key(&mut self, code: KeyCode, types: &[String]) -> EditAction {
        match code {
            KeyCode::Char(']') => self.tags.next_page(types.len()),
            KeyCode::Char('[') => self.tags.prev_page(),
            KeyCode::Right => self.tags.next_slot(types.len()),
            KeyCode::Left => self.tags.prev_slot(),
            KeyCode::Char(' ') => {
                if let Some(label) = self.tags.highlighted(types).map(str::to_string) {
                    if let Some(draft) = self.state.draft_mut() {
                        tags::toggle(&mut draft.transaction_types, &label);
                    }
                }
            }
            _ => {}
        }
        EditAction::Consumed
    }
}

impl RowState {
    pub fn draft(&self) -> Option<&Draft> {
        match self {
            RowState::Viewing => None,
            RowState::Editing(draft) | RowState::CreatingNew(draft) => Some(draft),
        }
    }

    fn draft_mut(&mut self) -> Option<&mut Draft> {
        match self {
            RowState::Viewing => None,
            RowState::Editing(draft) | RowState::CreatingNew(draft) => Some(draft),
        }
    }
}

fn text_of(draft: &Draft, field: DraftField) -> Option<&String> {
    match field {
        DraftField::Date => Some(&draft.date_text),
        DraftField::Name => Some(&draft.name),
        DraftField::Amount => Some(&draft.amount_text),
        _ => None,
    }
}

fn text_of_mut(draft: &mut Draft, field: DraftField) -> Option<&mut String> {
    match field {
        DraftField::Date => Some(&mut draft.date_text),
        DraftField::Name => Some(&mut draft.name),
        DraftField::Amount => Some(&mut draft.amount_text),
        _ => None,
    }
}

/// Byte offset of the `cursor`-th character.
fn byte_pos(text: &str, cursor: usize) -> usize {
    text.char_indices().nth(cursor).map(|(i, _)| i).unwrap_or(text.len())
}

/// Step through `choices` from `current`, wrapping at both ends. An unknown
/// or empty current value starts at the first (or last) choice.
fn cycle(choices: &[String], current: &str, step: i32) -> Option<String> {
    if choices.is_empty() {
        return None;
    }
    let index = choices.iter().position(|c| c == current);
    let next = match (index, step >= 0) {
        (None, true) => 0,
        (None, false) => choices.len() - 1,
        (Some(i), true) => (i + 1) % choices.len(),
        (Some(i), false) => (i + choices.len() - 1) % choices.len(),
    };
    Some(choices[next].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use serde_json::json;

    struct Fixture {
        categories: Vec<String>,
        banks: Vec<String>,
        types: Vec<String>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                categories: to_strings(&["Food", "Transport", "Housing"]),
                banks: to_strings(&["First National", "Metro Credit Union"]),
                types: to_strings(&["Essential", "Subscription", "One-off", "Refund", "Recurring"]),
            }
        }

        fn options(&self) -> FieldOptions<'_> {
            FieldOptions {
                categories: &self.categories,
                banks: &self.banks,
                types: &self.types,
            }
        }
    }

    fn to_strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn committed() -> Record {
        Record {
            id: Some(11),
            date: NaiveDate::from_ymd_opt(2025, 2, 20).unwrap(),
            name: "Weekly shop".to_string(),
            category: "Food".to_string(),
            transaction_types: vec!["Essential".to_string()],
            bank: "First National".to_string(),
            amount: Decimal::new(-8140, 2),
        }
    }

    fn type_text(editor: &mut RowEditor, options: &FieldOptions, text: &str) {
        for c in text.chars() {
            editor.handle_key(KeyCode::Char(c), options);
        }
    }

    fn clear_focused(editor: &mut RowEditor, options: &FieldOptions, chars: usize) {
        for _ in 0..chars {
            editor.handle_key(KeyCode::Backspace, options);
        }
    }

    #[test]
    fn test_parse_amount_accepts_decimal_and_trailing_dot() {
        assert_eq!(parse_amount("-12.50"), Some(Decimal::new(-1250, 2)));
        assert_eq!(parse_amount(" 7 "), Some(Decimal::new(7, 0)));
        assert_eq!(parse_amount("12."), Some(Decimal::new(12, 0)));
        assert_eq!(parse_amount("-"), None);
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("12,50"), None);
    }

    #[test]
    fn test_draft_round_trips_a_committed_record() {
        let record = committed();
        let draft = Draft::from_record(&record);
        assert_eq!(draft.amount_text, "-81.40");
        assert_eq!(draft.date_text, "2025-02-20");
        assert_eq!(draft.to_record(record.id).unwrap(), record);
    }

    #[test]
    fn test_escape_discards_every_draft_change() {
        let fixture = Fixture::new();
        let options = fixture.options();
        let record = committed();
        let mut editor = RowEditor::edit(&record);

        // Scribble over several fields.
        type_text(&mut editor, &options, "9");
        editor.handle_key(KeyCode::Tab, &options);
        type_text(&mut editor, &options, " extra");
        editor.handle_key(KeyCode::Tab, &options);
        editor.handle_key(KeyCode::Right, &options);
        assert_ne!(editor.draft().unwrap(), &Draft::from_record(&record));

        assert_eq!(editor.handle_key(KeyCode::Esc, &options), EditAction::Cancelled);
        assert_eq!(editor.state(), &RowState::Viewing);

        // Re-activating seeds from the committed record, not the scribbles.
        let reopened = RowEditor::edit(&record);
        assert_eq!(reopened.draft().unwrap(), &Draft::from_record(&record));
    }

    #[test]
    fn test_unparseable_amount_blocks_commit_and_keeps_draft() {
        let fixture = Fixture::new();
        let options = fixture.options();
        let mut editor = RowEditor::create();
        editor.handle_key(KeyCode::Tab, &options);
        type_text(&mut editor, &options, "Mystery");
        for _ in 0..4 {
            editor.handle_key(KeyCode::Tab, &options);
        }
        type_text(&mut editor, &options, "abc");

        let action = editor.handle_key(KeyCode::Enter, &options);
        match action {
            EditAction::Invalid(message) => assert!(message.contains("Invalid amount")),
            other => panic!("expected Invalid, got {other:?}"),
        }
        assert!(!editor.is_commit_pending());
        assert_eq!(editor.draft().unwrap().amount_text, "abc");
        assert!(matches!(editor.state(), RowState::CreatingNew(_)));
    }

    #[test]
    fn test_empty_name_blocks_commit() {
        let fixture = Fixture::new();
        let options = fixture.options();
        let mut editor = RowEditor::create();
        for _ in 0..5 {
            editor.handle_key(KeyCode::Tab, &options);
        }
        type_text(&mut editor, &options, "10");

        match editor.handle_key(KeyCode::Enter, &options) {
            EditAction::Invalid(message) => assert_eq!(message, "Name is required"),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_date_blocks_commit() {
        let fixture = Fixture::new();
        let options = fixture.options();
        let record = committed();
        let mut editor = RowEditor::edit(&record);
        clear_focused(&mut editor, &options, 10);
        type_text(&mut editor, &options, "20/02/2025");

        match editor.handle_key(KeyCode::Enter, &options) {
            EditAction::Invalid(message) => assert!(message.contains("Invalid date")),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_commit_carries_the_record_id_and_guards_reentry() {
        let fixture = Fixture::new();
        let options = fixture.options();
        let record = committed();
        let mut editor = RowEditor::edit(&record);
        editor.handle_key(KeyCode::Tab, &options);
        type_text(&mut editor, &options, "!");

        match editor.handle_key(KeyCode::Enter, &options) {
            EditAction::Commit(edited) => {
                assert_eq!(edited.id, Some(11));
                assert_eq!(edited.name, "Weekly shop!");
                assert_eq!(edited.amount, Decimal::new(-8140, 2));
            }
            other => panic!("expected Commit, got {other:?}"),
        }
        assert!(editor.is_commit_pending());

        // A second Enter while the call is in flight does nothing.
        assert_eq!(editor.handle_key(KeyCode::Enter, &options), EditAction::Consumed);

        editor.commit_failed();
        assert!(matches!(editor.handle_key(KeyCode::Enter, &options), EditAction::Commit(_)));
    }

    #[test]
    fn test_text_editing_follows_the_cursor() {
        let fixture = Fixture::new();
        let options = fixture.options();
        let mut editor = RowEditor::create();
        editor.handle_key(KeyCode::Tab, &options);
        type_text(&mut editor, &options, "bs");
        editor.handle_key(KeyCode::Left, &options);
        type_text(&mut editor, &options, "u");
        assert_eq!(editor.draft().unwrap().name, "bus");

        editor.handle_key(KeyCode::Delete, &options);
        assert_eq!(editor.draft().unwrap().name, "bu");
        editor.handle_key(KeyCode::Backspace, &options);
        assert_eq!(editor.draft().unwrap().name, "b");
    }

    #[test]
    fn test_selector_cycles_and_wraps() {
        let fixture = Fixture::new();
        let options = fixture.options();
        let mut editor = RowEditor::create();
        editor.handle_key(KeyCode::Tab, &options);
        editor.handle_key(KeyCode::Tab, &options);
        assert_eq!(editor.focus(), DraftField::Category);

        // From an empty value, Right starts at the first choice.
        editor.handle_key(KeyCode::Right, &options);
        assert_eq!(editor.draft().unwrap().category, "Food");
        editor.handle_key(KeyCode::Left, &options);
        assert_eq!(editor.draft().unwrap().category, "Housing");
        editor.handle_key(KeyCode::Right, &options);
        assert_eq!(editor.draft().unwrap().category, "Food");
    }

    #[test]
    fn test_selector_with_no_choices_is_inert() {
        let empty = Fixture {
            categories: vec![],
            banks: vec![],
            types: vec![],
        };
        let options = empty.options();
        let mut editor = RowEditor::create();
        editor.handle_key(KeyCode::Tab, &options);
        editor.handle_key(KeyCode::Tab, &options);
        editor.handle_key(KeyCode::Right, &options);
        assert_eq!(editor.draft().unwrap().category, "");
    }

    #[test]
    fn test_tag_paging_and_toggle() {
        let fixture = Fixture::new();
        let options = fixture.options();
        let record = committed();
        let mut editor = RowEditor::edit(&record);
        for _ in 0..3 {
            editor.handle_key(KeyCode::Tab, &options);
        }
        assert_eq!(editor.focus(), DraftField::Types);

        // Second page holds the fifth label.
        editor.handle_key(KeyCode::Char(']'), &options);
        assert_eq!(editor.tags().page(), 2);
        editor.handle_key(KeyCode::Char(' '), &options);
        assert_eq!(
            editor.draft().unwrap().transaction_types,
            vec!["Essential".to_string(), "Recurring".to_string()]
        );

        // Toggling an already-selected label from page one removes it.
        editor.handle_key(KeyCode::Char('['), &options);
        editor.handle_key(KeyCode::Char(' '), &options);
        assert_eq!(editor.draft().unwrap().transaction_types, vec!["Recurring".to_string()]);
    }

    #[test]
    fn test_focus_wraps_in_both_directions() {
        let fixture = Fixture::new();
        let options = fixture.options();
        let mut editor = RowEditor::create();
        assert_eq!(editor.focus(), DraftField::Date);
        editor.handle_key(KeyCode::BackTab, &options);
        assert_eq!(editor.focus(), DraftField::Amount);
        editor.handle_key(KeyCode::Down, &options);
        assert_eq!(editor.focus(), DraftField::Date);
    }

    /// New record committed with a cycled category, typed negative amount and
    /// a toggled type lands on the wire exactly as entered.
    #[test]
    fn test_new_row_commit_scenario() {
        let fixture = Fixture::new();
        let options = fixture.options();
        let mut editor = RowEditor::create();

        clear_focused(&mut editor, &options, 10);
        type_text(&mut editor, &options, "2025-03-14");
        editor.handle_key(KeyCode::Tab, &options);
        type_text(&mut editor, &options, "City metro pass");
        editor.handle_key(KeyCode::Tab, &options);
        editor.handle_key(KeyCode::Right, &options);
        editor.handle_key(KeyCode::Right, &options);
        assert_eq!(editor.draft().unwrap().category, "Transport");
        editor.handle_key(KeyCode::Tab, &options);
        editor.handle_key(KeyCode::Right, &options);
        editor.handle_key(KeyCode::Char(' '), &options);
        editor.handle_key(KeyCode::Tab, &options);
        editor.handle_key(KeyCode::Right, &options);
        editor.handle_key(KeyCode::Tab, &options);
        type_text(&mut editor, &options, "-12.50");

        let record = match editor.handle_key(KeyCode::Enter, &options) {
            EditAction::Commit(record) => record,
            other => panic!("expected Commit, got {other:?}"),
        };
        assert_eq!(record.id, None);
        assert_eq!(record.amount, Decimal::new(-1250, 2));

        assert_eq!(
            codec::encode_record(&record),
            json!({
                "date": "2025-03-14",
                "name": "City metro pass",
                "category": "Transport",
                "bank": "First National",
                "transaction_types": ["Subscription"],
                "amount": -12.5,
            })
        );
    }
}

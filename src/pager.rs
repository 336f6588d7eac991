//! Keyset cursors for walking the record list newest-first. Offsets are never
//! used: each page is keyed off the (date, id) of the last record already on
//! screen, so inserts and deletes between fetches cannot shift rows into or
//! out of earlier pages.

use chrono::{Local, NaiveDate};

use crate::models::Record;

/// Records fetched per page in the interactive ledger.
pub const PAGE_SIZE: u32 = 10;

/// Page size for near-complete snapshot reads (status summaries).
pub const SNAPSHOT_PAGE_SIZE: u32 = 1000;

/// Id paired with today's date in the initial cursor. Larger than any id the
/// store will assign, so the first page starts at the newest record.
pub const INITIAL_CURSOR_ID: i64 = i32::MAX as i64;

/// Exclusive lower bound for the next fetch: a record belongs to the page
/// when its date is older than `date`, or the date ties and its id is
/// smaller than `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub date: NaiveDate,
    pub id: i64,
}

impl PageCursor {
    pub fn initial() -> Self {
        Self {
            date: Local::now().date_naive(),
            id: INITIAL_CURSOR_ID,
        }
    }

    /// Cursor for the page following the one that ends in `last`. Only
    /// committed records appear in pages, so `last` always carries an id.
    pub fn after(last: &Record) -> Self {
        Self {
            date: last.date,
            id: last.id.unwrap_or(0),
        }
    }

    /// True when `record` sorts strictly below this cursor in
    /// (date DESC, id DESC) order.
    pub fn admits(&self, record: &Record) -> bool {
        record.date < self.date
            || (record.date == self.date && record.id.unwrap_or(0) < self.id)
    }
}

/// A page shorter than requested means the store ran out of older records.
pub fn is_last_page(len: usize, page_size: u32) -> bool {
    (len as u32) < page_size
}

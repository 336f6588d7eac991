use std::path::Path;

use comfy_table::{Cell, Table};

use crate::cli::{open_store, unlock_existing};
use crate::db::DB_FILE;
use crate::error::Result;
use crate::fmt::{display_date, format_bytes};
use crate::models::{Field, Record};
use crate::pager::{is_last_page, PageCursor, SNAPSHOT_PAGE_SIZE};
use crate::store::RecordStore;

pub async fn run(data_dir: &Path) -> Result<()> {
    let db_path = data_dir.join(DB_FILE);
    println!("Data dir:   {}", data_dir.display());
    println!("Database:   {}", db_path.display());

    if !db_path.exists() {
        println!();
        println!("Database not found. Run `tally init` to set up.");
        return Ok(());
    }

    let size = std::fs::metadata(&db_path)?.len();
    println!("DB size:    {}", format_bytes(size));

    let store = open_store(data_dir);
    unlock_existing(&store).await?;

    let records = snapshot(store.as_ref()).await?;
    let categories = store.get_types_for_field(Field::Category).await?;
    let banks = store.get_types_for_field(Field::Bank).await?;
    let types = store.get_types_for_field(Field::TransactionType).await?;

    let mut table = Table::new();
    table.set_header(vec!["", "Count"]);
    table.add_row(vec![Cell::new("Records"), Cell::new(records.len())]);
    table.add_row(vec![Cell::new("Categories"), Cell::new(categories.len())]);
    table.add_row(vec![Cell::new("Banks"), Cell::new(banks.len())]);
    table.add_row(vec![Cell::new("Transaction types"), Cell::new(types.len())]);

    println!();
    println!("{table}");

    if let (Some(newest), Some(oldest)) = (records.first(), records.last()) {
        println!();
        println!("Newest record: {}  {}", display_date(newest.date), newest.name);
        println!("Oldest record: {}  {}", display_date(oldest.date), oldest.name);
    }
    Ok(())
}

/// Every record, newest first, read through the wire in snapshot-sized pages.
async fn snapshot(store: &dyn RecordStore) -> Result<Vec<Record>> {
    let mut rows = Vec::new();
    let mut cursor = PageCursor::initial();
    loop {
        let page = store
            .get_records(SNAPSHOT_PAGE_SIZE, cursor.date, cursor.id)
            .await?;
        let fetched = page.len();
        if let Some(last) = page.last() {
            cursor = PageCursor::after(last);
        }
        rows.extend(page);
        if is_last_page(fetched, SNAPSHOT_PAGE_SIZE) {
            return Ok(rows);
        }
    }
}

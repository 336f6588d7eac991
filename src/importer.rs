use std::path::Path;

use calamine::{Data, Reader};
use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::error::{Result, TallyError};
use crate::models::Record;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn parse_date_dmy(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%d/%m/%Y").ok()
}

pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    // Excel epoch is 1899-12-30 (accounting for the 1900 leap year bug)
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    Some(base + chrono::Duration::days(serial as i64))
}

/// Transaction types arrive in one cell, '/'-separated:
/// "Essential / Subscription" becomes two labels.
pub fn split_types(raw: &str) -> Vec<String> {
    raw.split('/')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn cell_date(cell: &Data) -> Option<NaiveDate> {
    match cell {
        Data::String(s) => parse_date_dmy(s),
        Data::Float(f) => excel_serial_to_date(*f),
        Data::Int(i) => excel_serial_to_date(*i as f64),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64()),
        _ => None,
    }
}

fn cell_amount(cell: &Data) -> Option<Decimal> {
    match cell {
        Data::Float(f) => Decimal::from_f64(*f),
        Data::Int(i) => Decimal::from_i64(*i),
        Data::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Sheet parsing
// ---------------------------------------------------------------------------

/// Read every record from "Sheet1" of an XLSX/ODS file. After a header row,
/// columns are: date (DD/MM/YYYY), name, category, amount, transaction types
/// ('/'-separated), bank. The whole file is rejected on the first bad row so
/// an import is all-or-nothing.
pub fn parse_spreadsheet(path: &Path) -> Result<Vec<Record>> {
    let mut workbook = calamine::open_workbook_auto(path)
        .map_err(|e| TallyError::Other(format!("Failed to open spreadsheet: {e}")))?;
    let range = workbook
        .worksheet_range("Sheet1")
        .map_err(|e| TallyError::Other(format!("Cannot read 'Sheet1': {e}")))?;

    let mut records = Vec::new();
    for (i, row) in range.rows().skip(1).enumerate() {
        // 1-based spreadsheet numbering, after the header
        records.push(parse_row(row, i + 2)?);
    }
    Ok(records)
}

fn parse_row(row: &[Data], row_no: usize) -> Result<Record> {
    if row.len() < 6 {
        return Err(TallyError::ImportRow {
            row: row_no,
            reason: format!("expected 6 columns, found {}", row.len()),
        });
    }
    let date = cell_date(&row[0]).ok_or_else(|| TallyError::ImportRow {
        row: row_no,
        reason: format!("bad date '{}'", cell_text(&row[0])),
    })?;
    let name = cell_text(&row[1]);
    if name.is_empty() {
        return Err(TallyError::ImportRow {
            row: row_no,
            reason: "name is empty".to_string(),
        });
    }
    let amount = cell_amount(&row[3]).ok_or_else(|| TallyError::ImportRow {
        row: row_no,
        reason: format!("bad amount '{}'", cell_text(&row[3])),
    })?;

    Ok(Record {
        id: None,
        date,
        name,
        category: cell_text(&row[2]),
        transaction_types: split_types(&cell_text(&row[4])),
        bank: cell_text(&row[5]),
        amount,
    })
}

//! SQLCipher-backed reference implementation of the wire boundary. The
//! dispatcher speaks the wire shape only: camelCase argument keys in,
//! snake_case record payloads out. All rusqlite work runs on the blocking
//! pool; the connection is created by `unlock` and shared behind a mutex.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::Connection;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::task;
use tracing::{debug, info};

use crate::codec;
use crate::error::{Result, TallyError};
use crate::importer;
use crate::models::Field;
use crate::pager::INITIAL_CURSOR_ID;
use crate::store::{WireBackend, WireRequest};

pub const DB_FILE: &str = "tally.db";

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY,
    date TEXT NOT NULL,
    name TEXT NOT NULL,
    category TEXT NOT NULL,
    bank TEXT NOT NULL,
    amount REAL NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS banks (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS transaction_types (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS record_types (
    record_id INTEGER NOT NULL,
    type_id INTEGER NOT NULL,
    PRIMARY KEY (record_id, type_id),
    FOREIGN KEY (record_id) REFERENCES records(id) ON DELETE CASCADE,
    FOREIGN KEY (type_id) REFERENCES transaction_types(id)
);

CREATE INDEX IF NOT EXISTS idx_records_date_id ON records(date DESC, id DESC);
";

/// Record payload as it crosses the wire.
#[derive(Debug, Serialize, Deserialize)]
struct WireRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    date: String,
    name: String,
    category: String,
    bank: String,
    transaction_types: Vec<String>,
    amount: f64,
}

pub struct SqliteBackend {
    db_path: PathBuf,
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteBackend {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            db_path: data_dir.join(DB_FILE),
            conn: Arc::new(Mutex::new(None)),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

#[async_trait]
impl WireBackend for SqliteBackend {
    async fn call(&self, request: WireRequest) -> Result<Value> {
        debug!(command = request.command, "backend call");
        let db_path = self.db_path.clone();
        let conn = Arc::clone(&self.conn);
        task::spawn_blocking(move || dispatch(&db_path, &conn, request))
            .await
            .map_err(|e| TallyError::Other(format!("backend worker failed: {e}")))?
    }
}

fn dispatch(db_path: &Path, conn: &Mutex<Option<Connection>>, request: WireRequest) -> Result<Value> {
    let args = &request.args;
    match request.command {
        "is_initialized" => Ok(json!(db_path.exists())),
        "unlock" => unlock(db_path, conn, arg_str(args, "passphrase")?),
        "get_types_for_field" => with_conn(conn, |c| {
            let field = Field::from_wire(arg_str(args, "fieldName")?)?;
            get_types_for_field(c, field)
        }),
        "add_new_value" => with_conn(conn, |c| {
            let field = Field::from_wire(arg_str(args, "fieldName")?)?;
            add_new_value(c, field, arg_str(args, "newValue")?)
        }),
        "get_records" => with_conn(conn, |c| {
            let page_size = arg(args, "recordsPerPage")?
                .as_u64()
                .ok_or_else(|| TallyError::Wire("recordsPerPage must be a number".into()))?
                as u32;
            let last_date = arg_str(args, "lastSeenDate")?;
            // A missing cursor id means "from the top of that date".
            let last_id = args.get("lastSeenId").and_then(Value::as_i64).unwrap_or(INITIAL_CURSOR_ID);
            get_records(c, page_size, last_date, last_id)
        }),
        "create_record" => with_conn(conn, |c| {
            create_record(c, &wire_record(arg(args, "newRecord")?)?)
        }),
        "edit_record" => with_conn(conn, |c| {
            edit_record(c, &wire_record(arg(args, "record")?)?)
        }),
        "delete_record" => with_conn(conn, |c| {
            let id = arg(args, "id")?
                .as_i64()
                .ok_or_else(|| TallyError::Wire("id must be a number".into()))?;
            delete_record(c, id)
        }),
        "import_file" => with_conn(conn, |c| import_file(c, arg_str(args, "filePath")?)),
        other => Err(TallyError::UnknownCommand(other.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Argument plumbing
// ---------------------------------------------------------------------------

fn arg<'a>(args: &'a Value, key: &str) -> Result<&'a Value> {
    args.get(key)
        .ok_or_else(|| TallyError::Wire(format!("missing argument {key}")))
}

fn arg_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    arg(args, key)?
        .as_str()
        .ok_or_else(|| TallyError::Wire(format!("argument {key} must be text")))
}

fn wire_record(value: &Value) -> Result<WireRecord> {
    Ok(serde_json::from_value(value.clone())?)
}

fn with_conn<T>(
    conn: &Mutex<Option<Connection>>,
    op: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    let guard = lock(conn);
    match guard.as_ref() {
        Some(c) => op(c),
        None => Err(TallyError::Locked),
    }
}

fn lock(conn: &Mutex<Option<Connection>>) -> MutexGuard<'_, Option<Connection>> {
    conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Open the database with `passphrase`, creating it and the schema on first
/// use. SQLCipher only reports a bad key when the schema is read, so we probe
/// sqlite_master before trusting the connection.
fn unlock(db_path: &Path, conn: &Mutex<Option<Connection>>, passphrase: &str) -> Result<Value> {
    if let Some(dir) = db_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let new_conn = Connection::open(db_path)?;
    new_conn.pragma_update(None, "key", passphrase)?;

    let probe: std::result::Result<i64, rusqlite::Error> =
        new_conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get(0));
    if probe.is_err() {
        return Ok(json!(false));
    }

    new_conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    new_conn.execute_batch(SCHEMA)?;
    *lock(conn) = Some(new_conn);
    Ok(json!(true))
}

fn taxonomy_table(field: Field) -> &'static str {
    match field {
        Field::Category => "categories",
        Field::Bank => "banks",
        Field::TransactionType => "transaction_types",
    }
}

fn get_types_for_field(conn: &Connection, field: Field) -> Result<Value> {
    let mut stmt = conn.prepare(&format!(
        "SELECT name FROM {} ORDER BY id",
        taxonomy_table(field)
    ))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(json!(names))
}

fn add_new_value(conn: &Connection, field: Field, value: &str) -> Result<Value> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(json!(false));
    }
    let insert = format!("INSERT INTO {} (name) VALUES (?1)", taxonomy_table(field));
    match conn.execute(&insert, [value]) {
        Ok(_) => Ok(json!(true)),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Ok(json!(false))
        }
        Err(e) => Err(e.into()),
    }
}

fn get_records(conn: &Connection, page_size: u32, last_date: &str, last_id: i64) -> Result<Value> {
    let mut stmt = conn.prepare(
        "SELECT id, date, name, category, bank, amount FROM records
         WHERE date < ?1 OR (date = ?1 AND id < ?2)
         ORDER BY date DESC, id DESC
         LIMIT ?3",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![last_date, last_id, page_size], |row| {
            Ok(WireRecord {
                id: Some(row.get(0)?),
                date: row.get(1)?,
                name: row.get(2)?,
                category: row.get(3)?,
                bank: row.get(4)?,
                transaction_types: Vec::new(),
                amount: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut tag_stmt = conn.prepare(
        "SELECT t.name FROM transaction_types t
         JOIN record_types rt ON rt.type_id = t.id
         WHERE rt.record_id = ?1
         ORDER BY rt.rowid",
    )?;
    let mut page = Vec::with_capacity(rows.len());
    for mut record in rows {
        if let Some(id) = record.id {
            record.transaction_types = tag_stmt
                .query_map([id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
        }
        page.push(serde_json::to_value(record)?);
    }
    Ok(Value::Array(page))
}

fn create_record(conn: &Connection, record: &WireRecord) -> Result<Value> {
    codec::decode_date(&record.date)?;
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO records (date, name, category, bank, amount) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![record.date, record.name, record.category, record.bank, record.amount],
    )?;
    let id = tx.last_insert_rowid();
    link_types(&tx, id, &record.transaction_types)?;
    tx.commit()?;
    Ok(json!(true))
}

fn edit_record(conn: &Connection, record: &WireRecord) -> Result<Value> {
    let id = record
        .id
        .ok_or_else(|| TallyError::Wire("edit_record payload is missing an id".into()))?;
    codec::decode_date(&record.date)?;

    let tx = conn.unchecked_transaction()?;
    let updated = tx.execute(
        "UPDATE records SET date = ?1, name = ?2, category = ?3, bank = ?4, amount = ?5 WHERE id = ?6",
        rusqlite::params![record.date, record.name, record.category, record.bank, record.amount, id],
    )?;
    if updated == 0 {
        return Ok(json!(false));
    }
    tx.execute("DELETE FROM record_types WHERE record_id = ?1", [id])?;
    link_types(&tx, id, &record.transaction_types)?;
    tx.commit()?;
    Ok(json!(true))
}

fn delete_record(conn: &Connection, id: i64) -> Result<Value> {
    conn.execute("DELETE FROM records WHERE id = ?1", [id])?;
    Ok(json!(true))
}

fn import_file(conn: &Connection, path: &str) -> Result<Value> {
    let records = importer::parse_spreadsheet(Path::new(path))?;
    let tx = conn.unchecked_transaction()?;
    for record in &records {
        let amount = record
            .amount
            .to_f64()
            .ok_or_else(|| TallyError::BadAmount(record.amount.to_string()))?;
        if !record.category.is_empty() {
            ensure_value(&tx, "categories", &record.category)?;
        }
        if !record.bank.is_empty() {
            ensure_value(&tx, "banks", &record.bank)?;
        }
        tx.execute(
            "INSERT INTO records (date, name, category, bank, amount) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                codec::encode_date(record.date),
                record.name,
                record.category,
                record.bank,
                amount
            ],
        )?;
        let id = tx.last_insert_rowid();
        link_types(&tx, id, &record.transaction_types)?;
    }
    tx.commit()?;
    info!(count = records.len(), "imported records");
    Ok(json!(records.len() as u64))
}

/// Attach `labels` to a record, creating missing type values as needed.
/// Junction rows keep insertion order, which is what the editor selected.
fn link_types(conn: &Connection, record_id: i64, labels: &[String]) -> Result<()> {
    for label in labels {
        let type_id = ensure_value(conn, "transaction_types", label)?;
        conn.execute(
            "INSERT OR IGNORE INTO record_types (record_id, type_id) VALUES (?1, ?2)",
            rusqlite::params![record_id, type_id],
        )?;
    }
    Ok(())
}

fn ensure_value(conn: &Connection, table: &str, name: &str) -> Result<i64> {
    conn.execute(
        &format!("INSERT OR IGNORE INTO {table} (name) VALUES (?1)"),
        [name],
    )?;
    let id = conn.query_row(
        &format!("SELECT id FROM {table} WHERE name = ?1"),
        [name],
        |row| row.get(0),
    )?;
    Ok(id)
}

//! Async boundary to the record store. `RecordStore` is the typed interface
//! the views program against; `RemoteStore` binds it to a command-style
//! backend through the boundary codec, so a backend only ever sees the wire
//! shape.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use tracing::debug;

use crate::codec;
use crate::error::{Result, TallyError};
use crate::models::{Field, Record};

pub type StoreRef = Arc<dyn RecordStore>;
pub type BackendRef = Arc<dyn WireBackend>;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Current values of one taxonomy, in insertion order.
    async fn get_types_for_field(&self, field: Field) -> Result<Vec<String>>;

    /// Append a value to a taxonomy. Duplicates are refused by the store.
    async fn add_new_value(&self, field: Field, value: &str) -> Result<()>;

    /// One page of records strictly below the cursor, newest first.
    async fn get_records(
        &self,
        page_size: u32,
        cursor_date: NaiveDate,
        cursor_id: i64,
    ) -> Result<Vec<Record>>;

    /// Persist a draft. The store assigns the id.
    async fn create_record(&self, record: &Record) -> Result<()>;

    /// Overwrite the committed record with the same id.
    async fn edit_record(&self, record: &Record) -> Result<()>;

    async fn delete_record(&self, id: i64) -> Result<()>;

    /// Bulk-load records from a spreadsheet on the store's side of the
    /// boundary. Returns how many records were added.
    async fn import_file(&self, path: &str) -> Result<u64>;
}

/// One command sent across the boundary. Argument keys follow the wire's
/// camelCase convention; record payloads inside use snake_case keys.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub command: &'static str,
    pub args: Value,
}

#[async_trait]
pub trait WireBackend: Send + Sync {
    async fn call(&self, request: WireRequest) -> Result<Value>;
}

pub struct RemoteStore {
    backend: BackendRef,
}

impl RemoteStore {
    pub fn new(backend: BackendRef) -> Self {
        Self { backend }
    }

    async fn call(&self, command: &'static str, args: Value) -> Result<Value> {
        debug!(command, "store call");
        self.backend.call(WireRequest { command, args }).await
    }

    /// For commands that answer with a bare flag. `false` means the store
    /// refused the operation without further detail.
    async fn call_flag(&self, command: &'static str, args: Value) -> Result<()> {
        match self.call(command, args).await?.as_bool() {
            Some(true) => Ok(()),
            Some(false) => Err(TallyError::Refused(command.to_string())),
            None => Err(TallyError::Wire(format!("{command}: expected a boolean reply"))),
        }
    }

    /// Whether the backing database exists yet.
    pub async fn is_initialized(&self) -> Result<bool> {
        self.call("is_initialized", json!({}))
            .await?
            .as_bool()
            .ok_or_else(|| TallyError::Wire("is_initialized: expected a boolean reply".into()))
    }

    /// Open (or create) the store with `passphrase`. A `false` reply means
    /// the passphrase does not match the existing database.
    pub async fn unlock(&self, passphrase: &str) -> Result<bool> {
        self.call("unlock", json!({ "passphrase": passphrase }))
            .await?
            .as_bool()
            .ok_or_else(|| TallyError::Wire("unlock: expected a boolean reply".into()))
    }
}

#[async_trait]
impl RecordStore for RemoteStore {
    async fn get_types_for_field(&self, field: Field) -> Result<Vec<String>> {
        let reply = self
            .call("get_types_for_field", json!({ "fieldName": field.wire_name() }))
            .await?;
        reply
            .as_array()
            .ok_or_else(|| TallyError::Wire("get_types_for_field: expected a list".into()))?
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| TallyError::Wire("taxonomy value is not text".into()))
            })
            .collect()
    }

    async fn add_new_value(&self, field: Field, value: &str) -> Result<()> {
        self.call_flag(
            "add_new_value",
            json!({ "fieldName": field.wire_name(), "newValue": value }),
        )
        .await
    }

    async fn get_records(
        &self,
        page_size: u32,
        cursor_date: NaiveDate,
        cursor_id: i64,
    ) -> Result<Vec<Record>> {
        let reply = self
            .call(
                "get_records",
                json!({
                    "recordsPerPage": page_size,
                    "lastSeenDate": codec::encode_date(cursor_date),
                    "lastSeenId": cursor_id,
                }),
            )
            .await?;
        reply
            .as_array()
            .ok_or_else(|| TallyError::Wire("get_records: expected a list".into()))?
            .iter()
            .map(codec::decode_record)
            .collect()
    }

    async fn create_record(&self, record: &Record) -> Result<()> {
        self.call_flag("create_record", json!({ "newRecord": codec::encode_record(record) }))
            .await
    }

    async fn edit_record(&self, record: &Record) -> Result<()> {
        if record.id.is_none() {
            return Err(TallyError::Wire("edit_record needs a persisted record".into()));
        }
        self.call_flag("edit_record", json!({ "record": codec::encode_record(record) }))
            .await
    }

    async fn delete_record(&self, id: i64) -> Result<()> {
        self.call_flag("delete_record", json!({ "id": id })).await
    }

    async fn import_file(&self, path: &str) -> Result<u64> {
        let reply = self.call("import_file", json!({ "filePath": path })).await?;
        reply
            .as_u64()
            .ok_or_else(|| TallyError::Wire("import_file: expected a count".into()))
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use rust_decimal::Decimal;

    /// Backend double that records every request and replays canned replies.
    struct RecordingBackend {
        requests: Mutex<Vec<WireRequest>>,
        replies: Mutex<Vec<Value>>,
    }

    impl RecordingBackend {
        fn new(replies: Vec<Value>) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                replies: Mutex::new(replies),
            })
        }

        fn requests(&self) -> Vec<WireRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WireBackend for RecordingBackend {
        async fn call(&self, request: WireRequest) -> Result<Value> {
            self.requests.lock().unwrap().push(request);
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Ok(json!(true))
            } else {
                Ok(replies.remove(0))
            }
        }
    }

    fn draft() -> Record {
        Record {
            id: None,
            date: chrono::NaiveDate::from_ymd_opt(2025, 5, 2).unwrap(),
            name: "Bus fare".to_string(),
            category: "Transport".to_string(),
            transaction_types: vec!["One-off".to_string()],
            bank: "Metro Credit Union".to_string(),
            amount: Decimal::new(-450, 2),
        }
    }

    #[tokio::test]
    async fn test_get_records_sends_camel_case_cursor_args() {
        let backend = RecordingBackend::new(vec![json!([])]);
        let store = RemoteStore::new(backend.clone());

        let cursor_date = chrono::NaiveDate::from_ymd_opt(2025, 5, 2).unwrap();
        let page = store.get_records(10, cursor_date, 37).await.unwrap();
        assert!(page.is_empty());

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].command, "get_records");
        assert_eq!(
            requests[0].args,
            json!({ "recordsPerPage": 10, "lastSeenDate": "2025-05-02", "lastSeenId": 37 })
        );
    }

    #[tokio::test]
    async fn test_create_record_omits_id_in_payload() {
        let backend = RecordingBackend::new(vec![json!(true)]);
        let store = RemoteStore::new(backend.clone());

        store.create_record(&draft()).await.unwrap();

        let requests = backend.requests();
        assert_eq!(requests[0].command, "create_record");
        let payload = &requests[0].args["newRecord"];
        assert!(payload.get("id").is_none());
        assert_eq!(payload["transaction_types"], json!(["One-off"]));
        assert_eq!(payload["amount"], json!(-4.5));
    }

    #[tokio::test]
    async fn test_false_reply_surfaces_as_refused() {
        let backend = RecordingBackend::new(vec![json!(false)]);
        let store = RemoteStore::new(backend);

        let err = store.delete_record(9).await.unwrap_err();
        assert!(matches!(err, TallyError::Refused(_)));
    }

    #[tokio::test]
    async fn test_edit_record_requires_an_id() {
        let backend = RecordingBackend::new(vec![]);
        let store = RemoteStore::new(backend.clone());

        assert!(store.edit_record(&draft()).await.is_err());
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn test_add_new_value_names_the_field() {
        let backend = RecordingBackend::new(vec![json!(true)]);
        let store = RemoteStore::new(backend.clone());

        store.add_new_value(Field::TransactionType, "Refund").await.unwrap();

        let requests = backend.requests();
        assert_eq!(requests[0].command, "add_new_value");
        assert_eq!(
            requests[0].args,
            json!({ "fieldName": "transaction_type", "newValue": "Refund" })
        );
    }

    #[tokio::test]
    async fn test_get_records_decodes_wire_payload() {
        let backend = RecordingBackend::new(vec![json!([{
            "id": 3,
            "date": "2025-04-30",
            "name": "Gym",
            "category": "Health",
            "bank": "First National",
            "transaction_types": ["Subscription"],
            "amount": -55.0,
        }])]);
        let store = RemoteStore::new(backend);

        let cursor_date = chrono::NaiveDate::from_ymd_opt(2025, 5, 2).unwrap();
        let page = store.get_records(10, cursor_date, 37).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, Some(3));
        assert_eq!(page[0].amount, Decimal::new(-55, 0));
        assert_eq!(page[0].transaction_types, vec!["Subscription".to_string()]);
    }
}

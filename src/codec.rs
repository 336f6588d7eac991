//! Boundary codec between the client model and the store's wire shape.
//! Argument keys cross the wire in camelCase, record payloads in snake_case,
//! dates as `YYYY-MM-DD` text, amounts as plain JSON numbers. Nothing outside
//! this module should know those conventions.

use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};

use crate::error::{Result, TallyError};
use crate::models::Record;

pub const WIRE_DATE_FMT: &str = "%Y-%m-%d";

/// camelCase to snake_case: every uppercase letter becomes an underscore
/// plus its lowercase form.
fn snake_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 2);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// snake_case to camelCase: an underscore swallows itself and uppercases the
/// letter that follows.
fn camel_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for c in key.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn map_keys(value: Value, convert: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(convert(&k), map_keys(v, convert));
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| map_keys(v, convert)).collect())
        }
        other => other,
    }
}

/// Recursively rewrite every object key from camelCase to snake_case.
/// Values pass through untouched; arrays convert element-wise.
pub fn to_wire_keys(value: Value) -> Value {
    map_keys(value, &snake_key)
}

/// Recursively rewrite every object key from snake_case to camelCase.
pub fn from_wire_keys(value: Value) -> Value {
    map_keys(value, &camel_key)
}

pub fn encode_date(date: NaiveDate) -> String {
    date.format(WIRE_DATE_FMT).to_string()
}

pub fn decode_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, WIRE_DATE_FMT).map_err(|_| TallyError::BadDate(raw.to_string()))
}

/// Encode a record as its wire object. A draft (`id` of `None`) omits the id
/// key so the store assigns one.
pub fn encode_record(record: &Record) -> Value {
    let mut map = Map::new();
    if let Some(id) = record.id {
        map.insert("id".into(), json!(id));
    }
    map.insert("date".into(), json!(encode_date(record.date)));
    map.insert("name".into(), json!(record.name));
    map.insert("category".into(), json!(record.category));
    map.insert("bank".into(), json!(record.bank));
    map.insert("transaction_types".into(), json!(record.transaction_types));
    map.insert("amount".into(), json!(record.amount));
    Value::Object(map)
}

/// Decode a wire object into a record. Records coming back from the store
/// always carry an id; a payload without one is malformed.
pub fn decode_record(value: &Value) -> Result<Record> {
    let obj = value
        .as_object()
        .ok_or_else(|| TallyError::Wire("record is not an object".into()))?;
    let id = obj
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| TallyError::Wire("record is missing an id".into()))?;
    let date = decode_date(str_field(obj, "date")?)?;
    let transaction_types = obj
        .get("transaction_types")
        .and_then(Value::as_array)
        .ok_or_else(|| TallyError::Wire("record is missing transaction_types".into()))?
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| TallyError::Wire("transaction type is not text".into()))
        })
        .collect::<Result<Vec<_>>>()?;
    let raw_amount = obj
        .get("amount")
        .and_then(Value::as_f64)
        .ok_or_else(|| TallyError::Wire("record is missing an amount".into()))?;
    let amount = Decimal::from_f64(raw_amount)
        .ok_or_else(|| TallyError::BadAmount(raw_amount.to_string()))?;

    Ok(Record {
        id: Some(id),
        date,
        name: str_field(obj, "name")?.to_string(),
        category: str_field(obj, "category")?.to_string(),
        transaction_types,
        bank: str_field(obj, "bank")?.to_string(),
        amount,
    })
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| TallyError::Wire(format!("record is missing {key}")))
}

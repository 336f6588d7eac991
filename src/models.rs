use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::{Result, TallyError};

/// A dated monetary record. `id` is assigned by the store: `None` marks a
/// draft that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: Option<i64>,
    pub date: NaiveDate,
    pub name: String,
    pub category: String,
    pub transaction_types: Vec<String>,
    pub bank: String,
    pub amount: Decimal,
}

/// The three open-ended value lists used to classify records. Categories and
/// banks are single-choice per record; transaction types are a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Category,
    Bank,
    TransactionType,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::Category, Field::Bank, Field::TransactionType];

    /// Identifier used for this field over the wire.
    pub fn wire_name(self) -> &'static str {
        match self {
            Field::Category => "category",
            Field::Bank => "bank",
            Field::TransactionType => "transaction_type",
        }
    }

    pub fn from_wire(name: &str) -> Result<Field> {
        match name {
            "category" => Ok(Field::Category),
            "bank" => Ok(Field::Bank),
            "transaction_type" => Ok(Field::TransactionType),
            other => Err(TallyError::UnknownField(other.to_string())),
        }
    }

    /// Human label for prompts and table headers.
    pub fn label(self) -> &'static str {
        match self {
            Field::Category => "category",
            Field::Bank => "bank",
            Field::TransactionType => "transaction type",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_wire_names_round_trip() {
        for field in Field::ALL {
            assert_eq!(Field::from_wire(field.wire_name()).unwrap(), field);
        }
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        assert!(Field::from_wire("account").is_err());
    }
}

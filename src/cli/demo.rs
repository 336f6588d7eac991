use std::path::Path;

use chrono::{Duration, Local};
use rust_decimal::Decimal;

use crate::cli::{open_store, unlock_existing};
use crate::error::{Result, TallyError};
use crate::models::{Field, Record};
use crate::pager::PageCursor;
use crate::store::RecordStore;

const CATEGORIES: &[&str] = &["Food", "Housing", "Transport", "Health", "Leisure"];
const BANKS: &[&str] = &["First National", "Metro Credit Union"];
const TYPES: &[&str] = &["Essential", "Subscription", "One-off", "Refund", "Recurring"];

struct DemoRecord {
    days_ago: i64,
    name: &'static str,
    category: &'static str,
    bank: &'static str,
    cents: i64,
    types: &'static [&'static str],
}

const RECORDS: &[DemoRecord] = &[
    DemoRecord { days_ago: 1, name: "Weekly shop", category: "Food", bank: "First National", cents: -8140, types: &["Essential"] },
    DemoRecord { days_ago: 1, name: "City metro pass", category: "Transport", bank: "Metro Credit Union", cents: -1250, types: &["Essential", "Recurring"] },
    DemoRecord { days_ago: 3, name: "Streaming service", category: "Leisure", bank: "First National", cents: -1499, types: &["Subscription"] },
    DemoRecord { days_ago: 5, name: "Rent", category: "Housing", bank: "First National", cents: -142000, types: &["Essential", "Recurring"] },
    DemoRecord { days_ago: 7, name: "Pharmacy", category: "Health", bank: "Metro Credit Union", cents: -2310, types: &["One-off"] },
    DemoRecord { days_ago: 9, name: "Returned kettle", category: "Housing", bank: "First National", cents: 3499, types: &["Refund"] },
    DemoRecord { days_ago: 12, name: "Gym membership", category: "Health", bank: "First National", cents: -5500, types: &["Subscription", "Recurring"] },
    DemoRecord { days_ago: 14, name: "Dinner out", category: "Food", bank: "Metro Credit Union", cents: -6420, types: &["One-off"] },
    DemoRecord { days_ago: 17, name: "Electricity bill", category: "Housing", bank: "First National", cents: -9832, types: &["Essential", "Recurring"] },
    DemoRecord { days_ago: 21, name: "Train tickets", category: "Transport", bank: "Metro Credit Union", cents: -4300, types: &["One-off"] },
    DemoRecord { days_ago: 25, name: "Weekly shop", category: "Food", bank: "First National", cents: -7685, types: &["Essential"] },
    DemoRecord { days_ago: 31, name: "Cinema night", category: "Leisure", bank: "Metro Credit Union", cents: -2800, types: &[] },
    DemoRecord { days_ago: 38, name: "Dentist check-up", category: "Health", bank: "First National", cents: -8900, types: &["One-off"] },
    DemoRecord { days_ago: 45, name: "Internet", category: "Housing", bank: "First National", cents: -4599, types: &["Essential", "Subscription", "Recurring"] },
    DemoRecord { days_ago: 52, name: "Bicycle repair", category: "Transport", bank: "Metro Credit Union", cents: -3175, types: &["One-off"] },
    DemoRecord { days_ago: 60, name: "Weekend away", category: "Leisure", bank: "First National", cents: -21500, types: &["One-off"] },
];

pub async fn run(data_dir: &Path) -> Result<()> {
    let store = open_store(data_dir);
    unlock_existing(&store).await?;

    // Demo data loads once; an empty record list is the guard.
    let cursor = PageCursor::initial();
    let existing = store.get_records(1, cursor.date, cursor.id).await?;
    if !existing.is_empty() {
        println!("This ledger already has records; demo data loads only into an empty one.");
        return Ok(());
    }

    load_demo(store.as_ref()).await?;

    println!("Demo data loaded!");
    println!("  Records:           {}", RECORDS.len());
    println!("  Categories:        {}", CATEGORIES.len());
    println!("  Banks:             {}", BANKS.len());
    println!("  Transaction types: {}", TYPES.len());
    println!();
    println!("Try these next:");
    println!("  tally open");
    println!("  tally status");
    println!("  tally taxonomy list category");
    Ok(())
}

async fn load_demo(store: &dyn RecordStore) -> Result<()> {
    for value in CATEGORIES {
        seed_value(store, Field::Category, value).await?;
    }
    for value in BANKS {
        seed_value(store, Field::Bank, value).await?;
    }
    for value in TYPES {
        seed_value(store, Field::TransactionType, value).await?;
    }

    let today = Local::now().date_naive();
    for row in RECORDS {
        let record = Record {
            id: None,
            date: today - Duration::days(row.days_ago),
            name: row.name.to_string(),
            category: row.category.to_string(),
            transaction_types: row.types.iter().map(|t| t.to_string()).collect(),
            bank: row.bank.to_string(),
            amount: Decimal::new(row.cents, 2),
        };
        store.create_record(&record).await?;
    }
    Ok(())
}

/// Values that are already present are fine; the demo reruns after a partial
/// load without tripping on its own seeds.
async fn seed_value(store: &dyn RecordStore, field: Field, value: &str) -> Result<()> {
    match store.add_new_value(field, value).await {
        Ok(()) | Err(TallyError::Refused(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::MemoryStore;

    #[test]
    fn test_demo_rows_reference_seeded_taxonomies() {
        for row in RECORDS {
            assert!(CATEGORIES.contains(&row.category), "unknown category {}", row.category);
            assert!(BANKS.contains(&row.bank), "unknown bank {}", row.bank);
            for t in row.types {
                assert!(TYPES.contains(t), "unknown type {t}");
            }
        }
    }

    #[tokio::test]
    async fn test_load_demo_fills_store_and_taxonomies() {
        let store = MemoryStore::new();
        load_demo(&store).await.unwrap();

        assert_eq!(store.records().len(), RECORDS.len());
        assert_eq!(
            store.get_types_for_field(Field::Category).await.unwrap().len(),
            CATEGORIES.len()
        );
        assert_eq!(
            store.get_types_for_field(Field::TransactionType).await.unwrap(),
            TYPES.iter().map(|t| t.to_string()).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_load_demo_tolerates_preseeded_values() {
        let store = MemoryStore::new();
        store.seed_values(Field::Category, &["Food"]);

        load_demo(&store).await.unwrap();

        let categories = store.get_types_for_field(Field::Category).await.unwrap();
        assert_eq!(categories.iter().filter(|c| *c == "Food").count(), 1);
        assert_eq!(categories.len(), CATEGORIES.len());
    }
}

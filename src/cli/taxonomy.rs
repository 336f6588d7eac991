use std::path::Path;

use crate::cli::{open_store, parse_field, unlock_existing};
use crate::error::{Result, TallyError};
use crate::store::RecordStore;

pub async fn add(data_dir: &Path, field: &str, value: &str) -> Result<()> {
    let field = parse_field(field)?;
    let store = open_store(data_dir);
    unlock_existing(&store).await?;

    match store.add_new_value(field, value).await {
        Ok(()) => println!("Added {}: {}", field.label(), value.trim()),
        Err(TallyError::Refused(_)) => {
            println!("'{}' is already a {} value.", value.trim(), field.label());
        }
        Err(e) => return Err(e),
    }
    Ok(())
}

pub async fn list(data_dir: &Path, field: &str) -> Result<()> {
    let field = parse_field(field)?;
    let store = open_store(data_dir);
    unlock_existing(&store).await?;

    let values = store.get_types_for_field(field).await?;
    if values.is_empty() {
        println!("No {} values yet.", field.label());
        return Ok(());
    }
    for value in values {
        println!("{value}");
    }
    Ok(())
}

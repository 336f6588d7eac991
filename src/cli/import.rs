use std::path::Path;

use crate::cli::{open_store, unlock_existing};
use crate::error::Result;
use crate::store::RecordStore;

pub async fn run(data_dir: &Path, file: &str) -> Result<()> {
    let store = open_store(data_dir);
    unlock_existing(&store).await?;

    let count = store.import_file(file).await?;
    println!("{count} records imported from {file}");
    Ok(())
}

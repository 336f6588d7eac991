use std::path::Path;

use zeroize::Zeroize;

use crate::cli::{open_store, prompt_new_passphrase};
use crate::db::DB_FILE;
use crate::error::{Result, TallyError};
use crate::settings::{save_settings, Settings};

pub async fn run(data_dir: &Path) -> Result<()> {
    let db_path = data_dir.join(DB_FILE);
    if db_path.exists() {
        return Err(TallyError::Other(format!(
            "a ledger already exists at {}",
            db_path.display()
        )));
    }
    std::fs::create_dir_all(data_dir)?;

    let mut passphrase = prompt_new_passphrase()?;
    let store = open_store(data_dir);
    let opened = store.unlock(&passphrase).await;
    passphrase.zeroize();
    opened?;

    save_settings(&Settings {
        data_dir: data_dir.to_string_lossy().to_string(),
    })?;

    println!("Initialized tally at {}", data_dir.display());
    println!();
    println!("Try these next:");
    println!("  tally taxonomy add category Food");
    println!("  tally demo");
    println!("  tally open");
    Ok(())
}

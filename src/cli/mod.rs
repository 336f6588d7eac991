pub mod demo;
pub mod import;
pub mod init;
pub mod open;
pub mod status;
pub mod taxonomy;

use std::path::Path;
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};
use zeroize::Zeroize;

use crate::db::SqliteBackend;
use crate::error::{Result, TallyError};
use crate::models::Field;
use crate::store::RemoteStore;

/// Wrong passphrases tolerated before giving up.
const PASSPHRASE_ATTEMPTS: u32 = 3;

#[derive(Parser)]
#[command(name = "tally", about = "Encrypted personal spending ledger.")]
pub struct Cli {
    /// Use this data directory instead of the configured one.
    #[arg(long = "data-dir", global = true)]
    pub data_dir: Option<String>,

    /// Increase log verbosity (-v info, -vv debug). Non-interactive commands only.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a passphrase and create the encrypted database.
    Init,
    /// Open the interactive ledger (the default when no command is given).
    Open,
    /// Import records from an XLSX spreadsheet.
    Import {
        /// Path to the spreadsheet
        file: String,
    },
    /// Manage the category, bank and transaction type lists.
    Taxonomy {
        #[command(subcommand)]
        command: TaxonomyCommands,
    },
    /// Show the current database and summary statistics.
    Status,
    /// Load sample records and taxonomies to explore Tally.
    Demo,
}

#[derive(Subcommand)]
pub enum TaxonomyCommands {
    /// Append a value to one of the lists.
    Add {
        /// Which list: category, bank or type
        field: String,
        /// The value to append
        value: String,
    },
    /// Print one list in entry order.
    List {
        /// Which list: category, bank or type
        field: String,
    },
}

pub(crate) fn parse_field(name: &str) -> Result<Field> {
    match name.trim().to_ascii_lowercase().as_str() {
        "category" | "categories" => Ok(Field::Category),
        "bank" | "banks" => Ok(Field::Bank),
        "type" | "types" | "transaction-type" | "transaction_type" => Ok(Field::TransactionType),
        other => Err(TallyError::UnknownField(other.to_string())),
    }
}

/// Store handle over the SQLCipher backend in `data_dir`. The store stays
/// locked until a passphrase opens it.
pub(crate) fn open_store(data_dir: &Path) -> Arc<RemoteStore> {
    let backend = Arc::new(SqliteBackend::new(data_dir));
    Arc::new(RemoteStore::new(backend))
}

/// Ask for the passphrase twice until both entries match. Rejected buffers
/// are wiped before the next round.
pub(crate) fn prompt_new_passphrase() -> Result<String> {
    loop {
        let mut first = rpassword::prompt_password("Choose a passphrase: ")?;
        if first.trim().is_empty() {
            first.zeroize();
            println!("A passphrase is required.");
            continue;
        }
        let mut second = rpassword::prompt_password("Confirm passphrase: ")?;
        let matched = first == second;
        second.zeroize();
        if matched {
            return Ok(first);
        }
        first.zeroize();
        println!("The passphrases do not match. Try again.");
    }
}

/// Prompt for the passphrase and unlock the store, retrying a few times on a
/// wrong entry.
pub(crate) async fn unlock_store(store: &RemoteStore) -> Result<()> {
    for remaining in (0..PASSPHRASE_ATTEMPTS).rev() {
        let mut passphrase = rpassword::prompt_password("Passphrase: ")?;
        let opened = store.unlock(&passphrase).await?;
        passphrase.zeroize();
        if opened {
            return Ok(());
        }
        if remaining > 0 {
            println!("That passphrase does not open this ledger.");
        }
    }
    Err(TallyError::BadPassphrase)
}

/// Unlock, refusing to run against a ledger that was never initialized.
pub(crate) async fn unlock_existing(store: &RemoteStore) -> Result<()> {
    if !store.is_initialized().await? {
        return Err(TallyError::Other(
            "no ledger found; run `tally init` first".to_string(),
        ));
    }
    unlock_store(store).await
}

use std::path::Path;
use std::sync::Arc;

use tokio::runtime::Runtime;

use crate::cache::QueryCache;
use crate::cli::{open_store, unlock_existing};
use crate::error::Result;
use crate::ledger::LedgerView;
use crate::store::StoreRef;

/// Unlock the ledger and hand the terminal to the interactive view. The
/// runtime's workers carry the store calls while the view loop keeps the
/// calling thread.
pub fn run(data_dir: &Path, runtime: &Runtime) -> Result<()> {
    let store = open_store(data_dir);
    runtime.block_on(unlock_existing(&store))?;

    let store_ref: StoreRef = store;
    let view = LedgerView::new(store_ref, Arc::new(QueryCache::new()));
    view.run(runtime.handle())
}

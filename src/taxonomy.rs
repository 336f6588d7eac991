//! Cached view of the three taxonomy value lists. Values load once per cache
//! epoch; appending a value invalidates that field and reloads it, so every
//! selector sees the new label on its next read.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::cache::{CacheKey, QueryCache};
use crate::error::{Result, TallyError};
use crate::models::Field;
use crate::store::StoreRef;

struct Loaded {
    epoch: u64,
    values: Vec<String>,
}

pub struct TaxonomyStore {
    store: StoreRef,
    cache: Arc<QueryCache>,
    loaded: Mutex<HashMap<Field, Loaded>>,
}

impl TaxonomyStore {
    pub fn new(store: StoreRef, cache: Arc<QueryCache>) -> Self {
        Self {
            store,
            cache,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<Field, Loaded>> {
        self.loaded.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cached values for `field`. Possibly stale, empty until the first load
    /// completes; cheap enough to call per keystroke.
    pub fn values(&self, field: Field) -> Vec<String> {
        self.guard()
            .get(&field)
            .map(|entry| entry.values.clone())
            .unwrap_or_default()
    }

    pub fn is_fresh(&self, field: Field) -> bool {
        self.guard()
            .get(&field)
            .is_some_and(|entry| !self.cache.is_stale(CacheKey::Taxonomy(field), entry.epoch))
    }

    /// Fetch `field`'s values unless the cached copy is still fresh.
    pub async fn ensure_loaded(&self, field: Field) -> Result<Vec<String>> {
        if self.is_fresh(field) {
            return Ok(self.values(field));
        }
        let epoch = self.cache.epoch(CacheKey::Taxonomy(field));
        let values = self.store.get_types_for_field(field).await?;
        debug!(field = field.wire_name(), count = values.len(), "taxonomy loaded");
        self.guard().insert(field, Loaded { epoch, values: values.clone() });
        Ok(values)
    }

    /// Append a value to `field` and refresh the cached list. The empty
    /// string never reaches the store.
    pub async fn add_value(&self, field: Field, value: &str) -> Result<()> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(TallyError::Validation(format!(
                "A {} name is required",
                field.label()
            )));
        }
        self.store.add_new_value(field, trimmed).await?;
        self.cache.invalidate(CacheKey::Taxonomy(field));
        self.ensure_loaded(field).await?;
        Ok(())
    }
}

mod locator;
mod locks;

pub use locator::{Lookup, RecordLocator};
pub use locks::KeyedLocks;

use crate::config::UserFieldNames;
use crate::errors::LedgerResult;
use crate::records::{UserPatch, UserSnapshot};
use crate::store::RecordStore;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

/// The record an upsert touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRef {
    pub record_id: String,
    pub created: bool,
}

/// Find-or-create-then-update for user records, keyed by user id.
///
/// Upserts for the same user id are serialized in-process, so a
/// read-modify-write of the counters never interleaves with another one.
/// Writers in other processes are not coordinated.
pub struct Upserter {
    store: Arc<dyn RecordStore>,
    locator: RecordLocator,
    table: String,
    names: UserFieldNames,
    locks: KeyedLocks,
}

impl Upserter {
    pub fn new(store: Arc<dyn RecordStore>, table: String, names: UserFieldNames) -> Self {
        let locator = RecordLocator::new(store.clone(), table.clone(), names.user_id.clone());
        Self {
            store,
            locator,
            table,
            names,
            locks: KeyedLocks::new(),
        }
    }

    pub fn locator(&self) -> &RecordLocator {
        &self.locator
    }

    pub fn field_names(&self) -> &UserFieldNames {
        &self.names
    }

    /// Apply `update` to the user's record, creating it if absent.
    ///
    /// `update` sees `None` for a new record. On create, the key column is
    /// set from `user_id`. A failed lookup is returned as-is and nothing is
    /// written.
    pub async fn upsert<F>(&self, user_id: &str, update: F) -> LedgerResult<RecordRef>
    where
        F: FnOnce(Option<&UserSnapshot>) -> UserPatch + Send,
    {
        let _guard = self.locks.lock(user_id).await;

        match self.locator.find_by_user_id(user_id).await {
            Lookup::Found(record) => {
                let current = UserSnapshot::decode(&record, &self.names)?;
                let fields = update(Some(&current)).to_fields(&self.names);
                if fields.is_empty() {
                    debug!("upsert: nothing to change for {}", user_id);
                } else {
                    self.store
                        .update(&self.table, &record.record_id, fields)
                        .await?;
                    debug!("upsert: updated {} ({})", user_id, record.record_id);
                }
                Ok(RecordRef {
                    record_id: record.record_id,
                    created: false,
                })
            }
            Lookup::NotFound => {
                let mut fields = update(None).to_fields(&self.names);
                fields.insert(self.names.user_id.clone(), json!(user_id));
                let created = self.store.create(&self.table, fields).await?;
                info!("upsert: created record {} for {}", created.record_id, user_id);
                Ok(RecordRef {
                    record_id: created.record_id,
                    created: true,
                })
            }
            Lookup::Failed(e) => Err(e),
        }
    }
}

/// Counter arithmetic for read-modify-write updates.
pub fn increment(current: u64, delta: u64) -> u64 {
    current.saturating_add(delta)
}

#[cfg(test)]
mod tests;

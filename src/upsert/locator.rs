use crate::errors::LedgerError;
use crate::store::{RecordStore, SearchQuery, StoredRecord};
use std::sync::Arc;
use tracing::debug;

/// Outcome of a lookup. Only `NotFound` may lead to a create.
#[derive(Debug)]
pub enum Lookup {
    Found(StoredRecord),
    NotFound,
    Failed(LedgerError),
}

impl Lookup {
    pub fn record_id(&self) -> Option<&str> {
        match self {
            Self::Found(rec) => Some(&rec.record_id),
            Self::NotFound | Self::Failed(_) => None,
        }
    }
}

/// Finds the single record whose key column equals a user id.
pub struct RecordLocator {
    store: Arc<dyn RecordStore>,
    table: String,
    key_field: String,
}

impl RecordLocator {
    pub fn new(store: Arc<dyn RecordStore>, table: String, key_field: String) -> Self {
        Self {
            store,
            table,
            key_field,
        }
    }

    pub async fn find_by_user_id(&self, user_id: &str) -> Lookup {
        let query = SearchQuery::equals(&self.key_field, user_id);
        match self.store.search(&self.table, &query).await {
            Ok(records) => match records.into_iter().next() {
                Some(rec) => {
                    debug!("locator: {} -> {}", user_id, rec.record_id);
                    Lookup::Found(rec)
                }
                None => Lookup::NotFound,
            },
            Err(e) => Lookup::Failed(e),
        }
    }
}

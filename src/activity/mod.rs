use crate::config::ActivityFieldNames;
use crate::errors::LedgerResult;
use crate::records::{ActivityEntry, HistoryItem};
use crate::store::{RecordStore, SearchQuery};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
pub const MAX_HISTORY_LIMIT: u32 = 500;

/// Appends rows to the activity table and reads them back per user.
pub struct ActivityLogger {
    store: Arc<dyn RecordStore>,
    table: String,
    names: ActivityFieldNames,
}

impl ActivityLogger {
    pub fn new(store: Arc<dyn RecordStore>, table: String, names: ActivityFieldNames) -> Self {
        Self {
            store,
            table,
            names,
        }
    }

    pub async fn append(&self, entry: &ActivityEntry) -> LedgerResult<()> {
        let fields = entry.to_fields(&self.names);
        let rec = self.store.create(&self.table, fields).await?;
        debug!(
            "activity: {} {} for {} -> {}",
            entry.direction.as_str(),
            entry.event_kind.as_str(),
            entry.user_id,
            rec.record_id
        );
        Ok(())
    }

    /// Oldest-first rows for `user_id`, at most `limit` (clamped to
    /// `1..=MAX_HISTORY_LIMIT`).
    pub async fn history(&self, user_id: &str, limit: u32) -> LedgerResult<Vec<HistoryItem>> {
        let query = SearchQuery::equals(&self.names.user_id, user_id)
            .page_size(clamp_limit(limit))
            .sorted_by(&self.names.timestamp, false);
        let records = self.store.search(&self.table, &query).await?;
        Ok(records
            .iter()
            .map(|r| HistoryItem::from_record(r, &self.names))
            .collect())
    }
}

pub fn clamp_limit(limit: u32) -> u32 {
    limit.clamp(1, MAX_HISTORY_LIMIT)
}

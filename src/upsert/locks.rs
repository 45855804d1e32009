use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per key, created on demand.
///
/// Entries nobody holds or waits on are pruned on the next acquisition, so
/// the table stays proportional to in-flight keys.
#[derive(Default)]
pub struct KeyedLocks {
    table: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut table = self.table.lock().await;
            table.retain(|k, m| k == key || Arc::strong_count(m) > 1);
            table
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }

    pub async fn len(&self) -> usize {
        self.table.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.table.lock().await.is_empty()
    }
}

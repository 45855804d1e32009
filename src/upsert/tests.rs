use super::*;
use crate::errors::LedgerError;
use crate::store::{Fields, SearchQuery, StoredRecord};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct TestStore {
    rows: Mutex<Vec<StoredRecord>>,
    fail_search: bool,
    writes: AtomicUsize,
}

#[async_trait]
impl RecordStore for TestStore {
    async fn search(&self, _table: &str, query: &SearchQuery) -> LedgerResult<Vec<StoredRecord>> {
        if self.fail_search {
            return Err(LedgerError::Lookup("search unavailable".into()));
        }
        // Yield so concurrent upserts actually interleave without the lock.
        tokio::task::yield_now().await;
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|r| r.fields.get(&query.field) == Some(&json!(query.value)))
            .take(query.page_size as usize)
            .cloned()
            .collect())
    }

    async fn create(&self, _table: &str, fields: Fields) -> LedgerResult<StoredRecord> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows.lock().unwrap();
        let rec = StoredRecord {
            record_id: format!("rec{}", rows.len() + 1),
            fields,
        };
        rows.push(rec.clone());
        Ok(rec)
    }

    async fn update(
        &self,
        _table: &str,
        record_id: &str,
        fields: Fields,
    ) -> LedgerResult<StoredRecord> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let mut rows = self.rows.lock().unwrap();
        let rec = rows
            .iter_mut()
            .find(|r| r.record_id == record_id)
            .ok_or_else(|| LedgerError::Write(format!("no record {record_id}")))?;
        rec.fields.extend(fields);
        Ok(rec.clone())
    }
}

fn upserter(store: Arc<TestStore>) -> Upserter {
    Upserter::new(store, "tblUsers".into(), UserFieldNames::default())
}

fn bump(current: Option<&UserSnapshot>) -> UserPatch {
    let total = current.map_or(0, |c| c.total_interactions);
    UserPatch {
        total_interactions: Some(increment(total, 1)),
        ..UserPatch::default()
    }
}

#[tokio::test]
async fn test_upsert_creates_when_absent() {
    let store = Arc::new(TestStore::default());
    let up = upserter(store.clone());

    let rec = up.upsert("U1", bump).await.unwrap();
    assert!(rec.created);
    let rows = store.rows.lock().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].fields["line_user_id"], json!("U1"));
    assert_eq!(rows[0].fields["total_interactions"], json!(1));
}

#[tokio::test]
async fn test_upsert_updates_existing() {
    let store = Arc::new(TestStore::default());
    let up = upserter(store.clone());

    let first = up.upsert("U1", bump).await.unwrap();
    let second = up.upsert("U1", bump).await.unwrap();
    assert!(!second.created);
    assert_eq!(first.record_id, second.record_id);
    let rows = store.rows.lock().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].fields["total_interactions"], json!(2));
}

#[tokio::test]
async fn test_update_fn_sees_none_only_on_create() {
    let store = Arc::new(TestStore::default());
    let up = upserter(store);

    up.upsert("U1", |current| {
        assert!(current.is_none());
        UserPatch::default()
    })
    .await
    .unwrap();
    up.upsert("U1", |current| {
        assert_eq!(current.map(|c| c.record_id.as_str()), Some("rec1"));
        UserPatch::default()
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_failed_lookup_writes_nothing() {
    let store = Arc::new(TestStore {
        fail_search: true,
        ..TestStore::default()
    });
    let up = upserter(store.clone());

    let err = up.upsert("U1", bump).await.unwrap_err();
    assert!(matches!(err, LedgerError::Lookup(_)));
    assert_eq!(store.writes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unreadable_counter_is_not_overwritten() {
    let store = Arc::new(TestStore::default());
    store.rows.lock().unwrap().push(StoredRecord {
        record_id: "rec1".into(),
        fields: json!({"line_user_id": "U1", "total_interactions": "n/a"})
            .as_object()
            .cloned()
            .unwrap(),
    });

    let result = upserter(store.clone()).upsert("U1", bump).await;
    assert!(matches!(result, Err(LedgerError::Lookup(_))));
    assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    assert_eq!(
        store.rows.lock().unwrap()[0].fields["total_interactions"],
        json!("n/a")
    );
}

#[tokio::test]
async fn test_empty_patch_on_existing_skips_write() {
    let store = Arc::new(TestStore::default());
    let up = upserter(store.clone());
    up.upsert("U1", bump).await.unwrap();

    up.upsert("U1", |_| UserPatch::default()).await.unwrap();
    assert_eq!(store.writes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_upserts_same_user_do_not_lose_increments() {
    let store = Arc::new(TestStore::default());
    let up = Arc::new(upserter(store.clone()));

    let mut handles = Vec::new();
    for _ in 0..20 {
        let up = up.clone();
        handles.push(tokio::spawn(async move { up.upsert("U1", bump).await }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }

    let rows = store.rows.lock().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].fields["total_interactions"], json!(20));
}

#[tokio::test]
async fn test_keyed_locks_prune_released_entries() {
    let locks = KeyedLocks::new();
    {
        let _a = locks.lock("a").await;
        let _b = locks.lock("b").await;
        assert_eq!(locks.len().await, 2);
    }
    let _c = locks.lock("c").await;
    assert_eq!(locks.len().await, 1);
}

#[tokio::test]
async fn test_keyed_locks_serialize_same_key() {
    let locks = Arc::new(KeyedLocks::new());
    let guard = locks.lock("U1").await;

    let locks2 = locks.clone();
    let waiter = tokio::spawn(async move {
        let _g = locks2.lock("U1").await;
    });
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());
    drop(guard);
    waiter.await.unwrap();
}

#[test]
fn test_increment_saturates() {
    assert_eq!(increment(1, 1), 2);
    assert_eq!(increment(u64::MAX, 1), u64::MAX);
}

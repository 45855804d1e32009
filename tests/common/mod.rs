// Shared test helpers, not all items used by every test binary.
#![allow(unused)]

use async_trait::async_trait;
use chatledger::config::{Config, StoreConfig};
use chatledger::dispatcher::EventDispatcher;
use chatledger::errors::{LedgerError, LedgerResult};
use chatledger::messaging::{MessagingPlatform, Profile};
use chatledger::records::cell_text;
use chatledger::store::{Fields, RecordStore, SearchQuery, StoredRecord};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub const USERS: &str = "tblUsers";
pub const MESSAGES: &str = "tblMsgs";

/// In-memory record store with failure injection.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<StoredRecord>>>,
    next_id: AtomicU64,
    /// Writes whose fields contain one of these values fail with `Write`.
    fail_writes_for: Mutex<HashSet<String>>,
    fail_searches: Mutex<bool>,
    /// Every call fails with `Auth`, as when the token exchange is rejected.
    auth_broken: Mutex<bool>,
    pub calls: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_writes_for(&self, value: &str) {
        self.fail_writes_for.lock().unwrap().insert(value.to_string());
    }

    pub fn fail_searches(&self) {
        *self.fail_searches.lock().unwrap() = true;
    }

    pub fn break_auth(&self) {
        *self.auth_broken.lock().unwrap() = true;
    }

    pub fn rows(&self, table: &str) -> Vec<StoredRecord> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn rows_for(&self, table: &str, key_field: &str, user_id: &str) -> Vec<StoredRecord> {
        self.rows(table)
            .into_iter()
            .filter(|r| r.fields.get(key_field).and_then(cell_text).as_deref() == Some(user_id))
            .collect()
    }

    pub fn insert(&self, table: &str, fields: Value) -> String {
        let record_id = self.new_id();
        let fields = fields.as_object().cloned().unwrap_or_default();
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(StoredRecord {
                record_id: record_id.clone(),
                fields,
            });
        record_id
    }

    fn new_id(&self) -> String {
        format!("rec{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn check_auth(&self) -> LedgerResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.auth_broken.lock().unwrap() {
            return Err(LedgerError::Auth("invalid app credentials".into()));
        }
        Ok(())
    }

    fn check_write(&self, fields: &Fields) -> LedgerResult<()> {
        let blocked = self.fail_writes_for.lock().unwrap();
        let hit = fields
            .values()
            .filter_map(cell_text)
            .any(|v| blocked.contains(&v));
        if hit {
            return Err(LedgerError::Write("injected write failure".into()));
        }
        Ok(())
    }
}

fn sort_key(record: &StoredRecord, field: &str) -> String {
    record
        .fields
        .get(field)
        .and_then(cell_text)
        .unwrap_or_default()
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn search(&self, table: &str, query: &SearchQuery) -> LedgerResult<Vec<StoredRecord>> {
        self.check_auth()?;
        if *self.fail_searches.lock().unwrap() {
            return Err(LedgerError::Lookup("injected search failure".into()));
        }
        let mut hits: Vec<StoredRecord> = self
            .rows(table)
            .into_iter()
            .filter(|r| {
                r.fields.get(&query.field).and_then(cell_text).as_deref()
                    == Some(query.value.as_str())
            })
            .collect();
        if let Some(sort) = &query.sort {
            hits.sort_by_key(|r| sort_key(r, &sort.field));
            if sort.desc {
                hits.reverse();
            }
        }
        hits.truncate(query.page_size as usize);
        Ok(hits)
    }

    async fn create(&self, table: &str, fields: Fields) -> LedgerResult<StoredRecord> {
        self.check_auth()?;
        self.check_write(&fields)?;
        let record = StoredRecord {
            record_id: self.new_id(),
            fields,
        };
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        table: &str,
        record_id: &str,
        fields: Fields,
    ) -> LedgerResult<StoredRecord> {
        self.check_auth()?;
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();
        let Some(row) = rows.iter_mut().find(|r| r.record_id == record_id) else {
            return Err(LedgerError::Write(format!("no record {record_id}")));
        };
        let mut merged = row.fields.clone();
        merged.extend(fields);
        self.check_write(&merged)?;
        row.fields = merged;
        Ok(row.clone())
    }
}

/// Messaging double that records pushes.
#[derive(Default)]
pub struct MockMessaging {
    pub profile: Mutex<Option<Profile>>,
    pub fail_push: Mutex<bool>,
    pub pushed: Mutex<Vec<(String, String)>>,
}

impl MockMessaging {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_profile(display_name: &str) -> Arc<Self> {
        let mock = Self::default();
        *mock.profile.lock().unwrap() = Some(Profile {
            display_name: display_name.to_string(),
            picture_url: Some(format!("https://img.example/{display_name}.png")),
            status_message: None,
        });
        Arc::new(mock)
    }
}

#[async_trait]
impl MessagingPlatform for MockMessaging {
    async fn get_profile(&self, user_id: &str) -> LedgerResult<Profile> {
        self.profile.lock().unwrap().clone().ok_or(LedgerError::Platform {
            status: 404,
            message: format!("no profile for {user_id}"),
        })
    }

    async fn push_text(&self, to: &str, text: &str) -> LedgerResult<()> {
        if *self.fail_push.lock().unwrap() {
            return Err(LedgerError::Platform {
                status: 400,
                message: "push rejected".into(),
            });
        }
        self.pushed
            .lock()
            .unwrap()
            .push((to.to_string(), text.to_string()));
        Ok(())
    }
}

pub fn test_config() -> Config {
    Config {
        store: StoreConfig {
            app_id: "cli_test".into(),
            app_secret: "secret".into(),
            app_token: "bascnTest".into(),
            users_table_id: USERS.into(),
            messages_table_id: MESSAGES.into(),
            ..StoreConfig::default()
        },
        ..Config::default()
    }
}

pub fn dispatcher_with(
    config: &Config,
    store: Arc<MemoryStore>,
    messaging: Arc<MockMessaging>,
) -> EventDispatcher {
    EventDispatcher::with_store(config, store, messaging)
}

pub fn follow(user_id: &str) -> Value {
    json!({"type": "follow", "timestamp": 1, "source": {"type": "user", "userId": user_id}})
}

pub fn unfollow(user_id: &str) -> Value {
    json!({"type": "unfollow", "timestamp": 1, "source": {"type": "user", "userId": user_id}})
}

pub fn text_message(user_id: &str, id: &str, text: &str) -> Value {
    json!({
        "type": "message",
        "timestamp": 1,
        "source": {"type": "user", "userId": user_id},
        "message": {"id": id, "type": "text", "text": text}
    })
}

pub fn sticker_message(user_id: &str, id: &str) -> Value {
    json!({
        "type": "message",
        "timestamp": 1,
        "source": {"type": "user", "userId": user_id},
        "message": {"id": id, "type": "sticker", "packageId": "1", "stickerId": "2"}
    })
}

pub fn postback(user_id: &str, data: &str) -> Value {
    json!({
        "type": "postback",
        "timestamp": 1,
        "source": {"type": "user", "userId": user_id},
        "postback": {"data": data}
    })
}

pub fn body(events: Vec<Value>) -> Vec<u8> {
    serde_json::to_vec(&json!({"destination": "Ubot", "events": events})).unwrap()
}

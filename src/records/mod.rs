//! Typed views of the two tables: per-user records and activity log rows.
//!
//! Column names are never hard-coded here; encoding and decoding go through
//! [`UserFieldNames`] / [`ActivityFieldNames`] so a deployment can rename or
//! disable columns from config.

use crate::config::{ActivityFieldNames, UserFieldNames};
use crate::errors::LedgerError;
use crate::store::{Fields, StoredRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
    System,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
            Self::System => "system",
        }
    }
}

/// Event kinds the activity log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Message,
    Postback,
    Follow,
    Unfollow,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Postback => "postback",
            Self::Follow => "follow",
            Self::Unfollow => "unfollow",
        }
    }
}

/// How a user first reached the account. Unknown labels round-trip verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySource {
    Direct,
    Liff,
    Social,
    Ads,
    Referral,
    /// Written on unfollow, replacing whatever source was there.
    Unfollow,
    Other(String),
}

impl EntrySource {
    pub fn from_label(label: &str) -> Self {
        match label {
            "direct" => Self::Direct,
            "liff" => Self::Liff,
            "social" => Self::Social,
            "ads" => Self::Ads,
            "referral" => Self::Referral,
            "LINE_unfollow" => Self::Unfollow,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Direct => "direct",
            Self::Liff => "liff",
            Self::Social => "social",
            Self::Ads => "ads",
            Self::Referral => "referral",
            Self::Unfollow => "LINE_unfollow",
            Self::Other(label) => label,
        }
    }
}

impl fmt::Display for EntrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Lenient cell decoding
// ---------------------------------------------------------------------------

/// Text cells come back either as a plain string or as rich-text segments
/// (`[{"type":"text","text":"..."}]`).
pub fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(segments) => {
            let joined: String = segments
                .iter()
                .filter_map(|seg| match seg {
                    Value::String(s) => Some(s.as_str()),
                    Value::Object(obj) => obj.get("text").and_then(Value::as_str),
                    _ => None,
                })
                .collect();
            Some(joined)
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Object(obj) => obj
            .get("text")
            .or_else(|| obj.get("link"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

fn cell_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        _ => cell_text(value)
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|f| *f >= 0.0)
            .map(|f| f as u64),
    }
}

fn cell_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        _ => cell_text(value).and_then(|s| s.trim().parse().ok()),
    }
}

fn cell_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        _ => cell_text(value).and_then(|s| match s.trim() {
            "true" | "1" => Some(true),
            "false" | "0" | "" => Some(false),
            _ => None,
        }),
    }
}

fn put_field(out: &mut Fields, name: &str, value: Value) {
    if !name.is_empty() {
        out.insert(name.to_string(), value);
    }
}

fn get<'a>(fields: &'a Fields, name: &str) -> Option<&'a Value> {
    if name.is_empty() {
        return None;
    }
    fields.get(name).filter(|v| !v.is_null())
}

// ---------------------------------------------------------------------------
// User records
// ---------------------------------------------------------------------------

/// Decoded current state of a user record, as seen by update functions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserSnapshot {
    pub record_id: String,
    pub display_name: Option<String>,
    pub first_message_text: Option<String>,
    pub engagement_score: u64,
    pub total_interactions: u64,
    pub joined_at_ms: Option<i64>,
    pub last_active_at_ms: Option<i64>,
    pub unsubscribed_at_ms: Option<i64>,
    pub is_blocked: bool,
    pub entry_source: Option<EntrySource>,
}

impl UserSnapshot {
    /// Missing or unparseable counters decode as zero.
    pub fn from_record(record: &StoredRecord, names: &UserFieldNames) -> Self {
        let f = &record.fields;
        let text = |name: &String| get(f, name).and_then(cell_text).filter(|s| !s.is_empty());
        Self {
            record_id: record.record_id.clone(),
            display_name: text(&names.display_name),
            first_message_text: text(&names.first_message_text),
            engagement_score: get(f, &names.engagement_score)
                .and_then(cell_u64)
                .unwrap_or(0),
            total_interactions: get(f, &names.total_interactions)
                .and_then(cell_u64)
                .unwrap_or(0),
            joined_at_ms: get(f, &names.joined_at).and_then(cell_i64),
            last_active_at_ms: get(f, &names.last_active_at).and_then(cell_i64),
            unsubscribed_at_ms: get(f, &names.unsubscribed_at).and_then(cell_i64),
            is_blocked: get(f, &names.is_blocked)
                .and_then(cell_bool)
                .unwrap_or(false),
            entry_source: text(&names.entry_source).map(|s| EntrySource::from_label(&s)),
        }
    }

    /// Like [`UserSnapshot::from_record`], but a counter cell that holds a
    /// value which is not a non-negative number is a `Lookup` error instead
    /// of zero, so a read-modify-write never lowers a counter.
    pub fn decode(record: &StoredRecord, names: &UserFieldNames) -> Result<Self, LedgerError> {
        for column in [&names.engagement_score, &names.total_interactions] {
            let Some(value) = get(&record.fields, column) else {
                continue;
            };
            let blank = cell_text(value).is_some_and(|s| s.trim().is_empty());
            if !blank && cell_u64(value).is_none() {
                return Err(LedgerError::Lookup(format!(
                    "record {} has unreadable counter {}: {}",
                    record.record_id, column, value
                )));
            }
        }
        Ok(Self::from_record(record, names))
    }
}

/// Columns to write on a user record. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPatch {
    pub display_name: Option<String>,
    pub profile_image_url: Option<String>,
    pub status_message: Option<String>,
    pub first_message_text: Option<String>,
    pub engagement_score: Option<u64>,
    pub total_interactions: Option<u64>,
    pub joined_at: Option<DateTime<Utc>>,
    pub entry_date: Option<DateTime<Utc>>,
    pub last_active_at: Option<DateTime<Utc>>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
    pub is_blocked: Option<bool>,
    pub entry_source: Option<EntrySource>,
}

impl UserPatch {
    /// Defaults for a record created by this event: counters at zero, not
    /// blocked, entry and join dates at `now`, last active at `now`.
    pub fn new_user(now: DateTime<Utc>, source: EntrySource) -> Self {
        Self {
            engagement_score: Some(0),
            total_interactions: Some(0),
            joined_at: Some(now),
            entry_date: Some(now),
            last_active_at: Some(now),
            is_blocked: Some(false),
            entry_source: Some(source),
            ..Self::default()
        }
    }

    /// Encode into store columns. Columns mapped to `""` are skipped.
    pub fn to_fields(&self, names: &UserFieldNames) -> Fields {
        let mut out = Fields::new();

        if let Some(v) = &self.display_name {
            put_field(&mut out, &names.display_name, json!(v));
        }
        if let Some(url) = &self.profile_image_url {
            put_field(&mut out, &names.profile_image_url, json!({ "link": url }));
        }
        if let Some(v) = &self.status_message {
            put_field(&mut out, &names.status_message, json!(v));
        }
        if let Some(v) = &self.first_message_text {
            put_field(&mut out, &names.first_message_text, json!(v));
        }
        if let Some(v) = self.engagement_score {
            put_field(&mut out, &names.engagement_score, json!(v));
        }
        if let Some(v) = self.total_interactions {
            put_field(&mut out, &names.total_interactions, json!(v));
        }
        for (name, ts) in [
            (&names.joined_at, self.joined_at),
            (&names.entry_date, self.entry_date),
            (&names.last_active_at, self.last_active_at),
            (&names.unsubscribed_at, self.unsubscribed_at),
        ] {
            if let Some(ts) = ts {
                put_field(&mut out, name, json!(ts.timestamp_millis()));
            }
        }
        if let Some(v) = self.is_blocked {
            put_field(&mut out, &names.is_blocked, json!(v));
        }
        if let Some(v) = &self.entry_source {
            put_field(&mut out, &names.entry_source, json!(v.as_str()));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Activity log
// ---------------------------------------------------------------------------

/// One append-only activity row.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityEntry {
    pub user_id: String,
    pub direction: Direction,
    pub event_kind: EventKind,
    pub message_type: Option<String>,
    pub text: Option<String>,
    pub payload: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub message_id: Option<String>,
    /// The event as received (or, for outgoing rows, as sent).
    pub raw: Option<Value>,
    /// Weak link to the owning user record.
    pub parent_record_id: Option<String>,
}

impl ActivityEntry {
    pub fn new(
        user_id: impl Into<String>,
        direction: Direction,
        event_kind: EventKind,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            direction,
            event_kind,
            message_type: None,
            text: None,
            payload: None,
            timestamp,
            message_id: None,
            raw: None,
            parent_record_id: None,
        }
    }

    #[must_use]
    pub fn message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = Some(message_type.into());
        self
    }

    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    #[must_use]
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn raw(mut self, raw: Value) -> Self {
        self.raw = Some(raw);
        self
    }

    #[must_use]
    pub fn parent(mut self, record_id: Option<String>) -> Self {
        self.parent_record_id = record_id;
        self
    }

    /// `<millis>` or `<millis>-<message id>`.
    pub fn log_id(&self) -> String {
        let millis = self.timestamp.timestamp_millis();
        match self.message_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => format!("{millis}-{id}"),
            None => millis.to_string(),
        }
    }

    pub fn to_fields(&self, names: &ActivityFieldNames) -> Fields {
        let mut out = Fields::new();

        put_field(&mut out, &names.log_id, json!(self.log_id()));
        put_field(&mut out, &names.user_id, json!(self.user_id));
        put_field(&mut out, &names.direction, json!(self.direction.as_str()));
        put_field(&mut out, &names.event_type, json!(self.event_kind.as_str()));
        if let Some(v) = &self.message_type {
            put_field(&mut out, &names.message_type, json!(v));
        }
        put_field(&mut out, &names.text, json!(self.text.as_deref().unwrap_or("")));
        put_field(
            &mut out,
            &names.payload,
            json!(self.payload.as_deref().unwrap_or("")),
        );
        put_field(
            &mut out,
            &names.timestamp,
            json!(self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        if let Some(v) = &self.message_id {
            put_field(&mut out, &names.message_id, json!(v));
        }
        if let Some(raw) = &self.raw {
            put_field(&mut out, &names.raw_json, json!(raw.to_string()));
        }
        if let Some(parent) = &self.parent_record_id {
            put_field(&mut out, &names.parent_user, json!([parent]));
        }
        out
    }
}

/// One row of a user's chat history, shaped for API output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub record_id: String,
    pub timestamp: Option<Value>,
    pub direction: Option<String>,
    pub event_type: Option<String>,
    pub message_type: Option<String>,
    pub text: String,
    pub payload: String,
    pub message_id: String,
}

impl HistoryItem {
    pub fn from_record(record: &StoredRecord, names: &ActivityFieldNames) -> Self {
        let f = &record.fields;
        let text = |name: &String| get(f, name).and_then(cell_text);
        Self {
            record_id: record.record_id.clone(),
            timestamp: get(f, &names.timestamp).cloned(),
            direction: text(&names.direction),
            event_type: text(&names.event_type),
            message_type: text(&names.message_type),
            text: text(&names.text).unwrap_or_default(),
            payload: text(&names.payload).unwrap_or_default(),
            message_id: text(&names.message_id).unwrap_or_default(),
        }
    }
}

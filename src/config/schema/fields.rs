use serde::{Deserialize, Serialize};

use crate::errors::LedgerError;

/// Logical field → external column name mapping for both tables.
///
/// Schema drift between deployments is handled here rather than in code:
/// rename a column by changing its mapping, or set it to `""` to stop
/// writing that column entirely.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FieldsConfig {
    #[serde(default)]
    pub users: UserFieldNames,
    #[serde(default)]
    pub activity: ActivityFieldNames,
}

impl FieldsConfig {
    pub(crate) fn validate(&self) -> Result<(), LedgerError> {
        if self.users.user_id.trim().is_empty() {
            return Err(LedgerError::Config(
                "fields.users.userId must name the lookup column".into(),
            ));
        }
        if self.activity.user_id.trim().is_empty() {
            return Err(LedgerError::Config(
                "fields.activity.userId must name the lookup column".into(),
            ));
        }
        if self.activity.timestamp.trim().is_empty() {
            return Err(LedgerError::Config(
                "fields.activity.timestamp is required for history ordering".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserFieldNames {
    #[serde(default = "user_defaults::user_id", rename = "userId")]
    pub user_id: String,
    #[serde(default = "user_defaults::display_name", rename = "displayName")]
    pub display_name: String,
    #[serde(default = "user_defaults::profile_image_url", rename = "profileImageUrl")]
    pub profile_image_url: String,
    #[serde(default = "user_defaults::status_message", rename = "statusMessage")]
    pub status_message: String,
    #[serde(default = "user_defaults::first_message_text", rename = "firstMessageText")]
    pub first_message_text: String,
    #[serde(default = "user_defaults::engagement_score", rename = "engagementScore")]
    pub engagement_score: String,
    #[serde(default = "user_defaults::total_interactions", rename = "totalInteractions")]
    pub total_interactions: String,
    #[serde(default = "user_defaults::joined_at", rename = "joinedAt")]
    pub joined_at: String,
    #[serde(default = "user_defaults::entry_date", rename = "entryDate")]
    pub entry_date: String,
    #[serde(default = "user_defaults::last_active_at", rename = "lastActiveAt")]
    pub last_active_at: String,
    #[serde(default = "user_defaults::unsubscribed_at", rename = "unsubscribedAt")]
    pub unsubscribed_at: String,
    #[serde(default = "user_defaults::is_blocked", rename = "isBlocked")]
    pub is_blocked: String,
    #[serde(default = "user_defaults::entry_source", rename = "entrySource")]
    pub entry_source: String,
}

mod user_defaults {
    pub fn user_id() -> String {
        "line_user_id".into()
    }
    pub fn display_name() -> String {
        "display_name".into()
    }
    pub fn profile_image_url() -> String {
        "profile_image_url".into()
    }
    pub fn status_message() -> String {
        "status_message".into()
    }
    pub fn first_message_text() -> String {
        "first_message_text".into()
    }
    pub fn engagement_score() -> String {
        "engagement_score".into()
    }
    pub fn total_interactions() -> String {
        "total_interactions".into()
    }
    pub fn joined_at() -> String {
        "joined_at".into()
    }
    pub fn entry_date() -> String {
        "entry_date".into()
    }
    pub fn last_active_at() -> String {
        "last_active_date".into()
    }
    pub fn unsubscribed_at() -> String {
        "unsubscribed_at".into()
    }
    pub fn is_blocked() -> String {
        "is_blocked".into()
    }
    pub fn entry_source() -> String {
        "entry_source".into()
    }
}

impl Default for UserFieldNames {
    fn default() -> Self {
        Self {
            user_id: user_defaults::user_id(),
            display_name: user_defaults::display_name(),
            profile_image_url: user_defaults::profile_image_url(),
            status_message: user_defaults::status_message(),
            first_message_text: user_defaults::first_message_text(),
            engagement_score: user_defaults::engagement_score(),
            total_interactions: user_defaults::total_interactions(),
            joined_at: user_defaults::joined_at(),
            entry_date: user_defaults::entry_date(),
            last_active_at: user_defaults::last_active_at(),
            unsubscribed_at: user_defaults::unsubscribed_at(),
            is_blocked: user_defaults::is_blocked(),
            entry_source: user_defaults::entry_source(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityFieldNames {
    #[serde(default = "activity_defaults::log_id", rename = "logId")]
    pub log_id: String,
    #[serde(default = "activity_defaults::user_id", rename = "userId")]
    pub user_id: String,
    #[serde(default = "activity_defaults::direction")]
    pub direction: String,
    #[serde(default = "activity_defaults::event_type", rename = "eventType")]
    pub event_type: String,
    #[serde(default = "activity_defaults::message_type", rename = "messageType")]
    pub message_type: String,
    #[serde(default = "activity_defaults::text")]
    pub text: String,
    #[serde(default = "activity_defaults::payload")]
    pub payload: String,
    #[serde(default = "activity_defaults::timestamp")]
    pub timestamp: String,
    #[serde(default = "activity_defaults::message_id", rename = "messageId")]
    pub message_id: String,
    #[serde(default = "activity_defaults::raw_json", rename = "rawJson")]
    pub raw_json: String,
    #[serde(default = "activity_defaults::parent_user", rename = "parentUser")]
    pub parent_user: String,
}

mod activity_defaults {
    pub fn log_id() -> String {
        "message_record_id".into()
    }
    pub fn user_id() -> String {
        "line_user_id".into()
    }
    pub fn direction() -> String {
        "direction".into()
    }
    pub fn event_type() -> String {
        "event_type".into()
    }
    pub fn message_type() -> String {
        "message_type".into()
    }
    pub fn text() -> String {
        "text".into()
    }
    pub fn payload() -> String {
        "payload".into()
    }
    pub fn timestamp() -> String {
        "ts".into()
    }
    pub fn message_id() -> String {
        "message_id".into()
    }
    pub fn raw_json() -> String {
        "raw_json".into()
    }
    pub fn parent_user() -> String {
        "parent_user".into()
    }
}

impl Default for ActivityFieldNames {
    fn default() -> Self {
        Self {
            log_id: activity_defaults::log_id(),
            user_id: activity_defaults::user_id(),
            direction: activity_defaults::direction(),
            event_type: activity_defaults::event_type(),
            message_type: activity_defaults::message_type(),
            text: activity_defaults::text(),
            payload: activity_defaults::payload(),
            timestamp: activity_defaults::timestamp(),
            message_id: activity_defaults::message_id(),
            raw_json: activity_defaults::raw_json(),
            parent_user: activity_defaults::parent_user(),
        }
    }
}

mod events;

pub use events::{InboundEvent, InboundKind, MessageContent, WebhookBody, parse_body, parse_event};

use crate::activity::ActivityLogger;
use crate::config::{Config, PolicyConfig};
use crate::errors::LedgerResult;
use crate::messaging::{LineClient, MessagingPlatform, Profile};
use crate::records::{ActivityEntry, Direction, EntrySource, EventKind, UserPatch, UserSnapshot};
use crate::store::{BitableClient, CredentialCache, RecordStore, TokenProvider};
use crate::upsert::{Lookup, RecordRef, Upserter, increment};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-batch tally, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Processed,
    Failed,
    Skipped,
}

/// Input of the LIFF entry-tracking operation.
#[derive(Debug, Clone, Default)]
pub struct TrackRequest {
    pub user_id: String,
    pub display_name: Option<String>,
    pub picture_url: Option<String>,
    pub source: Option<String>,
}

/// Drives upserts and activity logging for inbound events and the
/// operator-initiated operations.
pub struct EventDispatcher {
    upserter: Arc<Upserter>,
    activity: Arc<ActivityLogger>,
    messaging: Arc<dyn MessagingPlatform>,
    policy: PolicyConfig,
}

impl EventDispatcher {
    pub fn new(
        upserter: Arc<Upserter>,
        activity: Arc<ActivityLogger>,
        messaging: Arc<dyn MessagingPlatform>,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            upserter,
            activity,
            messaging,
            policy,
        }
    }

    /// Wire the production stack: one credential cache, one store client
    /// shared by both tables, and the messaging API client.
    pub fn from_config(config: &Config) -> Self {
        let cache = Arc::new(CredentialCache::new());
        let tokens = Arc::new(TokenProvider::new(&config.store, cache));
        let store: Arc<dyn RecordStore> = Arc::new(BitableClient::new(&config.store, tokens));
        Self::with_store(config, store, Arc::new(LineClient::new(&config.messaging)))
    }

    /// Same wiring with caller-supplied backends.
    pub fn with_store(
        config: &Config,
        store: Arc<dyn RecordStore>,
        messaging: Arc<dyn MessagingPlatform>,
    ) -> Self {
        let upserter = Upserter::new(
            store.clone(),
            config.store.users_table_id.clone(),
            config.fields.users.clone(),
        );
        let activity = ActivityLogger::new(
            store,
            config.store.messages_table_id.clone(),
            config.fields.activity.clone(),
        );
        Self::new(
            Arc::new(upserter),
            Arc::new(activity),
            messaging,
            config.policy.clone(),
        )
    }

    pub fn upserter(&self) -> &Upserter {
        &self.upserter
    }

    pub fn activity(&self) -> &ActivityLogger {
        &self.activity
    }

    /// Process events in order. A failing event is logged and counted; it
    /// never stops the ones after it, except when the failure means every
    /// further store call would fail too (credential exchange).
    pub async fn dispatch(&self, events: Vec<InboundEvent>) -> DispatchReport {
        let mut report = DispatchReport::default();
        let total = events.len();

        for (idx, event) in events.into_iter().enumerate() {
            match self.handle(&event).await {
                Ok(Outcome::Processed) => report.processed += 1,
                Ok(Outcome::Skipped) => report.skipped += 1,
                Ok(Outcome::Failed) => report.failed += 1,
                Err(e) => {
                    let remaining = total - idx;
                    warn!(
                        "dispatcher: {} error, abandoning {} remaining event(s): {}",
                        e.kind(),
                        remaining,
                        e
                    );
                    report.failed += remaining;
                    break;
                }
            }
        }

        info!(
            "dispatcher: batch done, processed={} failed={} skipped={}",
            report.processed, report.failed, report.skipped
        );
        report
    }

    /// `Err` only for request-fatal errors; everything else is folded into
    /// `Outcome::Failed`.
    async fn handle(&self, event: &InboundEvent) -> LedgerResult<Outcome> {
        let Some(user_id) = event.user_id.as_deref() else {
            debug!("dispatcher: skipping {:?} event without source.userId", event.kind);
            return Ok(Outcome::Skipped);
        };
        let now = Utc::now();

        let (upsert, entry) = match &event.kind {
            InboundKind::Follow => {
                let profile = self.fetch_profile(user_id).await;
                let upsert = self
                    .upserter
                    .upsert(user_id, |current| follow_patch(current, now, profile.as_ref()))
                    .await;
                let entry = ActivityEntry::new(user_id, Direction::System, EventKind::Follow, now)
                    .text("followed");
                (Some(upsert), entry)
            }
            InboundKind::Unfollow => {
                let upsert = self
                    .upserter
                    .upsert(user_id, |current| unfollow_patch(current, now))
                    .await;
                let entry =
                    ActivityEntry::new(user_id, Direction::System, EventKind::Unfollow, now)
                        .text("unfollowed");
                (Some(upsert), entry)
            }
            InboundKind::Message => {
                let message = event.message.as_ref();
                let is_text = message.is_some_and(|m| m.kind == "text");
                let first_text = message
                    .filter(|_| is_text)
                    .and_then(|m| m.text.as_deref());
                let upsert = if is_text || self.policy.non_text_counts_engagement {
                    Some(
                        self.upserter
                            .upsert(user_id, |current| message_patch(current, now, first_text))
                            .await,
                    )
                } else {
                    None
                };

                let mut entry =
                    ActivityEntry::new(user_id, Direction::Incoming, EventKind::Message, now);
                if let Some(m) = message {
                    entry = entry.message_type(m.kind.clone());
                    if let Some(text) = &m.text {
                        entry = entry.text(text.clone());
                    }
                    if let Some(id) = &m.id {
                        entry = entry.message_id(id.clone());
                    }
                }
                (upsert, entry)
            }
            InboundKind::Postback => {
                let upsert = if self.policy.postback_counts_engagement {
                    Some(
                        self.upserter
                            .upsert(user_id, |current| engagement_patch(current, now))
                            .await,
                    )
                } else {
                    None
                };
                let entry =
                    ActivityEntry::new(user_id, Direction::Incoming, EventKind::Postback, now)
                        .payload(event.postback_data.clone().unwrap_or_default());
                (upsert, entry)
            }
            InboundKind::Unknown(kind) => {
                debug!("dispatcher: skipping unhandled event type '{}'", kind);
                return Ok(Outcome::Skipped);
            }
        };

        let mut failed = false;
        let parent = match upsert {
            Some(Ok(rec)) => Some(rec.record_id),
            Some(Err(e)) if e.is_request_fatal() => return Err(e),
            Some(Err(e)) => {
                warn!(
                    "dispatcher: {:?} upsert for {} failed ({}): {}",
                    event.kind,
                    user_id,
                    e.kind(),
                    e
                );
                failed = true;
                None
            }
            None => self.parent_of(user_id).await,
        };

        let entry = entry.raw(event.raw.clone()).parent(parent);
        if let Err(e) = self.activity.append(&entry).await {
            if e.is_request_fatal() {
                return Err(e);
            }
            warn!(
                "dispatcher: activity log for {} failed ({}): {}",
                user_id,
                e.kind(),
                e
            );
            failed = true;
        }

        Ok(if failed {
            Outcome::Failed
        } else {
            Outcome::Processed
        })
    }

    async fn fetch_profile(&self, user_id: &str) -> Option<Profile> {
        match self.messaging.get_profile(user_id).await {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!("dispatcher: profile fetch for {} failed: {}", user_id, e);
                None
            }
        }
    }

    /// Record id for a back-reference when no upsert ran. Lookup failures
    /// only cost the link.
    async fn parent_of(&self, user_id: &str) -> Option<String> {
        let lookup = self.upserter.locator().find_by_user_id(user_id).await;
        if let Lookup::Failed(e) = &lookup {
            warn!("dispatcher: parent lookup for {} failed: {}", user_id, e);
        }
        lookup.record_id().map(str::to_string)
    }

    /// Register or refresh a user arriving through the in-app web view.
    pub async fn track_entry(&self, req: &TrackRequest) -> LedgerResult<RecordRef> {
        let now = Utc::now();
        let rec = self
            .upserter
            .upsert(&req.user_id, |current| track_patch(current, now, req))
            .await?;
        info!(
            "dispatcher: tracked {} (source={}, created={})",
            req.user_id,
            req.source.as_deref().unwrap_or("liff"),
            rec.created
        );
        Ok(rec)
    }

    /// Push a text message, then log it as outgoing. Push failure is returned;
    /// a logging failure after a successful push is reported as `Ok(false)`.
    pub async fn send_text(&self, user_id: &str, text: &str) -> LedgerResult<bool> {
        self.messaging.push_text(user_id, text).await?;
        let now = Utc::now();
        let parent = self.parent_of(user_id).await;
        let entry = ActivityEntry::new(user_id, Direction::Outgoing, EventKind::Message, now)
            .message_type("text")
            .text(text)
            .payload("")
            .raw(json!({
                "sent_at": now.timestamp_millis(),
                "to": user_id,
                "text": text,
            }))
            .parent(parent);

        match self.activity.append(&entry).await {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!("dispatcher: sent to {} but logging failed: {}", user_id, e);
                Ok(false)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Transitions: current record state -> columns to write
// ---------------------------------------------------------------------------

fn follow_patch(
    current: Option<&UserSnapshot>,
    now: DateTime<Utc>,
    profile: Option<&Profile>,
) -> UserPatch {
    let mut patch = match current {
        Some(_) => UserPatch {
            joined_at: Some(now),
            last_active_at: Some(now),
            is_blocked: Some(false),
            ..UserPatch::default()
        },
        None => UserPatch {
            display_name: Some(String::new()),
            ..UserPatch::new_user(now, EntrySource::Direct)
        },
    };
    if let Some(p) = profile {
        if !p.display_name.is_empty() {
            patch.display_name = Some(p.display_name.clone());
        }
        patch.profile_image_url.clone_from(&p.picture_url);
        patch.status_message.clone_from(&p.status_message);
    }
    patch
}

fn message_patch(
    current: Option<&UserSnapshot>,
    now: DateTime<Utc>,
    text: Option<&str>,
) -> UserPatch {
    let mut patch = engagement_patch(current, now);
    let already_set = current.is_some_and(|c| c.first_message_text.is_some());
    if !already_set && let Some(text) = text.filter(|t| !t.is_empty()) {
        patch.first_message_text = Some(text.to_string());
    }
    patch
}

/// +1 engagement, +1 interactions, touch last-active.
fn engagement_patch(current: Option<&UserSnapshot>, now: DateTime<Utc>) -> UserPatch {
    match current {
        Some(c) => UserPatch {
            engagement_score: Some(increment(c.engagement_score, 1)),
            total_interactions: Some(increment(c.total_interactions, 1)),
            last_active_at: Some(now),
            ..UserPatch::default()
        },
        None => UserPatch {
            engagement_score: Some(1),
            total_interactions: Some(1),
            ..UserPatch::new_user(now, EntrySource::Direct)
        },
    }
}

fn unfollow_patch(current: Option<&UserSnapshot>, now: DateTime<Utc>) -> UserPatch {
    let patch = UserPatch {
        is_blocked: Some(true),
        unsubscribed_at: Some(now),
        last_active_at: Some(now),
        entry_source: Some(EntrySource::Unfollow),
        ..UserPatch::default()
    };
    match current {
        Some(_) => patch,
        None => UserPatch {
            entry_date: Some(now),
            engagement_score: Some(0),
            total_interactions: Some(0),
            ..patch
        },
    }
}

fn track_patch(
    current: Option<&UserSnapshot>,
    now: DateTime<Utc>,
    req: &TrackRequest,
) -> UserPatch {
    let source = EntrySource::from_label(req.source.as_deref().unwrap_or("liff"));
    let mut patch = match current {
        Some(_) => UserPatch {
            entry_source: Some(source),
            last_active_at: Some(now),
            ..UserPatch::default()
        },
        None => UserPatch {
            display_name: Some(String::new()),
            ..UserPatch::new_user(now, source)
        },
    };
    if let Some(name) = req.display_name.as_deref().filter(|n| !n.is_empty()) {
        patch.display_name = Some(name.to_string());
    }
    if let Some(url) = req.picture_url.as_deref().filter(|u| !u.is_empty()) {
        patch.profile_image_url = Some(url.to_string());
    }
    patch
}

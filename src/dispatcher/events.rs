use serde::Deserialize;
use serde_json::Value;

/// Webhook delivery envelope: `{"destination": "...", "events": [...]}`.
#[derive(Debug, Deserialize)]
pub struct WebhookBody {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundKind {
    Follow,
    Unfollow,
    Message,
    Postback,
    Unknown(String),
}

impl InboundKind {
    fn from_type(kind: &str) -> Self {
        match kind {
            "follow" => Self::Follow,
            "unfollow" => Self::Unfollow,
            "message" => Self::Message,
            "postback" => Self::Postback,
            other => Self::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent {
    pub id: Option<String>,
    /// Message subtype: `text`, `image`, `sticker`, ...
    pub kind: String,
    pub text: Option<String>,
}

/// One event, decoded just far enough to route it. `raw` keeps the event
/// exactly as delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub kind: InboundKind,
    pub user_id: Option<String>,
    pub message: Option<MessageContent>,
    pub postback_data: Option<String>,
    pub raw: Value,
}

#[derive(Deserialize)]
struct SourceShape {
    #[serde(rename = "userId", default)]
    user_id: Option<String>,
}

#[derive(Deserialize)]
struct MessageShape {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct PostbackShape {
    #[serde(default)]
    data: Option<String>,
}

/// Decode one section of an event; a section that does not match its shape
/// is `None` without affecting the others.
fn section<T: serde::de::DeserializeOwned>(raw: &Value, key: &str) -> Option<T> {
    raw.get(key).and_then(|v| T::deserialize(v).ok())
}

/// Decode one event. Never fails: a non-string `type` becomes
/// `InboundKind::Unknown("")`, and a mismatched `source`, `message` or
/// `postback` section is dropped on its own.
pub fn parse_event(raw: Value) -> InboundEvent {
    let kind = raw.get("type").and_then(Value::as_str).unwrap_or_default();
    let source: Option<SourceShape> = section(&raw, "source");
    let message: Option<MessageShape> = section(&raw, "message");
    let postback: Option<PostbackShape> = section(&raw, "postback");

    InboundEvent {
        kind: InboundKind::from_type(kind),
        user_id: source
            .and_then(|s| s.user_id)
            .filter(|id| !id.trim().is_empty()),
        message: message.map(|m| MessageContent {
            id: m.id.filter(|id| !id.is_empty()),
            kind: m.kind,
            text: m.text,
        }),
        postback_data: postback.and_then(|p| p.data),
        raw,
    }
}

/// Parse a webhook body. Errors only when the body is not a JSON object of
/// the expected envelope shape.
pub fn parse_body(body: &[u8]) -> Result<Vec<InboundEvent>, serde_json::Error> {
    let envelope: WebhookBody = serde_json::from_slice(body)?;
    Ok(envelope.events.into_iter().map(parse_event).collect())
}

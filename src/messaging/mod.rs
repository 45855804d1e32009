pub mod line;

pub use line::LineClient;

use crate::errors::LedgerResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Public profile of a chat user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub picture_url: Option<String>,
    #[serde(default)]
    pub status_message: Option<String>,
}

/// Outbound calls to the chat platform.
#[async_trait]
pub trait MessagingPlatform: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> LedgerResult<Profile>;

    async fn push_text(&self, to: &str, text: &str) -> LedgerResult<()>;
}

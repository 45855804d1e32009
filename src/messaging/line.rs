use super::{MessagingPlatform, Profile};
use crate::config::MessagingConfig;
use crate::errors::{LedgerError, LedgerResult};
use crate::utils::http::{error_body, http_client};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::json;
use tracing::debug;

/// Messaging API client authenticated with a channel access token.
pub struct LineClient {
    client: Client,
    base_url: String,
    access_token: String,
}

impl LineClient {
    pub fn new(config: &MessagingConfig) -> Self {
        Self {
            client: http_client(config.timeout_secs),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            access_token: config.channel_access_token.clone(),
        }
    }

    async fn check(resp: Response) -> LedgerResult<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = error_body(resp).await;
        Err(LedgerError::Platform {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl MessagingPlatform for LineClient {
    async fn get_profile(&self, user_id: &str) -> LedgerResult<Profile> {
        let resp = self
            .client
            .get(format!(
                "{}/v2/bot/profile/{}",
                self.base_url,
                urlencoding::encode(user_id)
            ))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| LedgerError::network("profile fetch", &e))?;

        let profile: Profile = Self::check(resp)
            .await?
            .json()
            .await
            .map_err(|e| LedgerError::Platform {
                status: 200,
                message: format!("malformed profile response: {e}"),
            })?;
        debug!("line: fetched profile for {}", user_id);
        Ok(profile)
    }

    async fn push_text(&self, to: &str, text: &str) -> LedgerResult<()> {
        let resp = self
            .client
            .post(format!("{}/v2/bot/message/push", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&json!({
                "to": to,
                "messages": [{ "type": "text", "text": text }],
            }))
            .send()
            .await
            .map_err(|e| LedgerError::network("message push", &e))?;

        Self::check(resp).await?;
        debug!("line: pushed {} chars to {}", text.chars().count(), to);
        Ok(())
    }
}

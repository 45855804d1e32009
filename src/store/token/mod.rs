use crate::config::StoreConfig;
use crate::errors::{LedgerError, LedgerResult};
use crate::utils::http::{error_body, http_client};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const TOKEN_PATH: &str = "/open-apis/auth/v3/tenant_access_token/internal";

/// Lifetime assumed when the exchange response omits `expire`.
const DEFAULT_EXPIRE_SECS: i64 = 7200;

/// A tenant bearer token and the instant it stops being accepted.
#[derive(Clone, PartialEq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AccessToken {
    /// Usable only while more than `margin` remains before expiry.
    pub fn is_fresh_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin < self.expires_at
    }
}

/// Process-wide holder for the current token.
///
/// The mutex is held for the whole refresh, so concurrent callers that find
/// the slot stale queue behind one exchange and then reuse its result.
#[derive(Default)]
pub struct CredentialCache {
    slot: Mutex<Option<AccessToken>>,
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(token: AccessToken) -> Self {
        Self {
            slot: Mutex::new(Some(token)),
        }
    }

    pub async fn current(&self) -> Option<AccessToken> {
        self.slot.lock().await.clone()
    }

    /// Drop the cached token so the next call exchanges again.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    tenant_access_token: Option<String>,
    #[serde(default)]
    expire: Option<i64>,
}

pub struct TokenProvider {
    client: Client,
    base_url: String,
    app_id: String,
    app_secret: String,
    cache: Arc<CredentialCache>,
    safety_margin: Duration,
}

impl TokenProvider {
    pub fn new(config: &StoreConfig, cache: Arc<CredentialCache>) -> Self {
        Self {
            client: http_client(config.timeout_secs),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_id: config.app_id.clone(),
            app_secret: config.app_secret.clone(),
            cache,
            safety_margin: Duration::seconds(
                i64::try_from(config.token_safety_margin_secs).unwrap_or(30),
            ),
        }
    }

    /// Return a token that stays valid for at least the safety margin,
    /// exchanging the app credentials when the cached one is stale.
    pub async fn get_access_token(&self) -> LedgerResult<AccessToken> {
        let mut slot = self.cache.slot.lock().await;
        if let Some(token) = slot.as_ref()
            && token.is_fresh_at(Utc::now(), self.safety_margin)
        {
            return Ok(token.clone());
        }

        debug!("token: cached credential missing or stale, exchanging");
        match self.exchange().await {
            Ok(token) => {
                info!("token: refreshed, expires at {}", token.expires_at);
                *slot = Some(token.clone());
                Ok(token)
            }
            Err(e) => {
                warn!("token: exchange failed: {}", e);
                Err(e)
            }
        }
    }

    /// Forget the cached token, e.g. after the store rejected it.
    pub async fn invalidate(&self) {
        self.cache.invalidate().await;
    }

    async fn exchange(&self) -> LedgerResult<AccessToken> {
        if self.app_id.is_empty() || self.app_secret.is_empty() {
            return Err(LedgerError::Auth("app id or app secret not configured".into()));
        }

        let resp = self
            .client
            .post(format!("{}{}", self.base_url, TOKEN_PATH))
            .json(&json!({
                "app_id": self.app_id,
                "app_secret": self.app_secret,
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LedgerError::Auth("token exchange timed out".into())
                } else {
                    LedgerError::Auth(format!("token exchange request failed: {e}"))
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = error_body(resp).await;
            return Err(LedgerError::Auth(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let data: TokenResponse = resp
            .json()
            .await
            .map_err(|e| LedgerError::Auth(format!("malformed token response: {e}")))?;

        if data.code != 0 {
            return Err(LedgerError::Auth(format!(
                "token endpoint code {}: {}",
                data.code, data.msg
            )));
        }

        let value = data
            .tenant_access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| LedgerError::Auth("token response has no tenant_access_token".into()))?;

        let expire = data.expire.unwrap_or(DEFAULT_EXPIRE_SECS);
        if expire <= 0 {
            return Err(LedgerError::Auth(format!(
                "token response has non-positive expire: {expire}"
            )));
        }

        let expires_at = Duration::try_seconds(expire)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| {
                LedgerError::Auth(format!("token response has out-of-range expire: {expire}"))
            })?;

        Ok(AccessToken { value, expires_at })
    }
}

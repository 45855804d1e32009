use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::LedgerError;

/// Generates a `Debug` impl that redacts secret fields.
///
/// Field specifiers:
/// - `field_name`:           printed normally via `&self.field_name`
/// - `redact(field_name)`:   `String` field: shows `[empty]` or `[REDACTED]`
macro_rules! redact_debug {
    (@field $builder:ident, $self:ident, redact($field:ident)) => {
        $builder.field(
            stringify!($field),
            &if $self.$field.is_empty() {
                "[empty]"
            } else {
                "[REDACTED]"
            },
        );
    };
    (@field $builder:ident, $self:ident, $field:ident) => {
        $builder.field(stringify!($field), &$self.$field);
    };

    (@fields $builder:ident, $self:ident,) => {};
    (@fields $builder:ident, $self:ident, redact($field:ident), $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, redact($field));
        redact_debug!(@fields $builder, $self, $($rest)*);
    };
    (@fields $builder:ident, $self:ident, $field:ident, $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, $field);
        redact_debug!(@fields $builder, $self, $($rest)*);
    };

    ($struct_name:ident, $($fields:tt)*) => {
        impl std::fmt::Debug for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let mut builder = f.debug_struct(stringify!($struct_name));
                redact_debug!(@fields builder, self, $($fields)*);
                builder.finish()
            }
        }
    };
}

mod fields;

pub use fields::{ActivityFieldNames, FieldsConfig, UserFieldNames};

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    10
}

// ---------------------------------------------------------------------------
// Record store
// ---------------------------------------------------------------------------

fn default_store_base_url() -> String {
    "https://open.larksuite.com".to_string()
}

fn default_token_safety_margin_secs() -> u64 {
    30
}

#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_base_url", rename = "baseUrl")]
    pub base_url: String,
    #[serde(default, rename = "appId")]
    pub app_id: String,
    #[serde(default, rename = "appSecret")]
    pub app_secret: String,
    /// Identifier of the base (application) holding both tables.
    #[serde(default, rename = "appToken")]
    pub app_token: String,
    #[serde(default, rename = "usersTableId")]
    pub users_table_id: String,
    #[serde(default, rename = "messagesTableId")]
    pub messages_table_id: String,
    #[serde(default = "default_timeout_secs", rename = "timeoutSecs")]
    pub timeout_secs: u64,
    /// A cached token is only reused while it has more than this many seconds left.
    #[serde(
        default = "default_token_safety_margin_secs",
        rename = "tokenSafetyMarginSecs"
    )]
    pub token_safety_margin_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: default_store_base_url(),
            app_id: String::new(),
            app_secret: String::new(),
            app_token: String::new(),
            users_table_id: String::new(),
            messages_table_id: String::new(),
            timeout_secs: default_timeout_secs(),
            token_safety_margin_secs: default_token_safety_margin_secs(),
        }
    }
}

redact_debug!(
    StoreConfig,
    base_url,
    app_id,
    redact(app_secret),
    app_token,
    users_table_id,
    messages_table_id,
    timeout_secs,
    token_safety_margin_secs,
);

// ---------------------------------------------------------------------------
// Messaging platform
// ---------------------------------------------------------------------------

fn default_messaging_base_url() -> String {
    "https://api.line.me".to_string()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    #[serde(default = "default_messaging_base_url", rename = "apiBaseUrl")]
    pub api_base_url: String,
    /// HMAC key for the `X-Line-Signature` webhook header.
    #[serde(default, rename = "channelSecret")]
    pub channel_secret: String,
    #[serde(default, rename = "channelAccessToken")]
    pub channel_access_token: String,
    #[serde(default = "default_true", rename = "verifySignature")]
    pub verify_signature: bool,
    #[serde(default = "default_timeout_secs", rename = "timeoutSecs")]
    pub timeout_secs: u64,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_messaging_base_url(),
            channel_secret: String::new(),
            channel_access_token: String::new(),
            verify_signature: true,
            timeout_secs: default_timeout_secs(),
        }
    }
}

redact_debug!(
    MessagingConfig,
    api_base_url,
    redact(channel_secret),
    redact(channel_access_token),
    verify_signature,
    timeout_secs,
);

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bearer token for the `/api/*` operator endpoints. Empty disables the check.
    #[serde(default, rename = "apiKey")]
    pub api_key: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_key: String::new(),
        }
    }
}

redact_debug!(GatewayConfig, host, port, redact(api_key),);

// ---------------------------------------------------------------------------
// Event policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PolicyConfig {
    /// When true, postback events bump engagement score and interaction count.
    #[serde(default, rename = "postbackCountsEngagement")]
    pub postback_counts_engagement: bool,
    /// When true, non-text messages (sticker, image, location, ...) bump the
    /// counters too. Off: they are logged but leave the user record alone.
    #[serde(default, rename = "nonTextCountsEngagement")]
    pub non_text_counts_engagement: bool,
}

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub messaging: MessagingConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub fields: FieldsConfig,
}

impl Config {
    /// Validate structural configuration values.
    ///
    /// Credentials may legitimately be absent here (they can arrive from the
    /// environment, and `check`/`lookup` need only a subset); see
    /// [`Config::validate_for_serve`].
    pub fn validate(&self) -> Result<(), LedgerError> {
        self.validate_store()?;
        self.validate_messaging()?;
        self.validate_gateway()?;
        self.fields.validate()?;
        Ok(())
    }

    fn validate_store(&self) -> Result<(), LedgerError> {
        let s = &self.store;
        if url::Url::parse(&s.base_url).is_err() {
            return Err(LedgerError::Config(format!(
                "store.baseUrl is not a valid URL: {}",
                s.base_url
            )));
        }
        if s.timeout_secs == 0 {
            return Err(LedgerError::Config("store.timeoutSecs must be > 0".into()));
        }
        if s.timeout_secs > 300 {
            warn!("store.timeoutSecs is very long (> 300s), webhook deliveries may time out");
        }
        if s.token_safety_margin_secs > 3600 {
            return Err(LedgerError::Config(
                "store.tokenSafetyMarginSecs must be <= 3600".into(),
            ));
        }
        Ok(())
    }

    fn validate_messaging(&self) -> Result<(), LedgerError> {
        let m = &self.messaging;
        if url::Url::parse(&m.api_base_url).is_err() {
            return Err(LedgerError::Config(format!(
                "messaging.apiBaseUrl is not a valid URL: {}",
                m.api_base_url
            )));
        }
        if m.timeout_secs == 0 {
            return Err(LedgerError::Config(
                "messaging.timeoutSecs must be > 0".into(),
            ));
        }
        if !m.verify_signature {
            warn!("messaging.verifySignature is disabled, webhook requests are not authenticated");
        }
        Ok(())
    }

    fn validate_gateway(&self) -> Result<(), LedgerError> {
        if self.gateway.port == 0 {
            return Err(LedgerError::Config("gateway.port must be > 0".into()));
        }
        if self.gateway.port < 1024 {
            warn!(
                "gateway.port {} is a privileged port (< 1024), may require elevated permissions",
                self.gateway.port
            );
        }
        Ok(())
    }

    /// Check that the record-store credentials and table ids are present.
    pub fn require_store(&self) -> Result<(), LedgerError> {
        let s = &self.store;
        let required: &[(&str, &str)] = &[
            ("store.appId (LARK_APP_ID)", &s.app_id),
            ("store.appSecret (LARK_APP_SECRET)", &s.app_secret),
            ("store.appToken (LARK_APP_TOKEN)", &s.app_token),
            ("store.usersTableId (LARK_TABLE_ID)", &s.users_table_id),
            (
                "store.messagesTableId (LARK_MESSAGES_TABLE_ID)",
                &s.messages_table_id,
            ),
        ];
        for &(name, value) in required {
            if value.trim().is_empty() {
                return Err(LedgerError::Config(format!("{name} is required")));
            }
        }
        Ok(())
    }

    /// Everything the HTTP server needs before it accepts a single request.
    pub fn validate_for_serve(&self) -> Result<(), LedgerError> {
        self.validate()?;
        self.require_store()?;
        let m = &self.messaging;
        if m.verify_signature && m.channel_secret.trim().is_empty() {
            return Err(LedgerError::Config(
                "messaging.channelSecret (LINE_CHANNEL_SECRET) is required when verifySignature is enabled"
                    .into(),
            ));
        }
        if m.channel_access_token.trim().is_empty() {
            return Err(LedgerError::Config(
                "messaging.channelAccessToken (LINE_CHANNEL_ACCESS_TOKEN) is required".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;

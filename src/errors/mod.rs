use thiserror::Error;

/// Typed error hierarchy for chatledger.
///
/// Use at module boundaries (record store calls, messaging platform calls,
/// config validation, webhook verification). Internal/leaf functions can keep
/// using `anyhow::Result`; the `Internal` variant converts via `?`.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential exchange failed or returned an unusable token.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Search call failed or returned malformed data. Never means "no match".
    #[error("Lookup failed: {0}")]
    Lookup(String),

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Signature verification failed: {0}")]
    Signature(String),

    /// Transport failure or timeout talking to an external service.
    #[error("Network error during {operation}: {message}")]
    Network { operation: String, message: String },

    /// Non-success response from the messaging platform API.
    #[error("Platform error: {status}: {message}")]
    Platform { status: u16, message: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience alias for results using `LedgerError`.
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

impl LedgerError {
    /// Build a `Network` error from a transport failure.
    pub fn network(operation: &str, err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else {
            err.to_string()
        };
        Self::Network {
            operation: operation.to_string(),
            message,
        }
    }

    /// Whether this error must abort the whole request rather than a single event.
    pub fn is_request_fatal(&self) -> bool {
        match self {
            Self::Config(_) | Self::Auth(_) | Self::Signature(_) => true,
            Self::Lookup(_)
            | Self::Write(_)
            | Self::Network { .. }
            | Self::Platform { .. }
            | Self::Internal(_) => false,
        }
    }

    /// Short machine-readable kind, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Auth(_) => "auth",
            Self::Lookup(_) => "lookup",
            Self::Write(_) => "write",
            Self::Signature(_) => "signature",
            Self::Network { .. } => "network",
            Self::Platform { .. } => "platform",
            Self::Internal(_) => "internal",
        }
    }
}

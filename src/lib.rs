#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::uninlined_format_args)]
// Epoch millis and record counters cross between i64, u64 and u32 freely
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::module_name_repetitions)]

pub mod activity;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod gateway;
pub mod messaging;
pub mod records;
pub mod store;
pub mod upsert;
pub(crate) mod utils;

/// Re-exports for fuzz targets. Not part of the public API.
#[doc(hidden)]
pub mod fuzz_api {
    /// Wrapper around `gateway::validate_line_signature` for fuzz targets.
    pub fn validate_line_signature(secret: &str, signature: &str, body: &[u8]) -> bool {
        crate::gateway::validate_line_signature(secret, signature, body)
    }

    /// Parse a webhook body and return the number of events, or `None` on rejection.
    pub fn parse_webhook_body(body: &[u8]) -> Option<usize> {
        crate::dispatcher::parse_body(body).ok().map(|events| events.len())
    }
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

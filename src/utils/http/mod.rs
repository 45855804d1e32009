use anyhow::{Result, bail};
use reqwest::{Client, Response};
use std::time::Duration;

/// Error bodies are only read far enough to be useful in a log line.
pub const ERROR_BODY_LIMIT: usize = 4 * 1024;

/// Build a `reqwest::Client` with a 5 s connect timeout and the given
/// overall per-request timeout.
///
/// Falls back to the default client if the builder fails.
pub fn http_client(timeout_secs: u64) -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(5.min(timeout_secs.max(1))))
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Download a response body as bytes with a size limit.
///
/// Rejects up front when `Content-Length` exceeds the limit, otherwise streams
/// and truncates at the limit. Returns `(bytes, was_truncated)`.
pub async fn limited_body(resp: Response, max_bytes: usize) -> Result<(Vec<u8>, bool)> {
    if let Some(cl) = resp.content_length()
        && cl as usize > max_bytes
    {
        bail!(
            "response body too large: Content-Length {} exceeds limit {}",
            cl,
            max_bytes
        );
    }

    let mut buf = Vec::new();
    let mut stream = resp;
    while let Some(chunk) = stream.chunk().await? {
        if buf.len() + chunk.len() > max_bytes {
            let remaining = max_bytes.saturating_sub(buf.len());
            buf.extend_from_slice(&chunk[..remaining]);
            return Ok((buf, true));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok((buf, false))
}

/// Read a non-success response body for diagnostics, never failing.
pub async fn error_body(resp: Response) -> String {
    match limited_body(resp, ERROR_BODY_LIMIT).await {
        Ok((bytes, truncated)) => {
            let mut text = String::from_utf8_lossy(&bytes).into_owned();
            if truncated {
                text.push_str(" [truncated]");
            }
            text
        }
        Err(e) => format!("<unreadable body: {e}>"),
    }
}

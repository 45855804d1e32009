//! HTTP surface: the platform webhook receiver plus the operator API
//! (entry tracking, outbound send, chat history) and a health check.

use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Query, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, error, info, warn};

use crate::activity::DEFAULT_HISTORY_LIMIT;
use crate::config::Config;
use crate::dispatcher::{EventDispatcher, TrackRequest, parse_body};

type HmacSha256 = Hmac<Sha256>;

/// Max webhook payload size: 1 MB.
const WEBHOOK_MAX_BODY: usize = 1_048_576;

pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// Shared state for all handlers.
#[derive(Clone)]
pub struct GatewayState {
    dispatcher: Arc<EventDispatcher>,
    channel_secret: Arc<str>,
    verify_signature: bool,
    api_key: Arc<str>,
}

impl GatewayState {
    pub fn new(
        dispatcher: Arc<EventDispatcher>,
        channel_secret: &str,
        verify_signature: bool,
        api_key: &str,
    ) -> Self {
        Self {
            dispatcher,
            channel_secret: Arc::from(channel_secret),
            verify_signature,
            api_key: Arc::from(api_key),
        }
    }

    pub fn from_config(config: &Config, dispatcher: Arc<EventDispatcher>) -> Self {
        Self::new(
            dispatcher,
            &config.messaging.channel_secret,
            config.messaging.verify_signature,
            &config.gateway.api_key,
        )
    }
}

/// Build the HTTP router.
pub fn build_router(state: GatewayState) -> Router {
    let api = Router::new()
        .route("/api/track", post(track_handler))
        .route("/api/send", post(send_handler))
        .route("/api/history", get(history_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware,
        ));

    Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/api/health", get(health_handler))
        .merge(api)
        .layer(DefaultBodyLimit::max(WEBHOOK_MAX_BODY))
        .with_state(state)
}

/// Validate a base64 HMAC-SHA256 signature of the raw body.
pub(crate) fn validate_line_signature(secret: &str, signature: &str, body: &[u8]) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
    expected.as_bytes().ct_eq(signature.trim().as_bytes()).into()
}

/// POST /webhook: verify, parse, dispatch, then acknowledge with an empty 200.
async fn webhook_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if body.len() > WEBHOOK_MAX_BODY {
        warn!("webhook: payload too large ({} bytes)", body.len());
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }

    if state.verify_signature {
        let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
            warn!("webhook: missing signature header");
            return StatusCode::UNAUTHORIZED.into_response();
        };
        if !validate_line_signature(&state.channel_secret, signature, &body) {
            warn!("webhook: invalid signature");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    let events = match parse_body(&body) {
        Ok(events) => events,
        Err(e) => {
            warn!("webhook: body is not a valid event envelope: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    debug!("webhook: received {} event(s)", events.len());

    state.dispatcher.dispatch(events).await;
    StatusCode::OK.into_response()
}

/// GET /api/health: health check endpoint.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION
    }))
}

/// Require `Authorization: Bearer <apiKey>` when an API key is configured.
async fn api_key_middleware(
    State(state): State<GatewayState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if state.api_key.is_empty() {
        return Ok(next.run(request).await);
    }

    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(token) if bool::from(token.as_bytes().ct_eq(state.api_key.as_bytes())) => {
            Ok(next.run(request).await)
        }
        _ => {
            debug!("api: rejected request without valid bearer token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

fn error_response(status: StatusCode, error: &str, details: Option<String>) -> Response {
    let body = match details {
        Some(details) => json!({ "error": error, "details": details }),
        None => json!({ "error": error }),
    };
    (status, Json(body)).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackBody {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    picture_url: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

/// POST /api/track: register or refresh a user from the in-app web view.
async fn track_handler(State(state): State<GatewayState>, Json(body): Json<TrackBody>) -> Response {
    let Some(user_id) = body.user_id.filter(|id| !id.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "userId is required", None);
    };

    let req = TrackRequest {
        user_id,
        display_name: body.display_name,
        picture_url: body.picture_url,
        source: body.source.filter(|s| !s.is_empty()),
    };
    match state.dispatcher.track_entry(&req).await {
        Ok(_) => Json(json!({ "success": true })).into_response(),
        Err(e) => {
            error!("api: track for {} failed: {}", req.user_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendBody {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

/// POST /api/send: push a text message and log it as outgoing.
async fn send_handler(State(state): State<GatewayState>, Json(body): Json<SendBody>) -> Response {
    let (Some(user_id), Some(text)) = (
        body.user_id.filter(|s| !s.is_empty()),
        body.text.filter(|s| !s.is_empty()),
    ) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "userId and text are required",
            None,
        );
    };

    match state.dispatcher.send_text(&user_id, &text).await {
        Ok(logged) => Json(json!({
            "success": true,
            "message": if logged { "Message sent and logged" } else { "Message sent" },
            "logged": logged,
            "userId": user_id,
            "text": text,
        }))
        .into_response(),
        Err(e) => {
            error!("api: send to {} failed: {}", user_id, e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to send message",
                Some(e.to_string()),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryParams {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    limit: Option<String>,
}

/// GET /api/history: a user's activity rows, oldest first.
async fn history_handler(
    State(state): State<GatewayState>,
    Query(params): Query<HistoryParams>,
) -> Response {
    let Some(user_id) = params.user_id.filter(|s| !s.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "userId is required", None);
    };
    let limit = params
        .limit
        .and_then(|l| l.trim().parse::<u32>().ok())
        .unwrap_or(DEFAULT_HISTORY_LIMIT);

    match state.dispatcher.activity().history(&user_id, limit).await {
        Ok(history) => Json(json!({
            "success": true,
            "userId": user_id,
            "count": history.len(),
            "history": history,
        }))
        .into_response(),
        Err(e) => {
            error!("api: history for {} failed: {}", user_id, e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to get chat history",
                Some(e.to_string()),
            )
        }
    }
}

/// Bind and serve in a background task.
pub async fn start(
    host: &str,
    port: u16,
    state: GatewayState,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = build_router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("gateway listening on {}", addr);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("gateway server error: {}", e);
        }
    });

    Ok(handle)
}

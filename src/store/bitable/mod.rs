use super::{Fields, RecordStore, SearchQuery, StoredRecord};
use crate::config::StoreConfig;
use crate::errors::{LedgerError, LedgerResult};
use crate::store::token::TokenProvider;
use crate::utils::http::{error_body, http_client};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

/// Store codes meaning the bearer token was rejected.
const INVALID_TOKEN_CODES: &[i64] = &[99_991_661, 99_991_663, 99_991_668];

#[derive(Debug, Clone, Copy)]
enum Operation {
    Search,
    Create,
    Update,
}

impl Operation {
    fn name(self) -> &'static str {
        match self {
            Self::Search => "record search",
            Self::Create => "record create",
            Self::Update => "record update",
        }
    }

    fn error(self, message: String) -> LedgerError {
        match self {
            Self::Search => LedgerError::Lookup(message),
            Self::Create | Self::Update => LedgerError::Write(message),
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Deserialize)]
struct SearchData {
    #[serde(default)]
    items: Option<Vec<StoredRecord>>,
}

#[derive(Deserialize)]
struct BatchCreateData {
    #[serde(default)]
    records: Vec<StoredRecord>,
}

#[derive(Deserialize)]
struct UpdateData {
    record: StoredRecord,
}

/// Bitable-style REST client for one base (`app_token`).
pub struct BitableClient {
    client: Client,
    base_url: String,
    app_token: String,
    tokens: Arc<TokenProvider>,
}

impl BitableClient {
    pub fn new(config: &StoreConfig, tokens: Arc<TokenProvider>) -> Self {
        Self {
            client: http_client(config.timeout_secs),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_token: config.app_token.clone(),
            tokens,
        }
    }

    fn records_url(&self, table: &str) -> String {
        format!(
            "{}/open-apis/bitable/v1/apps/{}/tables/{}/records",
            self.base_url,
            urlencoding::encode(&self.app_token),
            urlencoding::encode(table)
        )
    }

    /// Send an authorized request and return the envelope's `data` member.
    async fn send(&self, op: Operation, request: RequestBuilder) -> LedgerResult<Value> {
        let token = self.tokens.get_access_token().await?;
        let resp = request
            .bearer_auth(&token.value)
            .send()
            .await
            .map_err(|e| LedgerError::network(op.name(), &e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = error_body(resp).await;
            if status == reqwest::StatusCode::UNAUTHORIZED {
                self.tokens.invalidate().await;
            }
            return Err(op.error(format!("{} returned {status}: {body}", op.name())));
        }

        let envelope: Envelope = resp
            .json()
            .await
            .map_err(|e| op.error(format!("malformed {} response: {e}", op.name())))?;

        if envelope.code != 0 {
            if INVALID_TOKEN_CODES.contains(&envelope.code) {
                warn!("store: token rejected (code {}), dropping cached token", envelope.code);
                self.tokens.invalidate().await;
            }
            return Err(op.error(format!(
                "{} code {}: {}",
                op.name(),
                envelope.code,
                envelope.msg
            )));
        }

        envelope
            .data
            .ok_or_else(|| op.error(format!("{} response has no data", op.name())))
    }
}

fn search_body(query: &SearchQuery) -> Value {
    let mut body = json!({
        "filter": {
            "conjunction": "and",
            "conditions": [{
                "field_name": query.field,
                "operator": "is",
                "value": [query.value],
            }],
        },
    });
    if let Some(sort) = &query.sort {
        body["sort"] = json!([{ "field_name": sort.field, "desc": sort.desc }]);
    }
    body
}

#[async_trait]
impl RecordStore for BitableClient {
    async fn search(&self, table: &str, query: &SearchQuery) -> LedgerResult<Vec<StoredRecord>> {
        debug!("store: search {} where {} = {}", table, query.field, query.value);
        let request = self
            .client
            .post(format!("{}/search", self.records_url(table)))
            .query(&[("page_size", query.page_size.to_string())])
            .json(&search_body(query));

        let data = self.send(Operation::Search, request).await?;
        let parsed: SearchData = serde_json::from_value(data)
            .map_err(|e| LedgerError::Lookup(format!("malformed search items: {e}")))?;
        Ok(parsed.items.unwrap_or_default())
    }

    async fn create(&self, table: &str, fields: Fields) -> LedgerResult<StoredRecord> {
        debug!("store: create in {} ({} fields)", table, fields.len());
        let request = self
            .client
            .post(format!("{}/batch_create", self.records_url(table)))
            .json(&json!({ "records": [{ "fields": fields }] }));

        let data = self.send(Operation::Create, request).await?;
        let parsed: BatchCreateData = serde_json::from_value(data)
            .map_err(|e| LedgerError::Write(format!("malformed create response: {e}")))?;
        parsed
            .records
            .into_iter()
            .next()
            .ok_or_else(|| LedgerError::Write("create response has no records".into()))
    }

    async fn update(
        &self,
        table: &str,
        record_id: &str,
        fields: Fields,
    ) -> LedgerResult<StoredRecord> {
        debug!("store: update {}/{} ({} fields)", table, record_id, fields.len());
        let request = self
            .client
            .patch(format!(
                "{}/{}",
                self.records_url(table),
                urlencoding::encode(record_id)
            ))
            .json(&json!({ "fields": fields }));

        let data = self.send(Operation::Update, request).await?;
        let parsed: UpdateData = serde_json::from_value(data)
            .map_err(|e| LedgerError::Write(format!("malformed update response: {e}")))?;
        Ok(parsed.record)
    }
}

pub mod bitable;
pub mod token;

pub use bitable::BitableClient;
pub use token::{AccessToken, CredentialCache, TokenProvider};

use crate::errors::LedgerResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Column name → value, exactly as the record store stores it.
pub type Fields = Map<String, Value>;

/// A row as returned by the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub record_id: String,
    #[serde(default)]
    pub fields: Fields,
}

/// Single-condition equality search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub field: String,
    pub value: String,
    pub page_size: u32,
    pub sort: Option<SortSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub field: String,
    pub desc: bool,
}

impl SearchQuery {
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            page_size: 1,
            sort: None,
        }
    }

    #[must_use]
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub fn sorted_by(mut self, field: impl Into<String>, desc: bool) -> Self {
        self.sort = Some(SortSpec {
            field: field.into(),
            desc,
        });
        self
    }
}

/// Table-addressed record operations against the external store.
///
/// `table` is the table id inside the configured base. Implementations map
/// failures to `LedgerError::Lookup` (search), `LedgerError::Write`
/// (create/update) or `LedgerError::Network` (transport), and an empty search
/// result is `Ok(vec![])`, never an error.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn search(&self, table: &str, query: &SearchQuery) -> LedgerResult<Vec<StoredRecord>>;

    async fn create(&self, table: &str, fields: Fields) -> LedgerResult<StoredRecord>;

    /// Patch only the given fields; other columns are left untouched.
    async fn update(
        &self,
        table: &str,
        record_id: &str,
        fields: Fields,
    ) -> LedgerResult<StoredRecord>;
}

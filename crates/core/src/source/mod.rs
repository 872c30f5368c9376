//! Backend capability consumed by the validation workflow.

pub mod memory;
pub mod retry;

use async_trait::async_trait;

use crate::domain::record::Record;
use crate::errors::BackendError;

pub use memory::{InMemoryRecordSource, SourceCall, SourceOperation};
pub use retry::{with_retry, RetryPolicy};

/// Table-oriented access to the remote system of record.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Returns every record matching the query; an empty list is not an error.
    async fn query(&self, table: &str, query: &RecordQuery) -> Result<Vec<Record>, BackendError>;

    /// Creates a record and returns it as stored, including backend-assigned
    /// identifiers.
    async fn create(&self, table: &str, payload: &Record) -> Result<Record, BackendError>;

    /// Partially updates the record with the given internal identifier.
    async fn update(
        &self,
        table: &str,
        sys_id: &str,
        payload: &Record,
    ) -> Result<Record, BackendError>;
}

/// Exact-match filters (ANDed), an optional projection and a result limit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordQuery {
    pub filters: Vec<(String, String)>,
    pub fields: Vec<String>,
    pub limit: Option<u32>,
    pub display_values: bool,
}

impl RecordQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn display_values(mut self) -> Self {
        self.display_values = true;
        self
    }

    /// Encoded-query form, e.g. `name=dev-web-01^environment=dev`.
    pub fn encoded_filter(&self) -> String {
        self.filters
            .iter()
            .map(|(field, value)| format!("{field}={value}"))
            .collect::<Vec<_>>()
            .join("^")
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{RecordQuery, RecordSource};
use crate::domain::record::{value_text, Record};
use crate::errors::BackendError;

const FIRST_TICKET_SEQUENCE: u64 = 10_001;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceOperation {
    Query,
    Create,
    Update,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceCall {
    pub operation: SourceOperation,
    pub table: String,
}

/// Deterministic in-process backend. Records live in per-table vectors;
/// created records get a random `sys_id` and a sequential `INC` number.
#[derive(Default)]
pub struct InMemoryRecordSource {
    tables: RwLock<HashMap<String, Vec<Record>>>,
    failures: RwLock<HashMap<SourceOperation, BackendError>>,
    calls: RwLock<Vec<SourceCall>>,
    sequence: AtomicU64,
}

impl InMemoryRecordSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(mut self, table: &str, records: impl IntoIterator<Item = Record>) -> Self {
        self.tables.get_mut().entry(table.to_string()).or_default().extend(records);
        self
    }

    /// Makes every call of `operation` fail with `error`.
    pub fn failing(mut self, operation: SourceOperation, error: BackendError) -> Self {
        self.failures.get_mut().insert(operation, error);
        self
    }

    pub async fn records(&self, table: &str) -> Vec<Record> {
        self.tables.read().await.get(table).cloned().unwrap_or_default()
    }

    pub async fn calls(&self) -> Vec<SourceCall> {
        self.calls.read().await.clone()
    }

    async fn enter(&self, operation: SourceOperation, table: &str) -> Result<(), BackendError> {
        self.calls.write().await.push(SourceCall { operation, table: table.to_string() });
        match self.failures.read().await.get(&operation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn next_number(&self) -> String {
        let sequence = FIRST_TICKET_SEQUENCE + self.sequence.fetch_add(1, Ordering::SeqCst);
        format!("INC{sequence:07}")
    }
}

fn matches_filters(record: &Record, query: &RecordQuery) -> bool {
    query.filters.iter().all(|(field, value)| {
        value_text(record.get(field)).as_deref() == Some(value.as_str())
    })
}

fn project(record: &Record, fields: &[String]) -> Record {
    if fields.is_empty() {
        return record.clone();
    }
    record
        .iter()
        .filter(|(field, _)| fields.iter().any(|wanted| wanted == *field))
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect()
}

#[async_trait]
impl RecordSource for InMemoryRecordSource {
    async fn query(&self, table: &str, query: &RecordQuery) -> Result<Vec<Record>, BackendError> {
        self.enter(SourceOperation::Query, table).await?;

        let tables = self.tables.read().await;
        let limit = query.limit.map(|limit| limit as usize).unwrap_or(usize::MAX);
        Ok(tables
            .get(table)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| matches_filters(record, query))
                    .take(limit)
                    .map(|record| project(record, &query.fields))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create(&self, table: &str, payload: &Record) -> Result<Record, BackendError> {
        self.enter(SourceOperation::Create, table).await?;

        let mut record = payload.clone();
        record
            .entry("sys_id".to_string())
            .or_insert_with(|| Value::from(Uuid::new_v4().simple().to_string()));
        if !record.contains_key("number") {
            record.insert("number".to_string(), Value::from(self.next_number()));
        }

        self.tables.write().await.entry(table.to_string()).or_default().push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        table: &str,
        sys_id: &str,
        payload: &Record,
    ) -> Result<Record, BackendError> {
        self.enter(SourceOperation::Update, table).await?;

        let mut tables = self.tables.write().await;
        let record = tables
            .get_mut(table)
            .and_then(|records| {
                records
                    .iter_mut()
                    .find(|record| value_text(record.get("sys_id")).as_deref() == Some(sys_id))
            })
            .ok_or(BackendError::NotFound)?;

        for (field, value) in payload {
            record.insert(field.clone(), value.clone());
        }
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{InMemoryRecordSource, SourceOperation};
    use crate::domain::record::Record;
    use crate::errors::BackendError;
    use crate::source::{RecordQuery, RecordSource};

    fn record(value: Value) -> Record {
        serde_json::from_value(value).expect("record literal")
    }

    fn seeded() -> InMemoryRecordSource {
        InMemoryRecordSource::new().with_records(
            "cmdb_ci_vm_instance",
            [
                record(json!({"sys_id": "a1", "name": "web-01", "environment": "dev"})),
                record(json!({"sys_id": "b2", "name": "web-02", "environment": "dev"})),
                record(json!({"sys_id": "c3", "name": "db-01", "environment": "prod"})),
            ],
        )
    }

    #[tokio::test]
    async fn query_applies_filters_projection_and_limit() {
        let source = seeded();

        let dev = source
            .query("cmdb_ci_vm_instance", &RecordQuery::new().filter("environment", "dev"))
            .await
            .expect("query dev");
        assert_eq!(dev.len(), 2);

        let projected = source
            .query(
                "cmdb_ci_vm_instance",
                &RecordQuery::new()
                    .filter("environment", "dev")
                    .filter("name", "web-02")
                    .fields(["sys_id"])
                    .limit(1),
            )
            .await
            .expect("query projected");
        assert_eq!(projected, vec![record(json!({"sys_id": "b2"}))]);

        let none = source
            .query("cmdb_ci_vm_instance", &RecordQuery::new().filter("name", "missing"))
            .await
            .expect("query missing");
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn create_assigns_identifiers_and_update_merges_fields() {
        let source = InMemoryRecordSource::new();

        let first = source
            .create("incident", &record(json!({"short_description": "first"})))
            .await
            .expect("create first");
        let second = source
            .create("incident", &record(json!({"short_description": "second"})))
            .await
            .expect("create second");
        assert_eq!(first.get("number"), Some(&json!("INC0010001")));
        assert_eq!(second.get("number"), Some(&json!("INC0010002")));

        let sys_id = first.get("sys_id").and_then(Value::as_str).expect("sys_id").to_string();
        let updated = source
            .update("incident", &sys_id, &record(json!({"state": "6"})))
            .await
            .expect("update");
        assert_eq!(updated.get("state"), Some(&json!("6")));
        assert_eq!(updated.get("short_description"), Some(&json!("first")));
    }

    #[tokio::test]
    async fn update_of_unknown_record_is_not_found() {
        let source = InMemoryRecordSource::new();
        let result = source.update("incident", "nope", &Record::new()).await;
        assert_eq!(result, Err(BackendError::NotFound));
    }

    #[tokio::test]
    async fn injected_failures_are_returned_and_calls_are_recorded() {
        let source = seeded().failing(SourceOperation::Create, BackendError::Authentication);

        let result = source.create("incident", &Record::new()).await;
        assert_eq!(result, Err(BackendError::Authentication));
        assert!(source.records("incident").await.is_empty());

        let calls = source.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].operation, SourceOperation::Create);
        assert_eq!(calls[0].table, "incident");
    }
}

use async_trait::async_trait;
use cmdb_sync_core::config::{AppConfig, BackendConfig};
use cmdb_sync_core::source::{with_retry, RecordQuery, RecordSource, RetryPolicy};
use cmdb_sync_core::{BackendError, Record};
use reqwest::header::ACCEPT;
use reqwest::{Client, Method};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::response::{check_status, parse_record, parse_records, transport_error};

/// Table API client with basic auth, a per-request timeout and bounded
/// retries.
#[derive(Debug)]
pub struct ServiceNowClient {
    http: Client,
    base_url: String,
    username: String,
    password: SecretString,
    retry: RetryPolicy,
}

impl ServiceNowClient {
    pub fn new(config: &BackendConfig, retry: RetryPolicy) -> Result<Self, BackendError> {
        let http = Client::builder().timeout(config.timeout()).build().map_err(|error| {
            BackendError::Request(format!("could not build HTTP client: {error}"))
        })?;

        Ok(Self {
            http,
            base_url: config.base_url(),
            username: config.username.clone(),
            password: config.password.clone(),
            retry,
        })
    }

    pub fn from_app_config(config: &AppConfig) -> Result<Self, BackendError> {
        Self::new(&config.backend, config.retry.policy())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn table_url(&self, table: &str) -> String {
        format!("{}/table/{table}", self.base_url)
    }

    pub fn record_url(&self, table: &str, sys_id: &str) -> String {
        format!("{}/table/{table}/{sys_id}", self.base_url)
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        params: &[(&'static str, String)],
        body: Option<&Record>,
        attempt: u32,
    ) -> Result<String, BackendError> {
        debug!(method = %method, url, attempt, "sending backend request");

        let mut request = self
            .http
            .request(method, url)
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .header(ACCEPT, "application/json");
        if !params.is_empty() {
            request = request.query(params);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(transport_error)?;
        check_status(status, &text)?;
        Ok(text)
    }
}

/// Query-string parameters for a table read. Filters become an encoded
/// query joined with `^`.
pub fn query_params(query: &RecordQuery) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if !query.filters.is_empty() {
        params.push(("sysparm_query", query.encoded_filter()));
    }
    if !query.fields.is_empty() {
        params.push(("sysparm_fields", query.fields.join(",")));
    }
    if let Some(limit) = query.limit {
        params.push(("sysparm_limit", limit.to_string()));
    }
    if query.display_values {
        params.push(("sysparm_display_value", "true".to_string()));
    }
    params
}

#[async_trait]
impl RecordSource for ServiceNowClient {
    async fn query(&self, table: &str, query: &RecordQuery) -> Result<Vec<Record>, BackendError> {
        let url = self.table_url(table);
        let params = query_params(query);
        let body = with_retry(&self.retry, "query", |attempt| {
            self.send(Method::GET, &url, &params, None, attempt)
        })
        .await?;
        parse_records(&body)
    }

    async fn create(&self, table: &str, payload: &Record) -> Result<Record, BackendError> {
        let url = self.table_url(table);
        let body = with_retry(&self.retry, "create", |attempt| {
            self.send(Method::POST, &url, &[], Some(payload), attempt)
        })
        .await?;
        parse_record(&body)
    }

    async fn update(
        &self,
        table: &str,
        sys_id: &str,
        payload: &Record,
    ) -> Result<Record, BackendError> {
        let url = self.record_url(table, sys_id);
        let body = with_retry(&self.retry, "update", |attempt| {
            self.send(Method::PATCH, &url, &[], Some(payload), attempt)
        })
        .await?;
        parse_record(&body)
    }
}

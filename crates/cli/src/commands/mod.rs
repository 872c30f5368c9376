pub mod config;
pub mod inventory;
pub mod resolve;
pub mod validate;

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use cmdb_sync_core::config::AppConfig;
use cmdb_sync_core::source::RecordSource;
use cmdb_sync_core::BackendError;
use cmdb_sync_servicenow::ServiceNowClient;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"{}\",\"status\":\"error\",\"error_class\":\"serialization\",\
             \"message\":\"{}\"}}",
            payload.command,
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Network-backed record source for the configured instance.
pub fn connect(config: &AppConfig) -> Result<Arc<dyn RecordSource>, BackendError> {
    let client = ServiceNowClient::from_app_config(config)?;
    Ok(Arc::new(client))
}

/// Drives `future` to completion on a current-thread runtime. Backend calls
/// are strictly sequential, so one thread is enough.
pub(crate) fn block_on<F: Future>(command: &str, future: F) -> Result<F::Output, CommandResult> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to initialize async runtime")
        .map(|runtime| runtime.block_on(future))
        .map_err(|error| CommandResult::failure(command, "runtime_init", format!("{error:#}"), 1))
}

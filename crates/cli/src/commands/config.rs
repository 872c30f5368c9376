use std::env;
use std::fs;
use std::path::Path;

use cmdb_sync_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::CommandResult;

/// One rendered setting: dotted key, display value, overriding env var.
struct Setting {
    key: &'static str,
    value: String,
    env_key: Option<&'static str>,
}

impl Setting {
    fn new(key: &'static str, value: impl ToString, env_key: Option<&'static str>) -> Self {
        Self { key, value: value.to_string(), env_key }
    }
}

pub fn run(options: LoadOptions) -> CommandResult {
    let config_path = resolve_config_path(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("config", "config_validation", error.to_string(), 2)
        }
    };
    let config_doc = config_path.as_deref().and_then(load_config_doc);

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for setting in settings(&config) {
        let source = field_source(&setting, config_doc.as_ref(), config_path.as_deref());
        lines.push(format!("- {} = {} (source: {source})", setting.key, setting.value));
    }

    let readiness = match config.backend.connection_check() {
        Ok(()) => "backend connection: ready".to_string(),
        Err(error) => format!("backend connection: unavailable ({error}); demo runs only"),
    };
    lines.push(readiness);

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn settings(config: &AppConfig) -> Vec<Setting> {
    let backend = &config.backend;
    vec![
        Setting::new("backend.instance", &backend.instance, Some("SNOW_INSTANCE")),
        Setting::new("backend.username", &backend.username, Some("SNOW_USERNAME")),
        Setting::new(
            "backend.password",
            redact(backend.password.expose_secret()),
            Some("SNOW_PASSWORD"),
        ),
        Setting::new("backend.api_version", &backend.api_version, Some("SNOW_API_VERSION")),
        Setting::new("backend.cmdb_table", &backend.cmdb_table, Some("SNOW_CMDB_TABLE")),
        Setting::new(
            "backend.incident_table",
            &backend.incident_table,
            Some("SNOW_INCIDENT_TABLE"),
        ),
        Setting::new("backend.timeout_secs", backend.timeout_secs, Some("SNOW_TIMEOUT_SECS")),
        Setting::new("retry.attempts", config.retry.attempts, Some("CMDB_SYNC_RETRY_ATTEMPTS")),
        Setting::new(
            "retry.delay_secs",
            config.retry.delay_secs,
            Some("CMDB_SYNC_RETRY_DELAY_SECS"),
        ),
        Setting::new("ticket.category", &config.ticket.category, None),
        Setting::new("ticket.subcategory", &config.ticket.subcategory, None),
        Setting::new("ticket.assignment_group", &config.ticket.assignment_group, None),
        Setting::new("ticket.caller_id", &config.ticket.caller_id, None),
        Setting::new("logging.level", &config.logging.level, Some("CMDB_SYNC_LOG_LEVEL")),
        Setting::new(
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            Some("CMDB_SYNC_LOG_FORMAT"),
        ),
    ]
}

fn load_config_doc(path: &Path) -> Option<Value> {
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(setting: &Setting, doc: Option<&Value>, path: Option<&Path>) -> String {
    if let Some(env_key) = setting.env_key {
        if env::var(env_key).is_ok_and(|value| !value.trim().is_empty()) {
            return format!("env ({env_key})");
        }
    }

    if doc.is_some_and(|doc| contains_path(doc, setting.key)) {
        let file = path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({file})");
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn redact(secret: &str) -> &'static str {
    if secret.trim().is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

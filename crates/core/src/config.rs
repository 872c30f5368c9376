use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::source::RetryPolicy;

pub const CONFIG_FILE_NAME: &str = "cmdb-sync.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub retry: RetryConfig,
    pub ticket: TicketConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub instance: String,
    pub username: String,
    pub password: SecretString,
    pub api_version: String,
    pub cmdb_table: String,
    pub incident_table: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub attempts: u32,
    pub delay_secs: u64,
}

/// Static ticket fields stamped on every incident this tool opens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TicketConfig {
    pub category: String,
    pub subcategory: String,
    pub assignment_group: String,
    pub caller_id: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub instance: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub cmdb_table: Option<String>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
    #[error("backend connection settings are incomplete: missing {}", missing.join(", "))]
    IncompleteConnection { missing: Vec<&'static str> },
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig {
                instance: "dev123456.service-now.com".to_string(),
                username: "admin".to_string(),
                password: String::new().into(),
                api_version: "v2".to_string(),
                cmdb_table: "cmdb_ci_vm_instance".to_string(),
                incident_table: "incident".to_string(),
                timeout_secs: 30,
            },
            retry: RetryConfig { attempts: 3, delay_secs: 5 },
            ticket: TicketConfig {
                category: "Software".to_string(),
                subcategory: "Integration".to_string(),
                assignment_group: "Cloud Operations".to_string(),
                caller_id: "cmdb.integration".to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl BackendConfig {
    /// Base URL of the table API, e.g. `https://host/api/now/v2`.
    pub fn base_url(&self) -> String {
        let instance = self.instance.trim().trim_end_matches('/');
        if instance.starts_with("http://") || instance.starts_with("https://") {
            format!("{instance}/api/now/{}", self.api_version)
        } else {
            format!("https://{instance}/api/now/{}", self.api_version)
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Reports whether enough settings are present to talk to the backend.
    ///
    /// An empty password is the usual reason for failure here; callers fall
    /// back to demo runs in that case.
    pub fn connection_check(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        if self.instance.trim().is_empty() {
            missing.push("instance");
        }
        if self.username.trim().is_empty() {
            missing.push("username");
        }
        if self.password.expose_secret().is_empty() {
            missing.push("password");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::IncompleteConnection { missing })
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.attempts, Duration::from_secs(self.delay_secs))
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(backend) = patch.backend {
            if let Some(instance) = backend.instance {
                self.backend.instance = instance;
            }
            if let Some(username) = backend.username {
                self.backend.username = username;
            }
            if let Some(password_value) = backend.password {
                self.backend.password = secret_value(password_value);
            }
            if let Some(api_version) = backend.api_version {
                self.backend.api_version = api_version;
            }
            if let Some(cmdb_table) = backend.cmdb_table {
                self.backend.cmdb_table = cmdb_table;
            }
            if let Some(incident_table) = backend.incident_table {
                self.backend.incident_table = incident_table;
            }
            if let Some(timeout_secs) = backend.timeout_secs {
                self.backend.timeout_secs = timeout_secs;
            }
        }

        if let Some(retry) = patch.retry {
            if let Some(attempts) = retry.attempts {
                self.retry.attempts = attempts;
            }
            if let Some(delay_secs) = retry.delay_secs {
                self.retry.delay_secs = delay_secs;
            }
        }

        if let Some(ticket) = patch.ticket {
            if let Some(category) = ticket.category {
                self.ticket.category = category;
            }
            if let Some(subcategory) = ticket.subcategory {
                self.ticket.subcategory = subcategory;
            }
            if let Some(assignment_group) = ticket.assignment_group {
                self.ticket.assignment_group = assignment_group;
            }
            if let Some(caller_id) = ticket.caller_id {
                self.ticket.caller_id = caller_id;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SNOW_INSTANCE") {
            self.backend.instance = value;
        }
        if let Some(value) = read_env("SNOW_USERNAME") {
            self.backend.username = value;
        }
        if let Some(value) = read_env("SNOW_PASSWORD") {
            self.backend.password = secret_value(value);
        }
        if let Some(value) = read_env("SNOW_API_VERSION") {
            self.backend.api_version = value;
        }
        if let Some(value) = read_env("SNOW_CMDB_TABLE") {
            self.backend.cmdb_table = value;
        }
        if let Some(value) = read_env("SNOW_INCIDENT_TABLE") {
            self.backend.incident_table = value;
        }
        if let Some(value) = read_env("SNOW_TIMEOUT_SECS") {
            self.backend.timeout_secs = parse_u64("SNOW_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CMDB_SYNC_RETRY_ATTEMPTS") {
            self.retry.attempts = parse_u32("CMDB_SYNC_RETRY_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("CMDB_SYNC_RETRY_DELAY_SECS") {
            self.retry.delay_secs = parse_u64("CMDB_SYNC_RETRY_DELAY_SECS", &value)?;
        }

        if let Some(value) = read_env("CMDB_SYNC_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("CMDB_SYNC_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(instance) = overrides.instance {
            self.backend.instance = instance;
        }
        if let Some(username) = overrides.username {
            self.backend.username = username;
        }
        if let Some(password) = overrides.password {
            self.backend.password = secret_value(password);
        }
        if let Some(cmdb_table) = overrides.cmdb_table {
            self.backend.cmdb_table = cmdb_table;
        }
        if let Some(attempts) = overrides.retry_attempts {
            self.retry.attempts = attempts;
        }
        if let Some(delay_secs) = overrides.retry_delay_secs {
            self.retry.delay_secs = delay_secs;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    /// Structural validation only; missing credentials are reported
    /// separately by [`BackendConfig::connection_check`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_backend(&self.backend)?;
        validate_retry(&self.retry)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Explicit path if it exists, else `cmdb-sync.toml` or `config/cmdb-sync.toml`.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(CONFIG_FILE_NAME), PathBuf::from("config").join(CONFIG_FILE_NAME)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_backend(backend: &BackendConfig) -> Result<(), ConfigError> {
    if backend.timeout_secs == 0 || backend.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "backend.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if backend.cmdb_table.trim().is_empty() || backend.incident_table.trim().is_empty() {
        return Err(ConfigError::Validation(
            "backend.cmdb_table and backend.incident_table must not be empty".to_string(),
        ));
    }

    if backend.api_version.trim().is_empty() {
        return Err(ConfigError::Validation("backend.api_version must not be empty".to_string()));
    }

    Ok(())
}

fn validate_retry(retry: &RetryConfig) -> Result<(), ConfigError> {
    if retry.attempts == 0 {
        return Err(ConfigError::Validation(
            "retry.attempts must be greater than zero".to_string(),
        ));
    }

    if retry.delay_secs > 600 {
        return Err(ConfigError::Validation("retry.delay_secs must be at most 600".to_string()));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    backend: Option<BackendPatch>,
    retry: Option<RetryPatch>,
    ticket: Option<TicketPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct BackendPatch {
    instance: Option<String>,
    username: Option<String>,
    password: Option<String>,
    api_version: Option<String>,
    cmdb_table: Option<String>,
    incident_table: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RetryPatch {
    attempts: Option<u32>,
    delay_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TicketPatch {
    category: Option<String>,
    subcategory: Option<String>,
    assignment_group: Option<String>,
    caller_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

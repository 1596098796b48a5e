use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flows::{SpecialApprovalDestination, WorkflowRules};
use crate::submission::SubmissionRules;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub workflow: WorkflowConfig,
    pub notifications: NotificationsConfig,
    pub documents: DocumentsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    pub training_budget_ceiling: Decimal,
    pub special_approval_threshold: Decimal,
    pub special_approval_destination: SpecialApprovalDestination,
    pub duplicate_window_secs: u64,
    pub refresh_debounce_ms: u64,
}

#[derive(Clone, Debug)]
pub struct NotificationsConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub channel_token: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Default)]
pub struct DocumentsConfig {
    /// Rendered approval forms are written here when set.
    pub output_dir: Option<PathBuf>,
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
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub special_approval_destination: Option<SpecialApprovalDestination>,
    pub notifications_enabled: Option<bool>,
    pub notifications_endpoint: Option<String>,
    pub documents_output_dir: Option<PathBuf>,
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
}

impl Default for AppConfig {
    fn default() -> Self {
        let rules = WorkflowRules::default();
        Self {
            database: DatabaseConfig {
                url: "sqlite://claimdesk.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            workflow: WorkflowConfig {
                training_budget_ceiling: rules.training_budget_ceiling,
                special_approval_threshold: rules.special_approval_threshold,
                special_approval_destination: rules.special_approval_destination,
                duplicate_window_secs: 300,
                refresh_debounce_ms: 250,
            },
            notifications: NotificationsConfig {
                enabled: false,
                endpoint: None,
                channel_token: None,
                timeout_secs: 10,
            },
            documents: DocumentsConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LogFormat {
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

impl WorkflowConfig {
    pub fn rules(&self) -> WorkflowRules {
        WorkflowRules {
            training_budget_ceiling: self.training_budget_ceiling,
            special_approval_threshold: self.special_approval_threshold,
            special_approval_destination: self.special_approval_destination,
        }
    }

    pub fn submission_rules(&self) -> SubmissionRules {
        SubmissionRules {
            training_budget_ceiling: self.training_budget_ceiling,
            duplicate_window: chrono::Duration::seconds(
                i64::try_from(self.duplicate_window_secs).unwrap_or(i64::MAX),
            ),
        }
    }

    pub fn refresh_window(&self) -> Duration {
        Duration::from_millis(self.refresh_debounce_ms)
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("claimdesk.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(ceiling) = workflow.training_budget_ceiling {
                self.workflow.training_budget_ceiling = ceiling;
            }
            if let Some(threshold) = workflow.special_approval_threshold {
                self.workflow.special_approval_threshold = threshold;
            }
            if let Some(destination) = workflow.special_approval_destination {
                self.workflow.special_approval_destination = destination;
            }
            if let Some(window) = workflow.duplicate_window_secs {
                self.workflow.duplicate_window_secs = window;
            }
            if let Some(debounce) = workflow.refresh_debounce_ms {
                self.workflow.refresh_debounce_ms = debounce;
            }
        }

        if let Some(notifications) = patch.notifications {
            if let Some(enabled) = notifications.enabled {
                self.notifications.enabled = enabled;
            }
            if let Some(endpoint) = notifications.endpoint {
                self.notifications.endpoint = Some(endpoint);
            }
            if let Some(token) = notifications.channel_token {
                self.notifications.channel_token = Some(SecretString::from(token));
            }
            if let Some(timeout_secs) = notifications.timeout_secs {
                self.notifications.timeout_secs = timeout_secs;
            }
        }

        if let Some(documents) = patch.documents {
            if let Some(output_dir) = documents.output_dir {
                self.documents.output_dir = Some(output_dir);
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
        if let Some(value) = read_env("CLAIMDESK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CLAIMDESK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("CLAIMDESK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CLAIMDESK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("CLAIMDESK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CLAIMDESK_WORKFLOW_TRAINING_BUDGET_CEILING") {
            self.workflow.training_budget_ceiling =
                parse_decimal("CLAIMDESK_WORKFLOW_TRAINING_BUDGET_CEILING", &value)?;
        }
        if let Some(value) = read_env("CLAIMDESK_WORKFLOW_SPECIAL_APPROVAL_THRESHOLD") {
            self.workflow.special_approval_threshold =
                parse_decimal("CLAIMDESK_WORKFLOW_SPECIAL_APPROVAL_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("CLAIMDESK_WORKFLOW_SPECIAL_APPROVAL_DESTINATION") {
            self.workflow.special_approval_destination =
                value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                    key: "CLAIMDESK_WORKFLOW_SPECIAL_APPROVAL_DESTINATION".to_string(),
                    value: value.clone(),
                })?;
        }
        if let Some(value) = read_env("CLAIMDESK_WORKFLOW_DUPLICATE_WINDOW_SECS") {
            self.workflow.duplicate_window_secs =
                parse_u64("CLAIMDESK_WORKFLOW_DUPLICATE_WINDOW_SECS", &value)?;
        }
        if let Some(value) = read_env("CLAIMDESK_WORKFLOW_REFRESH_DEBOUNCE_MS") {
            self.workflow.refresh_debounce_ms =
                parse_u64("CLAIMDESK_WORKFLOW_REFRESH_DEBOUNCE_MS", &value)?;
        }

        if let Some(value) = read_env("CLAIMDESK_NOTIFICATIONS_ENABLED") {
            self.notifications.enabled = parse_bool("CLAIMDESK_NOTIFICATIONS_ENABLED", &value)?;
        }
        if let Some(value) = read_env("CLAIMDESK_NOTIFICATIONS_ENDPOINT") {
            self.notifications.endpoint = Some(value);
        }
        if let Some(value) = read_env("CLAIMDESK_NOTIFICATIONS_CHANNEL_TOKEN") {
            self.notifications.channel_token = Some(SecretString::from(value));
        }
        if let Some(value) = read_env("CLAIMDESK_NOTIFICATIONS_TIMEOUT_SECS") {
            self.notifications.timeout_secs =
                parse_u64("CLAIMDESK_NOTIFICATIONS_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CLAIMDESK_DOCUMENTS_OUTPUT_DIR") {
            self.documents.output_dir = Some(PathBuf::from(value));
        }

        let log_level =
            read_env("CLAIMDESK_LOGGING_LEVEL").or_else(|| read_env("CLAIMDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CLAIMDESK_LOGGING_FORMAT").or_else(|| read_env("CLAIMDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(destination) = overrides.special_approval_destination {
            self.workflow.special_approval_destination = destination;
        }
        if let Some(enabled) = overrides.notifications_enabled {
            self.notifications.enabled = enabled;
        }
        if let Some(endpoint) = overrides.notifications_endpoint {
            self.notifications.endpoint = Some(endpoint);
        }
        if let Some(output_dir) = overrides.documents_output_dir {
            self.documents.output_dir = Some(output_dir);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_workflow(&self.workflow)?;
        validate_notifications(&self.notifications)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("claimdesk.toml"), PathBuf::from("config/claimdesk.toml")]
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

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if workflow.training_budget_ceiling <= Decimal::ZERO {
        return Err(ConfigError::Validation(
            "workflow.training_budget_ceiling must be greater than zero".to_string(),
        ));
    }

    if workflow.special_approval_threshold < Decimal::ZERO {
        return Err(ConfigError::Validation(
            "workflow.special_approval_threshold must not be negative".to_string(),
        ));
    }

    if workflow.duplicate_window_secs > 86_400 {
        return Err(ConfigError::Validation(
            "workflow.duplicate_window_secs must be at most one day (86400)".to_string(),
        ));
    }

    if workflow.refresh_debounce_ms == 0 || workflow.refresh_debounce_ms > 60_000 {
        return Err(ConfigError::Validation(
            "workflow.refresh_debounce_ms must be in range 1..=60000".to_string(),
        ));
    }

    Ok(())
}

fn validate_notifications(notifications: &NotificationsConfig) -> Result<(), ConfigError> {
    if notifications.timeout_secs == 0 || notifications.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "notifications.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    if let Some(endpoint) = &notifications.endpoint {
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(ConfigError::Validation(
                "notifications.endpoint must start with http:// or https://".to_string(),
            ));
        }
    }

    if notifications.enabled {
        let missing_endpoint = notifications
            .endpoint
            .as_ref()
            .map(|value| value.trim().is_empty())
            .unwrap_or(true);
        if missing_endpoint {
            return Err(ConfigError::Validation(
                "notifications.enabled is true but notifications.endpoint is not set".to_string(),
            ));
        }

        let blank_token = notifications
            .channel_token
            .as_ref()
            .map(|token| token.expose_secret().trim().is_empty())
            .unwrap_or(false);
        if blank_token {
            return Err(ConfigError::Validation(
                "notifications.channel_token must not be blank when provided".to_string(),
            ));
        }
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

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| invalid_override(key, value))
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str(value.trim()).map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    workflow: Option<WorkflowPatch>,
    notifications: Option<NotificationsPatch>,
    documents: Option<DocumentsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    training_budget_ceiling: Option<Decimal>,
    special_approval_threshold: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_destination")]
    special_approval_destination: Option<SpecialApprovalDestination>,
    duplicate_window_secs: Option<u64>,
    refresh_debounce_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationsPatch {
    enabled: Option<bool>,
    endpoint: Option<String>,
    channel_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DocumentsPatch {
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

fn deserialize_destination<'de, D>(
    deserializer: D,
) -> Result<Option<SpecialApprovalDestination>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map(|value| value.parse().map_err(serde::de::Error::custom)).transpose()
}

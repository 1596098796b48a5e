use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use claimdesk_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_keys) in effective_values(&config) {
        let source =
            field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }

    lines.join("\n")
}

type Entry = (&'static str, String, &'static [&'static str]);

fn entry(key: &'static str, value: String, env_keys: &'static [&'static str]) -> Entry {
    (key, value, env_keys)
}

fn effective_values(config: &AppConfig) -> Vec<Entry> {
    let workflow = &config.workflow;
    let notifications = &config.notifications;

    vec![
        entry("database.url", config.database.url.clone(), &["CLAIMDESK_DATABASE_URL"]),
        entry(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["CLAIMDESK_DATABASE_MAX_CONNECTIONS"],
        ),
        entry(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["CLAIMDESK_DATABASE_TIMEOUT_SECS"],
        ),
        entry(
            "workflow.training_budget_ceiling",
            workflow.training_budget_ceiling.to_string(),
            &["CLAIMDESK_WORKFLOW_TRAINING_BUDGET_CEILING"],
        ),
        entry(
            "workflow.special_approval_threshold",
            workflow.special_approval_threshold.to_string(),
            &["CLAIMDESK_WORKFLOW_SPECIAL_APPROVAL_THRESHOLD"],
        ),
        entry(
            "workflow.special_approval_destination",
            workflow.special_approval_destination.status().as_str().to_string(),
            &["CLAIMDESK_WORKFLOW_SPECIAL_APPROVAL_DESTINATION"],
        ),
        entry(
            "workflow.duplicate_window_secs",
            workflow.duplicate_window_secs.to_string(),
            &["CLAIMDESK_WORKFLOW_DUPLICATE_WINDOW_SECS"],
        ),
        entry(
            "workflow.refresh_debounce_ms",
            workflow.refresh_debounce_ms.to_string(),
            &["CLAIMDESK_WORKFLOW_REFRESH_DEBOUNCE_MS"],
        ),
        entry(
            "notifications.enabled",
            notifications.enabled.to_string(),
            &["CLAIMDESK_NOTIFICATIONS_ENABLED"],
        ),
        entry(
            "notifications.endpoint",
            notifications.endpoint.clone().unwrap_or_else(|| "<unset>".to_string()),
            &["CLAIMDESK_NOTIFICATIONS_ENDPOINT"],
        ),
        entry(
            "notifications.channel_token",
            notifications
                .channel_token
                .as_ref()
                .map(|token| redact_token(token.expose_secret()))
                .unwrap_or_else(|| "<unset>".to_string()),
            &["CLAIMDESK_NOTIFICATIONS_CHANNEL_TOKEN"],
        ),
        entry(
            "notifications.timeout_secs",
            notifications.timeout_secs.to_string(),
            &["CLAIMDESK_NOTIFICATIONS_TIMEOUT_SECS"],
        ),
        entry(
            "documents.output_dir",
            config
                .documents
                .output_dir
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<unset>".to_string()),
            &["CLAIMDESK_DOCUMENTS_OUTPUT_DIR"],
        ),
        entry(
            "logging.level",
            config.logging.level.clone(),
            &["CLAIMDESK_LOGGING_LEVEL", "CLAIMDESK_LOG_LEVEL"],
        ),
        entry(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["CLAIMDESK_LOGGING_FORMAT", "CLAIMDESK_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["claimdesk.toml", "config/claimdesk.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(**key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a short prefix so operators can tell tokens apart without exposing them.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_token};

    #[test]
    fn tokens_are_redacted_to_their_prefix() {
        assert_eq!(redact_token("hook-abc123"), "hook-***");
        assert_eq!(redact_token("plainsecret"), "<redacted>");
        assert_eq!(redact_token("  "), "<empty>");
    }

    #[test]
    fn nested_keys_are_found_in_file_documents() {
        let doc: toml::Value =
            "[workflow]\ntraining_budget_ceiling = \"10000\"\n".parse().expect("toml");
        assert!(contains_path(&doc, "workflow.training_budget_ceiling"));
        assert!(!contains_path(&doc, "workflow.refresh_debounce_ms"));
        assert!(!contains_path(&doc, "notifications.enabled"));
    }
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use jobwire_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Field {
    fn new(key: &'static str, value: impl Into<String>, env_keys: &'static [&'static str]) -> Self {
        Self { key, value: value.into(), env_keys }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source =
            field_source(field.key, field.env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let workflow = &config.workflow;
    let estimators = workflow
        .estimators
        .iter()
        .map(|(name, user_id)| format!("{name}={user_id}"))
        .collect::<Vec<_>>()
        .join(",");

    vec![
        Field::new(
            "slack.signing_secret",
            redact_secret(&config.slack.signing_secret),
            &["JOBWIRE_SLACK_SIGNING_SECRET", "SLACK_SIGNING_SECRET"],
        ),
        Field::new(
            "slack.bot_token",
            redact_secret(&config.slack.bot_token),
            &["JOBWIRE_SLACK_BOT_TOKEN", "SLACK_BOT_TOKEN"],
        ),
        Field::new("slack.api_base_url", &config.slack.api_base_url, &["JOBWIRE_SLACK_API_BASE_URL"]),
        Field::new("slack.events_path", &config.slack.events_path, &["JOBWIRE_SLACK_EVENTS_PATH"]),
        Field::new(
            "slack.start_command",
            &config.slack.start_command,
            &["JOBWIRE_SLACK_START_COMMAND"],
        ),
        Field::new(
            "slack.system_user_id",
            &config.slack.system_user_id,
            &["JOBWIRE_SLACK_SYSTEM_USER_ID"],
        ),
        Field::new(
            "crm.api_token",
            redact_secret(&config.crm.api_token),
            &["JOBWIRE_CRM_API_TOKEN", "PIPEDRIVE_API_TOKEN"],
        ),
        Field::new("crm.base_url", &config.crm.base_url, &["JOBWIRE_CRM_BASE_URL"]),
        Field::new(
            "crm.timeout_secs",
            config.crm.timeout_secs.to_string(),
            &["JOBWIRE_CRM_TIMEOUT_SECS"],
        ),
        Field::new(
            "server.bind_address",
            &config.server.bind_address,
            &["JOBWIRE_SERVER_BIND_ADDRESS"],
        ),
        Field::new("server.port", config.server.port.to_string(), &["JOBWIRE_SERVER_PORT", "PORT"]),
        Field::new(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["JOBWIRE_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        Field::new(
            "workflow.initial_form_base",
            &workflow.initial_form_base,
            &["JOBWIRE_WORKFLOW_INITIAL_FORM_BASE"],
        ),
        Field::new(
            "workflow.progress_form_base",
            &workflow.progress_form_base,
            &["JOBWIRE_WORKFLOW_PROGRESS_FORM_BASE"],
        ),
        Field::new(
            "workflow.always_invite",
            workflow.always_invite.join(","),
            &["JOBWIRE_WORKFLOW_ALWAYS_INVITE"],
        ),
        Field::new("workflow.estimators", estimators, &[]),
        Field::new(
            "workflow.estimator_field_key",
            &workflow.estimator_field_key,
            &["JOBWIRE_WORKFLOW_ESTIMATOR_FIELD_KEY"],
        ),
        Field::new(
            "workflow.settle_delay_ms",
            workflow.settle_delay_ms.to_string(),
            &["JOBWIRE_WORKFLOW_SETTLE_DELAY_MS"],
        ),
        Field::new(
            "workflow.dedup_window_secs",
            workflow.dedup_window_secs.to_string(),
            &["JOBWIRE_WORKFLOW_DEDUP_WINDOW_SECS"],
        ),
        Field::new(
            "logging.level",
            &config.logging.level,
            &["JOBWIRE_LOGGING_LEVEL", "JOBWIRE_LOG_LEVEL"],
        ),
        Field::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["JOBWIRE_LOGGING_FORMAT", "JOBWIRE_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["jobwire.toml", "config/jobwire.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
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
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
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

fn redact_secret(secret: &SecretString) -> String {
    redact_token(secret.expose_secret())
}

const VISIBLE_TOKEN_PREFIXES: [&str; 2] = ["xoxb", "xoxp"];

/// Keeps a Slack token-type prefix visible; every other secret is hidden entirely.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.split_once('-') {
        Some((prefix, _)) if VISIBLE_TOKEN_PREFIXES.contains(&prefix) => format!("{prefix}-***"),
        _ => "<redacted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{contains_path, field_source, redact_token};

    #[test]
    fn tokens_keep_only_their_prefix() {
        assert_eq!(redact_token("xoxb-123-abc"), "xoxb-***");
        assert_eq!(redact_token("xoxp-9-def"), "xoxp-***");
        assert_eq!(redact_token("plainsecret"), "<redacted>");
        assert_eq!(redact_token("very-secret-value"), "<redacted>");
        assert_eq!(redact_token("  "), "<empty>");
    }

    #[test]
    fn nested_keys_are_found_in_file_doc() {
        let doc: toml::Value = "[workflow]\nsettle_delay_ms = 100\n".parse().expect("toml");

        assert!(contains_path(&doc, "workflow.settle_delay_ms"));
        assert!(!contains_path(&doc, "workflow.dedup_window_secs"));
        assert_eq!(
            field_source("workflow.settle_delay_ms", &[], Some(&doc), None),
            "file (config file)"
        );
        assert_eq!(field_source("crm.base_url", &[], Some(&doc), None), "default");
    }
}

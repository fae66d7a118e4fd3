use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::invite::normalize_estimator;

pub const DEFAULT_INITIAL_FORM_BASE: &str = "https://docs.google.com/forms/d/e/1FAIpQLScOHXE_h7gr_kagnUy-xTtV_gJsyTAMl7NtjlV4OBA1yPsZzw/viewform?usp=pp_url&entry.1514728493=";
pub const DEFAULT_PROGRESS_FORM_BASE: &str = "https://docs.google.com/forms/d/e/1FAIpQLSck9PRgRSGHWWgqIy0UJDC6r51Ihv5TIFKBILs-_sEzrkY7PA/viewform?usp=pp_url&entry.1942941566=";
pub const DEFAULT_ESTIMATOR_FIELD_KEY: &str = "0c1e4ec54e5c4b814a6cadbf0ed473ead1dff9d4";
pub const DEFAULT_ALWAYS_INVITE: [&str; 3] = ["U07AB7A4UNS", "U086RFE5UF2", "U05FPCPHJG6"];
pub const DEFAULT_ESTIMATORS: [(&str, &str); 2] = [("kim", "U05FYG3EMHS"), ("danica", "U06DKJ1BJ9W")];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackConfig,
    pub crm: CrmConfig,
    pub server: ServerConfig,
    pub workflow: WorkflowConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub signing_secret: SecretString,
    pub bot_token: SecretString,
    pub api_base_url: String,
    pub events_path: String,
    pub start_command: String,
    /// Platform-owned account whose join events are never acted on.
    pub system_user_id: String,
}

#[derive(Clone, Debug)]
pub struct CrmConfig {
    pub api_token: SecretString,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub initial_form_base: String,
    pub progress_form_base: String,
    pub always_invite: Vec<String>,
    pub estimators: BTreeMap<String, String>,
    pub estimator_field_key: String,
    pub settle_delay_ms: u64,
    pub dedup_window_secs: u64,
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
    pub slack_signing_secret: Option<String>,
    pub slack_bot_token: Option<String>,
    pub slack_api_base_url: Option<String>,
    pub crm_api_token: Option<String>,
    pub crm_base_url: Option<String>,
    pub server_port: Option<u16>,
    pub settle_delay_ms: Option<u64>,
    pub dedup_window_secs: Option<u64>,
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
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            initial_form_base: DEFAULT_INITIAL_FORM_BASE.to_string(),
            progress_form_base: DEFAULT_PROGRESS_FORM_BASE.to_string(),
            always_invite: DEFAULT_ALWAYS_INVITE.iter().map(|id| id.to_string()).collect(),
            estimators: DEFAULT_ESTIMATORS
                .iter()
                .map(|(name, user_id)| (name.to_string(), user_id.to_string()))
                .collect(),
            estimator_field_key: DEFAULT_ESTIMATOR_FIELD_KEY.to_string(),
            settle_delay_ms: 4_000,
            dedup_window_secs: 10,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig {
                signing_secret: String::new().into(),
                bot_token: String::new().into(),
                api_base_url: "https://slack.com/api".to_string(),
                events_path: "/slack/events".to_string(),
                start_command: "/start".to_string(),
                system_user_id: "USLACKBOT".to_string(),
            },
            crm: CrmConfig {
                api_token: String::new().into(),
                base_url: "https://api.pipedrive.com/v1".to_string(),
                timeout_secs: 15,
            },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 3000,
                graceful_shutdown_secs: 15,
            },
            workflow: WorkflowConfig::default(),
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("jobwire.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(slack) = patch.slack {
            if let Some(signing_secret) = slack.signing_secret {
                self.slack.signing_secret = secret_value(signing_secret);
            }
            if let Some(bot_token) = slack.bot_token {
                self.slack.bot_token = secret_value(bot_token);
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
            if let Some(events_path) = slack.events_path {
                self.slack.events_path = events_path;
            }
            if let Some(start_command) = slack.start_command {
                self.slack.start_command = start_command;
            }
            if let Some(system_user_id) = slack.system_user_id {
                self.slack.system_user_id = system_user_id;
            }
        }

        if let Some(crm) = patch.crm {
            if let Some(api_token) = crm.api_token {
                self.crm.api_token = secret_value(api_token);
            }
            if let Some(base_url) = crm.base_url {
                self.crm.base_url = base_url;
            }
            if let Some(timeout_secs) = crm.timeout_secs {
                self.crm.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(initial_form_base) = workflow.initial_form_base {
                self.workflow.initial_form_base = initial_form_base;
            }
            if let Some(progress_form_base) = workflow.progress_form_base {
                self.workflow.progress_form_base = progress_form_base;
            }
            if let Some(always_invite) = workflow.always_invite {
                self.workflow.always_invite = always_invite;
            }
            if let Some(estimators) = workflow.estimators {
                self.workflow.estimators = estimators
                    .into_iter()
                    .map(|(name, user_id)| (normalize_estimator(Some(&name)), user_id))
                    .collect();
            }
            if let Some(estimator_field_key) = workflow.estimator_field_key {
                self.workflow.estimator_field_key = estimator_field_key;
            }
            if let Some(settle_delay_ms) = workflow.settle_delay_ms {
                self.workflow.settle_delay_ms = settle_delay_ms;
            }
            if let Some(dedup_window_secs) = workflow.dedup_window_secs {
                self.workflow.dedup_window_secs = dedup_window_secs;
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
        if let Some(value) = read_env_with_fallback("JOBWIRE_SLACK_SIGNING_SECRET", "SLACK_SIGNING_SECRET")
        {
            self.slack.signing_secret = secret_value(value);
        }
        if let Some(value) = read_env_with_fallback("JOBWIRE_SLACK_BOT_TOKEN", "SLACK_BOT_TOKEN") {
            self.slack.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("JOBWIRE_SLACK_API_BASE_URL") {
            self.slack.api_base_url = value;
        }
        if let Some(value) = read_env("JOBWIRE_SLACK_EVENTS_PATH") {
            self.slack.events_path = value;
        }
        if let Some(value) = read_env("JOBWIRE_SLACK_START_COMMAND") {
            self.slack.start_command = value;
        }
        if let Some(value) = read_env("JOBWIRE_SLACK_SYSTEM_USER_ID") {
            self.slack.system_user_id = value;
        }

        if let Some(value) = read_env_with_fallback("JOBWIRE_CRM_API_TOKEN", "PIPEDRIVE_API_TOKEN") {
            self.crm.api_token = secret_value(value);
        }
        if let Some(value) = read_env("JOBWIRE_CRM_BASE_URL") {
            self.crm.base_url = value;
        }
        if let Some(value) = read_env("JOBWIRE_CRM_TIMEOUT_SECS") {
            self.crm.timeout_secs = parse_u64("JOBWIRE_CRM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("JOBWIRE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("JOBWIRE_SERVER_PORT") {
            self.server.port = parse_u16("JOBWIRE_SERVER_PORT", &value)?;
        } else if let Some(value) = read_env("PORT") {
            self.server.port = parse_u16("PORT", &value)?;
        }
        if let Some(value) = read_env("JOBWIRE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("JOBWIRE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("JOBWIRE_WORKFLOW_INITIAL_FORM_BASE") {
            self.workflow.initial_form_base = value;
        }
        if let Some(value) = read_env("JOBWIRE_WORKFLOW_PROGRESS_FORM_BASE") {
            self.workflow.progress_form_base = value;
        }
        if let Some(value) = read_env("JOBWIRE_WORKFLOW_ALWAYS_INVITE") {
            self.workflow.always_invite = value
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = read_env("JOBWIRE_WORKFLOW_ESTIMATOR_FIELD_KEY") {
            self.workflow.estimator_field_key = value;
        }
        if let Some(value) = read_env("JOBWIRE_WORKFLOW_SETTLE_DELAY_MS") {
            self.workflow.settle_delay_ms = parse_u64("JOBWIRE_WORKFLOW_SETTLE_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("JOBWIRE_WORKFLOW_DEDUP_WINDOW_SECS") {
            self.workflow.dedup_window_secs =
                parse_u64("JOBWIRE_WORKFLOW_DEDUP_WINDOW_SECS", &value)?;
        }

        let log_level =
            read_env("JOBWIRE_LOGGING_LEVEL").or_else(|| read_env("JOBWIRE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("JOBWIRE_LOGGING_FORMAT").or_else(|| read_env("JOBWIRE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(signing_secret) = overrides.slack_signing_secret {
            self.slack.signing_secret = secret_value(signing_secret);
        }
        if let Some(bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(bot_token);
        }
        if let Some(api_base_url) = overrides.slack_api_base_url {
            self.slack.api_base_url = api_base_url;
        }
        if let Some(api_token) = overrides.crm_api_token {
            self.crm.api_token = secret_value(api_token);
        }
        if let Some(base_url) = overrides.crm_base_url {
            self.crm.base_url = base_url;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(settle_delay_ms) = overrides.settle_delay_ms {
            self.workflow.settle_delay_ms = settle_delay_ms;
        }
        if let Some(dedup_window_secs) = overrides.dedup_window_secs {
            self.workflow.dedup_window_secs = dedup_window_secs;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        validate_crm(&self.crm)?;
        validate_server(&self.server)?;
        validate_workflow(&self.workflow)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("jobwire.toml"), PathBuf::from("config/jobwire.toml")]
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

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let bot_token = slack.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_token is required. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_string()
        ));
    }
    if !bot_token.starts_with("xoxb-") {
        return Err(ConfigError::Validation(
            "slack.bot_token must start with `xoxb-`. Get it from https://api.slack.com/apps"
                .to_string(),
        ));
    }

    if slack.signing_secret.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "slack.signing_secret is required. Get it from https://api.slack.com/apps > Your App > Basic Information > Signing Secret".to_string()
        ));
    }

    if !is_http_url(&slack.api_base_url) {
        return Err(ConfigError::Validation(
            "slack.api_base_url must start with http:// or https://".to_string(),
        ));
    }
    if !slack.events_path.starts_with('/') {
        return Err(ConfigError::Validation("slack.events_path must start with `/`".to_string()));
    }
    if !slack.start_command.starts_with('/') {
        return Err(ConfigError::Validation(
            "slack.start_command must start with `/`".to_string(),
        ));
    }

    Ok(())
}

fn validate_crm(crm: &CrmConfig) -> Result<(), ConfigError> {
    if crm.api_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation("crm.api_token is required".to_string()));
    }
    if !is_http_url(&crm.base_url) {
        return Err(ConfigError::Validation(
            "crm.base_url must start with http:// or https://".to_string(),
        ));
    }
    if crm.timeout_secs == 0 || crm.timeout_secs > 120 {
        return Err(ConfigError::Validation("crm.timeout_secs must be in range 1..=120".to_string()));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if !is_http_url(&workflow.initial_form_base) || !is_http_url(&workflow.progress_form_base) {
        return Err(ConfigError::Validation(
            "workflow form bases must start with http:// or https://".to_string(),
        ));
    }

    if workflow.estimator_field_key.trim().is_empty() {
        return Err(ConfigError::Validation(
            "workflow.estimator_field_key must not be empty".to_string(),
        ));
    }

    for (name, user_id) in &workflow.estimators {
        if name.is_empty() || *name != normalize_estimator(Some(name)) {
            return Err(ConfigError::Validation(format!(
                "workflow.estimators key `{name}` must be trimmed lowercase"
            )));
        }
        if user_id.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "workflow.estimators entry `{name}` has an empty user id"
            )));
        }
    }

    if workflow.settle_delay_ms > 60_000 {
        return Err(ConfigError::Validation(
            "workflow.settle_delay_ms must be at most 60000".to_string(),
        ));
    }

    if workflow.dedup_window_secs == 0 || workflow.dedup_window_secs > 3_600 {
        return Err(ConfigError::Validation(
            "workflow.dedup_window_secs must be in range 1..=3600".to_string(),
        ));
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

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_env_with_fallback(key: &str, fallback: &str) -> Option<String> {
    read_env(key).or_else(|| read_env(fallback))
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
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
    slack: Option<SlackPatch>,
    crm: Option<CrmPatch>,
    server: Option<ServerPatch>,
    workflow: Option<WorkflowPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    signing_secret: Option<String>,
    bot_token: Option<String>,
    api_base_url: Option<String>,
    events_path: Option<String>,
    start_command: Option<String>,
    system_user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CrmPatch {
    api_token: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    initial_form_base: Option<String>,
    progress_form_base: Option<String>,
    always_invite: Option<Vec<String>>,
    estimators: Option<BTreeMap<String, String>>,
    estimator_field_key: Option<String>,
    settle_delay_ms: Option<u64>,
    dedup_window_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

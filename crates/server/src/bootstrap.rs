use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use jobwire_core::config::{AppConfig, ConfigError};
use jobwire_core::dedup::DedupGuard;
use jobwire_core::deal::DealDirectory;
use jobwire_core::errors::CrmError;
use jobwire_core::workflow::{ChatPlatform, WorkflowRunner, WorkflowSettings};
use jobwire_slack::events::{default_dispatcher, JoinTriggerSettings};
use jobwire_slack::{SignatureVerifier, SlackWebClient};
use thiserror::Error;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::crm::PipedriveClient;
use crate::slack_events::SlackIngressState;
use crate::{health, slack_events, webhooks};

pub struct Application {
    pub config: AppConfig,
    pub router: Router,
    pub guard: DedupGuard,
    /// Slack dispatches running behind an already-acknowledged request.
    pub tasks: TaskTracker,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("crm client could not be built: {0}")]
    Crm(#[from] CrmError),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let platform: Arc<dyn ChatPlatform> = Arc::new(SlackWebClient::from_config(&config.slack));
    let deals: Arc<dyn DealDirectory> =
        Arc::new(PipedriveClient::from_config(&config.crm, &config.workflow)?);
    Ok(assemble(config, platform, deals))
}

/// Wires the HTTP surface around the given collaborators.
pub fn assemble(
    config: AppConfig,
    platform: Arc<dyn ChatPlatform>,
    deals: Arc<dyn DealDirectory>,
) -> Application {
    let guard = DedupGuard::new(Duration::from_secs(config.workflow.dedup_window_secs));
    let runner =
        Arc::new(WorkflowRunner::new(platform, deals, WorkflowSettings::from(&config.workflow)));
    let dispatcher = default_dispatcher(
        runner.clone(),
        guard.clone(),
        JoinTriggerSettings::from_config(&config),
        config.slack.start_command.clone(),
    );
    let tasks = TaskTracker::new();
    let ingress = SlackIngressState::new(
        SignatureVerifier::new(config.slack.signing_secret.clone()),
        Arc::new(dispatcher),
        tasks.clone(),
    );

    let router = Router::new()
        .merge(health::router(guard.clone()))
        .merge(webhooks::router(runner))
        .merge(slack_events::router(&config.slack.events_path, ingress));

    info!(
        event_name = "system.bootstrap.routes_ready",
        correlation_id = "bootstrap",
        events_path = %config.slack.events_path,
        "http routes assembled"
    );
    Application { config, router, guard, tasks }
}

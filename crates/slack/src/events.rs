use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use jobwire_core::config::AppConfig;
use jobwire_core::dedup::DedupGuard;
use jobwire_core::errors::WorkflowError;
use jobwire_core::job::mentions_deal;
use jobwire_core::workflow::{WorkflowOutcome, WorkflowRunner};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::commands::SlashCommandPayload;

const UNKNOWN_ENVELOPE_ID: &str = "unknown-envelope-id";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    MemberJoinedChannel(MemberJoinedChannelEvent),
    SlashCommand(SlashCommandPayload),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::MemberJoinedChannel(_) => SlackEventType::MemberJoinedChannel,
            Self::SlashCommand(_) => SlackEventType::SlashCommand,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    pub fn channel_id(&self) -> Option<&str> {
        match self {
            Self::MemberJoinedChannel(event) => Some(&event.channel_id),
            Self::SlashCommand(payload) => Some(&payload.channel_id),
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    MemberJoinedChannel,
    SlashCommand,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MemberJoinedChannelEvent {
    #[serde(rename = "user")]
    pub user_id: String,
    #[serde(rename = "channel")]
    pub channel_id: String,
    #[serde(default)]
    pub channel_type: Option<String>,
    #[serde(default, rename = "team")]
    pub team_id: Option<String>,
    #[serde(default)]
    pub inviter: Option<String>,
}

/// What an Events API request body turned out to be.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// Endpoint ownership check; answer with the challenge.
    UrlVerification { challenge: String },
    Envelope(SlackEnvelope),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("request body is not valid json: {0}")]
    InvalidJson(String),
    #[error("`{event_type}` event is malformed: {reason}")]
    MalformedEvent { event_type: String, reason: String },
    #[error("missing form field `{0}`")]
    MissingField(&'static str),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum EventsPayload {
    UrlVerification {
        challenge: String,
    },
    EventCallback {
        #[serde(default)]
        event_id: Option<String>,
        event: Value,
    },
    #[serde(other)]
    Other,
}

/// Parses a JSON Events API body.
pub fn parse_events_payload(body: &[u8]) -> Result<Inbound, EnvelopeError> {
    let payload: EventsPayload = serde_json::from_slice(body)
        .map_err(|error| EnvelopeError::InvalidJson(error.to_string()))?;

    let (event_id, event) = match payload {
        EventsPayload::UrlVerification { challenge } => {
            return Ok(Inbound::UrlVerification { challenge });
        }
        EventsPayload::EventCallback { event_id, event } => (event_id, event),
        EventsPayload::Other => {
            return Ok(Inbound::Envelope(SlackEnvelope {
                envelope_id: UNKNOWN_ENVELOPE_ID.to_owned(),
                event: SlackEvent::Unsupported { event_type: "unknown".to_owned() },
            }));
        }
    };

    let envelope_id = event_id.unwrap_or_else(|| UNKNOWN_ENVELOPE_ID.to_owned());
    let event_type = event.get("type").and_then(Value::as_str).unwrap_or("unknown").to_owned();
    let event = if event_type == "member_joined_channel" {
        let joined = serde_json::from_value(event).map_err(|error| {
            EnvelopeError::MalformedEvent { event_type, reason: error.to_string() }
        })?;
        SlackEvent::MemberJoinedChannel(joined)
    } else {
        SlackEvent::Unsupported { event_type }
    };

    Ok(Inbound::Envelope(SlackEnvelope { envelope_id, event }))
}

/// Parses a form-encoded slash command body.
pub fn parse_slash_command(body: &[u8]) -> Result<SlackEnvelope, EnvelopeError> {
    let payload = SlashCommandPayload::from_form(body)?;
    let envelope_id = if payload.trigger_id.is_empty() {
        UNKNOWN_ENVELOPE_ID.to_owned()
    } else {
        payload.trigger_id.clone()
    };
    Ok(SlackEnvelope { envelope_id, event: SlackEvent::SlashCommand(payload) })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    SystemUser,
    Duplicate,
    NotDealChannel,
    OtherCommand,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Completed(Box<WorkflowOutcome>),
    Skipped(SkipReason),
    Ignored,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Timing and identity knobs for the join trigger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinTriggerSettings {
    pub system_user_id: String,
    pub settle_delay: Duration,
}

impl JoinTriggerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            system_user_id: config.slack.system_user_id.clone(),
            settle_delay: Duration::from_millis(config.workflow.settle_delay_ms),
        }
    }
}

impl Default for JoinTriggerSettings {
    fn default() -> Self {
        Self { system_user_id: "USLACKBOT".to_owned(), settle_delay: Duration::from_secs(4) }
    }
}

/// Dispatcher with both triggers registered against one runner.
pub fn default_dispatcher(
    runner: Arc<WorkflowRunner>,
    guard: DedupGuard,
    join_settings: JoinTriggerSettings,
    start_command: impl Into<String>,
) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MemberJoinedHandler::new(runner.clone(), guard, join_settings));
    dispatcher.register(StartCommandHandler::new(runner, start_command));
    dispatcher
}

/// Starts the workflow when someone joins a deal channel, once per dedup window.
pub struct MemberJoinedHandler {
    runner: Arc<WorkflowRunner>,
    guard: DedupGuard,
    settings: JoinTriggerSettings,
}

impl MemberJoinedHandler {
    pub fn new(runner: Arc<WorkflowRunner>, guard: DedupGuard, settings: JoinTriggerSettings) -> Self {
        Self { runner, guard, settings }
    }
}

#[async_trait]
impl EventHandler for MemberJoinedHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::MemberJoinedChannel
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::MemberJoinedChannel(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let channel_id = event.channel_id.as_str();

        if event.user_id == self.settings.system_user_id {
            return Ok(HandlerResult::Skipped(SkipReason::SystemUser));
        }
        if self.guard.contains(channel_id) {
            debug!(
                event_name = "trigger.join.duplicate",
                correlation_id = %ctx.correlation_id,
                channel_id,
                "join event inside dedup window; ignoring"
            );
            return Ok(HandlerResult::Skipped(SkipReason::Duplicate));
        }

        let channel = self.runner.platform().channel_info(channel_id).await.map_err(|source| {
            WorkflowError::ChannelLookup { channel_id: channel_id.to_owned(), source }
        })?;
        let channel_name = channel.name.unwrap_or_default();
        if !mentions_deal(&channel_name) {
            return Ok(HandlerResult::Skipped(SkipReason::NotDealChannel));
        }
        if !self.guard.try_claim(channel_id) {
            return Ok(HandlerResult::Skipped(SkipReason::Duplicate));
        }

        info!(
            event_name = "trigger.join.accepted",
            correlation_id = %ctx.correlation_id,
            channel_id,
            channel_name = %channel_name,
            user_id = %event.user_id,
            "deal channel join accepted"
        );
        tokio::time::sleep(self.settings.settle_delay).await;

        let outcome = self.runner.run(channel_id).await?;
        log_outcome(ctx, &outcome);
        Ok(HandlerResult::Completed(Box::new(outcome)))
    }
}

/// Manual start: runs the workflow for the invoking channel with no filtering.
pub struct StartCommandHandler {
    runner: Arc<WorkflowRunner>,
    command: String,
}

impl StartCommandHandler {
    pub fn new(runner: Arc<WorkflowRunner>, command: impl Into<String>) -> Self {
        Self { runner, command: command.into() }
    }
}

#[async_trait]
impl EventHandler for StartCommandHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::SlashCommand
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::SlashCommand(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if !payload.is_command(&self.command) {
            return Ok(HandlerResult::Skipped(SkipReason::OtherCommand));
        }

        info!(
            event_name = "trigger.command.accepted",
            correlation_id = %ctx.correlation_id,
            channel_id = %payload.channel_id,
            user_id = %payload.user_id,
            "start command received"
        );
        let outcome = self.runner.run(&payload.channel_id).await?;
        log_outcome(ctx, &outcome);
        Ok(HandlerResult::Completed(Box::new(outcome)))
    }
}

fn log_outcome(ctx: &EventContext, outcome: &WorkflowOutcome) {
    info!(
        event_name = "workflow.start.completed",
        correlation_id = %ctx.correlation_id,
        channel_id = %outcome.channel_id,
        job_number = %outcome.job_number,
        customer = %outcome.deal.customer_name,
        invites = ?outcome.invites,
        "start workflow completed"
    );
}

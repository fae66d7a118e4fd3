//! Slack Events API / slash command ingress. Verifies, acknowledges, then dispatches off the
//! request path.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use jobwire_slack::events::{
    parse_events_payload, parse_slash_command, EventContext, EventDispatcher, HandlerResult,
    Inbound, SlackEnvelope,
};
use jobwire_slack::signature::{SignatureVerifier, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use serde_json::json;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

const RETRY_HEADER: &str = "x-slack-retry-num";

#[derive(Clone)]
pub struct SlackIngressState {
    verifier: SignatureVerifier,
    dispatcher: Arc<EventDispatcher>,
    /// Dispatches still running after their request was acknowledged.
    tasks: TaskTracker,
}

impl SlackIngressState {
    pub fn new(
        verifier: SignatureVerifier,
        dispatcher: Arc<EventDispatcher>,
        tasks: TaskTracker,
    ) -> Self {
        Self { verifier, dispatcher, tasks }
    }
}

pub fn router(events_path: &str, state: SlackIngressState) -> Router {
    Router::new().route(events_path, post(receive)).with_state(state)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

async fn receive(
    State(state): State<SlackIngressState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(rejection) = state.verifier.verify(
        header_str(&headers, TIMESTAMP_HEADER),
        header_str(&headers, SIGNATURE_HEADER),
        &body,
    ) {
        warn!(
            event_name = "ingress.slack.signature_rejected",
            error = %rejection,
            "rejected slack request"
        );
        return (StatusCode::UNAUTHORIZED, "invalid signature").into_response();
    }

    let is_form = header_str(&headers, header::CONTENT_TYPE.as_str())
        .is_some_and(|value| value.contains("application/x-www-form-urlencoded"));
    let parsed = if is_form {
        parse_slash_command(&body)
    } else {
        match parse_events_payload(&body) {
            Ok(Inbound::UrlVerification { challenge }) => {
                info!(event_name = "ingress.slack.url_verification", "answering url verification");
                return Json(json!({ "challenge": challenge })).into_response();
            }
            Ok(Inbound::Envelope(envelope)) => Ok(envelope),
            Err(failure) => Err(failure),
        }
    };

    let envelope = match parsed {
        Ok(envelope) => envelope,
        Err(failure) => {
            warn!(
                event_name = "ingress.slack.malformed",
                error = %failure,
                "could not parse slack request"
            );
            return (StatusCode::BAD_REQUEST, "malformed slack payload").into_response();
        }
    };

    info!(
        event_name = "ingress.slack.envelope_received",
        correlation_id = %envelope.envelope_id,
        event_type = ?envelope.event.event_type(),
        channel_id = envelope.event.channel_id().unwrap_or("unknown"),
        retry_num = header_str(&headers, RETRY_HEADER).unwrap_or("0"),
        "received slack envelope"
    );

    state.tasks.spawn(dispatch(state.dispatcher.clone(), envelope));
    StatusCode::OK.into_response()
}

async fn dispatch(dispatcher: Arc<EventDispatcher>, envelope: SlackEnvelope) {
    let ctx = EventContext { correlation_id: envelope.envelope_id.clone() };
    match dispatcher.dispatch(&envelope, &ctx).await {
        Ok(HandlerResult::Skipped(reason)) => debug!(
            event_name = "ingress.slack.skipped",
            correlation_id = %ctx.correlation_id,
            reason = ?reason,
            "slack event skipped"
        ),
        Ok(_) => {}
        Err(failure) => error!(
            event_name = "workflow.start.failed",
            correlation_id = %ctx.correlation_id,
            channel_id = envelope.event.channel_id().unwrap_or("unknown"),
            error = %failure,
            "start workflow failed"
        ),
    }
}

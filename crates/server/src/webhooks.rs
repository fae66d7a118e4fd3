//! Inbound relays from the job-tracking sheet: progress-form prompt and final status line.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::StatusCode, routing::post, Router};
use jobwire_core::job::{mentions_deal, JobNumber};
use jobwire_core::workflow::WorkflowRunner;
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const PROGRESS_FORM_PATH: &str = "/trigger-progress-form";
pub const FINAL_MESSAGE_PATH: &str = "/slack-final-message";

#[derive(Clone)]
pub struct WebhookState {
    runner: Arc<WorkflowRunner>,
}

/// Lenient body: anything that is not a JSON object with string fields reads as empty.
#[derive(Debug, Default, Deserialize)]
struct RelayBody {
    #[serde(default, rename = "jobNumber")]
    job_number: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl RelayBody {
    fn parse(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }
}

pub fn router(runner: Arc<WorkflowRunner>) -> Router {
    Router::new()
        .route(PROGRESS_FORM_PATH, post(trigger_progress_form))
        .route(FINAL_MESSAGE_PATH, post(final_message))
        .with_state(WebhookState { runner })
}

async fn trigger_progress_form(
    State(state): State<WebhookState>,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let correlation_id = Uuid::new_v4().to_string();
    let Some(job_number) =
        RelayBody::parse(&body).job_number.filter(|job| !job.is_empty() && mentions_deal(job))
    else {
        warn!(
            event_name = "webhook.progress_form.rejected",
            correlation_id = %correlation_id,
            "progress form request without a deal job number"
        );
        return (StatusCode::BAD_REQUEST, "Invalid job number");
    };

    let job_number = JobNumber::new(job_number);
    match state.runner.post_progress_form(&job_number).await {
        Ok(channel) => {
            info!(
                event_name = "webhook.progress_form.posted",
                correlation_id = %correlation_id,
                job_number = %job_number,
                channel = %channel,
                "progress form posted"
            );
            (StatusCode::OK, "Posted")
        }
        Err(failure) => {
            error!(
                event_name = "webhook.progress_form.failed",
                correlation_id = %correlation_id,
                job_number = %job_number,
                error = %failure,
                "failed to post progress form"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed")
        }
    }
}

async fn final_message(
    State(state): State<WebhookState>,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let correlation_id = Uuid::new_v4().to_string();
    let body = RelayBody::parse(&body);
    let (Some(job_number), Some(message)) = (
        body.job_number.filter(|job| !job.is_empty()),
        body.message.filter(|message| !message.is_empty()),
    ) else {
        warn!(
            event_name = "webhook.final_message.rejected",
            correlation_id = %correlation_id,
            "final message request missing jobNumber or message"
        );
        return (StatusCode::BAD_REQUEST, "Missing jobNumber or message");
    };

    let job_number = JobNumber::new(job_number);
    match state.runner.post_final_message(&job_number, &message).await {
        Ok(channel) => {
            info!(
                event_name = "webhook.final_message.posted",
                correlation_id = %correlation_id,
                job_number = %job_number,
                channel = %channel,
                "final message posted"
            );
            (StatusCode::OK, "Message sent to Slack")
        }
        Err(failure) => {
            error!(
                event_name = "webhook.final_message.failed",
                correlation_id = %correlation_id,
                job_number = %job_number,
                error = %failure,
                "failed to post final message"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, "Slack message failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use jobwire_core::errors::PlatformError;
    use jobwire_core::workflow::testing::{RecordingPlatform, StaticDeals};
    use jobwire_core::workflow::{WorkflowRunner, WorkflowSettings};
    use tower::ServiceExt;

    use super::{router, FINAL_MESSAGE_PATH, PROGRESS_FORM_PATH};

    fn app(platform: Arc<RecordingPlatform>) -> Router {
        router(Arc::new(WorkflowRunner::new(
            platform,
            Arc::new(StaticDeals::default()),
            WorkflowSettings::default(),
        )))
    }

    async fn post_json(app: Router, uri: &str, body: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_owned()))
                    .expect("request"),
            )
            .await
            .expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 4096).await.expect("body");
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[tokio::test]
    async fn progress_form_without_job_number_is_rejected() {
        let platform = Arc::new(RecordingPlatform::default());

        let (status, body) = post_json(app(platform.clone()), PROGRESS_FORM_PATH, "{}").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Invalid job number");
        assert!(platform.calls().await.is_empty());
    }

    #[tokio::test]
    async fn progress_form_requires_deal_in_job_number() {
        let platform = Arc::new(RecordingPlatform::default());

        let (status, _) =
            post_json(app(platform.clone()), PROGRESS_FORM_PATH, r#"{"jobNumber":"job-17"}"#).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(platform.calls().await.is_empty());
    }

    #[tokio::test]
    async fn progress_form_posts_to_lowercased_channel() {
        let platform = Arc::new(RecordingPlatform::default());

        let (status, body) =
            post_json(app(platform.clone()), PROGRESS_FORM_PATH, r#"{"jobNumber":"deal107"}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Posted");
        let posts = platform.posts().await;
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "deal107");
        assert!(posts[0].1.contains("Contents Progress Form"));
    }

    #[tokio::test]
    async fn progress_form_post_failure_is_500() {
        let platform = Arc::new(RecordingPlatform::default());
        platform.fail_post(PlatformError::api("chat.postMessage", "channel_not_found")).await;

        let (status, body) =
            post_json(app(platform), PROGRESS_FORM_PATH, r#"{"jobNumber":"Deal107"}"#).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Failed");
    }

    #[tokio::test]
    async fn final_message_is_relayed_with_checkmark() {
        let platform = Arc::new(RecordingPlatform::default());

        let (status, body) = post_json(
            app(platform.clone()),
            FINAL_MESSAGE_PATH,
            r#"{"jobNumber":"danica-deal107","message":"Packing complete"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Message sent to Slack");
        assert_eq!(
            platform.posts().await,
            vec![("danica-deal107".to_owned(), "\u{2705} Packing complete".to_owned())]
        );
    }

    #[tokio::test]
    async fn final_message_requires_both_fields() {
        let platform = Arc::new(RecordingPlatform::default());

        for body in [r#"{"jobNumber":"deal107"}"#, r#"{"message":"done"}"#, "not json"] {
            let (status, text) = post_json(app(platform.clone()), FINAL_MESSAGE_PATH, body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(text, "Missing jobNumber or message");
        }
        assert!(platform.calls().await.is_empty());
    }

    #[tokio::test]
    async fn final_message_post_failure_is_500() {
        let platform = Arc::new(RecordingPlatform::default());
        platform.fail_post(PlatformError::Transport("connection reset".to_owned())).await;

        let (status, body) = post_json(
            app(platform),
            FINAL_MESSAGE_PATH,
            r#"{"jobNumber":"deal107","message":"done"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Slack message failed");
    }
}

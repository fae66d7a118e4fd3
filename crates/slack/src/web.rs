//! Slack Web API client for the handful of methods the relay calls.

use async_trait::async_trait;
use jobwire_core::config::SlackConfig;
use jobwire_core::errors::PlatformError;
use jobwire_core::workflow::{ChannelInfo, ChatPlatform};
use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

/// Identity behind the bot token, as reported by `auth.test`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AuthIdentity {
    pub user_id: String,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
}

#[derive(Clone)]
pub struct SlackWebClient {
    http: reqwest::Client,
    base_url: String,
    bot_token: SecretString,
}

impl std::fmt::Debug for SlackWebClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackWebClient")
            .field("base_url", &self.base_url)
            .field("bot_token", &"[REDACTED]")
            .finish()
    }
}

impl SlackWebClient {
    pub fn new(base_url: impl Into<String>, bot_token: SecretString) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { http: reqwest::Client::new(), base_url, bot_token }
    }

    pub fn from_config(config: &SlackConfig) -> Self {
        Self::new(config.api_base_url.clone(), config.bot_token.clone())
    }

    pub async fn auth_test(&self) -> Result<AuthIdentity, PlatformError> {
        let body = self.post("auth.test", json!({})).await?;
        serde_json::from_value(body).map_err(|error| PlatformError::Decode(error.to_string()))
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    async fn get(&self, method: &str, query: &[(&str, &str)]) -> Result<Value, PlatformError> {
        let request = self.http.get(self.url(method)).query(query);
        self.send(method, request).await
    }

    async fn post(&self, method: &str, payload: Value) -> Result<Value, PlatformError> {
        let request = self.http.post(self.url(method)).json(&payload);
        self.send(method, request).await
    }

    async fn send(&self, method: &str, request: RequestBuilder) -> Result<Value, PlatformError> {
        let response = request
            .bearer_auth(self.bot_token.expose_secret())
            .send()
            .await
            .map_err(|error| PlatformError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PlatformError::Transport(format!("{method} returned http {status}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|error| PlatformError::Decode(error.to_string()))?;
        debug!(event_name = "slack.api.response", method, ok = body["ok"].as_bool(), "slack api call");
        check_ok(method, body)
    }
}

fn check_ok(method: &str, body: Value) -> Result<Value, PlatformError> {
    if body.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(body);
    }
    let code = body.get("error").and_then(Value::as_str).unwrap_or("unknown_error");
    Err(PlatformError::api(method, code))
}

#[async_trait]
impl ChatPlatform for SlackWebClient {
    async fn channel_info(&self, channel_id: &str) -> Result<ChannelInfo, PlatformError> {
        let body = self.get("conversations.info", &[("channel", channel_id)]).await?;
        let channel = &body["channel"];
        Ok(ChannelInfo {
            id: channel["id"].as_str().unwrap_or(channel_id).to_owned(),
            name: channel["name"].as_str().map(str::to_owned),
        })
    }

    async fn post_message(&self, channel: &str, text: &str) -> Result<(), PlatformError> {
        self.post("chat.postMessage", json!({ "channel": channel, "text": text })).await?;
        Ok(())
    }

    async fn join_channel(&self, channel_id: &str) -> Result<(), PlatformError> {
        self.post("conversations.join", json!({ "channel": channel_id })).await?;
        Ok(())
    }

    async fn invite_users(
        &self,
        channel_id: &str,
        user_ids: &[String],
    ) -> Result<(), PlatformError> {
        self.post(
            "conversations.invite",
            json!({ "channel": channel_id, "users": user_ids.join(",") }),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use jobwire_core::errors::PlatformError;
    use jobwire_core::workflow::ChatPlatform;
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::SlackWebClient;

    fn client(server: &MockServer) -> SlackWebClient {
        SlackWebClient::new(format!("{}/", server.uri()), SecretString::from("xoxb-test".to_owned()))
    }

    #[tokio::test]
    async fn channel_info_reads_name_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.info"))
            .and(query_param("channel", "C1"))
            .and(header("authorization", "Bearer xoxb-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "channel": { "id": "C1", "name": "danica-deal107", "is_private": false }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let info = client(&server).channel_info("C1").await.expect("channel info");

        assert_eq!(info.id, "C1");
        assert_eq!(info.name.as_deref(), Some("danica-deal107"));
    }

    #[tokio::test]
    async fn invite_joins_user_ids_with_commas() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversations.invite"))
            .and(body_json(json!({ "channel": "C1", "users": "U1,U2" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .invite_users("C1", &["U1".to_owned(), "U2".to_owned()])
            .await
            .expect("invite");
    }

    #[tokio::test]
    async fn not_ok_response_carries_platform_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversations.invite"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "ok": false, "error": "already_in_channel" })),
            )
            .mount(&server)
            .await;

        let error = client(&server)
            .invite_users("C1", &["U1".to_owned()])
            .await
            .expect_err("not ok");

        assert_eq!(error, PlatformError::api("conversations.invite", "already_in_channel"));
    }

    #[tokio::test]
    async fn post_message_sends_channel_and_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(body_json(json!({ "channel": "deal107", "text": "\u{2705} done" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "ts": "1.2" })))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).post_message("deal107", "\u{2705} done").await.expect("post");
    }

    #[tokio::test]
    async fn http_failure_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversations.join"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let error = client(&server).join_channel("C1").await.expect_err("503");

        assert!(matches!(error, PlatformError::Transport(_)));
        assert_eq!(error.code(), None);
    }

    #[tokio::test]
    async fn auth_test_decodes_identity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth.test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "user_id": "UBOT",
                "team": "Movers",
                "bot_id": "B1"
            })))
            .mount(&server)
            .await;

        let identity = client(&server).auth_test().await.expect("auth.test");

        assert_eq!(identity.user_id, "UBOT");
        assert_eq!(identity.team.as_deref(), Some("Movers"));
    }
}

//! Pipedrive deal lookups backing the start workflow's customer and estimator fields.

use std::time::Duration;

use async_trait::async_trait;
use jobwire_core::config::{CrmConfig, WorkflowConfig};
use jobwire_core::deal::{DealDirectory, DealRecord};
use jobwire_core::errors::CrmError;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;

#[derive(Clone)]
pub struct PipedriveClient {
    client: Client,
    base_url: String,
    api_token: SecretString,
    estimator_field_key: String,
}

impl std::fmt::Debug for PipedriveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipedriveClient")
            .field("base_url", &self.base_url)
            .field("api_token", &"[REDACTED]")
            .field("estimator_field_key", &self.estimator_field_key)
            .finish()
    }
}

impl PipedriveClient {
    pub fn new(
        base_url: impl Into<String>,
        api_token: SecretString,
        estimator_field_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CrmError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| CrmError::Transport(error.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_token,
            estimator_field_key: estimator_field_key.into(),
        })
    }

    pub fn from_config(crm: &CrmConfig, workflow: &WorkflowConfig) -> Result<Self, CrmError> {
        Self::new(
            crm.base_url.clone(),
            crm.api_token.clone(),
            workflow.estimator_field_key.clone(),
            Duration::from_secs(crm.timeout_secs),
        )
    }
}

#[async_trait]
impl DealDirectory for PipedriveClient {
    async fn fetch_deal(&self, deal_id: &str) -> Result<DealRecord, CrmError> {
        let url = format!("{}/deals/{deal_id}", self.base_url);
        let response = self
            .client
            .get(url)
            .query(&[("api_token", self.api_token.expose_secret())])
            .send()
            .await
            // The request url carries the token.
            .map_err(|error| CrmError::Transport(error.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CrmError::Status { status: status.as_u16() });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|error| CrmError::Decode(error.without_url().to_string()))?;
        debug!(event_name = "crm.deal.fetched", deal_id, "pipedrive deal fetched");

        match body.get("data") {
            Some(data) if data.is_object() => {
                Ok(DealRecord::from_data(data, &self.estimator_field_key))
            }
            Some(Value::Null) | None => Ok(DealRecord::default()),
            Some(other) => Err(CrmError::Decode(format!("deal data is not an object: {other}"))),
        }
    }
}

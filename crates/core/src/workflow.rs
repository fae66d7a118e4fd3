//! The start workflow for a job channel plus the follow-up relays posted by webhooks.
//!
//! ```text
//! channel id -> channel info -> job number -> deal lookup -> initial form post -> invites
//! ```
//!
//! Channel lookup and message posting are fatal to a run; the deal lookup and the
//! invites degrade in place.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::WorkflowConfig;
use crate::deal::{lookup_deal, DealDirectory, DealSummary};
use crate::errors::{PlatformError, WorkflowError};
use crate::invite::{dedupe_user_ids, InvitePolicy};
use crate::job::{extract_deal_id, JobNumber};
use crate::messages;

/// Invite failures that only mean there is nothing left to do.
pub const BENIGN_INVITE_CODES: [&str; 3] = ["already_in_channel", "cant_invite_self", "not_in_channel"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: String,
    pub name: Option<String>,
}

/// Outbound chat-platform operations the relay depends on.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn channel_info(&self, channel_id: &str) -> Result<ChannelInfo, PlatformError>;
    /// `channel` is either a channel id or a channel name.
    async fn post_message(&self, channel: &str, text: &str) -> Result<(), PlatformError>;
    async fn join_channel(&self, channel_id: &str) -> Result<(), PlatformError>;
    async fn invite_users(&self, channel_id: &str, user_ids: &[String])
        -> Result<(), PlatformError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowSettings {
    pub initial_form_base: String,
    pub progress_form_base: String,
    pub invite_policy: InvitePolicy,
}

impl From<&WorkflowConfig> for WorkflowSettings {
    fn from(config: &WorkflowConfig) -> Self {
        Self {
            initial_form_base: config.initial_form_base.clone(),
            progress_form_base: config.progress_form_base.clone(),
            invite_policy: InvitePolicy::new(
                config.always_invite.clone(),
                config.estimators.clone(),
            ),
        }
    }
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self::from(&WorkflowConfig::default())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InviteReport {
    /// Nothing to invite.
    Skipped,
    Invited(Vec<String>),
    /// Platform refused for a reason that needs no attention.
    Benign(String),
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowOutcome {
    pub channel_id: String,
    pub job_number: JobNumber,
    pub deal_id: Option<String>,
    pub deal: DealSummary,
    pub invites: InviteReport,
}

pub struct WorkflowRunner {
    platform: Arc<dyn ChatPlatform>,
    deals: Arc<dyn DealDirectory>,
    settings: WorkflowSettings,
}

impl WorkflowRunner {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        deals: Arc<dyn DealDirectory>,
        settings: WorkflowSettings,
    ) -> Self {
        Self { platform, deals, settings }
    }

    pub fn platform(&self) -> &Arc<dyn ChatPlatform> {
        &self.platform
    }

    /// Runs the start workflow for one channel, strictly in order.
    pub async fn run(&self, channel_id: &str) -> Result<WorkflowOutcome, WorkflowError> {
        let channel = self.platform.channel_info(channel_id).await.map_err(|source| {
            WorkflowError::ChannelLookup { channel_id: channel_id.to_owned(), source }
        })?;
        let channel_name = channel.name.as_deref().unwrap_or(crate::job::UNKNOWN_JOB_NUMBER);
        let deal_id = extract_deal_id(channel_name).map(str::to_owned);
        let job_number = JobNumber::from_channel_name(channel_name);

        let deal = match deal_id.as_deref() {
            Some(deal_id) => lookup_deal(self.deals.as_ref(), deal_id).await,
            None => DealSummary::default(),
        };

        let text = messages::initial_form_message(&self.settings.initial_form_base, &job_number);
        self.platform.post_message(channel_id, &text).await.map_err(|source| {
            WorkflowError::PostMessage { channel: channel_id.to_owned(), source }
        })?;
        info!(
            event_name = "workflow.start.form_posted",
            channel_id,
            job_number = %job_number,
            customer = %deal.customer_name,
            "initial contents form posted"
        );

        let invitees = self.settings.invite_policy.resolve(deal.estimator.as_deref());
        let invites = self.safe_invite(channel_id, &invitees).await;

        Ok(WorkflowOutcome {
            channel_id: channel_id.to_owned(),
            job_number,
            deal_id,
            deal,
            invites,
        })
    }

    /// Best-effort invite: joins first, invites everyone in one call, never errors.
    pub async fn safe_invite(&self, channel_id: &str, user_ids: &[String]) -> InviteReport {
        let unique = dedupe_user_ids(user_ids);
        if channel_id.is_empty() || unique.is_empty() {
            return InviteReport::Skipped;
        }

        // Already a member, or a private channel the app was added to.
        let _ = self.platform.join_channel(channel_id).await;

        match self.platform.invite_users(channel_id, &unique).await {
            Ok(()) => {
                info!(
                    event_name = "workflow.start.invited",
                    channel_id,
                    users = %unique.join(","),
                    "users invited to job channel"
                );
                InviteReport::Invited(unique)
            }
            Err(error) => {
                let label = error.label();
                if error.code().is_some_and(|code| BENIGN_INVITE_CODES.contains(&code)) {
                    InviteReport::Benign(label)
                } else {
                    warn!(
                        event_name = "workflow.start.invite_failed",
                        channel_id,
                        error = %error,
                        "invite failed; continuing"
                    );
                    InviteReport::Failed(label)
                }
            }
        }
    }

    /// Posts the progress-form prompt to the job's channel. Returns the channel used.
    pub async fn post_progress_form(&self, job_number: &JobNumber) -> Result<String, WorkflowError> {
        let channel = job_number.channel_name();
        let text = messages::progress_form_message(&self.settings.progress_form_base, job_number);
        self.platform
            .post_message(&channel, &text)
            .await
            .map_err(|source| WorkflowError::PostMessage { channel: channel.clone(), source })?;
        Ok(channel)
    }

    /// Relays a final status line to the job's channel. Returns the channel used.
    pub async fn post_final_message(
        &self,
        job_number: &JobNumber,
        message: &str,
    ) -> Result<String, WorkflowError> {
        let channel = job_number.channel_name();
        let text = messages::final_message(message);
        self.platform
            .post_message(&channel, &text)
            .await
            .map_err(|source| WorkflowError::PostMessage { channel: channel.clone(), source })?;
        Ok(channel)
    }
}

/// In-memory collaborators shared by tests across the workspace.
#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use std::collections::{HashMap, VecDeque};

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{ChannelInfo, ChatPlatform};
    use crate::deal::{DealDirectory, DealRecord};
    use crate::errors::{CrmError, PlatformError};

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum PlatformCall {
        ChannelInfo(String),
        PostMessage { channel: String, text: String },
        Join(String),
        Invite { channel: String, users: Vec<String> },
    }

    #[derive(Default)]
    pub struct RecordingPlatform {
        state: Mutex<RecordingState>,
    }

    #[derive(Default)]
    struct RecordingState {
        channel_names: HashMap<String, String>,
        calls: Vec<PlatformCall>,
        info_errors: VecDeque<PlatformError>,
        post_errors: VecDeque<PlatformError>,
        join_errors: VecDeque<PlatformError>,
        invite_errors: VecDeque<PlatformError>,
    }

    impl RecordingPlatform {
        pub fn with_channel(channel_id: &str, name: &str) -> Self {
            let mut state = RecordingState::default();
            state.channel_names.insert(channel_id.to_owned(), name.to_owned());
            Self { state: Mutex::new(state) }
        }

        pub async fn fail_channel_info(&self, error: PlatformError) {
            self.state.lock().await.info_errors.push_back(error);
        }

        pub async fn fail_post(&self, error: PlatformError) {
            self.state.lock().await.post_errors.push_back(error);
        }

        pub async fn fail_join(&self, error: PlatformError) {
            self.state.lock().await.join_errors.push_back(error);
        }

        pub async fn fail_invite(&self, error: PlatformError) {
            self.state.lock().await.invite_errors.push_back(error);
        }

        pub async fn calls(&self) -> Vec<PlatformCall> {
            self.state.lock().await.calls.clone()
        }

        pub async fn posts(&self) -> Vec<(String, String)> {
            self.calls()
                .await
                .into_iter()
                .filter_map(|call| match call {
                    PlatformCall::PostMessage { channel, text } => Some((channel, text)),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl ChatPlatform for RecordingPlatform {
        async fn channel_info(&self, channel_id: &str) -> Result<ChannelInfo, PlatformError> {
            let mut state = self.state.lock().await;
            state.calls.push(PlatformCall::ChannelInfo(channel_id.to_owned()));
            if let Some(error) = state.info_errors.pop_front() {
                return Err(error);
            }
            Ok(ChannelInfo {
                id: channel_id.to_owned(),
                name: state.channel_names.get(channel_id).cloned(),
            })
        }

        async fn post_message(&self, channel: &str, text: &str) -> Result<(), PlatformError> {
            let mut state = self.state.lock().await;
            if let Some(error) = state.post_errors.pop_front() {
                return Err(error);
            }
            state.calls.push(PlatformCall::PostMessage {
                channel: channel.to_owned(),
                text: text.to_owned(),
            });
            Ok(())
        }

        async fn join_channel(&self, channel_id: &str) -> Result<(), PlatformError> {
            let mut state = self.state.lock().await;
            state.calls.push(PlatformCall::Join(channel_id.to_owned()));
            state.join_errors.pop_front().map_or(Ok(()), Err)
        }

        async fn invite_users(
            &self,
            channel_id: &str,
            user_ids: &[String],
        ) -> Result<(), PlatformError> {
            let mut state = self.state.lock().await;
            state.calls.push(PlatformCall::Invite {
                channel: channel_id.to_owned(),
                users: user_ids.to_vec(),
            });
            state.invite_errors.pop_front().map_or(Ok(()), Err)
        }
    }

    /// Deal directory backed by a map; unknown ids fail like an unreachable CRM.
    #[derive(Default)]
    pub struct StaticDeals {
        records: HashMap<String, DealRecord>,
        lookups: Mutex<Vec<String>>,
    }

    impl StaticDeals {
        pub fn with_deal(mut self, deal_id: &str, record: DealRecord) -> Self {
            self.records.insert(deal_id.to_owned(), record);
            self
        }

        pub async fn lookups(&self) -> Vec<String> {
            self.lookups.lock().await.clone()
        }
    }

    #[async_trait]
    impl DealDirectory for StaticDeals {
        async fn fetch_deal(&self, deal_id: &str) -> Result<DealRecord, CrmError> {
            self.lookups.lock().await.push(deal_id.to_owned());
            self.records
                .get(deal_id)
                .cloned()
                .ok_or_else(|| CrmError::Transport("simulated network error".to_owned()))
        }
    }
}

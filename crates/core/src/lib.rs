pub mod config;
pub mod dedup;
pub mod deal;
pub mod errors;
pub mod invite;
pub mod job;
pub mod messages;
pub mod workflow;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use dedup::DedupGuard;
pub use deal::{lookup_deal, DealDirectory, DealRecord, DealSummary, EstimatorField};
pub use errors::{CrmError, PlatformError, WorkflowError};
pub use invite::InvitePolicy;
pub use job::{extract_deal_id, mentions_deal, JobNumber};
pub use workflow::{
    ChannelInfo, ChatPlatform, InviteReport, WorkflowOutcome, WorkflowRunner, WorkflowSettings,
};

//! HTTP surface of jobwire plus the Pipedrive-backed deal directory.

pub mod bootstrap;
pub mod crm;
pub mod health;
pub mod slack_events;
pub mod webhooks;

pub use bootstrap::{assemble, bootstrap_with_config, Application, BootstrapError};
pub use crm::PipedriveClient;

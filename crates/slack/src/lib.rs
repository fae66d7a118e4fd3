//! Slack side of jobwire.
//!
//! - **Web API** (`web`) - outbound calls: channel info, post, join, invite, auth.test
//! - **Signing** (`signature`) - verifies `X-Slack-Signature` on inbound requests
//! - **Events** (`events`) - Events API / slash command parsing and the trigger handlers
//! - **Commands** (`commands`) - slash command form payload
//!
//! ```text
//! Slack HTTP delivery -> verify -> parse -> EventDispatcher -> trigger -> WorkflowRunner
//!                                                                            |
//!                                                    SlackWebClient <--------+
//! ```

pub mod commands;
pub mod events;
pub mod signature;
pub mod web;

pub use events::{default_dispatcher, EventDispatcher, JoinTriggerSettings};
pub use signature::SignatureVerifier;
pub use web::SlackWebClient;

use thiserror::Error;

/// Failure reported by the chat platform or the transport in front of it.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("chat platform transport failure: {0}")]
    Transport(String),
    #[error("chat platform call `{method}` failed: {code}")]
    Api { method: String, code: String },
    #[error("chat platform response could not be decoded: {0}")]
    Decode(String),
}

impl PlatformError {
    pub fn api(method: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Api { method: method.into(), code: code.into() }
    }

    /// Platform error code (`already_in_channel`, `channel_not_found`, ...) when the
    /// platform answered with one; transport and decode failures have none.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code.as_str()),
            Self::Transport(_) | Self::Decode(_) => None,
        }
    }

    /// Short label used in logs and invite reports.
    pub fn label(&self) -> String {
        match self {
            Self::Api { code, .. } => code.clone(),
            Self::Transport(message) | Self::Decode(message) => message.clone(),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CrmError {
    #[error("crm transport failure: {0}")]
    Transport(String),
    #[error("crm responded with status {status}")]
    Status { status: u16 },
    #[error("crm response could not be decoded: {0}")]
    Decode(String),
}

/// Failures that abort a start workflow run. Everything else degrades in place.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("could not load channel `{channel_id}`: {source}")]
    ChannelLookup {
        channel_id: String,
        #[source]
        source: PlatformError,
    },
    #[error("could not post to channel `{channel}`: {source}")]
    PostMessage {
        channel: String,
        #[source]
        source: PlatformError,
    },
}

impl WorkflowError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::ChannelLookup { .. } => "channel_lookup",
            Self::PostMessage { .. } => "post_message",
        }
    }
}

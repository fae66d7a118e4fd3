//! Job numbers and the deal ids encoded in channel names.

use std::fmt;

const DEAL_MARKER: &[u8] = b"deal";

/// Job number used when a channel name carries no deal id.
pub const UNKNOWN_JOB_NUMBER: &str = "UNKNOWN";

/// Returns the digit run of the first `deal<digits>` occurrence, ignoring case.
///
/// `"Danica-DEAL107"` yields `Some("107")`; `"dealer-notes"` yields `None`.
pub fn extract_deal_id(channel_name: &str) -> Option<&str> {
    let bytes = channel_name.as_bytes();
    let mut start = 0;

    while start + DEAL_MARKER.len() <= bytes.len() {
        let marker_end = start + DEAL_MARKER.len();
        if bytes[start..marker_end].eq_ignore_ascii_case(DEAL_MARKER) {
            let digits = bytes[marker_end..].iter().take_while(|byte| byte.is_ascii_digit()).count();
            if digits > 0 {
                return Some(&channel_name[marker_end..marker_end + digits]);
            }
        }
        start += 1;
    }

    None
}

/// True when the name contains `deal` in any case, with or without digits.
pub fn mentions_deal(name: &str) -> bool {
    name.to_ascii_lowercase().contains("deal")
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JobNumber(String);

impl JobNumber {
    /// Job number for a channel: the channel name itself when it encodes a deal id,
    /// `UNKNOWN` otherwise.
    pub fn from_channel_name(channel_name: &str) -> Self {
        if extract_deal_id(channel_name).is_some() {
            Self(channel_name.to_owned())
        } else {
            Self::unknown()
        }
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn unknown() -> Self {
        Self(UNKNOWN_JOB_NUMBER.to_owned())
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_JOB_NUMBER
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Destination channel for webhook relays.
    pub fn channel_name(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for JobNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

use std::collections::HashMap;

use crate::events::EnvelopeError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub command: String,
    pub text: String,
    pub channel_id: String,
    pub user_id: String,
    pub trigger_id: String,
}

impl SlashCommandPayload {
    /// Decodes the `application/x-www-form-urlencoded` body Slack posts for a command.
    pub fn from_form(body: &[u8]) -> Result<Self, EnvelopeError> {
        let fields: HashMap<String, String> = form_urlencoded::parse(body).into_owned().collect();
        let required = |name: &'static str| {
            fields
                .get(name)
                .filter(|value| !value.trim().is_empty())
                .cloned()
                .ok_or(EnvelopeError::MissingField(name))
        };

        Ok(Self {
            command: required("command")?,
            channel_id: required("channel_id")?,
            text: fields.get("text").cloned().unwrap_or_default(),
            user_id: fields.get("user_id").cloned().unwrap_or_default(),
            trigger_id: fields.get("trigger_id").cloned().unwrap_or_default(),
        })
    }

    pub fn is_command(&self, name: &str) -> bool {
        self.command.trim().eq_ignore_ascii_case(name.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::SlashCommandPayload;
    use crate::events::EnvelopeError;

    #[test]
    fn decodes_slack_command_form() {
        let body = b"token=t&team_id=T1&channel_id=C123&channel_name=deal107&user_id=U9&command=%2Fstart&text=&trigger_id=398738663015.47445629121";

        let payload = SlashCommandPayload::from_form(body).expect("payload");

        assert_eq!(payload.command, "/start");
        assert_eq!(payload.channel_id, "C123");
        assert_eq!(payload.user_id, "U9");
        assert_eq!(payload.trigger_id, "398738663015.47445629121");
        assert!(payload.is_command("/start"));
        assert!(!payload.is_command("/quote"));
    }

    #[test]
    fn missing_channel_is_rejected() {
        let error = SlashCommandPayload::from_form(b"command=%2Fstart&text=").expect_err("no channel");
        assert_eq!(error, EnvelopeError::MissingField("channel_id"));
    }
}

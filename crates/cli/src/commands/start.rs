use std::sync::Arc;

use jobwire_core::config::{AppConfig, LoadOptions};
use jobwire_core::workflow::{InviteReport, WorkflowOutcome, WorkflowRunner, WorkflowSettings};
use jobwire_server::PipedriveClient;
use jobwire_slack::SlackWebClient;
use serde_json::{json, Value};

use crate::commands::{CommandResult, EXIT_RUNTIME};

const COMMAND: &str = "start";

/// Manual run of the start workflow. Unlike the join trigger, this never consults the dedup guard.
pub fn run(channel_id: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::config_failure(COMMAND, error),
    };

    let deals = match PipedriveClient::from_config(&config.crm, &config.workflow) {
        Ok(deals) => deals,
        Err(error) => {
            return CommandResult::failure(COMMAND, "crm_client", error.to_string(), EXIT_RUNTIME);
        }
    };
    let runner = WorkflowRunner::new(
        Arc::new(SlackWebClient::from_config(&config.slack)),
        Arc::new(deals),
        WorkflowSettings::from(&config.workflow),
    );

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            );
        }
    };

    match runtime.block_on(runner.run(channel_id)) {
        Ok(outcome) => CommandResult::success_with_details(
            COMMAND,
            format!("initial form posted to {} for {}", outcome.channel_id, outcome.job_number),
            Some(outcome_details(&outcome)),
        ),
        Err(error) => {
            CommandResult::failure(COMMAND, error.error_class(), error.to_string(), EXIT_RUNTIME)
        }
    }
}

fn outcome_details(outcome: &WorkflowOutcome) -> Value {
    let invites = match &outcome.invites {
        InviteReport::Skipped => json!({ "status": "skipped" }),
        InviteReport::Invited(user_ids) => json!({ "status": "invited", "users": user_ids }),
        InviteReport::Benign(code) => json!({ "status": "benign", "code": code }),
        InviteReport::Failed(code) => json!({ "status": "failed", "code": code }),
    };
    json!({
        "channel_id": outcome.channel_id,
        "job_number": outcome.job_number.to_string(),
        "deal_id": outcome.deal_id,
        "customer_name": outcome.deal.customer_name,
        "estimator": outcome.deal.estimator,
        "invites": invites,
    })
}

#[cfg(test)]
mod tests {
    use jobwire_core::deal::DealSummary;
    use jobwire_core::job::JobNumber;
    use jobwire_core::workflow::{InviteReport, WorkflowOutcome};

    use super::outcome_details;

    #[test]
    fn details_describe_invites_and_deal() {
        let outcome = WorkflowOutcome {
            channel_id: "C1".to_string(),
            job_number: JobNumber::from_channel_name("danica-deal107"),
            deal_id: Some("107".to_string()),
            deal: DealSummary { customer_name: "Danica".to_string(), estimator: Some("Kim".to_string()) },
            invites: InviteReport::Invited(vec!["U1".to_string(), "U2".to_string()]),
        };

        let details = outcome_details(&outcome);

        assert_eq!(details["job_number"], "danica-deal107");
        assert_eq!(details["deal_id"], "107");
        assert_eq!(details["customer_name"], "Danica");
        assert_eq!(details["estimator"], "Kim");
        assert_eq!(details["invites"]["status"], "invited");
        assert_eq!(details["invites"]["users"][1], "U2");
    }

    #[test]
    fn benign_invite_keeps_its_code() {
        let outcome = WorkflowOutcome {
            channel_id: "C1".to_string(),
            job_number: JobNumber::unknown(),
            deal_id: None,
            deal: DealSummary::default(),
            invites: InviteReport::Benign("already_in_channel".to_string()),
        };

        let details = outcome_details(&outcome);

        assert!(details["deal_id"].is_null());
        assert_eq!(details["customer_name"], "Customer");
        assert_eq!(details["invites"]["code"], "already_in_channel");
    }
}

use jobwire_core::config::{AppConfig, LoadOptions};
use jobwire_slack::SlackWebClient;
use serde::Serialize;

use crate::commands::{escape_json, CommandResult, EXIT_CONFIG, EXIT_OK, EXIT_RUNTIME};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because configuration did not load".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

impl DoctorReport {
    fn exit_code(&self) -> u8 {
        let failed = |name: &str| {
            self.checks.iter().any(|check| check.name == name && check.status == CheckStatus::Fail)
        };
        if failed("config_validation") {
            EXIT_CONFIG
        } else if self.overall_status == CheckStatus::Fail {
            EXIT_RUNTIME
        } else {
            EXIT_OK
        }
    }
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = report.exit_code();

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_slack_auth(&config));
            checks.push(check_crm_settings(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck::skipped("slack_auth"));
            checks.push(DoctorCheck::skipped("crm_settings"));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_slack_auth(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "slack_auth",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let client = SlackWebClient::from_config(&config.slack);
    match runtime.block_on(client.auth_test()) {
        Ok(identity) => DoctorCheck {
            name: "slack_auth",
            status: CheckStatus::Pass,
            details: format!(
                "bot token accepted for user `{}` in team `{}`",
                identity.user_id,
                identity.team.as_deref().unwrap_or("unknown")
            ),
        },
        Err(error) => DoctorCheck {
            name: "slack_auth",
            status: CheckStatus::Fail,
            details: format!("auth.test failed: {error}"),
        },
    }
}

/// The CRM has no side-effect-free ping, so only the configured endpoint is reported.
fn check_crm_settings(config: &AppConfig) -> DoctorCheck {
    DoctorCheck {
        name: "crm_settings",
        status: CheckStatus::Pass,
        details: format!(
            "deals read from `{}` with a {}s timeout, estimator field `{}`",
            config.crm.base_url, config.crm.timeout_secs, config.workflow.estimator_field_key
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::{render_human, CheckStatus, DoctorCheck, DoctorReport};
    use crate::commands::{EXIT_CONFIG, EXIT_OK, EXIT_RUNTIME};

    fn report(checks: Vec<DoctorCheck>) -> DoctorReport {
        let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
        DoctorReport {
            overall_status: if all_pass { CheckStatus::Pass } else { CheckStatus::Fail },
            summary: "summary".to_string(),
            checks,
        }
    }

    fn check(name: &'static str, status: CheckStatus) -> DoctorCheck {
        DoctorCheck { name, status, details: "details".to_string() }
    }

    #[test]
    fn exit_code_separates_config_from_runtime_failures() {
        let config_failed = report(vec![
            check("config_validation", CheckStatus::Fail),
            DoctorCheck::skipped("slack_auth"),
        ]);
        let auth_failed = report(vec![
            check("config_validation", CheckStatus::Pass),
            check("slack_auth", CheckStatus::Fail),
        ]);
        let healthy = report(vec![
            check("config_validation", CheckStatus::Pass),
            check("slack_auth", CheckStatus::Pass),
        ]);

        assert_eq!(config_failed.exit_code(), EXIT_CONFIG);
        assert_eq!(auth_failed.exit_code(), EXIT_RUNTIME);
        assert_eq!(healthy.exit_code(), EXIT_OK);
    }

    #[test]
    fn human_output_marks_each_check() {
        let rendered = render_human(&report(vec![
            check("config_validation", CheckStatus::Pass),
            DoctorCheck::skipped("crm_settings"),
        ]));

        assert!(rendered.contains("- [ok] config_validation: details"));
        assert!(rendered.contains("- [skip] crm_settings"));
    }
}

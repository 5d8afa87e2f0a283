use std::fs;
use std::path::Path;

use secrecy::ExposeSecret;
use serde::Serialize;
use signoff_core::config::{AppConfig, LoadOptions};
use signoff_core::destinations::DestinationStore;

use super::CommandResult;

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

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

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
            checks.push(check_slack_tokens(&config));
            checks.push(check_destination_store(&config));
            checks.push(check_data_directory(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["slack_token_readiness", "destination_store", "data_directory_writable"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
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

fn check_slack_tokens(config: &AppConfig) -> DoctorCheck {
    let problems = token_problems(
        config.slack.app_token.expose_secret(),
        config.slack.bot_token.expose_secret(),
    );
    if problems.is_empty() {
        DoctorCheck {
            name: "slack_token_readiness",
            status: CheckStatus::Pass,
            details: "app token is `xapp-` and bot token is `xoxb-`".to_string(),
        }
    } else {
        DoctorCheck {
            name: "slack_token_readiness",
            status: CheckStatus::Fail,
            details: problems.join("; "),
        }
    }
}

fn token_problems(app_token: &str, bot_token: &str) -> Vec<&'static str> {
    let mut problems = Vec::new();
    if app_token.trim().is_empty() {
        problems.push("app token is empty");
    } else if !app_token.starts_with("xapp-") {
        problems.push("app token does not start with `xapp-`");
    }
    if bot_token.trim().is_empty() {
        problems.push("bot token is empty");
    } else if !bot_token.starts_with("xoxb-") {
        problems.push("bot token does not start with `xoxb-`");
    }
    problems
}

fn check_data_directory(config: &AppConfig) -> DoctorCheck {
    let dir = match config.audit.destinations_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    match scratch_write(&dir) {
        Ok(()) => DoctorCheck {
            name: "data_directory_writable",
            status: CheckStatus::Pass,
            details: format!("`{}` accepts writes", dir.display()),
        },
        Err(error) => DoctorCheck {
            name: "data_directory_writable",
            status: CheckStatus::Fail,
            details: format!("cannot write to `{}`: {error}", dir.display()),
        },
    }
}

// Writes and removes a scratch file so the check exercises real permissions
// instead of inspecting metadata.
fn scratch_write(dir: &Path) -> std::io::Result<()> {
    let scratch = dir.join(format!(".signoff-doctor-{}", std::process::id()));
    fs::write(&scratch, b"signoff doctor")?;
    fs::remove_file(&scratch)
}

fn check_destination_store(config: &AppConfig) -> DoctorCheck {
    match DestinationStore::open(&config.audit.destinations_path) {
        Ok(store) => DoctorCheck {
            name: "destination_store",
            status: CheckStatus::Pass,
            details: format!(
                "{} logging destination(s) readable at `{}`",
                store.len(),
                store.path().display()
            ),
        },
        Err(error) => DoctorCheck {
            name: "destination_store",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
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

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

use claimdesk_core::config::{AppConfig, LoadOptions};
use claimdesk_db::{connect_from_config, migrations};
use serde::Serialize;

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

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
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
            checks.push(check_notifications(&config));
            checks.push(check_document_output(&config));
            checks.push(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["notification_readiness", "document_output", "database_schema"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_notifications(config: &AppConfig) -> DoctorCheck {
    let notifications = &config.notifications;
    let (status, details) = match (notifications.enabled, notifications.endpoint.as_deref()) {
        (false, _) => (CheckStatus::Skipped, "notifications disabled".to_string()),
        (true, Some(endpoint)) => {
            (CheckStatus::Pass, format!("webhook notifications will post to `{endpoint}`"))
        }
        (true, None) => {
            (CheckStatus::Fail, "notifications enabled without an endpoint".to_string())
        }
    };
    DoctorCheck { name: "notification_readiness", status, details }
}

fn check_document_output(config: &AppConfig) -> DoctorCheck {
    let Some(dir) = config.documents.output_dir.as_ref() else {
        return DoctorCheck {
            name: "document_output",
            status: CheckStatus::Skipped,
            details: "no output directory configured; approval forms are not rendered".to_string(),
        };
    };

    match std::fs::metadata(dir) {
        Ok(metadata) if metadata.is_dir() && !metadata.permissions().readonly() => DoctorCheck {
            name: "document_output",
            status: CheckStatus::Pass,
            details: format!("approval forms will be written to `{}`", dir.display()),
        },
        Ok(_) => DoctorCheck {
            name: "document_output",
            status: CheckStatus::Fail,
            details: format!("`{}` is not a writable directory", dir.display()),
        },
        // Created on the first render.
        Err(_) => DoctorCheck {
            name: "document_output",
            status: CheckStatus::Pass,
            details: format!("`{}` will be created on first render", dir.display()),
        },
    }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_schema",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;

        let present = migrations::request_table_present(&pool).await;
        pool.close().await;
        present.map_err(|error| format!("failed to inspect schema: {error}"))
    });

    match result {
        Ok(true) => DoctorCheck {
            name: "database_schema",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`; request table present", config.database.url),
        },
        Ok(false) => DoctorCheck {
            name: "database_schema",
            status: CheckStatus::Fail,
            details: "connected, but the request table is missing; run `claimdesk migrate`"
                .to_string(),
        },
        Err(error) => {
            DoctorCheck { name: "database_schema", status: CheckStatus::Fail, details: error }
        }
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

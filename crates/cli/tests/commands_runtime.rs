use std::env;
use std::sync::{Mutex, OnceLock};

use claimdesk_cli::commands::split::SplitBasis;
use claimdesk_cli::commands::act::ActArgs;
use claimdesk_cli::commands::{act, doctor, migrate, queue, seed, split, usage};
use rust_decimal::Decimal;
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("CLAIMDESK_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("CLAIMDESK_DATABASE_URL", "postgres://localhost/claims")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_returns_deterministic_request_summary() {
    with_env(&[("CLAIMDESK_DATABASE_URL", "sqlite::memory:")], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected deterministic seed success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains("  - seed-wedding-001 [pending_manager]"));
        assert!(message.contains("  - seed-training-001 [pending_hr]"));
        assert!(message.contains("  - seed-funeral-001 [rejected_hr]"));
    });
}

#[test]
fn seed_is_idempotent_across_runs_on_a_file_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = file_url(&dir);

    with_env(&[("CLAIMDESK_DATABASE_URL", url.as_str())], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");

        assert_eq!(
            parse_payload(&first.output)["message"],
            parse_payload(&second.output)["message"]
        );
    });
}

#[test]
fn usage_reports_seeded_childbirth_history() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = file_url(&dir);

    with_env(&[("CLAIMDESK_DATABASE_URL", url.as_str())], || {
        assert_eq!(seed::run().exit_code, 0);

        let result = usage::run("E-100", "childbirth");
        assert_eq!(result.exit_code, 0, "{}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["benefit"], "childbirth");
        assert_eq!(payload["data"]["total"], 2);
        assert_eq!(payload["data"]["remaining"], 1);

        // The only funeral claim on file was rejected, so nothing is used.
        let funeral = parse_payload(&usage::run("E-200", "funeral").output);
        assert_eq!(funeral["data"]["used_types"], serde_json::json!([]));
        assert_eq!(
            funeral["data"]["available_types"],
            serde_json::json!(["employee_spouse", "child", "parent"])
        );
    });
}

#[test]
fn usage_rejects_unknown_benefits() {
    let result = usage::run("E-100", "vacation");
    assert_eq!(result.exit_code, 2);
    let payload = parse_payload(&result.output);
    assert_eq!(payload["error_class"], "invalid_input");
}

#[test]
fn queue_lists_manager_pending_requests() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = file_url(&dir);

    with_env(&[("CLAIMDESK_DATABASE_URL", url.as_str())], || {
        assert_eq!(seed::run().exit_code, 0);

        let result = queue::run(&queue::QueueArgs {
            role: "manager".to_string(),
            approver_id: "M-10".to_string(),
            tab: "pending:manager".to_string(),
            team_member_ids: Vec::new(),
            partition: None,
        });
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        let ids: Vec<&str> = payload["data"]
            .as_array()
            .map(|rows| rows.iter().filter_map(|row| row["id"].as_str()).collect())
            .unwrap_or_default();
        assert_eq!(ids, vec!["seed-wedding-001"]);
    });
}

#[test]
fn queue_refuses_tabs_outside_the_role() {
    with_env(&[("CLAIMDESK_DATABASE_URL", "sqlite::memory:")], || {
        let result = queue::run(&queue::QueueArgs {
            role: "hr".to_string(),
            approver_id: "H-1".to_string(),
            tab: "pending:accounting".to_string(),
            team_member_ids: Vec::new(),
            partition: None,
        });
        assert_eq!(result.exit_code, 2);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "scope");
    });
}

#[test]
fn split_uses_configured_training_ceiling() {
    with_env(&[("CLAIMDESK_WORKFLOW_TRAINING_BUDGET_CEILING", "10000")], || {
        let result = split::run(
            SplitBasis::Amount(Decimal::new(12_000, 0)),
            "partial",
            Some(Decimal::new(500, 0)),
        );
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["excess"], "2000");
        assert_eq!(payload["data"]["company_payment"], "1500");
        assert_eq!(payload["data"]["employee_payment"], "500");
    });
}

#[test]
fn split_rejects_waiver_above_employee_share() {
    let result = split::run(
        SplitBasis::Excess(Decimal::new(2_000, 0)),
        "partial",
        Some(Decimal::new(1_500, 0)),
    );
    assert_eq!(result.exit_code, 2);
    let payload = parse_payload(&result.output);
    assert_eq!(payload["error_class"], "invalid_input");
}

#[test]
fn doctor_json_reports_missing_schema_then_passes_after_migrate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = file_url(&dir);

    with_env(&[("CLAIMDESK_DATABASE_URL", url.as_str())], || {
        let before: Value = serde_json::from_str(&doctor::run(true)).expect("doctor json");
        assert_eq!(before["overall_status"], "fail");

        assert_eq!(migrate::run().exit_code, 0);

        let after: Value = serde_json::from_str(&doctor::run(true)).expect("doctor json");
        assert_eq!(after["overall_status"], "pass", "{after}");
        let names: Vec<&str> = after["checks"]
            .as_array()
            .map(|checks| checks.iter().filter_map(|check| check["name"].as_str()).collect())
            .unwrap_or_default();
        assert_eq!(
            names,
            vec![
                "config_validation",
                "notification_readiness",
                "document_output",
                "database_schema"
            ]
        );
    });
}

#[test]
fn act_approves_and_renders_the_approval_form() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = file_url(&dir);
    let forms = dir.path().join("forms");
    let signature = dir.path().join("m10.txt");
    std::fs::write(&signature, "data:image/png;base64,TTEw").expect("write signature");
    let forms_dir = forms.display().to_string();

    with_env(
        &[
            ("CLAIMDESK_DATABASE_URL", url.as_str()),
            ("CLAIMDESK_DOCUMENTS_OUTPUT_DIR", forms_dir.as_str()),
        ],
        || {
            assert_eq!(seed::run().exit_code, 0);

            let mut args = act_args("seed-wedding-001", "M-10", "manager", "approve");
            args.signature_file = Some(signature.clone());
            let result = act::run(&args);
            assert_eq!(result.exit_code, 0, "{}", result.output);

            let payload = parse_payload(&result.output);
            assert_eq!(payload["data"]["from"], "pending_manager");
            assert_eq!(payload["data"]["to"], "pending_hr");
            assert_eq!(payload["data"]["version"], 2);
            assert!(forms.join("seed-wedding-001.html").exists());

            // The request has moved on; a second manager approval is refused.
            let again = act::run(&args);
            assert_eq!(again.exit_code, 2, "{}", again.output);
            assert_eq!(parse_payload(&again.output)["error_class"], "transition_refused");
        },
    );
}

#[test]
fn act_reports_unknown_requests() {
    with_env(&[("CLAIMDESK_DATABASE_URL", "sqlite::memory:")], || {
        let result = act::run(&act_args("REQ-missing", "H-1", "hr", "reject"));
        assert_eq!(result.exit_code, 4);
        assert_eq!(parse_payload(&result.output)["error_class"], "not_found");
    });
}

fn act_args(request_id: &str, actor_id: &str, role: &str, decision: &str) -> ActArgs {
    ActArgs {
        request_id: request_id.to_string(),
        actor_id: actor_id.to_string(),
        actor_name: None,
        position: None,
        role: role.to_string(),
        decision: decision.to_string(),
        comment: None,
        signature_file: None,
        waiver_mode: None,
        waiver_amount: None,
    }
}

fn file_url(dir: &tempfile::TempDir) -> String {
    format!("sqlite://{}", dir.path().join("claimdesk.db").display())
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "CLAIMDESK_DATABASE_URL",
        "CLAIMDESK_DATABASE_MAX_CONNECTIONS",
        "CLAIMDESK_DATABASE_TIMEOUT_SECS",
        "CLAIMDESK_WORKFLOW_TRAINING_BUDGET_CEILING",
        "CLAIMDESK_WORKFLOW_SPECIAL_APPROVAL_THRESHOLD",
        "CLAIMDESK_WORKFLOW_SPECIAL_APPROVAL_DESTINATION",
        "CLAIMDESK_WORKFLOW_DUPLICATE_WINDOW_SECS",
        "CLAIMDESK_WORKFLOW_REFRESH_DEBOUNCE_MS",
        "CLAIMDESK_NOTIFICATIONS_ENABLED",
        "CLAIMDESK_NOTIFICATIONS_ENDPOINT",
        "CLAIMDESK_NOTIFICATIONS_CHANNEL_TOKEN",
        "CLAIMDESK_NOTIFICATIONS_TIMEOUT_SECS",
        "CLAIMDESK_DOCUMENTS_OUTPUT_DIR",
        "CLAIMDESK_LOGGING_LEVEL",
        "CLAIMDESK_LOGGING_FORMAT",
        "CLAIMDESK_LOG_LEVEL",
        "CLAIMDESK_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;

use claimdesk_core::approvals::{ApprovalError, ApprovalService};
use claimdesk_core::audit::{AuditContext, TracingAuditSink};
use claimdesk_core::delivery::effect_dispatcher;
use claimdesk_core::domain::action::{Actor, ApprovalAction, Decision, Role};
use claimdesk_core::domain::request::{RequestId, RequestStatus, SignatureImage};
use claimdesk_core::errors::{ApplicationError, InterfaceError};
use claimdesk_core::flows::ApprovalStateMachine;
use claimdesk_core::waiver::{WaiverMode, WaiverSelection};
use claimdesk_db::SqlRequestRepository;

use crate::commands::{to_data, with_migrated_pool, CommandResult, Failure};

#[derive(Clone, Debug)]
pub struct ActArgs {
    pub request_id: String,
    pub actor_id: String,
    pub actor_name: Option<String>,
    pub position: Option<String>,
    pub role: String,
    pub decision: String,
    pub comment: Option<String>,
    pub signature_file: Option<PathBuf>,
    pub waiver_mode: Option<String>,
    pub waiver_amount: Option<Decimal>,
}

#[derive(Debug, Serialize)]
struct ActReport {
    request_id: String,
    from: RequestStatus,
    to: RequestStatus,
    version: u32,
}

pub fn run(args: &ActArgs) -> CommandResult {
    let (actor, action) = match build_action(args) {
        Ok(parts) => parts,
        Err(message) => return CommandResult::failure("act", "invalid_input", message, 2),
    };
    let target = RequestId(args.request_id.trim().to_string());
    let result = with_migrated_pool("act", |config, pool| async move {
        let effects = effect_dispatcher(&config)
            .map_err(|error| ("effects_config", error.to_string(), 2u8))?;
        let service = ApprovalService::new(
            Arc::new(SqlRequestRepository::new(pool)),
            ApprovalStateMachine::new(config.workflow.rules()),
            effects,
            Arc::new(TracingAuditSink),
        );
        let correlation_id = format!("cli-act-{}", target.0);
        let context = AuditContext::new(None, correlation_id.clone(), actor.id.clone());

        let receipt = service
            .act(&target, &actor, &action, &context)
            .await
            .map_err(|error| classify(error, &correlation_id))?;
        let from = receipt.from;
        let request = receipt.settle().await;
        Ok(ActReport {
            request_id: request.id.0.clone(),
            from,
            to: request.status,
            version: request.version,
        })
    });

    match result {
        Ok(report) => {
            let message = format!("{}: {} -> {}", report.request_id, report.from, report.to);
            CommandResult::success_with_data("act", message, to_data(&report))
        }
        Err(failure) => failure,
    }
}

fn classify(error: ApprovalError, correlation_id: &str) -> Failure {
    let interface = ApplicationError::from(error).into_interface(correlation_id);
    let message = interface.to_string();
    match interface {
        InterfaceError::BadRequest { .. } | InterfaceError::Forbidden { .. } => {
            ("transition_refused", message, 2)
        }
        InterfaceError::NotFound { .. } => ("not_found", message, 4),
        InterfaceError::Conflict { .. } => ("conflict", message, 7),
        InterfaceError::ServiceUnavailable { .. } => ("store", message, 4),
        InterfaceError::Internal { .. } => ("internal", message, 1),
    }
}

fn build_action(args: &ActArgs) -> Result<(Actor, ApprovalAction), String> {
    let role = Role::parse(&args.role).ok_or_else(|| format!("unknown role `{}`", args.role))?;
    let actor_id = args.actor_id.trim().to_string();
    if actor_id.is_empty() || args.request_id.trim().is_empty() {
        return Err("request id and actor id are required".to_string());
    }

    let decision = match args.decision.trim().to_ascii_lowercase().as_str() {
        "approve" => Decision::Approve,
        "reject" => Decision::Reject,
        "revise" | "request_revision" => Decision::RequestRevision,
        "resubmit" => Decision::Resubmit,
        other => {
            return Err(format!(
                "unknown decision `{other}`; expected approve, reject, revise or resubmit"
            ))
        }
    };

    let signature = match &args.signature_file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|error| format!("cannot read signature `{}`: {error}", path.display()))?;
            Some(SignatureImage(raw.trim().to_string()))
        }
        None => None,
    };

    let waiver = match args.waiver_mode.as_deref() {
        None => None,
        Some(mode) => {
            let mode = WaiverMode::parse(mode).ok_or_else(|| {
                format!("unknown waiver mode `{mode}`; expected none, full or partial")
            })?;
            Some(WaiverSelection { mode, amount: args.waiver_amount })
        }
    };

    let actor = Actor {
        name: args.actor_name.clone().unwrap_or_else(|| actor_id.clone()),
        position: args.position.clone().unwrap_or_default(),
        id: actor_id,
        role,
    };
    let action = ApprovalAction { decision, comment: args.comment.clone(), signature, waiver };
    Ok((actor, action))
}

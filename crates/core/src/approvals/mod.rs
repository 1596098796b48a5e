pub mod queue;

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::action::{Actor, ApprovalAction};
use crate::domain::request::{Request, RequestId, RequestStatus};
use crate::flows::effects::EffectDispatcher;
use crate::flows::engine::{ApprovalStateMachine, TransitionError};
use crate::store::{RequestStore, StoreError};

pub use queue::{
    ApprovalQueueController, BulkAction, BulkDecision, BulkItemFailure, BulkOutcome, CancelFlag,
    SignatureCapture, SignaturePrompt,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("request `{0}` not found")]
    NotFound(RequestId),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A committed action. `effect_tasks` are already running.
#[derive(Debug)]
pub struct ApprovalReceipt {
    pub request: Request,
    pub from: RequestStatus,
    pub effect_tasks: Vec<JoinHandle<()>>,
}

impl ApprovalReceipt {
    /// Waits for the spawned effects, which never fail the action.
    pub async fn settle(self) -> Request {
        for task in self.effect_tasks {
            let _ = task.await;
        }
        self.request
    }
}

/// Load, plan, persist, audit, then fire effects. Nothing is written when any step
/// before persistence fails.
pub struct ApprovalService {
    store: Arc<dyn RequestStore>,
    machine: ApprovalStateMachine,
    effects: EffectDispatcher,
    audit: Arc<dyn AuditSink>,
}

impl ApprovalService {
    pub fn new(
        store: Arc<dyn RequestStore>,
        machine: ApprovalStateMachine,
        effects: EffectDispatcher,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { store, machine, effects, audit }
    }

    pub fn machine(&self) -> &ApprovalStateMachine {
        &self.machine
    }

    pub async fn act(
        &self,
        request_id: &RequestId,
        actor: &Actor,
        action: &ApprovalAction,
        context: &AuditContext,
    ) -> Result<ApprovalReceipt, ApprovalError> {
        let context = context.for_request(request_id.clone());
        let Some(current) = self.store.find_by_id(request_id).await? else {
            warn!(
                event_name = "approval.request_missing",
                request_id = %request_id,
                correlation_id = %context.correlation_id,
                "approval target not found"
            );
            return Err(ApprovalError::NotFound(request_id.clone()));
        };

        let outcome = match self.machine.decide_with_audit(
            &current,
            actor,
            action,
            Utc::now(),
            self.audit.as_ref(),
            &context,
        ) {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(
                    event_name = "approval.transition_refused",
                    request_id = %request_id,
                    correlation_id = %context.correlation_id,
                    actor_id = %actor.id,
                    status = current.status.as_str(),
                    decision = action.decision.as_str(),
                    error = %error,
                    "approval action refused"
                );
                return Err(error.into());
            }
        };

        let stored = match self.store.save_transition(&outcome.request, current.version).await {
            Ok(stored) => stored,
            Err(error) => {
                self.audit.emit(
                    AuditEvent::new(
                        &context,
                        "approval.transition_failed",
                        AuditCategory::Persistence,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("error", error.to_string()),
                );
                warn!(
                    event_name = "approval.transition_failed",
                    request_id = %request_id,
                    correlation_id = %context.correlation_id,
                    error = %error,
                    "approval transition was not persisted"
                );
                return Err(error.into());
            }
        };

        self.audit.emit(
            AuditEvent::new(
                &context,
                "approval.transition_committed",
                AuditCategory::Approval,
                AuditOutcome::Success,
            )
            .with_metadata("from", outcome.from.as_str())
            .with_metadata("to", outcome.to.as_str())
            .with_metadata("decision", outcome.decision.as_str())
            .with_metadata("version", stored.version.to_string()),
        );
        info!(
            event_name = "approval.transition_committed",
            request_id = %request_id,
            correlation_id = %context.correlation_id,
            actor_id = %actor.id,
            from = outcome.from.as_str(),
            to = outcome.to.as_str(),
            "approval transition committed"
        );

        let effect_tasks = self.effects.dispatch(outcome.effects, &context.correlation_id);
        Ok(ApprovalReceipt { request: stored, from: outcome.from, effect_tasks })
    }
}

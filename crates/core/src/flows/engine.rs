use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::action::{Actor, ApprovalAction, Decision, Role};
use crate::domain::request::{Request, RequestId, RequestStatus, RequestType, Stage, StageStamp};
use crate::flows::states::{
    DocumentRequest, Effect, NotificationRequest, SpecialApprovalDestination, TransitionOutcome,
};
use crate::waiver::{WaiverCalculator, WaiverError, WaiverSelection};

/// Tunables the transition table depends on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowRules {
    pub training_budget_ceiling: Decimal,
    /// HR approval of a training request strictly above this goes to the committee.
    pub special_approval_threshold: Decimal,
    pub special_approval_destination: SpecialApprovalDestination,
}

impl Default for WorkflowRules {
    fn default() -> Self {
        Self {
            training_budget_ceiling: Decimal::new(10_000, 0),
            special_approval_threshold: Decimal::new(10_000, 0),
            special_approval_destination: SpecialApprovalDestination::PendingAccounting,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionErrorKind {
    Validation,
    Authorization,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("request in status `{status}` is not awaiting a {decision} decision")]
    NotActionable { status: RequestStatus, decision: Decision },
    #[error("role `{role}` cannot {decision} a request in status `{status}`")]
    RoleNotPermitted { role: Role, status: RequestStatus, decision: Decision },
    #[error("`{actor_id}` is not the {stage} approver assigned to request `{request_id}`")]
    NotAssignedApprover { actor_id: String, stage: Stage, request_id: RequestId },
    #[error("only the requester may resubmit request `{request_id}`")]
    NotRequester { actor_id: String, request_id: RequestId },
    #[error("the {stage} stage does not accept revision requests")]
    RevisionNotAllowed { stage: Stage },
    #[error("a comment is required to {decision}")]
    MissingComment { decision: Decision },
    #[error("a signature is required to approve at the {stage} stage")]
    MissingSignature { stage: Stage },
    #[error("a waiver only applies to a manager approving a training request with excess")]
    WaiverNotApplicable,
    #[error(transparent)]
    Waiver(#[from] WaiverError),
}

impl TransitionError {
    pub fn kind(&self) -> TransitionErrorKind {
        match self {
            Self::NotActionable { .. }
            | Self::RoleNotPermitted { .. }
            | Self::NotAssignedApprover { .. }
            | Self::NotRequester { .. } => TransitionErrorKind::Authorization,
            Self::RevisionNotAllowed { .. }
            | Self::MissingComment { .. }
            | Self::MissingSignature { .. }
            | Self::WaiverNotApplicable
            | Self::Waiver(_) => TransitionErrorKind::Validation,
        }
    }
}

/// Pure approval workflow. Every role view goes through the same table; callers persist
/// the returned request and run its effects.
#[derive(Clone, Debug, Default)]
pub struct ApprovalStateMachine {
    rules: WorkflowRules,
    waiver: WaiverCalculator,
}

impl ApprovalStateMachine {
    pub fn new(rules: WorkflowRules) -> Self {
        Self { rules, waiver: WaiverCalculator }
    }

    pub fn rules(&self) -> &WorkflowRules {
        &self.rules
    }

    /// Destination of an approver decision. Resubmission is not an approver decision and
    /// is resolved by [`ApprovalStateMachine::decide`].
    pub fn next_status(
        &self,
        current: RequestStatus,
        role: Role,
        request_type: RequestType,
        amount: Decimal,
        decision: Decision,
    ) -> Result<RequestStatus, TransitionError> {
        let Some(stage) = current.pending_stage() else {
            return Err(TransitionError::NotActionable { status: current, decision });
        };
        if decision == Decision::Resubmit || !role.can_act_at(stage) {
            return Err(TransitionError::RoleNotPermitted { role, status: current, decision });
        }

        match decision {
            Decision::Approve => Ok(self.after_approval(stage, request_type, amount)),
            Decision::Reject => Ok(stage.rejected_status()),
            Decision::RequestRevision if stage.allows_revision() => {
                Ok(RequestStatus::PendingRevision)
            }
            Decision::RequestRevision => Err(TransitionError::RevisionNotAllowed { stage }),
            Decision::Resubmit => {
                Err(TransitionError::RoleNotPermitted { role, status: current, decision })
            }
        }
    }

    fn after_approval(
        &self,
        stage: Stage,
        request_type: RequestType,
        amount: Decimal,
    ) -> RequestStatus {
        match stage {
            Stage::Executive => RequestStatus::PendingManager,
            Stage::Manager if request_type.is_accounting_routed() => {
                RequestStatus::PendingAccounting
            }
            Stage::Manager => RequestStatus::PendingHr,
            Stage::Hr
                if request_type.requires_special_approval_review()
                    && amount > self.rules.special_approval_threshold =>
            {
                RequestStatus::PendingSpecialApproval
            }
            Stage::Hr => RequestStatus::PendingAccounting,
            Stage::Accounting => RequestStatus::Completed,
            Stage::SpecialApproval => self.rules.special_approval_destination.status(),
        }
    }

    /// Plans `action` by `actor` on `request`. Authorization is checked before input
    /// validation; nothing is written.
    pub fn decide(
        &self,
        request: &Request,
        actor: &Actor,
        action: &ApprovalAction,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, TransitionError> {
        if action.decision == Decision::Resubmit {
            return self.resubmit(request, actor, action, now);
        }

        let from = request.status;
        let to = self.next_status(
            from,
            actor.role,
            request.request_type,
            request.amount,
            action.decision,
        )?;
        let Some(stage) = from.pending_stage() else {
            return Err(TransitionError::NotActionable { status: from, decision: action.decision });
        };
        ensure_assigned(request, actor, stage)?;

        let mut updated = request.clone();
        let (signature, note) = match action.decision {
            Decision::Approve => {
                let signature = action.signature.clone().filter(|image| !image.is_blank());
                if stage.requires_signature() && signature.is_none() {
                    return Err(TransitionError::MissingSignature { stage });
                }
                self.fold_waiver(&mut updated, stage, action.waiver.as_ref())?;
                (signature, action.comment_text().map(str::to_owned))
            }
            decision => {
                let Some(comment) = action.comment_text() else {
                    return Err(TransitionError::MissingComment { decision });
                };
                if action.waiver.is_some() {
                    return Err(TransitionError::WaiverNotApplicable);
                }
                (None, Some(comment.to_owned()))
            }
        };

        updated.stamps.insert(
            stage,
            StageStamp {
                approver_id: actor.id.clone(),
                approver_name: actor.name.clone(),
                approver_position: actor.position.clone(),
                decision: action.decision,
                decided_at: now,
                signature,
                note,
            },
        );
        updated.status = to;
        updated.updated_at = now;

        let effects = effects_for(&updated, from, to, now);
        Ok(TransitionOutcome {
            request_id: request.id.clone(),
            from,
            to,
            decision: action.decision,
            stage: Some(stage),
            request: updated,
            effects,
        })
    }

    pub fn decide_with_audit<S>(
        &self,
        request: &Request,
        actor: &Actor,
        action: &ApprovalAction,
        now: DateTime<Utc>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, TransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.decide(request, actor, action, now);
        let audit = audit.for_request(request.id.clone());
        match &result {
            Ok(outcome) => sink.emit(
                AuditEvent::new(
                    &audit,
                    "approval.transition_planned",
                    AuditCategory::Approval,
                    AuditOutcome::Success,
                )
                .with_metadata("from", outcome.from.as_str())
                .with_metadata("to", outcome.to.as_str())
                .with_metadata("decision", outcome.decision.as_str()),
            ),
            Err(error) => sink.emit(
                AuditEvent::new(
                    &audit,
                    "approval.transition_refused",
                    AuditCategory::Approval,
                    AuditOutcome::Rejected,
                )
                .with_metadata("status", request.status.as_str())
                .with_metadata("decision", action.decision.as_str())
                .with_metadata("error", error.to_string()),
            ),
        }
        result
    }

    fn resubmit(
        &self,
        request: &Request,
        actor: &Actor,
        action: &ApprovalAction,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, TransitionError> {
        let from = request.status;
        if from != RequestStatus::PendingRevision {
            return Err(TransitionError::NotActionable {
                status: from,
                decision: Decision::Resubmit,
            });
        }
        if actor.id != request.requester.employee_id {
            return Err(TransitionError::NotRequester {
                actor_id: actor.id.clone(),
                request_id: request.id.clone(),
            });
        }
        if action.waiver.is_some() {
            return Err(TransitionError::WaiverNotApplicable);
        }

        let mut updated = request.clone();
        let to = updated.initial_status();
        updated.stamps.clear();
        updated.payment_split = None;
        updated.waiver = None;
        if let Some(signature) = action.signature.clone().filter(|image| !image.is_blank()) {
            updated.requester_signature = Some(signature);
        }
        updated.revision_count = updated.revision_count.saturating_add(1);
        updated.status = to;
        updated.updated_at = now;

        let effects = effects_for(&updated, from, to, now);
        Ok(TransitionOutcome {
            request_id: request.id.clone(),
            from,
            to,
            decision: Decision::Resubmit,
            stage: None,
            request: updated,
            effects,
        })
    }

    fn fold_waiver(
        &self,
        request: &mut Request,
        stage: Stage,
        selection: Option<&WaiverSelection>,
    ) -> Result<(), TransitionError> {
        let applicable = stage == Stage::Manager
            && request.request_type.has_budget_ceiling()
            && request.excess_amount > Decimal::ZERO;
        if !applicable {
            return match selection {
                Some(_) => Err(TransitionError::WaiverNotApplicable),
                None => Ok(()),
            };
        }

        let selection = selection.cloned().unwrap_or_else(WaiverSelection::none);
        let split = self.waiver.apply(request.excess_amount, &selection)?;
        request.payment_split = Some(split);
        request.waiver = Some(selection);
        Ok(())
    }
}

fn ensure_assigned(request: &Request, actor: &Actor, stage: Stage) -> Result<(), TransitionError> {
    let assigned = match stage {
        Stage::Executive => request.executive_id.as_deref(),
        Stage::Manager => request.manager_id.as_deref(),
        Stage::Hr | Stage::Accounting | Stage::SpecialApproval => None,
    };
    match assigned {
        Some(approver_id) if approver_id != actor.id => Err(TransitionError::NotAssignedApprover {
            actor_id: actor.id.clone(),
            stage,
            request_id: request.id.clone(),
        }),
        _ => Ok(()),
    }
}

fn effects_for(
    request: &Request,
    from: RequestStatus,
    to: RequestStatus,
    now: DateTime<Utc>,
) -> Vec<Effect> {
    let mut effects = Vec::new();
    let contact = request.requester.contact.as_deref().map(str::trim).filter(|c| !c.is_empty());
    if let Some(contact) = contact {
        effects.push(Effect::Notify(NotificationRequest {
            request_id: request.id.clone(),
            contact: contact.to_owned(),
            request_type: request.request_type,
            status: to,
            amount: request.amount,
            requester_name: request.requester.name.clone(),
            occurred_at: now,
        }));
    }
    if from.is_signed_stage() || to.is_signed_stage() {
        effects.push(Effect::RenderDocument(DocumentRequest {
            signatures: request.signatures(),
            request: request.clone(),
        }));
    }
    effects
}

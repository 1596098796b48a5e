use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::approvals::{ApprovalError, ApprovalService};
use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::action::{Actor, ApprovalAction};
use crate::domain::request::{Request, RequestId, RequestStatus, SignatureImage};
use crate::store::RequestStore;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignaturePrompt {
    Captured(SignatureImage),
    Cancelled,
}

/// Asks the approver to sign for one queue item.
#[async_trait]
pub trait SignatureCapture: Send + Sync {
    async fn capture(&self, request: &Request, position: usize, total: usize) -> SignaturePrompt;
}

/// Stops a bulk run before its next item. An item already in flight still completes.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BulkDecision {
    Approve,
    Reject { comment: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BulkAction {
    /// Only items still in this status are acted on.
    pub expected_status: RequestStatus,
    pub decision: BulkDecision,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemFailure {
    pub request_id: RequestId,
    pub error: String,
}

impl BulkItemFailure {
    fn new(request_id: &RequestId, error: ApprovalError) -> Self {
        Self { request_id: request_id.clone(), error: error.to_string() }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub succeeded: Vec<RequestId>,
    pub failed: Vec<BulkItemFailure>,
    pub skipped: Vec<RequestId>,
    pub cancelled: bool,
    pub untouched: Vec<RequestId>,
}

impl BulkOutcome {
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

pub struct ApprovalQueueController {
    service: Arc<ApprovalService>,
    audit: Arc<dyn AuditSink>,
}

impl ApprovalQueueController {
    pub fn new(service: Arc<ApprovalService>, audit: Arc<dyn AuditSink>) -> Self {
        Self { service, audit }
    }

    /// Acts on `requests` one at a time, re-reading each item first. There is no rollback:
    /// a cancelled run keeps what it already advanced and reports the rest as untouched.
    pub async fn run_bulk(
        &self,
        requests: &[Request],
        actor: &Actor,
        action: &BulkAction,
        capture: &dyn SignatureCapture,
        cancel: &CancelFlag,
        context: &AuditContext,
    ) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        let total = requests.len();
        let needs_signature = action.decision == BulkDecision::Approve
            && action
                .expected_status
                .pending_stage()
                .map(|stage| stage.requires_signature())
                .unwrap_or(false);

        for (index, snapshot) in requests.iter().enumerate() {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                outcome.untouched = untouched_from(requests, index);
                break;
            }
            if snapshot.status != action.expected_status {
                outcome.skipped.push(snapshot.id.clone());
                continue;
            }

            // The list may be stale; only the stored status decides.
            let request = match self.service.store.find_by_id(&snapshot.id).await {
                Ok(Some(current)) if current.status == action.expected_status => current,
                Ok(Some(current)) => {
                    debug!(
                        event_name = "queue.item_moved",
                        request_id = %current.id,
                        correlation_id = %context.correlation_id,
                        status = current.status.as_str(),
                        "item left the queue before its turn"
                    );
                    outcome.skipped.push(current.id);
                    continue;
                }
                Ok(None) => {
                    let error = ApprovalError::NotFound(snapshot.id.clone());
                    outcome.failed.push(BulkItemFailure::new(&snapshot.id, error));
                    continue;
                }
                Err(error) => {
                    let error = ApprovalError::Store(error);
                    outcome.failed.push(BulkItemFailure::new(&snapshot.id, error));
                    continue;
                }
            };

            let item_action = match &action.decision {
                BulkDecision::Reject { comment } => ApprovalAction::reject(comment.clone()),
                BulkDecision::Approve if needs_signature => {
                    match capture.capture(&request, index + 1, total).await {
                        SignaturePrompt::Captured(signature) => {
                            ApprovalAction::approve(Some(signature))
                        }
                        SignaturePrompt::Cancelled => {
                            outcome.cancelled = true;
                            outcome.untouched = untouched_from(requests, index);
                            break;
                        }
                    }
                }
                BulkDecision::Approve => ApprovalAction::approve(None),
            };

            match self.service.act(&request.id, actor, &item_action, context).await {
                Ok(_) => outcome.succeeded.push(request.id),
                Err(error) => outcome.failed.push(BulkItemFailure::new(&request.id, error)),
            }
        }

        let audit_outcome =
            if outcome.failed.is_empty() { AuditOutcome::Success } else { AuditOutcome::Failed };
        self.audit.emit(
            AuditEvent::new(
                context,
                "queue.bulk_completed",
                AuditCategory::Queue,
                audit_outcome,
            )
            .with_metadata("expected_status", action.expected_status.as_str())
            .with_metadata("succeeded", outcome.succeeded_count().to_string())
            .with_metadata("failed", outcome.failed_count().to_string())
            .with_metadata("skipped", outcome.skipped_count().to_string())
            .with_metadata("cancelled", outcome.cancelled.to_string()),
        );
        info!(
            event_name = "queue.bulk_completed",
            correlation_id = %context.correlation_id,
            actor_id = %actor.id,
            expected_status = action.expected_status.as_str(),
            succeeded = outcome.succeeded_count(),
            failed = outcome.failed_count(),
            skipped = outcome.skipped_count(),
            cancelled = outcome.cancelled,
            "bulk approval run finished"
        );
        outcome
    }
}

fn untouched_from(requests: &[Request], index: usize) -> Vec<RequestId> {
    requests[index..].iter().map(|item| item.id.clone()).collect()
}

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::request::{
    ChildRecord, FuneralType, Request, RequestId, RequestStatus, RequestType, Requester,
    SignatureImage,
};
use crate::ledger::{BenefitLedger, LedgerViolation};
use crate::store::{RequestFilter, RequestStore, StoreError};
use crate::waiver::WaiverCalculator;

/// What an employee fills in before submitting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionDraft {
    pub request_type: RequestType,
    pub requester: Requester,
    pub title: Option<String>,
    pub amount: Decimal,
    pub children: Option<Vec<ChildRecord>>,
    pub funeral_type: Option<FuneralType>,
    pub executive_id: Option<String>,
    pub manager_id: Option<String>,
    pub requester_signature: Option<SignatureImage>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("amount must be greater than zero (got {0})")]
    NonPositiveAmount(Decimal),
    #[error("funeral requests must name a funeral benefit type")]
    MissingFuneralType,
    #[error(transparent)]
    Ledger(#[from] LedgerViolation),
    #[error("a matching request `{existing}` was submitted moments ago")]
    DuplicateSubmission { existing: RequestId },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionRules {
    pub training_budget_ceiling: Decimal,
    pub duplicate_window: Duration,
}

impl Default for SubmissionRules {
    fn default() -> Self {
        Self {
            training_budget_ceiling: Decimal::new(10_000, 0),
            duplicate_window: Duration::seconds(300),
        }
    }
}

/// Pure checks and construction; the service feeds it the employee's history.
#[derive(Clone, Debug, Default)]
pub struct SubmissionGuard {
    ledger: BenefitLedger,
    rules: SubmissionRules,
}

impl SubmissionGuard {
    pub fn new(ledger: BenefitLedger, rules: SubmissionRules) -> Self {
        Self { ledger, rules }
    }

    pub fn check(
        &self,
        draft: &SubmissionDraft,
        history: &[Request],
        now: DateTime<Utc>,
    ) -> Result<(), SubmissionError> {
        if draft.amount <= Decimal::ZERO {
            return Err(SubmissionError::NonPositiveAmount(draft.amount));
        }

        let employee_id = draft.requester.employee_id.as_str();
        match draft.request_type {
            RequestType::Childbirth => {
                let requested = match &draft.children {
                    Some(children) if !children.is_empty() => {
                        u32::try_from(children.len()).unwrap_or(u32::MAX)
                    }
                    _ => 1,
                };
                self.ledger.check_childbirth(employee_id, history, requested)?;
            }
            RequestType::Funeral => {
                let funeral_type = draft.funeral_type.ok_or(SubmissionError::MissingFuneralType)?;
                self.ledger.check_funeral(employee_id, history, funeral_type)?;
            }
            _ => {}
        }

        if let Some(existing) = self.find_duplicate(draft, history, now) {
            return Err(SubmissionError::DuplicateSubmission { existing: existing.id.clone() });
        }
        Ok(())
    }

    fn find_duplicate<'a>(
        &self,
        draft: &SubmissionDraft,
        history: &'a [Request],
        now: DateTime<Utc>,
    ) -> Option<&'a Request> {
        let title = draft.title.as_deref().map(normalize_title).filter(|title| !title.is_empty());
        history.iter().find(|request| {
            let age = now.signed_duration_since(request.created_at);
            request.requester.employee_id == draft.requester.employee_id
                && request.request_type == draft.request_type
                && !request.status.is_rejected()
                && age >= Duration::zero()
                && age < self.rules.duplicate_window
                && match &title {
                    Some(title) => {
                        request.title.as_deref().map(normalize_title).as_ref() == Some(title)
                    }
                    None => request.amount == draft.amount,
                }
        })
    }

    /// Builds the request as first stored: initial status, excess over the training
    /// ceiling, version 1.
    pub fn build(&self, draft: SubmissionDraft, now: DateTime<Utc>) -> Request {
        let excess_amount = if draft.request_type.has_budget_ceiling() {
            WaiverCalculator::excess_over_ceiling(draft.amount, self.rules.training_budget_ceiling)
        } else {
            Decimal::ZERO
        };
        let mut request = Request {
            id: RequestId::generate(),
            request_type: draft.request_type,
            status: RequestStatus::PendingManager,
            requester: draft.requester,
            title: draft
                .title
                .map(|title| title.trim().to_owned())
                .filter(|title| !title.is_empty()),
            amount: draft.amount,
            excess_amount,
            payment_split: None,
            waiver: None,
            children: draft.children,
            funeral_type: draft.funeral_type,
            executive_id: draft.executive_id,
            manager_id: draft.manager_id,
            requester_signature: draft.requester_signature,
            stamps: Default::default(),
            revision_count: 0,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        request.status = request.initial_status();
        request
    }
}

fn normalize_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

pub struct SubmissionService {
    store: Arc<dyn RequestStore>,
    guard: SubmissionGuard,
    audit: Arc<dyn AuditSink>,
}

impl SubmissionService {
    pub fn new(
        store: Arc<dyn RequestStore>,
        guard: SubmissionGuard,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { store, guard, audit }
    }

    pub async fn submit(
        &self,
        draft: SubmissionDraft,
        now: DateTime<Utc>,
        context: &AuditContext,
    ) -> Result<Request, SubmissionError> {
        let history = self
            .store
            .list(&RequestFilter::for_requester(draft.requester.employee_id.clone()))
            .await?;

        if let Err(error) = self.guard.check(&draft, &history, now) {
            self.audit.emit(
                AuditEvent::new(
                    context,
                    "submission.blocked",
                    AuditCategory::Submission,
                    AuditOutcome::Rejected,
                )
                .with_metadata("request_type", draft.request_type.as_str())
                .with_metadata("employee_id", draft.requester.employee_id.clone())
                .with_metadata("error", error.to_string()),
            );
            warn!(
                event_name = "submission.blocked",
                correlation_id = %context.correlation_id,
                employee_id = %draft.requester.employee_id,
                request_type = draft.request_type.as_str(),
                error = %error,
                "submission refused"
            );
            return Err(error);
        }

        let request = self.guard.build(draft, now);
        let stored = self.store.insert(&request).await?;
        let context = context.for_request(stored.id.clone());
        self.audit.emit(
            AuditEvent::new(
                &context,
                "submission.accepted",
                AuditCategory::Submission,
                AuditOutcome::Success,
            )
            .with_metadata("request_type", stored.request_type.as_str())
            .with_metadata("status", stored.status.as_str())
            .with_metadata("amount", stored.amount.to_string()),
        );
        info!(
            event_name = "submission.accepted",
            request_id = %stored.id,
            correlation_id = %context.correlation_id,
            status = stored.status.as_str(),
            "request submitted"
        );
        Ok(stored)
    }
}

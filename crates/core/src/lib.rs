pub mod approvals;
pub mod audit;
pub mod config;
pub mod delivery;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod ledger;
pub mod realtime;
pub mod scope;
pub mod store;
pub mod submission;
pub mod waiver;

#[cfg(test)]
mod test_support;

pub use approvals::{
    ApprovalError, ApprovalQueueController, ApprovalReceipt, ApprovalService, BulkAction,
    BulkDecision, BulkOutcome, CancelFlag, SignatureCapture, SignaturePrompt,
};
pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use domain::action::{Actor, ApprovalAction, Decision, Role};
pub use domain::request::{
    Request, RequestId, RequestStatus, RequestType, SignatureImage, Stage, TypePartition,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{
    ApprovalStateMachine, Effect, EffectDispatcher, SpecialApprovalDestination, TransitionError,
    TransitionOutcome, WorkflowRules,
};
pub use ledger::{BenefitLedger, LedgerViolation, UsageSummary};
pub use realtime::{RefreshDebouncer, RequestCache, RequestWatcher};
pub use scope::{QueueTab, RoleScopeFilter, ScopeError, ScopeQuery};
pub use store::{ChangeFeed, RequestChange, RequestFilter, RequestStore, StoreError};
pub use submission::{SubmissionDraft, SubmissionError, SubmissionGuard, SubmissionService};
pub use waiver::{PaymentSplit, WaiverCalculator, WaiverMode, WaiverSelection};

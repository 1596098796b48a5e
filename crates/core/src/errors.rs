use thiserror::Error;

use crate::approvals::ApprovalError;
use crate::domain::request::RequestId;
use crate::flows::{TransitionError, TransitionErrorKind};
use crate::ledger::LedgerViolation;
use crate::scope::ScopeError;
use crate::store::StoreError;
use crate::submission::SubmissionError;
use crate::waiver::WaiverError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Waiver(#[from] WaiverError),
    #[error(transparent)]
    Ledger(#[from] LedgerViolation),
    #[error(transparent)]
    Scope(#[from] ScopeError),
    #[error("duplicate of recently submitted request `{0}`")]
    DuplicateSubmission(RequestId),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("concurrent modification: {0}")]
    Conflict(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Unavailable(message) => Self::Persistence(message),
            StoreError::NotFound(id) => Self::NotFound(format!("request `{id}`")),
            error @ (StoreError::Conflict { .. } | StoreError::Duplicate(_)) => {
                Self::Conflict(error.to_string())
            }
        }
    }
}

impl From<ApprovalError> for ApplicationError {
    fn from(value: ApprovalError) -> Self {
        match value {
            ApprovalError::NotFound(id) => Self::NotFound(format!("request `{id}`")),
            ApprovalError::Transition(error) => Self::Domain(error.into()),
            ApprovalError::Store(error) => error.into(),
        }
    }
}

impl From<SubmissionError> for ApplicationError {
    fn from(value: SubmissionError) -> Self {
        match value {
            SubmissionError::NonPositiveAmount(_) | SubmissionError::MissingFuneralType => {
                Self::Domain(DomainError::InvalidInput(value.to_string()))
            }
            SubmissionError::Ledger(violation) => Self::Domain(violation.into()),
            SubmissionError::DuplicateSubmission { existing } => {
                Self::Domain(DomainError::DuplicateSubmission(existing))
            }
            SubmissionError::Store(error) => error.into(),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You are not allowed to perform this action on this request.",
            Self::NotFound { .. } => "The request no longer exists.",
            Self::Conflict { .. } => {
                "The request conflicts with its current state. Reload and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(DomainError::Transition(error))
                if error.kind() == TransitionErrorKind::Authorization =>
            {
                Self::Forbidden { message: error.to_string(), correlation_id }
            }
            ApplicationError::Domain(DomainError::Scope(error)) => {
                Self::Forbidden { message: error.to_string(), correlation_id }
            }
            ApplicationError::Domain(
                error @ (DomainError::Ledger(_) | DomainError::DuplicateSubmission(_)),
            ) => Self::Conflict { message: error.to_string(), correlation_id },
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id }
            }
            ApplicationError::NotFound(message) => Self::NotFound { message, correlation_id },
            ApplicationError::Conflict(message) => Self::Conflict { message, correlation_id },
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::approvals::ApprovalError;
    use crate::domain::action::{Decision, Role};
    use crate::domain::request::{RequestId, RequestStatus};
    use crate::errors::{ApplicationError, DomainError, InterfaceError};
    use crate::flows::TransitionError;
    use crate::ledger::LedgerViolation;
    use crate::store::StoreError;
    use crate::submission::SubmissionError;

    #[test]
    fn validation_error_maps_to_bad_request() {
        let interface = ApplicationError::from(DomainError::from(TransitionError::MissingComment {
            decision: Decision::Reject,
        }))
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest { ref correlation_id, .. } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn authorization_error_maps_to_forbidden() {
        let interface = ApplicationError::from(ApprovalError::Transition(
            TransitionError::RoleNotPermitted {
                role: Role::Manager,
                status: RequestStatus::PendingHr,
                decision: Decision::Approve,
            },
        ))
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Forbidden { .. }));
        assert_eq!(interface.correlation_id(), "req-2");
    }

    #[test]
    fn version_conflict_maps_to_conflict() {
        let interface = ApplicationError::from(StoreError::Conflict {
            id: RequestId("REQ-1".to_owned()),
            expected: 3,
            actual: 4,
        })
        .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::Conflict { .. }));
        assert_eq!(
            interface.user_message(),
            "The request conflicts with its current state. Reload and try again."
        );
    }

    #[test]
    fn submission_blocks_map_to_conflict_and_bad_request() {
        let blocked = ApplicationError::from(SubmissionError::Ledger(
            LedgerViolation::ChildbirthCapReached { total: 3, remaining: 0, requested: 1 },
        ))
        .into_interface("req-4");
        assert!(matches!(blocked, InterfaceError::Conflict { .. }));

        let invalid =
            ApplicationError::from(SubmissionError::MissingFuneralType).into_interface("req-5");
        assert!(matches!(invalid, InterfaceError::BadRequest { .. }));
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface =
            ApplicationError::from(StoreError::Unavailable("database lock timeout".to_owned()))
                .into_interface("req-6");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface = ApplicationError::Configuration("invalid channel token".to_owned())
            .into_interface("req-7");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}

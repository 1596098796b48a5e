use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::action::Decision;
use crate::domain::request::{Request, RequestId, RequestStatus, RequestType, SignatureSet, Stage};

/// Where a request goes once the special-approval committee signs off.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialApprovalDestination {
    #[default]
    PendingAccounting,
    Completed,
}

impl SpecialApprovalDestination {
    pub fn status(&self) -> RequestStatus {
        match self {
            Self::PendingAccounting => RequestStatus::PendingAccounting,
            Self::Completed => RequestStatus::Completed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingAccounting => "pending_accounting",
            Self::Completed => "completed",
        }
    }
}

impl std::str::FromStr for SpecialApprovalDestination {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending_accounting" => Ok(Self::PendingAccounting),
            "completed" | "approved" => Ok(Self::Completed),
            other => Err(format!(
                "unsupported special approval destination `{other}` (expected pending_accounting|completed)"
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub request_id: RequestId,
    pub contact: String,
    pub request_type: RequestType,
    pub status: RequestStatus,
    pub amount: Decimal,
    pub requester_name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRequest {
    pub request: Request,
    pub signatures: SignatureSet,
}

/// Side effects a committed transition asks its caller to run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Effect {
    Notify(NotificationRequest),
    RenderDocument(DocumentRequest),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub request_id: RequestId,
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub decision: Decision,
    /// Stage that was left; `None` for a requester resubmission.
    pub stage: Option<Stage>,
    /// The request as it must be persisted.
    pub request: Request,
    pub effects: Vec<Effect>,
}

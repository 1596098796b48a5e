use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::action::Decision;
use crate::waiver::{PaymentSplit, WaiverSelection};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fixed catalog of request types.
///
/// Welfare subtypes go through HR; the four advance/clearing subtypes are routed from the
/// manager straight to accounting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RequestType {
    #[serde(rename = "wedding")]
    Wedding,
    #[serde(rename = "childbirth")]
    Childbirth,
    #[serde(rename = "funeral")]
    Funeral,
    #[serde(rename = "training")]
    Training,
    #[serde(rename = "medical")]
    Medical,
    #[serde(rename = "dental")]
    Dental,
    #[serde(rename = "fitness")]
    Fitness,
    #[serde(rename = "advance")]
    Advance,
    #[serde(rename = "general-advance")]
    GeneralAdvance,
    #[serde(rename = "expense-clearing")]
    ExpenseClearing,
    #[serde(rename = "general-expense-clearing")]
    GeneralExpenseClearing,
    #[serde(rename = "internal_training")]
    InternalTraining,
}

impl RequestType {
    pub const ALL: [RequestType; 12] = [
        Self::Wedding,
        Self::Childbirth,
        Self::Funeral,
        Self::Training,
        Self::Medical,
        Self::Dental,
        Self::Fitness,
        Self::Advance,
        Self::GeneralAdvance,
        Self::ExpenseClearing,
        Self::GeneralExpenseClearing,
        Self::InternalTraining,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wedding => "wedding",
            Self::Childbirth => "childbirth",
            Self::Funeral => "funeral",
            Self::Training => "training",
            Self::Medical => "medical",
            Self::Dental => "dental",
            Self::Fitness => "fitness",
            Self::Advance => "advance",
            Self::GeneralAdvance => "general-advance",
            Self::ExpenseClearing => "expense-clearing",
            Self::GeneralExpenseClearing => "general-expense-clearing",
            Self::InternalTraining => "internal_training",
        }
    }

    /// Accepts both the hyphenated and the underscored spelling.
    pub fn parse(value: &str) -> Option<Self> {
        let key = value.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL.into_iter().find(|kind| kind.as_str().replace('_', "-") == key)
    }

    /// Types whose manager approval bypasses HR.
    pub fn is_accounting_routed(&self) -> bool {
        matches!(
            self,
            Self::Advance
                | Self::GeneralAdvance
                | Self::ExpenseClearing
                | Self::GeneralExpenseClearing
        )
    }

    pub fn requires_special_approval_review(&self) -> bool {
        matches!(self, Self::Training | Self::InternalTraining)
    }

    pub fn has_budget_ceiling(&self) -> bool {
        matches!(self, Self::Training)
    }

    pub fn partition(&self) -> TypePartition {
        if self.is_accounting_routed() {
            TypePartition::Accounting
        } else {
            TypePartition::Welfare
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypePartition {
    Welfare,
    Accounting,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Executive,
    Manager,
    Hr,
    Accounting,
    SpecialApproval,
}

impl Stage {
    pub const ALL: [Stage; 5] =
        [Self::Executive, Self::Manager, Self::Hr, Self::Accounting, Self::SpecialApproval];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Executive => "executive",
            Self::Manager => "manager",
            Self::Hr => "hr",
            Self::Accounting => "accounting",
            Self::SpecialApproval => "special_approval",
        }
    }

    pub fn pending_status(&self) -> RequestStatus {
        match self {
            Self::Executive => RequestStatus::PendingExecutive,
            Self::Manager => RequestStatus::PendingManager,
            Self::Hr => RequestStatus::PendingHr,
            Self::Accounting => RequestStatus::PendingAccounting,
            Self::SpecialApproval => RequestStatus::PendingSpecialApproval,
        }
    }

    pub fn rejected_status(&self) -> RequestStatus {
        match self {
            Self::Executive => RequestStatus::RejectedExecutive,
            Self::Manager => RequestStatus::RejectedManager,
            Self::Hr => RequestStatus::RejectedHr,
            Self::Accounting => RequestStatus::RejectedAccounting,
            Self::SpecialApproval => RequestStatus::RejectedSpecialApproval,
        }
    }

    /// The committee stamps without a captured signature image.
    pub fn requires_signature(&self) -> bool {
        !matches!(self, Self::SpecialApproval)
    }

    /// Stages from which the approver may send a request back to its requester.
    pub fn allows_revision(&self) -> bool {
        matches!(self, Self::Executive | Self::Manager | Self::Hr)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    PendingExecutive,
    PendingManager,
    PendingHr,
    PendingAccounting,
    PendingSpecialApproval,
    PendingRevision,
    #[serde(alias = "approved")]
    Completed,
    RejectedExecutive,
    RejectedManager,
    RejectedHr,
    RejectedAccounting,
    RejectedSpecialApproval,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 12] = [
        Self::PendingExecutive,
        Self::PendingManager,
        Self::PendingHr,
        Self::PendingAccounting,
        Self::PendingSpecialApproval,
        Self::PendingRevision,
        Self::Completed,
        Self::RejectedExecutive,
        Self::RejectedManager,
        Self::RejectedHr,
        Self::RejectedAccounting,
        Self::RejectedSpecialApproval,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingExecutive => "pending_executive",
            Self::PendingManager => "pending_manager",
            Self::PendingHr => "pending_hr",
            Self::PendingAccounting => "pending_accounting",
            Self::PendingSpecialApproval => "pending_special_approval",
            Self::PendingRevision => "pending_revision",
            Self::Completed => "completed",
            Self::RejectedExecutive => "rejected_executive",
            Self::RejectedManager => "rejected_manager",
            Self::RejectedHr => "rejected_hr",
            Self::RejectedAccounting => "rejected_accounting",
            Self::RejectedSpecialApproval => "rejected_special_approval",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let key = value.trim().to_ascii_lowercase();
        if key == "approved" {
            return Some(Self::Completed);
        }
        Self::ALL.into_iter().find(|status| status.as_str() == key)
    }

    /// The approval stage waiting on this status, if any.
    pub fn pending_stage(&self) -> Option<Stage> {
        match self {
            Self::PendingExecutive => Some(Stage::Executive),
            Self::PendingManager => Some(Stage::Manager),
            Self::PendingHr => Some(Stage::Hr),
            Self::PendingAccounting => Some(Stage::Accounting),
            Self::PendingSpecialApproval => Some(Stage::SpecialApproval),
            _ => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(
            self,
            Self::RejectedExecutive
                | Self::RejectedManager
                | Self::RejectedHr
                | Self::RejectedAccounting
                | Self::RejectedSpecialApproval
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed) || self.is_rejected()
    }

    /// Statuses at which an approver signature is collected.
    pub fn is_signed_stage(&self) -> bool {
        self.pending_stage().map(|stage| stage.requires_signature()).unwrap_or(false)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuneralType {
    EmployeeSpouse,
    Child,
    Parent,
}

impl FuneralType {
    pub const ALL: [FuneralType; 3] = [Self::EmployeeSpouse, Self::Child, Self::Parent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmployeeSpouse => "employee_spouse",
            Self::Child => "child",
            Self::Parent => "parent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let key = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|kind| kind.as_str() == key)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRecord {
    pub name: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

/// Opaque reference to a captured signature (data URL or storage key).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignatureImage(pub String);

impl SignatureImage {
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStamp {
    pub approver_id: String,
    pub approver_name: String,
    pub approver_position: String,
    pub decision: Decision,
    pub decided_at: DateTime<Utc>,
    pub signature: Option<SignatureImage>,
    pub note: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub employee_id: String,
    pub name: String,
    pub department: String,
    pub contact: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub request_type: RequestType,
    pub status: RequestStatus,
    pub requester: Requester,
    pub title: Option<String>,
    pub amount: Decimal,
    pub excess_amount: Decimal,
    pub payment_split: Option<PaymentSplit>,
    pub waiver: Option<WaiverSelection>,
    pub children: Option<Vec<ChildRecord>>,
    pub funeral_type: Option<FuneralType>,
    pub executive_id: Option<String>,
    pub manager_id: Option<String>,
    pub requester_signature: Option<SignatureImage>,
    pub stamps: BTreeMap<Stage, StageStamp>,
    pub revision_count: u32,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Request {
    /// Where a freshly submitted (or resubmitted) request enters the workflow.
    pub fn initial_status(&self) -> RequestStatus {
        if self.executive_id.is_some() {
            RequestStatus::PendingExecutive
        } else {
            RequestStatus::PendingManager
        }
    }

    pub fn stamp(&self, stage: Stage) -> Option<&StageStamp> {
        self.stamps.get(&stage)
    }

    /// Legacy childbirth rows carry no child list and count as a single child.
    pub fn child_count(&self) -> u32 {
        match &self.children {
            Some(children) if !children.is_empty() => {
                u32::try_from(children.len()).unwrap_or(u32::MAX)
            }
            _ => 1,
        }
    }

    pub fn signatures(&self) -> SignatureSet {
        let signature_of =
            |stage: Stage| self.stamps.get(&stage).and_then(|stamp| stamp.signature.clone());
        SignatureSet {
            requester: self.requester_signature.clone(),
            executive: signature_of(Stage::Executive),
            manager: signature_of(Stage::Manager),
            hr: signature_of(Stage::Hr),
            accounting: signature_of(Stage::Accounting),
        }
    }
}

/// Every signature rendered onto the supporting document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureSet {
    pub requester: Option<SignatureImage>,
    pub executive: Option<SignatureImage>,
    pub manager: Option<SignatureImage>,
    pub hr: Option<SignatureImage>,
    pub accounting: Option<SignatureImage>,
}

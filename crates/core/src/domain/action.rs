use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::request::{SignatureImage, Stage};
use crate::waiver::WaiverSelection;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Employee,
    Manager,
    #[serde(rename = "accountingandmanager")]
    AccountingAndManager,
    Hr,
    Admin,
    Accounting,
    Executive,
    SpecialApproval,
}

impl Role {
    pub const ALL: [Role; 8] = [
        Self::Employee,
        Self::Manager,
        Self::AccountingAndManager,
        Self::Hr,
        Self::Admin,
        Self::Accounting,
        Self::Executive,
        Self::SpecialApproval,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Employee => "employee",
            Self::Manager => "manager",
            Self::AccountingAndManager => "accountingandmanager",
            Self::Hr => "hr",
            Self::Admin => "admin",
            Self::Accounting => "accounting",
            Self::Executive => "executive",
            Self::SpecialApproval => "special_approval",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let key = value.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL.into_iter().find(|role| role.as_str() == key)
    }

    /// Approval stages this role holds authority over.
    pub fn stages(&self) -> &'static [Stage] {
        match self {
            Self::Employee => &[],
            Self::Manager => &[Stage::Manager],
            Self::AccountingAndManager => &[Stage::Manager, Stage::Accounting],
            Self::Hr | Self::Admin => &[Stage::Hr],
            Self::Accounting => &[Stage::Accounting],
            Self::Executive => &[Stage::Executive],
            Self::SpecialApproval => &[Stage::SpecialApproval],
        }
    }

    pub fn can_act_at(&self, stage: Stage) -> bool {
        self.stages().contains(&stage)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved identity of whoever performs an action. Supplied by the session layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub position: String,
    pub role: Role,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
    RequestRevision,
    Resubmit,
}

impl Decision {
    pub const ALL: [Decision; 4] =
        [Decision::Approve, Decision::Reject, Decision::RequestRevision, Decision::Resubmit];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::RequestRevision => "request_revision",
            Self::Resubmit => "resubmit",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalAction {
    pub decision: Decision,
    pub comment: Option<String>,
    pub signature: Option<SignatureImage>,
    pub waiver: Option<WaiverSelection>,
}

impl ApprovalAction {
    pub fn approve(signature: Option<SignatureImage>) -> Self {
        Self { decision: Decision::Approve, comment: None, signature, waiver: None }
    }

    pub fn reject(comment: impl Into<String>) -> Self {
        Self {
            decision: Decision::Reject,
            comment: Some(comment.into()),
            signature: None,
            waiver: None,
        }
    }

    pub fn request_revision(comment: impl Into<String>) -> Self {
        Self {
            decision: Decision::RequestRevision,
            comment: Some(comment.into()),
            signature: None,
            waiver: None,
        }
    }

    pub fn resubmit() -> Self {
        Self { decision: Decision::Resubmit, comment: None, signature: None, waiver: None }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_waiver(mut self, waiver: WaiverSelection) -> Self {
        self.waiver = Some(waiver);
        self
    }

    /// Trimmed comment, `None` when absent or blank.
    pub fn comment_text(&self) -> Option<&str> {
        self.comment.as_deref().map(str::trim).filter(|comment| !comment.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::{ApprovalAction, Role};
    use crate::domain::request::Stage;

    #[test]
    fn combined_role_holds_manager_and_accounting_authority() {
        let role = Role::AccountingAndManager;
        assert!(role.can_act_at(Stage::Manager));
        assert!(role.can_act_at(Stage::Accounting));
        assert!(!role.can_act_at(Stage::Hr));
        assert!(Role::Employee.stages().is_empty());
    }

    #[test]
    fn role_parse_accepts_legacy_spelling() {
        assert_eq!(Role::parse("accountingandmanager"), Some(Role::AccountingAndManager));
        assert_eq!(Role::parse("special-approval"), Some(Role::SpecialApproval));
        assert_eq!(Role::parse("HR"), Some(Role::Hr));
        assert_eq!(Role::parse("intern"), None);
    }

    #[test]
    fn blank_comment_is_treated_as_missing() {
        assert_eq!(ApprovalAction::reject("   ").comment_text(), None);
        assert_eq!(ApprovalAction::reject(" over budget ").comment_text(), Some("over budget"));
    }
}

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::request::{FuneralType, Request, RequestType};

/// Children an employee may claim a childbirth benefit for over their tenure.
pub const CHILDBIRTH_LIFETIME_CAP: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenefitKind {
    Childbirth,
    Funeral,
}

impl BenefitKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "childbirth" => Some(Self::Childbirth),
            "funeral" => Some(Self::Funeral),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildbirthUsage {
    pub total: u32,
    pub remaining: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuneralUsage {
    pub used_types: BTreeSet<FuneralType>,
    pub available_types: BTreeSet<FuneralType>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "benefit", rename_all = "snake_case")]
pub enum UsageSummary {
    Childbirth(ChildbirthUsage),
    Funeral(FuneralUsage),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LedgerViolation {
    #[error(
        "childbirth benefit cap reached: {total} used, {remaining} remaining, {requested} requested"
    )]
    ChildbirthCapReached { total: u32, remaining: u32, requested: u32 },
    #[error("funeral benefit `{}` was already used", .funeral_type.as_str())]
    FuneralTypeAlreadyUsed { funeral_type: FuneralType },
}

/// Derives benefit usage from an employee's request history. Rejected requests never
/// count against a cap.
#[derive(Clone, Debug)]
pub struct BenefitLedger {
    childbirth_cap: u32,
}

impl Default for BenefitLedger {
    fn default() -> Self {
        Self { childbirth_cap: CHILDBIRTH_LIFETIME_CAP }
    }
}

impl BenefitLedger {
    pub fn usage(
        &self,
        employee_id: &str,
        benefit: BenefitKind,
        requests: &[Request],
    ) -> UsageSummary {
        match benefit {
            BenefitKind::Childbirth => {
                UsageSummary::Childbirth(self.childbirth(employee_id, requests))
            }
            BenefitKind::Funeral => UsageSummary::Funeral(self.funeral(employee_id, requests)),
        }
    }

    pub fn childbirth(&self, employee_id: &str, requests: &[Request]) -> ChildbirthUsage {
        let total = counted(employee_id, RequestType::Childbirth, requests)
            .map(Request::child_count)
            .fold(0u32, u32::saturating_add);

        ChildbirthUsage { total, remaining: self.childbirth_cap.saturating_sub(total) }
    }

    pub fn funeral(&self, employee_id: &str, requests: &[Request]) -> FuneralUsage {
        let used_types: BTreeSet<FuneralType> = counted(employee_id, RequestType::Funeral, requests)
            .filter_map(|request| request.funeral_type)
            .collect();
        let available_types =
            FuneralType::ALL.into_iter().filter(|kind| !used_types.contains(kind)).collect();

        FuneralUsage { used_types, available_types }
    }

    /// Refuses a childbirth claim that would push the employee past the cap.
    pub fn check_childbirth(
        &self,
        employee_id: &str,
        requests: &[Request],
        requested_children: u32,
    ) -> Result<ChildbirthUsage, LedgerViolation> {
        let usage = self.childbirth(employee_id, requests);
        if usage.remaining == 0 || requested_children > usage.remaining {
            return Err(LedgerViolation::ChildbirthCapReached {
                total: usage.total,
                remaining: usage.remaining,
                requested: requested_children,
            });
        }
        Ok(usage)
    }

    pub fn check_funeral(
        &self,
        employee_id: &str,
        requests: &[Request],
        funeral_type: FuneralType,
    ) -> Result<FuneralUsage, LedgerViolation> {
        let usage = self.funeral(employee_id, requests);
        if usage.used_types.contains(&funeral_type) {
            return Err(LedgerViolation::FuneralTypeAlreadyUsed { funeral_type });
        }
        Ok(usage)
    }
}

fn counted<'a>(
    employee_id: &'a str,
    request_type: RequestType,
    requests: &'a [Request],
) -> impl Iterator<Item = &'a Request> + 'a {
    requests.iter().filter(move |request| {
        request.requester.employee_id == employee_id
            && request.request_type == request_type
            && !request.status.is_rejected()
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{
        BenefitKind, BenefitLedger, ChildbirthUsage, LedgerViolation, UsageSummary,
        CHILDBIRTH_LIFETIME_CAP,
    };
    use crate::domain::request::{ChildRecord, FuneralType, Request, RequestStatus, RequestType};
    use crate::test_support::request;

    fn childbirth(id: &str, employee: &str, status: RequestStatus, children: usize) -> Request {
        let mut request = request(id, employee, RequestType::Childbirth, status);
        request.children = Some(
            (0..children)
                .map(|index| ChildRecord { name: Some(format!("child-{index}")), birth_date: None })
                .collect(),
        );
        request
    }

    fn funeral(id: &str, employee: &str, status: RequestStatus, kind: FuneralType) -> Request {
        let mut request = request(id, employee, RequestType::Funeral, status);
        request.funeral_type = Some(kind);
        request
    }

    #[test]
    fn legacy_childbirth_rows_count_as_one_child() {
        let history = vec![
            request("R-1", "E-1", RequestType::Childbirth, RequestStatus::Completed),
            childbirth("R-2", "E-1", RequestStatus::PendingHr, 0),
        ];

        let usage = BenefitLedger::default().childbirth("E-1", &history);
        assert_eq!(usage, ChildbirthUsage { total: 2, remaining: 1 });
    }

    #[test]
    fn rejected_and_foreign_requests_do_not_count() {
        let history = vec![
            childbirth("R-1", "E-1", RequestStatus::RejectedHr, 2),
            childbirth("R-2", "E-1", RequestStatus::RejectedExecutive, 1),
            childbirth("R-3", "E-2", RequestStatus::Completed, 2),
            childbirth("R-4", "E-1", RequestStatus::PendingManager, 1),
        ];

        let usage = BenefitLedger::default().childbirth("E-1", &history);
        assert_eq!(usage.total, 1);
    }

    #[test]
    fn total_plus_remaining_equals_cap_while_under_cap() {
        let ledger = BenefitLedger::default();
        for children in 0..=CHILDBIRTH_LIFETIME_CAP as usize {
            let history = if children == 0 {
                Vec::new()
            } else {
                vec![childbirth("R-1", "E-1", RequestStatus::Completed, children)]
            };
            let usage = ledger.childbirth("E-1", &history);
            assert_eq!(usage.total + usage.remaining, CHILDBIRTH_LIFETIME_CAP);
        }
    }

    #[test]
    fn fourth_childbirth_is_blocked() {
        let history = vec![
            childbirth("R-1", "E-1", RequestStatus::Completed, 2),
            childbirth("R-2", "E-1", RequestStatus::PendingAccounting, 1),
        ];

        let error = BenefitLedger::default()
            .check_childbirth("E-1", &history, 1)
            .expect_err("cap is exhausted");
        assert_eq!(
            error,
            LedgerViolation::ChildbirthCapReached { total: 3, remaining: 0, requested: 1 }
        );
    }

    #[test]
    fn twins_are_blocked_when_only_one_slot_remains() {
        let history = vec![childbirth("R-1", "E-1", RequestStatus::Completed, 2)];

        let ledger = BenefitLedger::default();
        assert!(ledger.check_childbirth("E-1", &history, 2).is_err());
        assert_eq!(
            ledger.check_childbirth("E-1", &history, 1),
            Ok(ChildbirthUsage { total: 2, remaining: 1 })
        );
    }

    #[test]
    fn funeral_usage_partitions_all_types() {
        let history = vec![
            funeral("R-1", "E-1", RequestStatus::Completed, FuneralType::Parent),
            funeral("R-2", "E-1", RequestStatus::RejectedManager, FuneralType::Child),
            funeral("R-3", "E-2", RequestStatus::Completed, FuneralType::EmployeeSpouse),
        ];

        let usage = BenefitLedger::default().funeral("E-1", &history);
        assert_eq!(usage.used_types, BTreeSet::from([FuneralType::Parent]));
        assert_eq!(
            usage.available_types,
            BTreeSet::from([FuneralType::EmployeeSpouse, FuneralType::Child])
        );
        assert!(usage.used_types.is_disjoint(&usage.available_types));

        let union: BTreeSet<FuneralType> =
            usage.used_types.union(&usage.available_types).copied().collect();
        assert_eq!(union, BTreeSet::from(FuneralType::ALL));
    }

    #[test]
    fn reused_funeral_type_is_blocked() {
        let history = vec![funeral("R-1", "E-1", RequestStatus::PendingHr, FuneralType::Child)];
        let ledger = BenefitLedger::default();

        assert_eq!(
            ledger.check_funeral("E-1", &history, FuneralType::Child),
            Err(LedgerViolation::FuneralTypeAlreadyUsed { funeral_type: FuneralType::Child })
        );
        assert!(ledger.check_funeral("E-1", &history, FuneralType::Parent).is_ok());
    }

    #[test]
    fn usage_dispatches_on_benefit_kind() {
        let ledger = BenefitLedger::default();
        assert!(matches!(
            ledger.usage("E-1", BenefitKind::Childbirth, &[]),
            UsageSummary::Childbirth(ChildbirthUsage { total: 0, remaining: 3 })
        ));
        assert!(matches!(
            ledger.usage("E-1", BenefitKind::Funeral, &[]),
            UsageSummary::Funeral(ref usage) if usage.available_types.len() == 3
        ));
    }
}

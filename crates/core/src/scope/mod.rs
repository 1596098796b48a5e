//! Which requests an approver sees on each queue tab.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::action::Role;
use crate::domain::request::{Request, RequestStatus, Stage, TypePartition};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "view", content = "stage", rename_all = "snake_case")]
pub enum QueueTab {
    Pending(Stage),
    History(Stage),
    Own,
}

impl QueueTab {
    /// Accepts `pending:<stage>`, `history:<stage>` and `own`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        if value == "own" {
            return Some(Self::Own);
        }
        let (view, stage) = value.split_once(':')?;
        let stage = Stage::ALL.into_iter().find(|candidate| candidate.as_str() == stage)?;
        match view {
            "pending" => Some(Self::Pending(stage)),
            "history" => Some(Self::History(stage)),
            _ => None,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Pending(stage) | Self::History(stage) => Some(*stage),
            Self::Own => None,
        }
    }

    pub fn statuses(&self) -> Vec<RequestStatus> {
        match self {
            Self::Pending(stage) => vec![stage.pending_status()],
            Self::History(stage) => history_statuses(*stage),
            Self::Own => RequestStatus::ALL.to_vec(),
        }
    }
}

impl fmt::Display for QueueTab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending(stage) => write!(f, "pending:{stage}"),
            Self::History(stage) => write!(f, "history:{stage}"),
            Self::Own => f.write_str("own"),
        }
    }
}

/// Position of a pending status along the approval chain.
fn progress(status: RequestStatus) -> Option<u8> {
    match status {
        RequestStatus::PendingExecutive => Some(0),
        RequestStatus::PendingManager => Some(1),
        RequestStatus::PendingHr => Some(2),
        RequestStatus::PendingSpecialApproval => Some(3),
        RequestStatus::PendingAccounting => Some(4),
        RequestStatus::Completed => Some(5),
        _ => None,
    }
}

/// Everything past the stage's own pending status, plus revisions and every rejection.
fn history_statuses(stage: Stage) -> Vec<RequestStatus> {
    let own = progress(stage.pending_status()).unwrap_or(0);
    RequestStatus::ALL
        .into_iter()
        .filter(|status| match progress(*status) {
            Some(rank) => rank > own,
            None => true,
        })
        .collect()
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ScopeError {
    #[error("role `{role}` has no `{tab}` queue")]
    TabNotPermitted { role: Role, tab: QueueTab },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopeQuery {
    pub role: Role,
    pub approver_id: String,
    pub team_member_ids: Vec<String>,
    pub tab: QueueTab,
    /// Restricts organisation-wide queues to welfare or accounting types.
    pub partition: Option<TypePartition>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RoleScopeFilter;

impl RoleScopeFilter {
    pub fn visible_requests(
        &self,
        query: &ScopeQuery,
        requests: &[Request],
    ) -> Result<Vec<Request>, ScopeError> {
        let statuses = query.tab.statuses();
        let mut visible: Vec<Request> = match query.tab.stage() {
            None => requests
                .iter()
                .filter(|request| request.requester.employee_id == query.approver_id)
                .cloned()
                .collect(),
            Some(stage) => {
                if !query.role.can_act_at(stage) {
                    return Err(ScopeError::TabNotPermitted { role: query.role, tab: query.tab });
                }
                let partition = query.partition.or(match stage {
                    Stage::Hr => Some(TypePartition::Welfare),
                    _ => None,
                });
                let history = matches!(query.tab, QueueTab::History(_));
                requests
                    .iter()
                    .filter(|request| in_population(query, stage, partition, history, request))
                    .cloned()
                    .collect()
            }
        };

        visible.retain(|request| statuses.contains(&request.status));
        visible.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then_with(|| left.id.cmp(&right.id))
        });
        Ok(visible)
    }
}

fn in_population(
    query: &ScopeQuery,
    stage: Stage,
    partition: Option<TypePartition>,
    history: bool,
    request: &Request,
) -> bool {
    match stage {
        Stage::Executive => request.executive_id.as_deref() == Some(query.approver_id.as_str()),
        Stage::Manager => {
            let requester = &request.requester.employee_id;
            query.team_member_ids.contains(requester)
                || request.manager_id.as_deref() == Some(query.approver_id.as_str())
                || (history && *requester == query.approver_id)
        }
        Stage::Hr | Stage::Accounting | Stage::SpecialApproval => {
            partition.map_or(true, |partition| request.request_type.partition() == partition)
        }
    }
}

use serde::Serialize;

use claimdesk_core::domain::action::Role;
use claimdesk_core::domain::request::{Request, TypePartition};
use claimdesk_core::scope::{QueueTab, RoleScopeFilter, ScopeQuery};
use claimdesk_core::store::{RequestFilter, RequestStore};
use claimdesk_db::SqlRequestRepository;

use crate::commands::{to_data, with_migrated_pool, CommandResult};

#[derive(Clone, Debug)]
pub struct QueueArgs {
    pub role: String,
    pub approver_id: String,
    pub tab: String,
    pub team_member_ids: Vec<String>,
    pub partition: Option<String>,
}

/// Flattened view of a queued request.
#[derive(Debug, Serialize)]
struct QueueRow {
    id: String,
    request_type: &'static str,
    status: &'static str,
    employee_id: String,
    requester_name: String,
    amount: String,
    created_at: String,
}

impl From<&Request> for QueueRow {
    fn from(request: &Request) -> Self {
        Self {
            id: request.id.0.clone(),
            request_type: request.request_type.as_str(),
            status: request.status.as_str(),
            employee_id: request.requester.employee_id.clone(),
            requester_name: request.requester.name.clone(),
            amount: request.amount.to_string(),
            created_at: request.created_at.to_rfc3339(),
        }
    }
}

pub fn run(args: &QueueArgs) -> CommandResult {
    let query = match build_query(args) {
        Ok(query) => query,
        Err(message) => return CommandResult::failure("queue", "invalid_input", message, 2),
    };

    let scope = query.clone();
    let result = with_migrated_pool("queue", |_config, pool| async move {
        let repository = SqlRequestRepository::new(pool);
        let requests = repository
            .list(&RequestFilter::default())
            .await
            .map_err(|error| ("store", error.to_string(), 4u8))?;
        RoleScopeFilter
            .visible_requests(&scope, &requests)
            .map_err(|error| ("scope", error.to_string(), 2u8))
    });

    match result {
        Ok(visible) => {
            let rows: Vec<QueueRow> = visible.iter().map(QueueRow::from).collect();
            let message = format!(
                "{} request(s) on the {} queue for {} `{}`",
                rows.len(),
                query.tab,
                query.role,
                query.approver_id
            );
            CommandResult::success_with_data("queue", message, to_data(&rows))
        }
        Err(failure) => failure,
    }
}

fn build_query(args: &QueueArgs) -> Result<ScopeQuery, String> {
    let role = Role::parse(&args.role).ok_or_else(|| format!("unknown role `{}`", args.role))?;
    let tab = QueueTab::parse(&args.tab).ok_or_else(|| {
        format!("unknown tab `{}`; expected own, pending:<stage> or history:<stage>", args.tab)
    })?;
    let approver_id = args.approver_id.trim().to_string();
    if approver_id.is_empty() {
        return Err("approver id is required".to_string());
    }
    let partition = match args.partition.as_deref().map(str::trim) {
        None => None,
        Some("welfare") => Some(TypePartition::Welfare),
        Some("accounting") => Some(TypePartition::Accounting),
        Some(other) => {
            return Err(format!("unknown partition `{other}`; expected welfare or accounting"))
        }
    };
    let team_member_ids = args
        .team_member_ids
        .iter()
        .map(|member| member.trim().to_string())
        .filter(|member| !member.is_empty())
        .collect();

    Ok(ScopeQuery { role, approver_id, team_member_ids, tab, partition })
}

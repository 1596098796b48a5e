use std::collections::BTreeSet;

use claimdesk_core::domain::request::FuneralType;
use claimdesk_core::ledger::{BenefitKind, BenefitLedger, UsageSummary};
use claimdesk_core::store::{RequestFilter, RequestStore};
use claimdesk_db::SqlRequestRepository;

use crate::commands::{to_data, with_migrated_pool, CommandResult};

pub fn run(employee_id: &str, benefit: &str) -> CommandResult {
    let Some(kind) = BenefitKind::parse(benefit) else {
        return CommandResult::failure(
            "usage",
            "invalid_input",
            format!("unknown benefit `{benefit}`; expected childbirth or funeral"),
            2,
        );
    };
    let employee_id = employee_id.trim().to_string();
    if employee_id.is_empty() {
        return CommandResult::failure("usage", "invalid_input", "employee id is required", 2);
    }

    let lookup = employee_id.clone();
    let result = with_migrated_pool("usage", |_config, pool| async move {
        let repository = SqlRequestRepository::new(pool);
        let history = repository
            .list(&RequestFilter::for_requester(lookup.as_str()))
            .await
            .map_err(|error| ("store", error.to_string(), 4u8))?;
        Ok(BenefitLedger::default().usage(&lookup, kind, &history))
    });

    match result {
        Ok(summary) => {
            let message = describe(&employee_id, &summary);
            CommandResult::success_with_data("usage", message, to_data(&summary))
        }
        Err(failure) => failure,
    }
}

fn describe(employee_id: &str, summary: &UsageSummary) -> String {
    match summary {
        UsageSummary::Childbirth(usage) => format!(
            "{employee_id}: childbirth benefit used for {} children, {} remaining",
            usage.total, usage.remaining
        ),
        UsageSummary::Funeral(usage) => format!(
            "{employee_id}: funeral benefit used for [{}], available [{}]",
            join_types(&usage.used_types),
            join_types(&usage.available_types)
        ),
    }
}

fn join_types(types: &BTreeSet<FuneralType>) -> String {
    if types.is_empty() {
        return "none".to_string();
    }
    types.iter().map(FuneralType::as_str).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use claimdesk_core::ledger::{ChildbirthUsage, UsageSummary};

    use super::describe;

    #[test]
    fn childbirth_summary_names_remaining_children() {
        let summary = UsageSummary::Childbirth(ChildbirthUsage { total: 2, remaining: 1 });
        assert_eq!(
            describe("E-100", &summary),
            "E-100: childbirth benefit used for 2 children, 1 remaining"
        );
    }
}

use rust_decimal::Decimal;
use serde::Serialize;

use claimdesk_core::waiver::{PaymentSplit, WaiverCalculator, WaiverMode, WaiverSelection};

use crate::commands::{load_config, to_data, CommandResult};

/// What the split is computed from: an explicit excess, or a training amount that is
/// measured against the configured budget ceiling.
#[derive(Clone, Copy, Debug)]
pub enum SplitBasis {
    Excess(Decimal),
    Amount(Decimal),
}

#[derive(Debug, Serialize)]
struct SplitReport {
    excess: Decimal,
    mode: WaiverMode,
    waiver_amount: Option<Decimal>,
    #[serde(flatten)]
    split: PaymentSplit,
}

pub fn run(basis: SplitBasis, mode: &str, waiver_amount: Option<Decimal>) -> CommandResult {
    let Some(mode) = WaiverMode::parse(mode) else {
        return CommandResult::failure(
            "split",
            "invalid_input",
            format!("unknown waiver mode `{mode}`; expected none, full or partial"),
            2,
        );
    };

    let excess = match basis {
        SplitBasis::Excess(excess) => excess,
        SplitBasis::Amount(amount) => match load_config("split") {
            Ok(config) => WaiverCalculator::excess_over_ceiling(
                amount,
                config.workflow.training_budget_ceiling,
            ),
            Err(failure) => return failure,
        },
    };

    let selection = WaiverSelection {
        mode,
        amount: if mode == WaiverMode::Partial { waiver_amount } else { None },
    };

    match WaiverCalculator.apply(excess, &selection) {
        Ok(split) => {
            let message = format!(
                "excess {excess}: company pays {}, employee pays {}",
                split.company_payment, split.employee_payment
            );
            let report = SplitReport { excess, mode, waiver_amount: selection.amount, split };
            CommandResult::success_with_data("split", message, to_data(&report))
        }
        Err(error) => CommandResult::failure("split", "invalid_input", error.to_string(), 2),
    }
}

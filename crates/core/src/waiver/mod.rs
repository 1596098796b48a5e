//! Cost sharing for training requests that exceed their budget ceiling.
//!
//! By default the excess is split evenly between company and employee. A manager may
//! waive the employee's half entirely (`full`) or in part (`partial`), in which case the
//! company takes on the waived amount on top of its own half.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaiverMode {
    None,
    Full,
    Partial,
}

impl WaiverMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Full => "full",
            Self::Partial => "partial",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "full" => Some(Self::Full),
            "partial" => Some(Self::Partial),
            _ => None,
        }
    }
}

/// A manager's waiver choice, persisted alongside the resulting split.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaiverSelection {
    pub mode: WaiverMode,
    pub amount: Option<Decimal>,
}

impl WaiverSelection {
    pub fn none() -> Self {
        Self { mode: WaiverMode::None, amount: None }
    }

    pub fn full() -> Self {
        Self { mode: WaiverMode::Full, amount: None }
    }

    pub fn partial(amount: Decimal) -> Self {
        Self { mode: WaiverMode::Partial, amount: Some(amount) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSplit {
    pub company_payment: Decimal,
    pub employee_payment: Decimal,
}

impl PaymentSplit {
    pub fn total(&self) -> Decimal {
        self.company_payment + self.employee_payment
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WaiverError {
    #[error("excess amount must not be negative (got {0})")]
    NegativeExcess(Decimal),
    #[error("partial waiver requires a waiver amount")]
    MissingPartialAmount,
    #[error("waiver amount must not be negative (got {0})")]
    NegativeWaiverAmount(Decimal),
    #[error("waiver amount {requested} exceeds the employee share {cap}")]
    WaiverAmountExceedsCap { requested: Decimal, cap: Decimal },
}

#[derive(Clone, Copy, Debug, Default)]
pub struct WaiverCalculator;

impl WaiverCalculator {
    /// Portion of `amount` above `ceiling`, never negative.
    pub fn excess_over_ceiling(amount: Decimal, ceiling: Decimal) -> Decimal {
        (amount - ceiling).max(Decimal::ZERO)
    }

    /// Splits `excess` for `mode`. A partial waiver larger than the employee's half is
    /// clamped to that half.
    pub fn compute_split(
        &self,
        excess: Decimal,
        mode: WaiverMode,
        waiver_amount: Option<Decimal>,
    ) -> Result<PaymentSplit, WaiverError> {
        if excess < Decimal::ZERO {
            return Err(WaiverError::NegativeExcess(excess));
        }

        let half = excess / Decimal::TWO;
        let company_payment = match mode {
            WaiverMode::None => half,
            WaiverMode::Full => excess,
            WaiverMode::Partial => {
                let waived = waiver_amount.ok_or(WaiverError::MissingPartialAmount)?;
                if waived < Decimal::ZERO {
                    return Err(WaiverError::NegativeWaiverAmount(waived));
                }
                half + waived.min(half)
            }
        };
        let employee_payment = (excess - company_payment).max(Decimal::ZERO);

        Ok(PaymentSplit { company_payment, employee_payment })
    }

    /// Refuses waiver amounts above the employee's half instead of clamping them.
    pub fn validate(
        &self,
        excess: Decimal,
        selection: &WaiverSelection,
    ) -> Result<(), WaiverError> {
        if excess < Decimal::ZERO {
            return Err(WaiverError::NegativeExcess(excess));
        }
        if selection.mode != WaiverMode::Partial {
            return Ok(());
        }

        let requested = selection.amount.ok_or(WaiverError::MissingPartialAmount)?;
        if requested < Decimal::ZERO {
            return Err(WaiverError::NegativeWaiverAmount(requested));
        }
        let cap = excess / Decimal::TWO;
        if requested > cap {
            return Err(WaiverError::WaiverAmountExceedsCap { requested, cap });
        }
        Ok(())
    }

    pub fn apply(
        &self,
        excess: Decimal,
        selection: &WaiverSelection,
    ) -> Result<PaymentSplit, WaiverError> {
        self.validate(excess, selection)?;
        self.compute_split(excess, selection.mode, selection.amount)
    }
}

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::error::{EngineError, EngineResult};

/// When the year's net flow lands relative to that year's growth.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowTiming {
    /// Growth is earned on the opening balance, then the flow is applied.
    #[default]
    EndOfYear,
    /// The flow is applied first and the adjusted balance earns the year's growth.
    StartOfYear,
}

pub(crate) fn checked_add(a: Decimal, b: Decimal, context: &'static str) -> EngineResult<Decimal> {
    a.checked_add(b).ok_or_else(|| EngineError::overflow(context))
}

pub(crate) fn checked_sub(a: Decimal, b: Decimal, context: &'static str) -> EngineResult<Decimal> {
    a.checked_sub(b).ok_or_else(|| EngineError::overflow(context))
}

pub(crate) fn checked_mul(a: Decimal, b: Decimal, context: &'static str) -> EngineResult<Decimal> {
    a.checked_mul(b).ok_or_else(|| EngineError::overflow(context))
}

pub(crate) fn checked_sum<I>(values: I, context: &'static str) -> EngineResult<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| checked_add(acc, v, context))
}

/// Rounds to cents, the precision monetary fields are stored at.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// One year of growth on `balance`, then the net flow. Growth is computed on
/// the pre-flow balance, so deposits do not earn the current year's return.
pub fn compound(
    balance: Decimal,
    rate: Decimal,
    contribution: Decimal,
    withdrawal: Decimal,
) -> EngineResult<Decimal> {
    compound_with(FlowTiming::EndOfYear, balance, rate, contribution, withdrawal)
}

pub fn compound_with(
    timing: FlowTiming,
    balance: Decimal,
    rate: Decimal,
    contribution: Decimal,
    withdrawal: Decimal,
) -> EngineResult<Decimal> {
    let factor = checked_add(Decimal::ONE, rate, "growth factor")?;
    match timing {
        FlowTiming::EndOfYear => {
            let grown = checked_mul(balance, factor, "balance growth")?;
            let funded = checked_add(grown, contribution, "balance contribution")?;
            checked_sub(funded, withdrawal, "balance withdrawal")
        }
        FlowTiming::StartOfYear => {
            let funded = checked_add(balance, contribution, "balance contribution")?;
            let base = checked_sub(funded, withdrawal, "balance withdrawal")?;
            checked_mul(base, factor, "balance growth")
        }
    }
}

/// Compounds `inflation_rate` over `years_elapsed` periods.
pub fn apply_inflation(
    nominal_amount: Decimal,
    inflation_rate: Decimal,
    years_elapsed: u32,
) -> EngineResult<Decimal> {
    let factor = checked_add(Decimal::ONE, inflation_rate, "inflation factor")?;
    (0..years_elapsed).try_fold(nominal_amount, |amount, _| {
        checked_mul(amount, factor, "inflation adjustment")
    })
}

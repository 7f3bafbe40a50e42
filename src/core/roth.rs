use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span};

use super::calc::{FlowTiming, checked_add, checked_mul, checked_sub, compound_with, round_money};
use super::error::{EngineError, EngineResult};
use super::tax::{BracketTable, incremental_tax};
use super::types::MAX_PLAN_AGE;

/// Inputs for one Roth conversion strategy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionParams {
    pub current_age: u32,
    pub retirement_age: u32,
    pub traditional_balance: Decimal,
    #[serde(default)]
    pub roth_balance: Decimal,
    /// Ordinary income the conversions are stacked on top of.
    pub annual_income: Decimal,
    pub conversion_amount: Decimal,
    pub years_to_convert: u32,
    pub expected_return: Decimal,
    pub brackets: BracketTable,
    /// Rate applied to traditional balances still untaxed at retirement.
    #[serde(default)]
    pub expected_retirement_tax_rate: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionYear {
    /// 1-based year of the strategy.
    pub year: u32,
    pub age: u32,
    pub conversion_amount: Decimal,
    pub tax_cost: Decimal,
    pub traditional_balance: Decimal,
    pub roth_balance: Decimal,
    pub total_tax_paid: Decimal,
    pub net_worth: Decimal,
    pub baseline_traditional_balance: Decimal,
    pub baseline_roth_balance: Decimal,
    pub baseline_net_worth: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionSummary {
    pub total_converted: Decimal,
    pub total_tax_paid: Decimal,
    pub final_net_worth: Decimal,
    pub final_baseline_net_worth: Decimal,
    /// Net worth after traditional balances are taxed at the retirement rate.
    pub after_tax_net_worth: Decimal,
    pub baseline_after_tax_net_worth: Decimal,
    /// Positive when converting leaves more after tax than not converting.
    pub after_tax_advantage: Decimal,
}

#[derive(Debug, Clone, Copy)]
struct Ledger {
    traditional: Decimal,
    roth: Decimal,
}

impl Ledger {
    fn net_worth(self) -> EngineResult<Decimal> {
        checked_add(self.traditional, self.roth, "conversion net worth")
    }

    fn after_tax(self, retirement_rate: Decimal) -> EngineResult<Decimal> {
        let kept = checked_sub(Decimal::ONE, retirement_rate, "after-tax share")?;
        let traditional = checked_mul(self.traditional, kept, "after-tax traditional")?;
        checked_add(round_money(traditional), self.roth, "after-tax net worth")
    }

    /// Flows land before the year's growth.
    fn advance(self, rate: Decimal, withdrawn: Decimal, deposited: Decimal) -> EngineResult<Self> {
        Ok(Self {
            traditional: round_money(compound_with(
                FlowTiming::StartOfYear,
                self.traditional,
                rate,
                Decimal::ZERO,
                withdrawn,
            )?),
            roth: round_money(compound_with(
                FlowTiming::StartOfYear,
                self.roth,
                rate,
                deposited,
                Decimal::ZERO,
            )?),
        })
    }
}

pub fn validate_conversion(params: &ConversionParams) -> EngineResult<()> {
    if params.retirement_age < params.current_age {
        return Err(EngineError::invalid("retirement age must be >= current age"));
    }
    if params.retirement_age > MAX_PLAN_AGE {
        return Err(EngineError::invalid(format!(
            "retirement age must be <= {MAX_PLAN_AGE}"
        )));
    }
    if params.expected_return <= -Decimal::ONE || params.expected_return > Decimal::ONE {
        return Err(EngineError::invalid(
            "expected return must be > -100% and <= 100%",
        ));
    }
    if params.expected_retirement_tax_rate < Decimal::ZERO
        || params.expected_retirement_tax_rate > Decimal::ONE
    {
        return Err(EngineError::invalid(
            "expected retirement tax rate must be between 0 and 1",
        ));
    }
    for (label, amount) in [
        ("traditional balance", params.traditional_balance),
        ("roth balance", params.roth_balance),
        ("annual income", params.annual_income),
        ("conversion amount", params.conversion_amount),
    ] {
        if amount < Decimal::ZERO {
            return Err(EngineError::invalid(format!("{label} must be >= 0")));
        }
    }
    params.brackets.validate()
}

/// Runs the conversion schedule alongside a no-conversion baseline.
///
/// One record is produced per year from `current_age` up to, but not
/// including, `retirement_age`. Scheduled years past that point are dropped,
/// and a conversion never exceeds the remaining traditional balance.
pub fn simulate_conversion(params: &ConversionParams) -> EngineResult<Vec<ConversionYear>> {
    validate_conversion(params)?;

    let span = params.retirement_age - params.current_age;
    let _span = debug_span!(
        "simulate_conversion",
        current_age = params.current_age,
        years = span,
        scheduled = params.years_to_convert
    )
    .entered();

    let opening = Ledger {
        traditional: round_money(params.traditional_balance),
        roth: round_money(params.roth_balance),
    };
    let rate = params.expected_return;

    let mut strategy = opening;
    let mut baseline = opening;
    let mut total_tax_paid = Decimal::ZERO;
    let mut records = Vec::with_capacity(span as usize);

    for offset in 0..span {
        let year = offset + 1;
        let conversion_amount = if year <= params.years_to_convert {
            round_money(params.conversion_amount).min(strategy.traditional)
        } else {
            Decimal::ZERO
        };
        let tax_cost = round_money(incremental_tax(
            params.annual_income,
            conversion_amount,
            &params.brackets,
        )?);
        let after_tax = checked_sub(conversion_amount, tax_cost, "after-tax conversion")?;

        strategy = strategy.advance(rate, conversion_amount, after_tax)?;
        baseline = baseline.advance(rate, Decimal::ZERO, Decimal::ZERO)?;
        total_tax_paid = checked_add(total_tax_paid, tax_cost, "conversion tax")?;

        records.push(ConversionYear {
            year,
            age: params.current_age + offset,
            conversion_amount,
            tax_cost,
            traditional_balance: strategy.traditional,
            roth_balance: strategy.roth,
            total_tax_paid,
            net_worth: strategy.net_worth()?,
            baseline_traditional_balance: baseline.traditional,
            baseline_roth_balance: baseline.roth,
            baseline_net_worth: baseline.net_worth()?,
        });
    }

    debug!(
        records = records.len(),
        total_tax_paid = %total_tax_paid,
        "conversion simulated"
    );
    Ok(records)
}

pub fn summarize_conversion(
    params: &ConversionParams,
    years: &[ConversionYear],
) -> EngineResult<ConversionSummary> {
    let (strategy, baseline, total_tax_paid) = match years.last() {
        Some(last) => (
            Ledger {
                traditional: last.traditional_balance,
                roth: last.roth_balance,
            },
            Ledger {
                traditional: last.baseline_traditional_balance,
                roth: last.baseline_roth_balance,
            },
            last.total_tax_paid,
        ),
        None => {
            let opening = Ledger {
                traditional: round_money(params.traditional_balance),
                roth: round_money(params.roth_balance),
            };
            (opening, opening, Decimal::ZERO)
        }
    };

    let total_converted = years
        .iter()
        .try_fold(Decimal::ZERO, |acc, y| {
            checked_add(acc, y.conversion_amount, "total converted")
        })?;
    let rate = params.expected_retirement_tax_rate;
    let after_tax_net_worth = strategy.after_tax(rate)?;
    let baseline_after_tax_net_worth = baseline.after_tax(rate)?;

    Ok(ConversionSummary {
        total_converted,
        total_tax_paid,
        final_net_worth: strategy.net_worth()?,
        final_baseline_net_worth: baseline.net_worth()?,
        after_tax_net_worth,
        baseline_after_tax_net_worth,
        after_tax_advantage: checked_sub(
            after_tax_net_worth,
            baseline_after_tax_net_worth,
            "after-tax advantage",
        )?,
    })
}

/// Default conversion scenario served when a caller supplies no fields.
pub fn sample_conversion() -> ConversionParams {
    ConversionParams {
        current_age: 60,
        retirement_age: 65,
        traditional_balance: dec!(50000),
        roth_balance: Decimal::ZERO,
        annual_income: dec!(80000),
        conversion_amount: dec!(5000),
        years_to_convert: 3,
        expected_return: dec!(0.05),
        brackets: BracketTable::flat(dec!(0.22)),
        expected_retirement_tax_rate: dec!(0.22),
    }
}

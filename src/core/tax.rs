use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::calc::{checked_add, checked_mul, checked_sub};
use super::error::{EngineError, EngineResult};

/// Share of Social Security benefits counted as ordinary income.
pub const SOCIAL_SECURITY_TAXABLE_SHARE: Decimal = dec!(0.85);

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilingStatus {
    #[default]
    Single,
    #[serde(alias = "marriedJointly", alias = "married_jointly")]
    MarriedJointly,
    #[serde(alias = "headOfHousehold", alias = "head_household")]
    HeadOfHousehold,
}

/// Income at or above `threshold` (up to the next bracket) is taxed at `rate`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TaxBracket {
    pub threshold: Decimal,
    pub rate: Decimal,
}

/// Progressive marginal schedule, ascending by threshold.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketTable {
    pub brackets: Vec<TaxBracket>,
    #[serde(default)]
    pub standard_deduction: Decimal,
}

impl BracketTable {
    pub fn new(brackets: Vec<TaxBracket>, standard_deduction: Decimal) -> Self {
        Self {
            brackets,
            standard_deduction,
        }
    }

    /// A single bracket from zero: every dollar is taxed at `rate`.
    pub fn flat(rate: Decimal) -> Self {
        Self::new(
            vec![TaxBracket {
                threshold: Decimal::ZERO,
                rate,
            }],
            Decimal::ZERO,
        )
    }

    /// 2024 federal ordinary-income schedule (IRS Rev. Proc. 2023-34).
    pub fn federal_2024(status: FilingStatus) -> Self {
        let (rows, deduction): (&[(Decimal, Decimal)], Decimal) = match status {
            FilingStatus::Single => (
                &[
                    (dec!(0), dec!(0.10)),
                    (dec!(11600), dec!(0.12)),
                    (dec!(47150), dec!(0.22)),
                    (dec!(100525), dec!(0.24)),
                    (dec!(191950), dec!(0.32)),
                    (dec!(243725), dec!(0.35)),
                    (dec!(609350), dec!(0.37)),
                ],
                dec!(14600),
            ),
            FilingStatus::MarriedJointly => (
                &[
                    (dec!(0), dec!(0.10)),
                    (dec!(23200), dec!(0.12)),
                    (dec!(94300), dec!(0.22)),
                    (dec!(201050), dec!(0.24)),
                    (dec!(383900), dec!(0.32)),
                    (dec!(487450), dec!(0.35)),
                    (dec!(731200), dec!(0.37)),
                ],
                dec!(29200),
            ),
            FilingStatus::HeadOfHousehold => (
                &[
                    (dec!(0), dec!(0.10)),
                    (dec!(16550), dec!(0.12)),
                    (dec!(63100), dec!(0.22)),
                    (dec!(100500), dec!(0.24)),
                    (dec!(191950), dec!(0.32)),
                    (dec!(243700), dec!(0.35)),
                    (dec!(609350), dec!(0.37)),
                ],
                dec!(21900),
            ),
        };
        Self::new(
            rows.iter()
                .map(|&(threshold, rate)| TaxBracket { threshold, rate })
                .collect(),
            deduction,
        )
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.standard_deduction < Decimal::ZERO {
            return Err(EngineError::invalid(
                "standard deduction must be >= 0",
            ));
        }
        for (idx, bracket) in self.brackets.iter().enumerate() {
            if bracket.threshold < Decimal::ZERO {
                return Err(EngineError::invalid(format!(
                    "bracket {idx} threshold must be >= 0"
                )));
            }
            if bracket.rate < Decimal::ZERO || bracket.rate > Decimal::ONE {
                return Err(EngineError::invalid(format!(
                    "bracket {idx} rate must be between 0 and 1"
                )));
            }
        }
        if self
            .brackets
            .windows(2)
            .any(|pair| pair[1].threshold <= pair[0].threshold)
        {
            return Err(EngineError::invalid(
                "bracket thresholds must be strictly ascending",
            ));
        }
        Ok(())
    }
}

/// Tax owed on `taxable_income` under the progressive schedule. Income below
/// the lowest threshold owes nothing.
pub fn estimate_tax(taxable_income: Decimal, table: &BracketTable) -> EngineResult<Decimal> {
    table.validate()?;
    progressive_tax(taxable_income, table)
}

/// Applies the standard deduction, then the brackets.
pub fn tax_on_gross(gross_ordinary_income: Decimal, table: &BracketTable) -> EngineResult<Decimal> {
    let taxable = checked_sub(
        gross_ordinary_income,
        table.standard_deduction,
        "taxable income",
    )?;
    estimate_tax(taxable.max(Decimal::ZERO), table)
}

/// Rate of the highest bracket `taxable_income` reaches into.
pub fn marginal_rate(taxable_income: Decimal, table: &BracketTable) -> Decimal {
    table
        .brackets
        .iter()
        .take_while(|b| taxable_income > b.threshold)
        .last()
        .map(|b| b.rate)
        .unwrap_or(Decimal::ZERO)
}

/// Tax on `extra` stacked on top of `base` gross income. The standard
/// deduction shelters the combined income first.
pub fn incremental_tax(
    base: Decimal,
    extra: Decimal,
    table: &BracketTable,
) -> EngineResult<Decimal> {
    let before = tax_on_gross(base, table)?;
    let after = tax_on_gross(checked_add(base, extra, "stacked income")?, table)?;
    checked_sub(after, before, "incremental tax").map(|t| t.max(Decimal::ZERO))
}

fn progressive_tax(taxable_income: Decimal, table: &BracketTable) -> EngineResult<Decimal> {
    let mut tax = Decimal::ZERO;
    for (idx, bracket) in table.brackets.iter().enumerate() {
        if taxable_income <= bracket.threshold {
            break;
        }
        let top = match table.brackets.get(idx + 1) {
            Some(next) => next.threshold.min(taxable_income),
            None => taxable_income,
        };
        let slice = checked_sub(top, bracket.threshold, "bracket slice")?;
        let owed = checked_mul(slice, bracket.rate, "bracket tax")?;
        tax = checked_add(tax, owed, "tax owed")?;
    }
    Ok(tax)
}

/// Annual caps on tax-advantaged contributions.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionLimits {
    pub limit_401k: Decimal,
    pub catch_up_401k: Decimal,
    pub limit_ira: Decimal,
    pub catch_up_ira: Decimal,
    pub limit_hsa_single: Decimal,
    pub limit_hsa_family: Decimal,
    pub catch_up_hsa: Decimal,
    pub catch_up_age: u32,
    pub hsa_catch_up_age: u32,
}

impl ContributionLimits {
    pub fn federal_2024() -> Self {
        Self {
            limit_401k: dec!(23000),
            catch_up_401k: dec!(7500),
            limit_ira: dec!(7000),
            catch_up_ira: dec!(1000),
            limit_hsa_single: dec!(4150),
            limit_hsa_family: dec!(8300),
            catch_up_hsa: dec!(1000),
            catch_up_age: 50,
            hsa_catch_up_age: 55,
        }
    }

    pub fn employer_plan(&self, age: u32) -> Decimal {
        if age >= self.catch_up_age {
            self.limit_401k + self.catch_up_401k
        } else {
            self.limit_401k
        }
    }

    pub fn ira(&self, age: u32) -> Decimal {
        if age >= self.catch_up_age {
            self.limit_ira + self.catch_up_ira
        } else {
            self.limit_ira
        }
    }

    pub fn hsa(&self, age: u32, family: bool) -> Decimal {
        let base = if family {
            self.limit_hsa_family
        } else {
            self.limit_hsa_single
        };
        if age >= self.hsa_catch_up_age {
            base + self.catch_up_hsa
        } else {
            base
        }
    }
}

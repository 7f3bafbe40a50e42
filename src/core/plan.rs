use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::types::{FinancialProfile, MajorExpense, PlanKind, PlanParameters, SpouseParameters};

/// System-wide fallbacks, the lowest resolution layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanDefaults {
    pub inflation_rate: Decimal,
    pub portfolio_growth_rate: Decimal,
    pub bond_growth_rate: Decimal,
    pub retirement_age: u32,
    pub social_security_claim_age: u32,
    pub social_security_benefit: Decimal,
    pub pension_income: Decimal,
    pub desired_retirement_spending: Decimal,
    pub end_age: u32,
    pub spouse_retirement_age: u32,
}

impl Default for PlanDefaults {
    fn default() -> Self {
        Self {
            inflation_rate: dec!(0.03),
            portfolio_growth_rate: dec!(0.07),
            bond_growth_rate: dec!(0.04),
            retirement_age: 65,
            social_security_claim_age: 67,
            social_security_benefit: Decimal::ZERO,
            pension_income: Decimal::ZERO,
            desired_retirement_spending: dec!(80000),
            end_age: 95,
            spouse_retirement_age: 65,
        }
    }
}

/// Per-plan overrides, the highest resolution layer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlanOverrides {
    pub start_age: Option<u32>,
    pub retirement_age: Option<u32>,
    pub end_age: Option<u32>,
    pub start_year: Option<i32>,
    pub social_security_claim_age: Option<u32>,
    pub social_security_benefit: Option<Decimal>,
    pub portfolio_growth_rate: Option<Decimal>,
    pub bond_growth_rate: Option<Decimal>,
    pub inflation_rate: Option<Decimal>,
    pub pension_income: Option<Decimal>,
    pub desired_retirement_spending: Option<Decimal>,
    pub major_expenses: Option<Vec<MajorExpense>>,
    pub spouse_retirement_age: Option<u32>,
    pub spouse_social_security_claim_age: Option<u32>,
    pub spouse_social_security_benefit: Option<Decimal>,
    pub spouse_pension_income: Option<Decimal>,
    pub kind: Option<PlanKind>,
}

/// Builds the effective parameters for one run.
///
/// Each field comes from the first layer that sets it: `overrides`, then the
/// profile's stored assumptions, then `defaults`. The plan starts at the
/// profile's age in `current_year` unless overridden.
///
/// Retirement never precedes the start age and the horizon never precedes
/// retirement. Moving the start age moves the spouse's age by the same amount.
pub fn resolve_plan(
    profile: &FinancialProfile,
    overrides: &PlanOverrides,
    defaults: &PlanDefaults,
    current_year: i32,
) -> PlanParameters {
    let stored = &profile.assumptions;

    let start_age = overrides.start_age.unwrap_or(profile.age);
    let retirement_age = overrides
        .retirement_age
        .or(stored.retirement_age)
        .unwrap_or(defaults.retirement_age)
        .max(start_age);
    let end_age = overrides
        .end_age
        .unwrap_or(defaults.end_age)
        .max(retirement_age);

    let spouse = profile.spouse_age.map(|spouse_age| {
        let spouse_start = spouse_age
            .saturating_add(start_age.saturating_sub(profile.age))
            .saturating_sub(profile.age.saturating_sub(start_age));
        SpouseParameters {
            start_age: spouse_start,
            retirement_age: overrides
                .spouse_retirement_age
                .or(stored.spouse_retirement_age)
                .unwrap_or(defaults.spouse_retirement_age)
                .max(spouse_start),
            social_security_claim_age: Some(
                overrides
                    .spouse_social_security_claim_age
                    .unwrap_or(defaults.social_security_claim_age),
            ),
            social_security_benefit: overrides
                .spouse_social_security_benefit
                .unwrap_or(Decimal::ZERO),
            pension_income: overrides.spouse_pension_income.unwrap_or(Decimal::ZERO),
        }
    });

    PlanParameters {
        start_age,
        retirement_age,
        end_age,
        start_year: overrides.start_year.unwrap_or(current_year),
        spouse,
        social_security_claim_age: Some(
            overrides
                .social_security_claim_age
                .or(stored.social_security_claim_age)
                .unwrap_or(defaults.social_security_claim_age),
        ),
        social_security_benefit: overrides
            .social_security_benefit
            .or(stored.social_security_benefit)
            .unwrap_or(defaults.social_security_benefit),
        portfolio_growth_rate: overrides
            .portfolio_growth_rate
            .or(stored.portfolio_growth_rate)
            .unwrap_or(defaults.portfolio_growth_rate),
        bond_growth_rate: overrides
            .bond_growth_rate
            .or(stored.bond_growth_rate)
            .unwrap_or(defaults.bond_growth_rate),
        inflation_rate: overrides
            .inflation_rate
            .or(stored.inflation_rate)
            .unwrap_or(defaults.inflation_rate),
        pension_income: overrides
            .pension_income
            .or(stored.pension_income)
            .unwrap_or(defaults.pension_income),
        desired_retirement_spending: overrides
            .desired_retirement_spending
            .or(stored.desired_retirement_spending)
            .unwrap_or(defaults.desired_retirement_spending),
        major_expenses: overrides.major_expenses.clone().unwrap_or_default(),
        kind: overrides.kind.unwrap_or_default(),
    }
}

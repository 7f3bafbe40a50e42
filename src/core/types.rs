use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountKind {
    Savings,
    Checking,
    Brokerage,
    #[serde(rename = "401k", alias = "retirement-401k")]
    Retirement401k,
    #[serde(rename = "ira", alias = "traditional-ira")]
    TraditionalIra,
    #[serde(rename = "roth", alias = "roth-ira")]
    RothIra,
    Hsa,
}

impl AccountKind {
    pub fn label(self) -> &'static str {
        match self {
            AccountKind::Savings => "Savings",
            AccountKind::Checking => "Checking",
            AccountKind::Brokerage => "Brokerage",
            AccountKind::Retirement401k => "401(k)",
            AccountKind::TraditionalIra => "Traditional IRA",
            AccountKind::RothIra => "Roth IRA",
            AccountKind::Hsa => "HSA",
        }
    }

    pub fn asset_class(self) -> AssetClass {
        match self {
            AccountKind::Savings | AccountKind::Checking => AssetClass::Cash,
            AccountKind::Brokerage => AssetClass::Investment,
            AccountKind::Retirement401k | AccountKind::TraditionalIra | AccountKind::RothIra => {
                AssetClass::Retirement
            }
            AccountKind::Hsa => AssetClass::Hsa,
        }
    }

    pub fn is_cash(self) -> bool {
        matches!(self, AccountKind::Savings | AccountKind::Checking)
    }

    /// Withdrawals from these accounts are ordinary income.
    pub fn is_tax_deferred(self) -> bool {
        matches!(self, AccountKind::Retirement401k | AccountKind::TraditionalIra)
    }

    /// Contributions to these accounts reduce taxable wages.
    pub fn is_pre_tax(self) -> bool {
        matches!(
            self,
            AccountKind::Retirement401k | AccountKind::TraditionalIra | AccountKind::Hsa
        )
    }

    /// Position in the withdrawal order; lower ranks are drawn first.
    pub fn withdrawal_rank(self) -> u8 {
        match self {
            AccountKind::Savings => 0,
            AccountKind::Checking => 1,
            AccountKind::Brokerage => 2,
            AccountKind::Retirement401k => 3,
            AccountKind::TraditionalIra => 4,
            AccountKind::RothIra => 5,
            AccountKind::Hsa => 6,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetClass {
    Cash,
    Investment,
    Retirement,
    Hsa,
    RealEstate,
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub kind: AccountKind,
    #[serde(default)]
    pub name: Option<String>,
    pub balance: Decimal,
    #[serde(default)]
    pub annual_contribution: Decimal,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DebtKind {
    Mortgage,
    #[serde(alias = "creditCard")]
    CreditCard,
    #[serde(alias = "studentLoan")]
    StudentLoan,
    Auto,
    Other,
}

impl DebtKind {
    pub fn label(self) -> &'static str {
        match self {
            DebtKind::Mortgage => "Primary Mortgage",
            DebtKind::CreditCard => "Credit Card",
            DebtKind::StudentLoan => "Student Loan",
            DebtKind::Auto => "Auto Loan",
            DebtKind::Other => "Other Debt",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Debt {
    pub kind: DebtKind,
    #[serde(default)]
    pub name: Option<String>,
    pub balance: Decimal,
    #[serde(default)]
    pub annual_payment: Decimal,
}

/// A recurring income outside wages and retirement benefits (rental, royalties).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeStream {
    pub source: String,
    pub annual_amount: Decimal,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HsaCoverage {
    #[default]
    Single,
    Family,
}

/// Planning preferences stored on the profile. Unset fields fall back to
/// system defaults when a plan is resolved.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProfileAssumptions {
    pub inflation_rate: Option<Decimal>,
    pub portfolio_growth_rate: Option<Decimal>,
    pub bond_growth_rate: Option<Decimal>,
    pub retirement_age: Option<u32>,
    pub social_security_claim_age: Option<u32>,
    pub social_security_benefit: Option<Decimal>,
    pub pension_income: Option<Decimal>,
    pub desired_retirement_spending: Option<Decimal>,
    pub spouse_retirement_age: Option<u32>,
}

/// Current finances of the household. Owned by the caller for one run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FinancialProfile {
    pub age: u32,
    pub spouse_age: Option<u32>,
    pub income: Decimal,
    pub income_growth_rate: Decimal,
    pub spouse_income: Decimal,
    pub spouse_income_growth_rate: Decimal,
    pub other_income: Vec<IncomeStream>,
    /// Category name to monthly amount.
    pub monthly_expenses: BTreeMap<String, Decimal>,
    pub accounts: Vec<Account>,
    pub hsa_coverage: HsaCoverage,
    pub debts: Vec<Debt>,
    pub real_estate_value: Decimal,
    pub other_assets_value: Decimal,
    pub assumptions: ProfileAssumptions,
}

impl FinancialProfile {
    pub fn has_spouse(&self) -> bool {
        self.spouse_age.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpouseParameters {
    pub start_age: u32,
    pub retirement_age: u32,
    #[serde(default)]
    pub social_security_claim_age: Option<u32>,
    #[serde(default)]
    pub social_security_benefit: Decimal,
    #[serde(default)]
    pub pension_income: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MajorExpense {
    pub amount: Decimal,
    /// Years after the plan's start year in which the expense lands.
    pub year_offset: u32,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanKind {
    #[default]
    Primary,
    Alternative,
}

/// Oldest age any plan may reach.
pub const MAX_PLAN_AGE: u32 = 120;

/// Rates, ages and policy toggles for one projection run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanParameters {
    pub start_age: u32,
    pub retirement_age: u32,
    pub end_age: u32,
    /// Calendar year of `start_age`.
    pub start_year: i32,
    pub spouse: Option<SpouseParameters>,
    pub social_security_claim_age: Option<u32>,
    pub social_security_benefit: Decimal,
    pub portfolio_growth_rate: Decimal,
    pub bond_growth_rate: Decimal,
    pub inflation_rate: Decimal,
    pub pension_income: Decimal,
    pub desired_retirement_spending: Decimal,
    pub major_expenses: Vec<MajorExpense>,
    pub kind: PlanKind,
}

impl PlanParameters {
    pub fn year_count(&self) -> usize {
        usize::try_from(self.end_age.saturating_sub(self.start_age))
            .map(|span| span.saturating_add(1))
            .unwrap_or(usize::MAX)
    }

    /// `None` when the calendar year does not fit an `i32`.
    pub fn year_at_age(&self, age: u32) -> Option<i32> {
        let age = i32::try_from(age).ok()?;
        let start_age = i32::try_from(self.start_age).ok()?;
        self.start_year.checked_add(age.checked_sub(start_age)?)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    PreRetirement,
    Retired,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeRow {
    pub source: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseRow {
    pub category: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRow {
    pub name: String,
    #[serde(rename = "type")]
    pub class: AssetClass,
    pub balance: Decimal,
    pub growth: Decimal,
    pub contribution: Decimal,
    pub withdrawal: Decimal,
    /// A withdrawal asked for more than the account held; the balance was floored at zero.
    pub clamped: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiabilityRow {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DebtKind,
    pub balance: Decimal,
    pub payment: Decimal,
}

/// One simulated year of a plan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnualSnapshot {
    pub year: i32,
    pub age: u32,
    pub phase: Phase,
    pub gross_income: Decimal,
    pub net_income: Decimal,
    pub total_expenses: Decimal,
    pub total_assets: Decimal,
    pub total_liabilities: Decimal,
    pub net_worth: Decimal,
    pub taxes_paid: Decimal,
    pub cumulative_tax: Decimal,
    /// Spending the accounts could not fund this year.
    pub shortfall: Decimal,
    pub income: Vec<IncomeRow>,
    pub expenses: Vec<ExpenseRow>,
    pub assets: Vec<AssetRow>,
    pub liabilities: Vec<LiabilityRow>,
}

impl AnnualSnapshot {
    pub fn has_shortfall(&self) -> bool {
        self.shortfall > Decimal::ZERO || self.assets.iter().any(|a| a.clamped)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub total_lifetime_tax: Decimal,
    pub final_net_worth: Decimal,
    pub shortfall_years: Vec<i32>,
}

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, debug_span, warn};

use super::calc::{
    apply_inflation, checked_add, checked_mul, checked_sub, checked_sum, compound, round_money,
};
use super::error::{EngineError, EngineResult};
use super::tax::{BracketTable, ContributionLimits, SOCIAL_SECURITY_TAXABLE_SHARE, tax_on_gross};
use super::types::{
    AccountKind, AnnualSnapshot, AssetClass, AssetRow, DebtKind, ExpenseRow, FinancialProfile,
    HsaCoverage, IncomeRow, LiabilityRow, MAX_PLAN_AGE, Phase, PlanParameters, PlanSummary,
};

const MONTHS_PER_YEAR: Decimal = dec!(12);
pub const MIN_SOCIAL_SECURITY_CLAIM_AGE: u32 = 62;
pub const MAX_SOCIAL_SECURITY_CLAIM_AGE: u32 = 70;

#[derive(Debug, Clone, PartialEq, Eq)]
struct AccountState {
    kind: AccountKind,
    name: String,
    balance: Decimal,
    annual_contribution: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DebtState {
    kind: DebtKind,
    name: String,
    balance: Decimal,
    annual_payment: Decimal,
}

/// Ending position of one simulated year. Nothing else is carried forward.
#[derive(Debug, Clone, PartialEq, Eq)]
struct YearState {
    salary: Decimal,
    spouse_salary: Decimal,
    accounts: Vec<AccountState>,
    real_estate: Decimal,
    other_assets: Decimal,
    debts: Vec<DebtState>,
    cumulative_tax: Decimal,
}

/// Immutable inputs shared by every year of one run.
struct Projection<'a> {
    profile: &'a FinancialProfile,
    params: &'a PlanParameters,
    brackets: &'a BracketTable,
    limits: ContributionLimits,
}

#[derive(Debug, Default)]
struct HouseholdIncome {
    rows: Vec<IncomeRow>,
    gross: Decimal,
    ordinary_taxable: Decimal,
    next_salary: Decimal,
    next_spouse_salary: Decimal,
}

/// Per-account withdrawals accumulated over one year's funding passes.
#[derive(Debug)]
struct Draws {
    amounts: Vec<Decimal>,
    clamped: Vec<bool>,
    unmet: Decimal,
}

impl Draws {
    fn new(len: usize) -> Self {
        Self {
            amounts: vec![Decimal::ZERO; len],
            clamped: vec![false; len],
            unmet: Decimal::ZERO,
        }
    }

    fn total(&self) -> EngineResult<Decimal> {
        checked_sum(self.amounts.iter().copied(), "total withdrawals")
    }

    fn tax_deferred(&self, accounts: &[AccountState]) -> EngineResult<Decimal> {
        checked_sum(
            accounts
                .iter()
                .zip(&self.amounts)
                .filter(|(acct, _)| acct.kind.is_tax_deferred())
                .map(|(_, amount)| *amount),
            "tax-deferred withdrawals",
        )
    }

    /// Draws `request` in withdrawal order, never past an account's capacity.
    fn take(
        &mut self,
        request: Decimal,
        accounts: &[AccountState],
        capacity: &[Decimal],
    ) -> EngineResult<()> {
        let mut remaining = round_money(request);
        let mut drained = Vec::new();
        for idx in withdrawal_order(accounts) {
            if remaining <= Decimal::ZERO {
                break;
            }
            let left = checked_sub(capacity[idx], self.amounts[idx], "account capacity")?
                .max(Decimal::ZERO);
            let taken = remaining.min(left);
            if remaining > left {
                drained.push(idx);
            }
            self.amounts[idx] = checked_add(self.amounts[idx], taken, "account withdrawal")?;
            remaining = checked_sub(remaining, taken, "withdrawal request")?;
        }
        if remaining > Decimal::ZERO {
            for idx in drained {
                self.clamped[idx] = true;
            }
            self.unmet = checked_add(self.unmet, remaining, "shortfall")?;
        }
        Ok(())
    }
}

fn withdrawal_order(accounts: &[AccountState]) -> Vec<usize> {
    let mut order = (0..accounts.len()).collect::<Vec<_>>();
    order.sort_by_key(|&idx| accounts[idx].kind.withdrawal_rank());
    order
}

/// Projects every age from `start_age` to `end_age` inclusive.
///
/// Each year is a pure transition from the prior year's ending state, so the
/// whole run is a fold over the age range. Either the full sequence is
/// returned or an error is raised before anything is emitted.
pub fn project(
    profile: &FinancialProfile,
    params: &PlanParameters,
    brackets: &BracketTable,
) -> EngineResult<Vec<AnnualSnapshot>> {
    validate_plan(profile, params, brackets)?;

    let _span = debug_span!(
        "project",
        start_age = params.start_age,
        end_age = params.end_age,
        kind = ?params.kind
    )
    .entered();

    let plan = Projection {
        profile,
        params,
        brackets,
        limits: ContributionLimits::federal_2024(),
    };

    let opening = opening_state(profile);
    let (_, snapshots) = (params.start_age..=params.end_age).try_fold(
        (opening, Vec::with_capacity(params.year_count())),
        |(state, mut snapshots), age| {
            let (next, snapshot) = step(&state, &plan, age)?;
            if snapshot.has_shortfall() {
                warn!(
                    year = snapshot.year,
                    age = snapshot.age,
                    shortfall = %snapshot.shortfall,
                    "accounts could not fund the year's spending"
                );
            }
            snapshots.push(snapshot);
            Ok::<_, EngineError>((next, snapshots))
        },
    )?;

    debug!(
        years = snapshots.len(),
        final_net_worth = %snapshots.last().map(|s| s.net_worth).unwrap_or_default(),
        "projection complete"
    );
    Ok(snapshots)
}

pub fn summarize(snapshots: &[AnnualSnapshot]) -> EngineResult<PlanSummary> {
    Ok(PlanSummary {
        total_lifetime_tax: checked_sum(snapshots.iter().map(|s| s.taxes_paid), "lifetime tax")?,
        final_net_worth: snapshots
            .last()
            .map(|s| s.net_worth)
            .unwrap_or(Decimal::ZERO),
        shortfall_years: snapshots
            .iter()
            .filter(|s| s.has_shortfall())
            .map(|s| s.year)
            .collect(),
    })
}

pub fn find_snapshot(snapshots: &[AnnualSnapshot], year: i32) -> Option<&AnnualSnapshot> {
    snapshots.iter().find(|s| s.year == year)
}

pub fn phase_at(params: &PlanParameters, age: u32) -> Phase {
    if age >= params.retirement_age {
        Phase::Retired
    } else {
        Phase::PreRetirement
    }
}

pub fn validate_plan(
    profile: &FinancialProfile,
    params: &PlanParameters,
    brackets: &BracketTable,
) -> EngineResult<()> {
    if params.retirement_age < params.start_age {
        return Err(EngineError::invalid("retirement age must be >= start age"));
    }
    if params.end_age < params.retirement_age {
        return Err(EngineError::invalid("end age must be >= retirement age"));
    }
    check_age("end age", params.end_age)?;
    if params.year_at_age(params.end_age).is_none() {
        return Err(EngineError::invalid("start year is out of range"));
    }
    validate_claim_age("social security claim age", params.social_security_claim_age)?;

    match (&params.spouse, profile.spouse_age) {
        (Some(spouse), Some(_)) => {
            check_age("spouse retirement age", spouse.retirement_age)?;
            if spouse.retirement_age < spouse.start_age {
                return Err(EngineError::invalid(
                    "spouse retirement age must be >= spouse start age",
                ));
            }
            validate_claim_age(
                "spouse social security claim age",
                spouse.social_security_claim_age,
            )?;
            check_money("spouse social security benefit", spouse.social_security_benefit)?;
            check_money("spouse pension income", spouse.pension_income)?;
        }
        (Some(_), None) => {
            return Err(EngineError::invalid(
                "spouse parameters were given but the profile has no spouse",
            ));
        }
        _ => {}
    }
    if let Some(spouse_age) = profile.spouse_age {
        check_age("spouse age", spouse_age)?;
    }

    check_rate("portfolio growth rate", params.portfolio_growth_rate)?;
    check_rate("bond growth rate", params.bond_growth_rate)?;
    check_rate("inflation rate", params.inflation_rate)?;
    check_rate("income growth rate", profile.income_growth_rate)?;
    check_rate("spouse income growth rate", profile.spouse_income_growth_rate)?;

    check_money("social security benefit", params.social_security_benefit)?;
    check_money("pension income", params.pension_income)?;
    check_money(
        "desired retirement spending",
        params.desired_retirement_spending,
    )?;
    for expense in &params.major_expenses {
        check_money("major expense", expense.amount)?;
    }

    check_money("income", profile.income)?;
    check_money("spouse income", profile.spouse_income)?;
    check_money("real estate value", profile.real_estate_value)?;
    check_money("other assets value", profile.other_assets_value)?;
    for stream in &profile.other_income {
        check_money("other income", stream.annual_amount)?;
    }
    for amount in profile.monthly_expenses.values() {
        check_money("monthly expense", *amount)?;
    }
    for account in &profile.accounts {
        check_money("account balance", account.balance)?;
        check_money("account contribution", account.annual_contribution)?;
    }
    for debt in &profile.debts {
        check_money("debt balance", debt.balance)?;
        check_money("debt payment", debt.annual_payment)?;
    }

    brackets.validate()
}

fn validate_claim_age(label: &str, claim_age: Option<u32>) -> EngineResult<()> {
    match claim_age {
        Some(age)
            if !(MIN_SOCIAL_SECURITY_CLAIM_AGE..=MAX_SOCIAL_SECURITY_CLAIM_AGE).contains(&age) =>
        {
            Err(EngineError::invalid(format!(
                "{label} must be between {MIN_SOCIAL_SECURITY_CLAIM_AGE} and {MAX_SOCIAL_SECURITY_CLAIM_AGE}"
            )))
        }
        _ => Ok(()),
    }
}

fn check_age(label: &str, age: u32) -> EngineResult<()> {
    if age > MAX_PLAN_AGE {
        return Err(EngineError::invalid(format!(
            "{label} must be <= {MAX_PLAN_AGE}"
        )));
    }
    Ok(())
}

fn check_rate(label: &str, rate: Decimal) -> EngineResult<()> {
    if rate <= -Decimal::ONE || rate > Decimal::ONE {
        return Err(EngineError::invalid(format!(
            "{label} must be > -100% and <= 100%"
        )));
    }
    Ok(())
}

fn check_money(label: &str, amount: Decimal) -> EngineResult<()> {
    if amount < Decimal::ZERO {
        return Err(EngineError::invalid(format!("{label} must be >= 0")));
    }
    Ok(())
}

fn opening_state(profile: &FinancialProfile) -> YearState {
    let mut accounts = profile
        .accounts
        .iter()
        .map(|acct| AccountState {
            kind: acct.kind,
            name: acct
                .name
                .clone()
                .unwrap_or_else(|| acct.kind.label().to_string()),
            balance: round_money(acct.balance),
            annual_contribution: round_money(acct.annual_contribution),
        })
        .collect::<Vec<_>>();

    // Surplus income needs somewhere to land.
    if !accounts.iter().any(|a| a.kind.is_cash()) {
        accounts.insert(
            0,
            AccountState {
                kind: AccountKind::Savings,
                name: AccountKind::Savings.label().to_string(),
                balance: Decimal::ZERO,
                annual_contribution: Decimal::ZERO,
            },
        );
    }

    YearState {
        salary: round_money(profile.income),
        spouse_salary: round_money(profile.spouse_income),
        accounts,
        real_estate: round_money(profile.real_estate_value),
        other_assets: round_money(profile.other_assets_value),
        debts: profile
            .debts
            .iter()
            .map(|debt| DebtState {
                kind: debt.kind,
                name: debt
                    .name
                    .clone()
                    .unwrap_or_else(|| debt.kind.label().to_string()),
                balance: round_money(debt.balance),
                annual_payment: round_money(debt.annual_payment),
            })
            .collect(),
        cumulative_tax: Decimal::ZERO,
    }
}

fn growth_rate(params: &PlanParameters, kind: AccountKind) -> Decimal {
    if kind.is_cash() {
        params.bond_growth_rate
    } else {
        params.portfolio_growth_rate
    }
}

/// One year's transition: `(prior_state, age) -> (new_state, snapshot)`.
fn step(prior: &YearState, plan: &Projection<'_>, age: u32) -> EngineResult<(YearState, AnnualSnapshot)> {
    let params = plan.params;
    let offset = age - params.start_age;
    let phase = phase_at(params, age);

    let household = household_income(prior, plan, age, offset, phase)?;

    let contributions = match phase {
        Phase::PreRetirement => plan_contributions(prior, plan, age),
        Phase::Retired => vec![Decimal::ZERO; prior.accounts.len()],
    };
    let contributed = checked_sum(contributions.iter().copied(), "contributions")?;
    let pre_tax = checked_sum(
        prior
            .accounts
            .iter()
            .zip(&contributions)
            .filter(|(acct, _)| acct.kind.is_pre_tax())
            .map(|(_, c)| *c),
        "pre-tax contributions",
    )?;

    let debt_payments = prior
        .debts
        .iter()
        .map(|debt| debt.annual_payment.min(debt.balance))
        .collect::<Vec<_>>();
    let expenses = year_expenses(plan, offset, phase, &debt_payments)?;
    let total_expenses = checked_sum(expenses.iter().map(|e| e.amount), "total expenses")?;

    let taxable_wages =
        checked_sub(household.ordinary_taxable, pre_tax, "taxable income")?.max(Decimal::ZERO);
    let base_tax = round_money(tax_on_gross(taxable_wages, plan.brackets)?);

    let spendable = checked_sub(
        checked_sub(household.gross, base_tax, "after-tax income")?,
        contributed,
        "spendable income",
    )?;
    let cash_flow = checked_sub(spendable, total_expenses, "cash flow")?;

    let capacity = prior
        .accounts
        .iter()
        .zip(&contributions)
        .map(|(acct, c)| {
            compound(acct.balance, growth_rate(params, acct.kind), *c, Decimal::ZERO)
                .map(round_money)
        })
        .collect::<EngineResult<Vec<_>>>()?;

    let mut deposits = vec![Decimal::ZERO; prior.accounts.len()];
    let mut draws = Draws::new(prior.accounts.len());
    let mut taxes_paid = base_tax;

    if cash_flow >= Decimal::ZERO {
        // Retired households leave surplus income unspent.
        if phase == Phase::PreRetirement {
            if let Some(idx) = prior.accounts.iter().position(|a| a.kind.is_cash()) {
                deposits[idx] = round_money(cash_flow);
            }
        }
    } else {
        draws.take(-cash_flow, &prior.accounts, &capacity)?;
        let deferred = draws.tax_deferred(&prior.accounts)?;
        if deferred > Decimal::ZERO {
            let with_draws = checked_add(taxable_wages, deferred, "taxable withdrawals")?;
            taxes_paid = round_money(tax_on_gross(with_draws, plan.brackets)?);
            let top_up = checked_sub(taxes_paid, base_tax, "withdrawal tax")?;
            if top_up > Decimal::ZERO {
                draws.take(top_up, &prior.accounts, &capacity)?;
            }
        }
    }

    let mut accounts = Vec::with_capacity(prior.accounts.len());
    let mut asset_rows = Vec::with_capacity(prior.accounts.len() + 2);
    for (idx, acct) in prior.accounts.iter().enumerate() {
        let rate = growth_rate(params, acct.kind);
        let inflow = checked_add(contributions[idx], deposits[idx], "account inflow")?;
        let withdrawal = draws.amounts[idx];
        let mut balance = round_money(compound(acct.balance, rate, inflow, withdrawal)?);
        let mut clamped = draws.clamped[idx];
        if balance < Decimal::ZERO {
            balance = Decimal::ZERO;
            clamped = true;
        }
        asset_rows.push(AssetRow {
            name: acct.name.clone(),
            class: acct.kind.asset_class(),
            balance,
            growth: round_money(checked_mul(acct.balance, rate, "account growth")?),
            contribution: inflow,
            withdrawal,
            clamped,
        });
        accounts.push(AccountState {
            balance,
            ..acct.clone()
        });
    }

    let real_estate = round_money(compound(
        prior.real_estate,
        params.inflation_rate,
        Decimal::ZERO,
        Decimal::ZERO,
    )?);
    if prior.real_estate > Decimal::ZERO {
        asset_rows.push(AssetRow {
            name: "Real Estate".to_string(),
            class: AssetClass::RealEstate,
            balance: real_estate,
            growth: checked_sub(real_estate, prior.real_estate, "real estate growth")?,
            contribution: Decimal::ZERO,
            withdrawal: Decimal::ZERO,
            clamped: false,
        });
    }
    if prior.other_assets > Decimal::ZERO {
        asset_rows.push(AssetRow {
            name: "Other Assets".to_string(),
            class: AssetClass::Other,
            balance: prior.other_assets,
            growth: Decimal::ZERO,
            contribution: Decimal::ZERO,
            withdrawal: Decimal::ZERO,
            clamped: false,
        });
    }

    let mut debts = Vec::with_capacity(prior.debts.len());
    let mut liability_rows = Vec::with_capacity(prior.debts.len());
    for (debt, payment) in prior.debts.iter().zip(&debt_payments) {
        let balance = checked_sub(debt.balance, *payment, "debt principal")?;
        if balance > Decimal::ZERO || *payment > Decimal::ZERO {
            liability_rows.push(LiabilityRow {
                name: debt.name.clone(),
                kind: debt.kind,
                balance,
                payment: *payment,
            });
        }
        debts.push(DebtState {
            balance,
            ..debt.clone()
        });
    }

    let withdrawn = draws.total()?;
    let mut income_rows = household.rows;
    if withdrawn > Decimal::ZERO {
        income_rows.push(IncomeRow {
            source: "Portfolio Withdrawals".to_string(),
            amount: withdrawn,
        });
    }
    let gross_income = checked_add(household.gross, withdrawn, "gross income")?;
    let net_income = checked_sub(
        checked_sub(gross_income, taxes_paid, "net income")?,
        contributed,
        "net income",
    )?;

    let total_assets = checked_sum(asset_rows.iter().map(|a| a.balance), "total assets")?;
    let total_liabilities = checked_sum(
        liability_rows.iter().map(|l| l.balance),
        "total liabilities",
    )?;
    let cumulative_tax = checked_add(prior.cumulative_tax, taxes_paid, "cumulative tax")?;

    let snapshot = AnnualSnapshot {
        year: params
            .year_at_age(age)
            .ok_or_else(|| EngineError::overflow("snapshot year"))?,
        age,
        phase,
        gross_income,
        net_income,
        total_expenses,
        total_assets,
        total_liabilities,
        net_worth: checked_sub(total_assets, total_liabilities, "net worth")?,
        taxes_paid,
        cumulative_tax,
        shortfall: draws.unmet,
        income: income_rows,
        expenses,
        assets: asset_rows,
        liabilities: liability_rows,
    };

    let next = YearState {
        salary: household.next_salary,
        spouse_salary: household.next_spouse_salary,
        accounts,
        real_estate,
        other_assets: prior.other_assets,
        debts,
        cumulative_tax,
    };

    Ok((next, snapshot))
}

fn household_income(
    prior: &YearState,
    plan: &Projection<'_>,
    age: u32,
    offset: u32,
    phase: Phase,
) -> EngineResult<HouseholdIncome> {
    let params = plan.params;
    let profile = plan.profile;
    let inflation = params.inflation_rate;
    let mut income = HouseholdIncome {
        next_salary: prior.salary,
        next_spouse_salary: prior.spouse_salary,
        ..HouseholdIncome::default()
    };

    match phase {
        Phase::PreRetirement => {
            income.add("Salary", prior.salary, Decimal::ONE)?;
            income.next_salary = grow_wage(prior.salary, profile.income_growth_rate)?;
        }
        Phase::Retired => {
            if let Some(claim_age) = params.social_security_claim_age {
                if age >= claim_age {
                    let benefit = apply_inflation(
                        params.social_security_benefit,
                        inflation,
                        age - claim_age,
                    )?;
                    income.add(
                        "Social Security",
                        round_money(benefit),
                        SOCIAL_SECURITY_TAXABLE_SHARE,
                    )?;
                }
            }
            let pension = apply_inflation(params.pension_income, inflation, offset)?;
            income.add("Pension", round_money(pension), Decimal::ONE)?;
        }
    }

    if let Some(profile_spouse_age) = profile.spouse_age {
        let (spouse_age, spouse_retirement_age) = match &params.spouse {
            Some(spouse) => (spouse.start_age + offset, spouse.retirement_age),
            None => (
                profile_spouse_age + offset,
                profile_spouse_age + (params.retirement_age - params.start_age),
            ),
        };
        if spouse_age < spouse_retirement_age {
            income.add("Spouse Salary", prior.spouse_salary, Decimal::ONE)?;
            income.next_spouse_salary =
                grow_wage(prior.spouse_salary, profile.spouse_income_growth_rate)?;
        } else if let Some(spouse) = &params.spouse {
            if let Some(claim_age) = spouse.social_security_claim_age {
                if spouse_age >= claim_age {
                    let benefit = apply_inflation(
                        spouse.social_security_benefit,
                        inflation,
                        spouse_age - claim_age,
                    )?;
                    income.add(
                        "Spouse Social Security",
                        round_money(benefit),
                        SOCIAL_SECURITY_TAXABLE_SHARE,
                    )?;
                }
            }
            let pension = apply_inflation(spouse.pension_income, inflation, offset)?;
            income.add("Spouse Pension", round_money(pension), Decimal::ONE)?;
        }
    }

    for stream in &profile.other_income {
        let amount = apply_inflation(stream.annual_amount, inflation, offset)?;
        income.add(&stream.source, round_money(amount), Decimal::ONE)?;
    }

    Ok(income)
}

impl HouseholdIncome {
    fn add(&mut self, source: &str, amount: Decimal, taxable_share: Decimal) -> EngineResult<()> {
        if amount <= Decimal::ZERO {
            return Ok(());
        }
        self.gross = checked_add(self.gross, amount, "gross income")?;
        let taxable = checked_mul(amount, taxable_share, "taxable income")?;
        self.ordinary_taxable = checked_add(self.ordinary_taxable, taxable, "taxable income")?;
        self.rows.push(IncomeRow {
            source: source.to_string(),
            amount,
        });
        Ok(())
    }
}

fn grow_wage(wage: Decimal, growth_rate: Decimal) -> EngineResult<Decimal> {
    compound(wage, growth_rate, Decimal::ZERO, Decimal::ZERO).map(round_money)
}

/// Profile contributions, capped by the annual limits for tax-advantaged accounts.
fn plan_contributions(prior: &YearState, plan: &Projection<'_>, age: u32) -> Vec<Decimal> {
    let limits = &plan.limits;
    let earners = if plan.profile.has_spouse() {
        Decimal::TWO
    } else {
        Decimal::ONE
    };
    let mut employer_room = limits.employer_plan(age) * earners;
    let mut ira_room = limits.ira(age) * earners;
    let mut hsa_room = limits.hsa(age, plan.profile.hsa_coverage == HsaCoverage::Family);

    let mut contributions = Vec::with_capacity(prior.accounts.len());
    for acct in &prior.accounts {
        let requested = acct.annual_contribution.max(Decimal::ZERO);
        let room = match acct.kind {
            AccountKind::Retirement401k => Some(&mut employer_room),
            AccountKind::TraditionalIra | AccountKind::RothIra => Some(&mut ira_room),
            AccountKind::Hsa => Some(&mut hsa_room),
            AccountKind::Savings | AccountKind::Checking | AccountKind::Brokerage => None,
        };
        let amount = match room {
            Some(room) => {
                let capped = requested.min(*room);
                *room -= capped;
                capped
            }
            None => requested,
        };
        contributions.push(amount);
    }
    contributions
}

fn year_expenses(
    plan: &Projection<'_>,
    offset: u32,
    phase: Phase,
    debt_payments: &[Decimal],
) -> EngineResult<Vec<ExpenseRow>> {
    let params = plan.params;
    let inflation = params.inflation_rate;
    let mut rows = Vec::new();

    match phase {
        Phase::PreRetirement => {
            for (category, monthly) in &plan.profile.monthly_expenses {
                let annual = checked_mul(*monthly, MONTHS_PER_YEAR, "annual expense")?;
                let amount = round_money(apply_inflation(annual, inflation, offset)?);
                rows.push(ExpenseRow {
                    category: category.clone(),
                    amount,
                });
            }
        }
        Phase::Retired => {
            let spending =
                apply_inflation(params.desired_retirement_spending, inflation, offset)?;
            rows.push(ExpenseRow {
                category: "Retirement Spending".to_string(),
                amount: round_money(spending),
            });
        }
    }

    let debt_total = checked_sum(debt_payments.iter().copied(), "debt payments")?;
    if debt_total > Decimal::ZERO {
        rows.push(ExpenseRow {
            category: "Debt Payments".to_string(),
            amount: debt_total,
        });
    }

    for expense in params
        .major_expenses
        .iter()
        .filter(|e| e.year_offset == offset)
    {
        rows.push(ExpenseRow {
            category: expense
                .description
                .clone()
                .unwrap_or_else(|| "Major Expense".to_string()),
            amount: round_money(expense.amount),
        });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tax::TaxBracket;
    use crate::core::types::{
        Account, Debt, IncomeStream, MajorExpense, PlanKind, SpouseParameters,
    };
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};
    use std::collections::BTreeMap;

    fn account(kind: AccountKind, balance: Decimal, contribution: Decimal) -> Account {
        Account {
            kind,
            name: None,
            balance,
            annual_contribution: contribution,
        }
    }

    fn sample_profile() -> FinancialProfile {
        let mut monthly_expenses = BTreeMap::new();
        monthly_expenses.insert("Housing".to_string(), dec!(2000));
        monthly_expenses.insert("Food".to_string(), dec!(600));
        FinancialProfile {
            age: 30,
            income: dec!(85000),
            income_growth_rate: dec!(0.03),
            monthly_expenses,
            accounts: vec![
                account(AccountKind::Savings, dec!(10000), Decimal::ZERO),
                account(AccountKind::Brokerage, dec!(50000), dec!(5000)),
                account(AccountKind::Retirement401k, dec!(80000), dec!(12000)),
                account(AccountKind::RothIra, dec!(20000), dec!(6500)),
            ],
            debts: vec![Debt {
                kind: DebtKind::StudentLoan,
                name: None,
                balance: dec!(18000),
                annual_payment: dec!(4800),
            }],
            ..FinancialProfile::default()
        }
    }

    fn sample_params() -> PlanParameters {
        PlanParameters {
            start_age: 30,
            retirement_age: 65,
            end_age: 95,
            start_year: 2026,
            spouse: None,
            social_security_claim_age: Some(67),
            social_security_benefit: dec!(28000),
            portfolio_growth_rate: dec!(0.07),
            bond_growth_rate: dec!(0.04),
            inflation_rate: dec!(0.03),
            pension_income: Decimal::ZERO,
            desired_retirement_spending: dec!(80000),
            major_expenses: Vec::new(),
            kind: PlanKind::Primary,
        }
    }

    fn zero_rate_params(start_age: u32, retirement_age: u32, end_age: u32) -> PlanParameters {
        PlanParameters {
            start_age,
            retirement_age,
            end_age,
            social_security_claim_age: None,
            social_security_benefit: Decimal::ZERO,
            portfolio_growth_rate: Decimal::ZERO,
            bond_growth_rate: Decimal::ZERO,
            inflation_rate: Decimal::ZERO,
            desired_retirement_spending: Decimal::ZERO,
            ..sample_params()
        }
    }

    fn no_tax() -> BracketTable {
        BracketTable::default()
    }

    fn asset<'a>(snapshot: &'a AnnualSnapshot, name: &str) -> &'a AssetRow {
        snapshot
            .assets
            .iter()
            .find(|a| a.name == name)
            .unwrap_or_else(|| panic!("missing asset row {name}"))
    }

    fn income_amount(snapshot: &AnnualSnapshot, source: &str) -> Option<Decimal> {
        snapshot
            .income
            .iter()
            .find(|r| r.source == source)
            .map(|r| r.amount)
    }

    fn assert_snapshot_invariants(snapshots: &[AnnualSnapshot]) {
        for snapshot in snapshots {
            let assets: Decimal = snapshot.assets.iter().map(|a| a.balance).sum();
            let liabilities: Decimal = snapshot.liabilities.iter().map(|l| l.balance).sum();
            assert_eq!(snapshot.total_assets, assets, "age {}", snapshot.age);
            assert_eq!(snapshot.total_liabilities, liabilities, "age {}", snapshot.age);
            assert_eq!(snapshot.net_worth, assets - liabilities, "age {}", snapshot.age);
            for row in &snapshot.assets {
                assert!(row.balance >= Decimal::ZERO, "{} negative", row.name);
            }
        }
        for pair in snapshots.windows(2) {
            assert!(pair[1].cumulative_tax >= pair[0].cumulative_tax);
            assert_eq!(pair[1].year, pair[0].year + 1);
            assert_eq!(pair[1].age, pair[0].age + 1);
        }
    }

    #[test]
    fn projects_one_snapshot_per_age_inclusive() {
        let params = sample_params();
        let snapshots = project(
            &sample_profile(),
            &params,
            &BracketTable::federal_2024(crate::core::tax::FilingStatus::Single),
        )
        .expect("valid plan");

        assert_eq!(snapshots.len(), 66);
        assert_eq!(snapshots[0].age, 30);
        assert_eq!(snapshots[0].year, 2026);
        assert_eq!(snapshots[65].age, 95);
        assert_eq!(snapshots[65].year, 2091);
        assert_eq!(snapshots[34].phase, Phase::PreRetirement);
        assert_eq!(snapshots[35].phase, Phase::Retired);
        assert_snapshot_invariants(&snapshots);
    }

    #[test]
    fn zero_rates_keep_income_and_expenses_exactly_at_profile_values() {
        let mut profile = sample_profile();
        profile.income_growth_rate = Decimal::ZERO;
        profile.debts.clear();
        for acct in &mut profile.accounts {
            acct.annual_contribution = Decimal::ZERO;
        }
        let params = zero_rate_params(30, 65, 95);

        let snapshots = project(&profile, &params, &no_tax()).expect("valid plan");

        assert_eq!(snapshots[0].net_income, dec!(85000));
        assert_eq!(snapshots[0].total_expenses, dec!(31200));
        assert_eq!(snapshots[0].gross_income, dec!(85000));
        assert_eq!(snapshots[1].net_income, dec!(85000));
        assert_eq!(snapshots[1].total_expenses, dec!(31200));
        assert_eq!(snapshots[34].net_income, dec!(85000));
    }

    #[test]
    fn oracle_one_pre_retirement_year_matches_hand_calculation() {
        let mut monthly_expenses = BTreeMap::new();
        monthly_expenses.insert("Living".to_string(), dec!(2000));
        let profile = FinancialProfile {
            age: 30,
            income: dec!(50000),
            monthly_expenses,
            accounts: vec![
                account(AccountKind::Savings, dec!(1000), Decimal::ZERO),
                account(AccountKind::Brokerage, dec!(10000), dec!(1000)),
            ],
            ..FinancialProfile::default()
        };
        let params = PlanParameters {
            portfolio_growth_rate: dec!(0.07),
            bond_growth_rate: dec!(0.04),
            ..zero_rate_params(30, 65, 30)
        };
        let err = project(&profile, &params, &no_tax()).expect_err("end before retirement");
        assert!(err.to_string().contains("end age"));

        let params = PlanParameters {
            end_age: 65,
            ..params
        };
        let snapshots = project(&profile, &params, &no_tax()).expect("valid plan");
        let first = &snapshots[0];

        // Hand calculation:
        // Brokerage: 10000 * 1.07 + 1000 contribution = 11700
        // Spendable: 50000 - 0 tax - 1000 contribution = 49000; surplus 49000 - 24000 = 25000
        // Savings: 1000 * 1.04 + 25000 surplus = 26040
        assert_eq!(asset(first, "Brokerage").balance, dec!(11700));
        assert_eq!(asset(first, "Brokerage").growth, dec!(700));
        assert_eq!(asset(first, "Savings").balance, dec!(26040));
        assert_eq!(asset(first, "Savings").contribution, dec!(25000));
        assert_eq!(first.net_income, dec!(49000));
        assert_eq!(first.total_assets, dec!(37740));
        assert_eq!(first.net_worth, dec!(37740));
    }

    #[test]
    fn pre_tax_contributions_reduce_taxable_wages() {
        let profile = FinancialProfile {
            age: 40,
            income: dec!(50000),
            accounts: vec![account(AccountKind::Retirement401k, Decimal::ZERO, dec!(5000))],
            ..FinancialProfile::default()
        };
        let params = zero_rate_params(40, 65, 70);
        let snapshots =
            project(&profile, &params, &BracketTable::flat(dec!(0.10))).expect("valid plan");

        // (50000 - 5000) * 10% = 4500; net = 50000 - 4500 - 5000
        assert_eq!(snapshots[0].taxes_paid, dec!(4500));
        assert_eq!(snapshots[0].net_income, dec!(40500));
    }

    #[test]
    fn contributions_are_capped_at_annual_limits() {
        let profile = FinancialProfile {
            age: 40,
            income: dec!(200000),
            accounts: vec![
                account(AccountKind::Retirement401k, Decimal::ZERO, dec!(30000)),
                account(AccountKind::TraditionalIra, Decimal::ZERO, dec!(5000)),
                account(AccountKind::RothIra, Decimal::ZERO, dec!(5000)),
            ],
            ..FinancialProfile::default()
        };
        let params = zero_rate_params(40, 65, 70);
        let snapshots = project(&profile, &params, &no_tax()).expect("valid plan");

        assert_eq!(asset(&snapshots[0], "401(k)").contribution, dec!(23000));
        assert_eq!(asset(&snapshots[0], "Traditional IRA").contribution, dec!(5000));
        assert_eq!(asset(&snapshots[0], "Roth IRA").contribution, dec!(2000));
        // Catch-up room opens at 50.
        assert_eq!(asset(&snapshots[10], "401(k)").contribution, dec!(30000));
    }

    #[test]
    fn retiring_at_start_age_applies_retired_rules_from_year_zero() {
        let profile = FinancialProfile {
            age: 60,
            income: dec!(90000),
            accounts: vec![account(AccountKind::Brokerage, dec!(500000), Decimal::ZERO)],
            ..FinancialProfile::default()
        };
        let params = PlanParameters {
            desired_retirement_spending: dec!(40000),
            ..zero_rate_params(60, 60, 62)
        };
        let snapshots = project(&profile, &params, &no_tax()).expect("valid plan");

        assert_eq!(snapshots[0].phase, Phase::Retired);
        assert_eq!(income_amount(&snapshots[0], "Salary"), None);
        assert_eq!(
            income_amount(&snapshots[0], "Portfolio Withdrawals"),
            Some(dec!(40000))
        );
        assert_eq!(asset(&snapshots[0], "Brokerage").balance, dec!(460000));
    }

    #[test]
    fn non_portfolio_income_covering_spending_means_zero_withdrawal() {
        let profile = FinancialProfile {
            age: 65,
            accounts: vec![account(AccountKind::Brokerage, dec!(100000), Decimal::ZERO)],
            ..FinancialProfile::default()
        };
        let params = PlanParameters {
            social_security_claim_age: Some(65),
            social_security_benefit: dec!(40000),
            desired_retirement_spending: dec!(30000),
            ..zero_rate_params(65, 65, 70)
        };
        let snapshots = project(&profile, &params, &no_tax()).expect("valid plan");

        for snapshot in &snapshots {
            assert_eq!(income_amount(snapshot, "Portfolio Withdrawals"), None);
            assert_eq!(asset(snapshot, "Brokerage").withdrawal, Decimal::ZERO);
            assert_eq!(asset(snapshot, "Brokerage").balance, dec!(100000));
            // Surplus is not deposited anywhere.
            assert_eq!(asset(snapshot, "Savings").balance, Decimal::ZERO);
        }
    }

    #[test]
    fn retirement_withdrawals_from_tax_deferred_accounts_fund_their_own_tax() {
        let profile = FinancialProfile {
            age: 65,
            accounts: vec![account(AccountKind::Retirement401k, dec!(100000), Decimal::ZERO)],
            ..FinancialProfile::default()
        };
        let params = PlanParameters {
            desired_retirement_spending: dec!(20000),
            ..zero_rate_params(65, 65, 66)
        };
        let snapshots =
            project(&profile, &params, &BracketTable::flat(dec!(0.10))).expect("valid plan");
        let first = &snapshots[0];

        // 20000 drawn for spending is taxed at 10%; the 2000 tax is drawn on top.
        assert_eq!(first.taxes_paid, dec!(2000));
        assert_eq!(first.gross_income, dec!(22000));
        assert_eq!(first.net_income, dec!(20000));
        assert_eq!(asset(first, "401(k)").balance, dec!(78000));
        assert_eq!(first.shortfall, Decimal::ZERO);
        assert!(!first.has_shortfall());
    }

    #[test]
    fn depleted_accounts_clamp_to_zero_and_projection_continues() {
        let profile = FinancialProfile {
            age: 60,
            accounts: vec![account(AccountKind::Savings, dec!(10000), Decimal::ZERO)],
            ..FinancialProfile::default()
        };
        let params = PlanParameters {
            desired_retirement_spending: dec!(8000),
            ..zero_rate_params(60, 60, 62)
        };
        let snapshots = project(&profile, &params, &no_tax()).expect("valid plan");

        assert_eq!(snapshots.len(), 3);
        assert!(!snapshots[0].has_shortfall());
        assert_eq!(asset(&snapshots[0], "Savings").balance, dec!(2000));

        assert_eq!(asset(&snapshots[1], "Savings").balance, Decimal::ZERO);
        assert_eq!(asset(&snapshots[1], "Savings").withdrawal, dec!(2000));
        assert!(asset(&snapshots[1], "Savings").clamped);
        assert_eq!(snapshots[1].shortfall, dec!(6000));

        assert_eq!(snapshots[2].shortfall, dec!(8000));
        assert!(snapshots[2].has_shortfall());
        assert_snapshot_invariants(&snapshots);

        let summary = summarize(&snapshots).expect("no overflow");
        assert_eq!(summary.shortfall_years, vec![2027, 2028]);
    }

    #[test]
    fn major_expense_lands_once_in_its_offset_year() {
        let profile = FinancialProfile {
            age: 60,
            accounts: vec![account(AccountKind::Savings, dec!(50000), Decimal::ZERO)],
            ..FinancialProfile::default()
        };
        let params = PlanParameters {
            major_expenses: vec![MajorExpense {
                amount: dec!(15000),
                year_offset: 2,
                description: Some("New Roof".to_string()),
            }],
            ..zero_rate_params(60, 60, 65)
        };
        let snapshots = project(&profile, &params, &no_tax()).expect("valid plan");

        let hits = snapshots
            .iter()
            .filter(|s| s.expenses.iter().any(|e| e.category == "New Roof"))
            .map(|s| s.age)
            .collect::<Vec<_>>();
        assert_eq!(hits, vec![62]);
        assert_eq!(snapshots[2].total_expenses, dec!(15000));
        assert_eq!(asset(&snapshots[5], "Savings").balance, dec!(35000));
    }

    #[test]
    fn social_security_starts_at_claim_age_and_inflates_from_claim_year() {
        let profile = FinancialProfile {
            age: 60,
            ..FinancialProfile::default()
        };
        let params = PlanParameters {
            social_security_claim_age: Some(67),
            social_security_benefit: dec!(20000),
            inflation_rate: dec!(0.02),
            ..zero_rate_params(60, 60, 70)
        };
        let snapshots = project(&profile, &params, &no_tax()).expect("valid plan");

        assert_eq!(income_amount(&snapshots[6], "Social Security"), None);
        assert_eq!(
            income_amount(&snapshots[7], "Social Security"),
            Some(dec!(20000))
        );
        assert_eq!(
            income_amount(&snapshots[8], "Social Security"),
            Some(dec!(20400))
        );
        assert_eq!(
            income_amount(&snapshots[9], "Social Security"),
            Some(dec!(20808))
        );
    }

    #[test]
    fn spouse_salary_stops_at_spouse_retirement_then_benefits_begin() {
        let profile = FinancialProfile {
            age: 60,
            spouse_age: Some(58),
            income: dec!(70000),
            spouse_income: dec!(40000),
            ..FinancialProfile::default()
        };
        let params = PlanParameters {
            spouse: Some(SpouseParameters {
                start_age: 58,
                retirement_age: 62,
                social_security_claim_age: Some(62),
                social_security_benefit: dec!(15000),
                pension_income: Decimal::ZERO,
            }),
            ..zero_rate_params(60, 67, 70)
        };
        let snapshots = project(&profile, &params, &no_tax()).expect("valid plan");

        assert_eq!(income_amount(&snapshots[3], "Spouse Salary"), Some(dec!(40000)));
        assert_eq!(income_amount(&snapshots[4], "Spouse Salary"), None);
        assert_eq!(
            income_amount(&snapshots[4], "Spouse Social Security"),
            Some(dec!(15000))
        );
        assert_eq!(income_amount(&snapshots[4], "Salary"), Some(dec!(70000)));
    }

    #[test]
    fn income_grows_from_prior_year_wage() {
        let profile = FinancialProfile {
            age: 30,
            income: dec!(100000),
            income_growth_rate: dec!(0.05),
            ..FinancialProfile::default()
        };
        let params = zero_rate_params(30, 65, 70);
        let snapshots = project(&profile, &params, &no_tax()).expect("valid plan");

        assert_eq!(income_amount(&snapshots[0], "Salary"), Some(dec!(100000)));
        assert_eq!(income_amount(&snapshots[1], "Salary"), Some(dec!(105000)));
        assert_eq!(income_amount(&snapshots[2], "Salary"), Some(dec!(110250)));
    }

    #[test]
    fn other_income_streams_are_inflation_adjusted() {
        let profile = FinancialProfile {
            age: 50,
            other_income: vec![IncomeStream {
                source: "Rental".to_string(),
                annual_amount: dec!(12000),
            }],
            ..FinancialProfile::default()
        };
        let params = PlanParameters {
            inflation_rate: dec!(0.03),
            ..zero_rate_params(50, 65, 70)
        };
        let snapshots = project(&profile, &params, &no_tax()).expect("valid plan");

        assert_eq!(income_amount(&snapshots[0], "Rental"), Some(dec!(12000)));
        assert_eq!(income_amount(&snapshots[1], "Rental"), Some(dec!(12360)));
        assert!(income_amount(&snapshots[20], "Rental").is_some());
    }

    #[test]
    fn debts_amortize_linearly_by_annual_payment() {
        let profile = FinancialProfile {
            age: 40,
            income: dec!(100000),
            debts: vec![Debt {
                kind: DebtKind::Mortgage,
                name: None,
                balance: dec!(25000),
                annual_payment: dec!(10000),
            }],
            ..FinancialProfile::default()
        };
        let params = zero_rate_params(40, 65, 70);
        let snapshots = project(&profile, &params, &no_tax()).expect("valid plan");

        let balances = snapshots
            .iter()
            .take(4)
            .map(|s| s.total_liabilities)
            .collect::<Vec<_>>();
        assert_eq!(balances, vec![dec!(15000), dec!(5000), dec!(0), dec!(0)]);
        assert_eq!(snapshots[2].liabilities[0].payment, dec!(5000));
        assert!(snapshots[3].liabilities.is_empty());
        assert_eq!(
            snapshots[0]
                .expenses
                .iter()
                .find(|e| e.category == "Debt Payments")
                .map(|e| e.amount),
            Some(dec!(10000))
        );
    }

    #[test]
    fn real_estate_appreciates_with_inflation() {
        let profile = FinancialProfile {
            age: 40,
            real_estate_value: dec!(400000),
            other_assets_value: dec!(15000),
            ..FinancialProfile::default()
        };
        let params = PlanParameters {
            inflation_rate: dec!(0.03),
            ..zero_rate_params(40, 65, 70)
        };
        let snapshots = project(&profile, &params, &no_tax()).expect("valid plan");

        assert_eq!(asset(&snapshots[0], "Real Estate").balance, dec!(412000));
        assert_eq!(asset(&snapshots[0], "Real Estate").growth, dec!(12000));
        assert_eq!(asset(&snapshots[0], "Other Assets").balance, dec!(15000));
        assert_snapshot_invariants(&snapshots);
    }

    #[test]
    fn step_depends_only_on_prior_state() {
        let profile = sample_profile();
        let params = sample_params();
        let brackets = BracketTable::federal_2024(crate::core::tax::FilingStatus::Single);
        let plan = Projection {
            profile: &profile,
            params: &params,
            brackets: &brackets,
            limits: ContributionLimits::federal_2024(),
        };

        let snapshots = project(&profile, &params, &brackets).expect("valid plan");
        let mut state = opening_state(&profile);
        for age in 30..=33 {
            let (next, _) = step(&state, &plan, age).expect("step");
            state = next;
        }
        let (_, replayed) = step(&state, &plan, 34).expect("step");
        assert_eq!(replayed, snapshots[4]);
    }

    #[test]
    fn reruns_with_identical_inputs_are_identical() {
        let brackets = BracketTable::federal_2024(crate::core::tax::FilingStatus::Single);
        let a = project(&sample_profile(), &sample_params(), &brackets).expect("valid plan");
        let b = project(&sample_profile(), &sample_params(), &brackets).expect("valid plan");
        assert_eq!(a, b);
    }

    #[test]
    fn summary_totals_lifetime_tax() {
        let brackets = BracketTable::federal_2024(crate::core::tax::FilingStatus::Single);
        let snapshots =
            project(&sample_profile(), &sample_params(), &brackets).expect("valid plan");
        let summary = summarize(&snapshots).expect("no overflow");

        let last = snapshots.last().expect("non-empty");
        assert_eq!(summary.total_lifetime_tax, last.cumulative_tax);
        assert_eq!(summary.final_net_worth, last.net_worth);
        assert_eq!(
            find_snapshot(&snapshots, 2030).map(|s| s.age),
            Some(34)
        );
        assert!(find_snapshot(&snapshots, 1999).is_none());
    }

    #[test]
    fn rejects_age_ordering_violations() {
        let mut params = sample_params();
        params.retirement_age = 29;
        let err = project(&sample_profile(), &params, &no_tax()).expect_err("must reject");
        assert!(matches!(err, EngineError::InvalidParameters { .. }));
        assert!(err.to_string().contains("retirement age"));
    }

    #[test]
    fn rejects_ages_past_the_plan_ceiling() {
        let profile = FinancialProfile::default();
        let params = PlanParameters {
            social_security_claim_age: None,
            ..zero_rate_params(0, 0, u32::MAX)
        };
        let err = project(&profile, &params, &BracketTable::flat(Decimal::ZERO))
            .expect_err("must reject");
        assert!(matches!(err, EngineError::InvalidParameters { .. }));
        assert!(err.to_string().contains("end age"));

        let params = zero_rate_params(30, 65, MAX_PLAN_AGE + 1);
        assert!(matches!(
            project(&sample_profile(), &params, &no_tax()),
            Err(EngineError::InvalidParameters { .. })
        ));
        let params = zero_rate_params(30, 65, MAX_PLAN_AGE);
        assert!(project(&sample_profile(), &params, &no_tax()).is_ok());
    }

    #[test]
    fn rejects_start_year_that_overflows_calendar() {
        let params = PlanParameters {
            start_year: i32::MAX - 10,
            ..zero_rate_params(30, 65, 95)
        };
        let err = project(&sample_profile(), &params, &no_tax()).expect_err("must reject");
        assert!(err.to_string().contains("start year"));
    }

    #[test]
    fn rejects_claim_age_outside_program_range() {
        for claim_age in [61, 71] {
            let mut params = sample_params();
            params.social_security_claim_age = Some(claim_age);
            let err = project(&sample_profile(), &params, &no_tax()).expect_err("must reject");
            assert!(err.to_string().contains("claim age"));
        }
        let mut params = sample_params();
        params.social_security_claim_age = Some(62);
        assert!(project(&sample_profile(), &params, &no_tax()).is_ok());
    }

    #[test]
    fn rejects_growth_at_or_below_minus_one_hundred_percent() {
        let mut params = sample_params();
        params.portfolio_growth_rate = dec!(-1.5);
        let err = project(&sample_profile(), &params, &no_tax()).expect_err("must reject");
        assert!(err.to_string().contains("portfolio growth rate"));
    }

    #[test]
    fn rejects_malformed_bracket_table_before_any_year_runs() {
        let brackets = BracketTable::new(
            vec![
                TaxBracket {
                    threshold: dec!(50000),
                    rate: dec!(0.2),
                },
                TaxBracket {
                    threshold: dec!(10000),
                    rate: dec!(0.1),
                },
            ],
            Decimal::ZERO,
        );
        let err = project(&sample_profile(), &sample_params(), &brackets).expect_err("must reject");
        assert!(err.to_string().contains("ascending"));
    }

    #[test]
    fn rejects_spouse_parameters_without_profile_spouse() {
        let mut params = sample_params();
        params.spouse = Some(SpouseParameters {
            start_age: 30,
            retirement_age: 65,
            social_security_claim_age: None,
            social_security_benefit: Decimal::ZERO,
            pension_income: Decimal::ZERO,
        });
        let err = project(&sample_profile(), &params, &no_tax()).expect_err("must reject");
        assert!(err.to_string().contains("spouse"));
    }

    #[test]
    fn overflow_is_fatal_for_the_run() {
        let profile = FinancialProfile {
            age: 30,
            accounts: vec![account(
                AccountKind::Brokerage,
                Decimal::MAX / dec!(2),
                Decimal::ZERO,
            )],
            ..FinancialProfile::default()
        };
        let params = PlanParameters {
            portfolio_growth_rate: dec!(0.5),
            ..zero_rate_params(30, 65, 95)
        };
        let err = project(&profile, &params, &no_tax()).expect_err("must overflow");
        assert!(matches!(err, EngineError::ArithmeticOverflow { .. }));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(48))]

        #[test]
        fn prop_projection_invariants_hold(
            start_age in 20u32..70,
            retirement_span in 0u32..30,
            retired_span in 0u32..30,
            income in 0u32..300_000,
            monthly_expense in 0u32..10_000,
            savings in 0u32..200_000,
            brokerage in 0u32..1_000_000,
            pre_tax in 0u32..2_000_000,
            contribution in 0u32..40_000,
            spending in 0u32..150_000,
            growth_bp in -2_000i32..1_500,
            bond_bp in 0i32..600,
            inflation_bp in 0i32..800,
            claim_offset in 0u32..9
        ) {
            let mut monthly_expenses = BTreeMap::new();
            monthly_expenses.insert("Living".to_string(), Decimal::from(monthly_expense));
            let profile = FinancialProfile {
                age: start_age,
                income: Decimal::from(income),
                income_growth_rate: dec!(0.02),
                monthly_expenses,
                accounts: vec![
                    account(AccountKind::Savings, Decimal::from(savings), Decimal::ZERO),
                    account(AccountKind::Brokerage, Decimal::from(brokerage), Decimal::from(contribution)),
                    account(AccountKind::TraditionalIra, Decimal::from(pre_tax), Decimal::from(contribution)),
                ],
                ..FinancialProfile::default()
            };
            let retirement_age = start_age + retirement_span;
            let params = PlanParameters {
                start_age,
                retirement_age,
                end_age: retirement_age + retired_span,
                social_security_claim_age: Some(62 + claim_offset),
                social_security_benefit: dec!(24000),
                portfolio_growth_rate: Decimal::new(growth_bp.into(), 4),
                bond_growth_rate: Decimal::new(bond_bp.into(), 4),
                inflation_rate: Decimal::new(inflation_bp.into(), 4),
                desired_retirement_spending: Decimal::from(spending),
                ..sample_params()
            };
            let brackets = BracketTable::federal_2024(crate::core::tax::FilingStatus::Single);

            let snapshots = project(&profile, &params, &brackets).expect("valid plan");
            prop_assert_eq!(snapshots.len() as u32, params.end_age - params.start_age + 1);
            for snapshot in &snapshots {
                let assets: Decimal = snapshot.assets.iter().map(|a| a.balance).sum();
                let liabilities: Decimal = snapshot.liabilities.iter().map(|l| l.balance).sum();
                prop_assert_eq!(snapshot.net_worth, assets - liabilities);
                prop_assert!(snapshot.assets.iter().all(|a| a.balance >= Decimal::ZERO));
                prop_assert!(snapshot.shortfall >= Decimal::ZERO);
            }
            for pair in snapshots.windows(2) {
                prop_assert!(pair[1].cumulative_tax >= pair[0].cumulative_tax);
                prop_assert!(pair[1].year > pair[0].year);
                prop_assert!(pair[1].age > pair[0].age);
            }

            let rerun = project(&profile, &params, &brackets).expect("valid plan");
            prop_assert_eq!(rerun, snapshots);
        }
    }
}

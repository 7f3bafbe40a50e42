mod calc;
mod engine;
mod error;
mod milestones;
mod plan;
mod roth;
mod tax;
mod types;

pub use calc::{FlowTiming, apply_inflation, compound, compound_with, round_money};
pub use engine::{
    MAX_SOCIAL_SECURITY_CLAIM_AGE, MIN_SOCIAL_SECURITY_CLAIM_AGE, find_snapshot, phase_at,
    project, summarize, validate_plan,
};
pub use error::{EngineError, EngineResult};
pub use milestones::{
    MilestoneCategory, MilestoneInstance, MilestoneType, RefMilestone, ReferenceCatalog,
    STANDARD_CATALOG_VERSION, derive_milestones, milestones_for_plan, plan_milestones,
    standard_catalog,
};
pub use plan::{PlanDefaults, PlanOverrides, resolve_plan};
pub use roth::{
    ConversionParams, ConversionSummary, ConversionYear, sample_conversion, simulate_conversion,
    summarize_conversion, validate_conversion,
};
pub use tax::{
    BracketTable, ContributionLimits, FilingStatus, SOCIAL_SECURITY_TAXABLE_SHARE, TaxBracket,
    estimate_tax, incremental_tax, marginal_rate, tax_on_gross,
};
pub use types::{
    Account, AccountKind, AnnualSnapshot, AssetClass, AssetRow, Debt, DebtKind, ExpenseRow,
    FinancialProfile, HsaCoverage, IncomeRow, IncomeStream, LiabilityRow, MAX_PLAN_AGE,
    MajorExpense, Phase, PlanKind, PlanParameters, PlanSummary, ProfileAssumptions,
    SpouseParameters,
};

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{EngineError, EngineResult};
use super::types::PlanParameters;

pub const STANDARD_CATALOG_VERSION: u32 = 2;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MilestoneCategory {
    Financial,
    Retirement,
    Health,
    Income,
    Tax,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MilestoneType {
    #[default]
    Standard,
    Personal,
}

/// One entry of the read-only reference catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefMilestone {
    pub id: u32,
    pub title: String,
    pub description: String,
    /// Fractional ages are allowed (59.5).
    pub target_age: Decimal,
    pub category: MilestoneCategory,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub sort_order: i32,
    /// Catalog entries are standard; plan-derived ones are personal.
    #[serde(default)]
    pub milestone_type: MilestoneType,
}

fn default_icon() -> String {
    "info".to_string()
}

fn default_active() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceCatalog {
    pub version: u32,
    pub milestones: Vec<RefMilestone>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneInstance {
    pub title: String,
    pub description: String,
    pub category: MilestoneCategory,
    pub target_age: Decimal,
    pub target_year: i32,
    pub is_completed: bool,
    pub milestone_type: MilestoneType,
}

/// Matches `reference` against the plan's age range.
///
/// Inactive entries and entries outside `[start_age, end_age]` are dropped.
/// The result is ordered by target age, then by the catalog's sort order;
/// entries equal on both keep their catalog order.
pub fn derive_milestones(
    params: &PlanParameters,
    reference: &[RefMilestone],
    current_age: u32,
) -> EngineResult<Vec<MilestoneInstance>> {
    if params.end_age < params.start_age {
        return Err(EngineError::invalid("end age must be >= start age"));
    }
    let start = Decimal::from(params.start_age);
    let end = Decimal::from(params.end_age);
    let current = Decimal::from(current_age);

    let mut matched = reference
        .iter()
        .filter(|m| m.is_active && m.target_age >= start && m.target_age <= end)
        .collect::<Vec<_>>();
    matched.sort_by(|a, b| {
        a.target_age
            .cmp(&b.target_age)
            .then(a.sort_order.cmp(&b.sort_order))
    });

    let instances = matched
        .into_iter()
        .map(|m| {
            let offset = (m.target_age - start)
                .floor()
                .to_i32()
                .ok_or_else(|| EngineError::overflow("milestone year"))?;
            Ok(MilestoneInstance {
                title: m.title.clone(),
                description: m.description.clone(),
                category: m.category,
                target_age: m.target_age,
                target_year: params
                    .start_year
                    .checked_add(offset)
                    .ok_or_else(|| EngineError::overflow("milestone year"))?,
                is_completed: m.target_age <= current,
                milestone_type: m.milestone_type,
            })
        })
        .collect::<EngineResult<Vec<_>>>()?;

    debug!(
        catalog = reference.len(),
        matched = instances.len(),
        "derived milestones"
    );
    Ok(instances)
}

/// Milestones that come from the plan itself rather than the catalog.
pub fn plan_milestones(params: &PlanParameters) -> Vec<RefMilestone> {
    let mut milestones = vec![RefMilestone {
        id: 0,
        title: "Retirement Begins".to_string(),
        description: "Start of retirement phase".to_string(),
        target_age: Decimal::from(params.retirement_age),
        category: MilestoneCategory::Retirement,
        icon: default_icon(),
        is_active: true,
        sort_order: age_order(params.retirement_age),
        milestone_type: MilestoneType::Personal,
    }];
    if let Some(claim_age) = params.social_security_claim_age {
        milestones.push(RefMilestone {
            id: 0,
            title: "Social Security Begins".to_string(),
            description: "First year of claimed Social Security benefits".to_string(),
            target_age: Decimal::from(claim_age),
            category: MilestoneCategory::Income,
            icon: default_icon(),
            is_active: true,
            sort_order: age_order(claim_age),
            milestone_type: MilestoneType::Personal,
        });
    }
    milestones
}

fn age_order(age: u32) -> i32 {
    i32::try_from(age).unwrap_or(i32::MAX)
}

/// Catalog entries plus the plan's own milestones, derived together.
pub fn milestones_for_plan(
    params: &PlanParameters,
    catalog: &ReferenceCatalog,
    current_age: u32,
) -> EngineResult<Vec<MilestoneInstance>> {
    let mut reference = catalog.milestones.clone();
    reference.extend(plan_milestones(params));
    derive_milestones(params, &reference, current_age)
}

pub fn standard_catalog() -> ReferenceCatalog {
    use MilestoneCategory::{Financial, Health, Income, Retirement, Tax};

    let rows: [(Decimal, &str, &str, MilestoneCategory); 13] = [
        (
            dec!(50),
            "Catch-up Contributions",
            "Eligible for additional 401(k) and IRA contributions",
            Financial,
        ),
        (
            dec!(55),
            "The Rule of 55",
            "Leaving a job in or after the year you turn 55 allows penalty-free (but taxed) withdrawals from that employer's 401(k) or 403(b).",
            Retirement,
        ),
        (
            dec!(55),
            "HSA Catch-up",
            "Eligible for an additional $1,000 catch-up contribution to a Health Savings Account.",
            Health,
        ),
        (
            dec!(59.5),
            "Penalty-Free Withdrawals",
            "The 10% early withdrawal penalty expires for traditional IRAs and 401(k)s regardless of employment status.",
            Financial,
        ),
        (
            dec!(60),
            "Social Security Survivors",
            "Widows and widowers can begin claiming survivor benefits at a reduced rate.",
            Income,
        ),
        (
            dec!(62),
            "Early Social Security",
            "Eligible for reduced Social Security benefits (75% of full benefit)",
            Income,
        ),
        (
            dec!(65),
            "Medicare Eligibility",
            "Eligible for Medicare health insurance",
            Health,
        ),
        (
            dec!(65),
            "HSA Penalty Sunset",
            "HSA funds can be withdrawn for non-medical expenses without the 20% penalty; income tax still applies.",
            Health,
        ),
        (
            dec!(67),
            "Full Retirement Age",
            "Eligible for full Social Security benefits",
            Income,
        ),
        (
            dec!(70),
            "Max Social Security",
            "Benefits stop increasing; there is no gain from waiting past 70 to claim.",
            Income,
        ),
        (
            dec!(70.5),
            "QCD Eligibility",
            "Qualified Charitable Distributions can go directly from an IRA to a charity, tax-free and counting toward later RMDs.",
            Tax,
        ),
        (
            dec!(73),
            "Required Minimum Distributions",
            "Must begin taking RMDs from retirement accounts",
            Tax,
        ),
        (
            dec!(75),
            "Updated RMD Age",
            "For those born in 1960 or later, the RMD age moves from 73 to 75.",
            Tax,
        ),
    ];

    ReferenceCatalog {
        version: STANDARD_CATALOG_VERSION,
        milestones: rows
            .into_iter()
            .enumerate()
            .map(|(idx, (target_age, title, description, category))| RefMilestone {
                id: idx as u32 + 1,
                title: title.to_string(),
                description: description.to_string(),
                target_age,
                category,
                icon: default_icon(),
                is_active: true,
                sort_order: target_age.floor().to_i32().unwrap_or_default(),
                milestone_type: MilestoneType::Standard,
            })
            .collect(),
    }
}

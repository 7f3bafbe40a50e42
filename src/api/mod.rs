use axum::{
    Router,
    extract::Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    Account, AccountKind, AnnualSnapshot, BracketTable, ConversionParams, ConversionSummary,
    ConversionYear, EngineError, FilingStatus, FinancialProfile, MilestoneInstance,
    PlanDefaults, PlanOverrides, PlanParameters, TaxBracket,
    milestones_for_plan, project, resolve_plan, sample_conversion, simulate_conversion,
    standard_catalog, summarize, summarize_conversion,
};

/// Start year used when a request does not name one.
const DEFAULT_START_YEAR: i32 = 2026;
const PERCENT: Decimal = dec!(100);

#[derive(Parser, Debug)]
#[command(
    name = "retire",
    about = "Deterministic retirement projections, milestones and Roth conversion scenarios"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the JSON API.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Project a plan from a JSON request file and print the result.
    Project {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, help = "Age used to mark milestones completed; defaults to the plan start age")]
        current_age: Option<u32>,
    },
    /// Simulate a Roth conversion strategy from a JSON request file.
    Convert {
        #[arg(long)]
        input: PathBuf,
    },
    /// Print the built-in reference milestone catalog.
    Milestones,
}

/// Rates in every payload are percentages (`5` means 5%).
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectionPayload {
    profile: Option<FinancialProfile>,
    parameters: Option<PlanOverrides>,
    filing_status: Option<FilingStatus>,
    brackets: Option<Vec<TaxBracket>>,
    standard_deduction: Option<Decimal>,
    current_age: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ConversionPayload {
    current_age: Option<u32>,
    retirement_age: Option<u32>,
    #[serde(alias = "traditionalIraBalance")]
    traditional_balance: Option<Decimal>,
    roth_balance: Option<Decimal>,
    annual_income: Option<Decimal>,
    conversion_amount: Option<Decimal>,
    years_to_convert: Option<u32>,
    expected_return: Option<Decimal>,
    current_tax_rate: Option<Decimal>,
    filing_status: Option<FilingStatus>,
    expected_retirement_tax_rate: Option<Decimal>,
}

#[derive(Debug)]
struct ProjectionRequest {
    profile: FinancialProfile,
    params: PlanParameters,
    brackets: BracketTable,
    current_age: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectionResponse {
    parameters: PlanParameters,
    total_lifetime_tax: Decimal,
    final_net_worth: Decimal,
    shortfall_years: Vec<i32>,
    milestones: Vec<MilestoneInstance>,
    snapshots: Vec<AnnualSnapshot>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConversionResponse {
    summary: ConversionSummary,
    years: Vec<ConversionYear>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Failure at the surface: a message and the status it maps to.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match err {
            EngineError::InvalidParameters { .. } => StatusCode::BAD_REQUEST,
            EngineError::ArithmeticOverflow { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

pub async fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Serve { port } => run_http_server(port)
            .await
            .map_err(|e| format!("Server error: {e}")),
        Command::Project { input, current_age } => {
            let json = read_input(&input)?;
            let mut payload = serde_json::from_str::<ProjectionPayload>(&json)
                .map_err(|e| format!("Invalid projection JSON in {}: {e}", input.display()))?;
            if current_age.is_some() {
                payload.current_age = current_age;
            }
            let request = projection_request_from_payload(payload)?;
            let response = build_projection_response(request).map_err(|e| e.message)?;
            print_json(&response)
        }
        Command::Convert { input } => {
            let json = read_input(&input)?;
            let payload = serde_json::from_str::<ConversionPayload>(&json)
                .map_err(|e| format!("Invalid conversion JSON in {}: {e}", input.display()))?;
            let params = conversion_params_from_payload(payload)?;
            let response = build_conversion_response(&params).map_err(|e| e.message)?;
            print_json(&response)
        }
        Command::Milestones => print_json(&standard_catalog()),
    }
}

fn read_input(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| format!("Cannot read {}: {e}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| format!("Cannot encode output: {e}"))?;
    println!("{text}");
    Ok(())
}

fn router() -> Router {
    Router::new()
        .route("/api/projection", post(projection_handler))
        .route("/api/roth-conversion", post(conversion_handler))
        .route("/api/milestones/standard", get(standard_milestones_handler))
        .fallback(not_found_handler)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "retirement projection API listening");

    axum::serve(listener, router()).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn standard_milestones_handler() -> Response {
    json_response(StatusCode::OK, standard_catalog())
}

async fn projection_handler(Json(payload): Json<ProjectionPayload>) -> Response {
    let request = match projection_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    match build_projection_response(request) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(err) => {
            warn!(status = %err.status, error = %err.message, "projection rejected");
            error_response(err.status, &err.message)
        }
    }
}

async fn conversion_handler(Json(payload): Json<ConversionPayload>) -> Response {
    let params = match conversion_params_from_payload(payload) {
        Ok(params) => params,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    match build_conversion_response(&params) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(err) => {
            warn!(status = %err.status, error = %err.message, "conversion rejected");
            error_response(err.status, &err.message)
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

fn from_percent(value: Decimal) -> Decimal {
    value / PERCENT
}

fn from_percent_opt(value: Option<Decimal>) -> Option<Decimal> {
    value.map(from_percent)
}

fn projection_request_from_payload(payload: ProjectionPayload) -> Result<ProjectionRequest, String> {
    let mut profile = payload.profile.unwrap_or_else(default_profile_for_api);
    profile.income_growth_rate = from_percent(profile.income_growth_rate);
    profile.spouse_income_growth_rate = from_percent(profile.spouse_income_growth_rate);
    let stored = &mut profile.assumptions;
    stored.inflation_rate = from_percent_opt(stored.inflation_rate);
    stored.portfolio_growth_rate = from_percent_opt(stored.portfolio_growth_rate);
    stored.bond_growth_rate = from_percent_opt(stored.bond_growth_rate);

    let mut overrides = payload.parameters.unwrap_or_default();
    overrides.inflation_rate = from_percent_opt(overrides.inflation_rate);
    overrides.portfolio_growth_rate = from_percent_opt(overrides.portfolio_growth_rate);
    overrides.bond_growth_rate = from_percent_opt(overrides.bond_growth_rate);

    let params = resolve_plan(
        &profile,
        &overrides,
        &PlanDefaults::default(),
        DEFAULT_START_YEAR,
    );

    let status = payload.filing_status.unwrap_or_else(|| {
        if profile.has_spouse() {
            FilingStatus::MarriedJointly
        } else {
            FilingStatus::Single
        }
    });
    let brackets = match payload.brackets {
        Some(rows) => {
            if rows.is_empty() {
                return Err("brackets must not be empty when provided".to_string());
            }
            BracketTable::new(
                rows.into_iter()
                    .map(|b| TaxBracket {
                        threshold: b.threshold,
                        rate: from_percent(b.rate),
                    })
                    .collect(),
                payload.standard_deduction.unwrap_or(Decimal::ZERO),
            )
        }
        None => {
            let mut table = BracketTable::federal_2024(status);
            if let Some(deduction) = payload.standard_deduction {
                table.standard_deduction = deduction;
            }
            table
        }
    };

    let current_age = payload.current_age.unwrap_or(params.start_age);
    Ok(ProjectionRequest {
        profile,
        params,
        brackets,
        current_age,
    })
}

fn build_projection_response(request: ProjectionRequest) -> Result<ProjectionResponse, ApiError> {
    let snapshots = project(&request.profile, &request.params, &request.brackets)?;
    let summary = summarize(&snapshots)?;
    let milestones = milestones_for_plan(&request.params, &standard_catalog(), request.current_age)?;
    Ok(ProjectionResponse {
        parameters: request.params,
        total_lifetime_tax: summary.total_lifetime_tax,
        final_net_worth: summary.final_net_worth,
        shortfall_years: summary.shortfall_years,
        milestones,
        snapshots,
    })
}

fn conversion_params_from_payload(payload: ConversionPayload) -> Result<ConversionParams, String> {
    let mut params = sample_conversion();

    if let Some(v) = payload.current_age {
        params.current_age = v;
    }
    if let Some(v) = payload.retirement_age {
        params.retirement_age = v;
    }
    if let Some(v) = payload.traditional_balance {
        params.traditional_balance = v;
    }
    if let Some(v) = payload.roth_balance {
        params.roth_balance = v;
    }
    if let Some(v) = payload.annual_income {
        params.annual_income = v;
    }
    if let Some(v) = payload.conversion_amount {
        params.conversion_amount = v;
    }
    if let Some(v) = payload.years_to_convert {
        params.years_to_convert = v;
    }
    if let Some(v) = payload.expected_return {
        params.expected_return = from_percent(v);
    }
    if let Some(v) = payload.expected_retirement_tax_rate {
        params.expected_retirement_tax_rate = from_percent(v);
    }

    match (payload.filing_status, payload.current_tax_rate) {
        (Some(_), Some(_)) => {
            return Err("give either filingStatus or currentTaxRate, not both".to_string());
        }
        (Some(status), None) => params.brackets = BracketTable::federal_2024(status),
        (None, Some(rate)) => params.brackets = BracketTable::flat(from_percent(rate)),
        (None, None) => {}
    }

    Ok(params)
}

fn build_conversion_response(params: &ConversionParams) -> Result<ConversionResponse, ApiError> {
    let years = simulate_conversion(params)?;
    if years.is_empty() {
        return Err(ApiError::bad_request(
            "retirement age equals current age; there are no years to convert",
        ));
    }
    let summary = summarize_conversion(params, &years)?;
    Ok(ConversionResponse { summary, years })
}

fn default_profile_for_api() -> FinancialProfile {
    FinancialProfile {
        age: 40,
        income: dec!(95000),
        income_growth_rate: dec!(3),
        monthly_expenses: [
            ("Housing".to_string(), dec!(2200)),
            ("Food".to_string(), dec!(800)),
            ("Transportation".to_string(), dec!(500)),
        ]
        .into_iter()
        .collect(),
        accounts: vec![
            Account {
                kind: AccountKind::Savings,
                name: None,
                balance: dec!(25000),
                annual_contribution: Decimal::ZERO,
            },
            Account {
                kind: AccountKind::Retirement401k,
                name: None,
                balance: dec!(150000),
                annual_contribution: dec!(14250),
            },
            Account {
                kind: AccountKind::Brokerage,
                name: None,
                balance: dec!(40000),
                annual_contribution: dec!(3000),
            },
        ],
        ..FinancialProfile::default()
    }
}

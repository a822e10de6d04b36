//! v1 cross-boundary contracts for the game core, API facade, persistence, and CLI.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod serde_opt_u64_string;
pub mod serde_percent;

pub const SCHEMA_VERSION_V1: &str = "1.0";
pub const DEFAULT_EXPERIMENT_ID: &str = "otree_nd";

/// Upper bounds that keep every ledger sum inside `i64`.
pub const MAX_ROUNDS: u32 = 1_000;
pub const MAX_SPENDING_LIMIT: u32 = 1_000_000;
pub const MAX_AMOUNT: i64 = 100_000_000_000;

/// Per-experiment constants. Passed explicitly to settlement and reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExperimentConfig {
    pub schema_version: String,
    pub experiment_id: String,
    pub num_rounds: u32,
    pub initial_profit: i64,
    /// Disruption impact at zero spending.
    pub disruption_cost: i64,
    /// Disruption probability at zero spending, in percent.
    pub basic_probability: f64,
    pub max_spending: u32,
    #[serde(with = "serde_opt_u64_string")]
    pub seed: Option<u64>,
    pub notes: Option<String>,
}

impl ExperimentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schema_version != SCHEMA_VERSION_V1 {
            return Err(ConfigError::UnsupportedSchema(self.schema_version.clone()));
        }
        if self.experiment_id.trim().is_empty() {
            return Err(ConfigError::EmptyExperimentId);
        }
        if self.num_rounds == 0 {
            return Err(ConfigError::NoRounds);
        }
        if self.num_rounds > MAX_ROUNDS {
            return Err(ConfigError::TooLarge(
                "num_rounds",
                i64::from(self.num_rounds),
                i64::from(MAX_ROUNDS),
            ));
        }
        if self.max_spending == 0 {
            return Err(ConfigError::NoSpendingRange);
        }
        if self.max_spending > MAX_SPENDING_LIMIT {
            return Err(ConfigError::TooLarge(
                "max_spending",
                i64::from(self.max_spending),
                i64::from(MAX_SPENDING_LIMIT),
            ));
        }
        if self.initial_profit < 0 {
            return Err(ConfigError::NegativeAmount("initial_profit", self.initial_profit));
        }
        if self.disruption_cost < 0 {
            return Err(ConfigError::NegativeAmount(
                "disruption_cost",
                self.disruption_cost,
            ));
        }
        for (field, value) in [
            ("initial_profit", self.initial_profit),
            ("disruption_cost", self.disruption_cost),
        ] {
            if value > MAX_AMOUNT {
                return Err(ConfigError::TooLarge(field, value, MAX_AMOUNT));
            }
        }
        if !(0.0..=100.0).contains(&self.basic_probability) {
            return Err(ConfigError::ProbabilityOutOfRange(self.basic_probability));
        }
        Ok(())
    }

    pub fn spending_in_range(&self, spending: i64) -> bool {
        (0..=i64::from(self.max_spending)).contains(&spending)
    }

    pub fn round_in_range(&self, round_number: u32) -> bool {
        (1..=self.num_rounds).contains(&round_number)
    }
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            experiment_id: DEFAULT_EXPERIMENT_ID.to_string(),
            num_rounds: 10,
            initial_profit: 10_000,
            disruption_cost: 2_000,
            basic_probability: 5.0,
            max_spending: 100,
            seed: None,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    UnsupportedSchema(String),
    EmptyExperimentId,
    NoRounds,
    NoSpendingRange,
    NegativeAmount(&'static str, i64),
    TooLarge(&'static str, i64, i64),
    ProbabilityOutOfRange(f64),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedSchema(got) => write!(
                f,
                "unsupported schema_version: got={got} expected={SCHEMA_VERSION_V1}"
            ),
            Self::EmptyExperimentId => write!(f, "experiment_id must not be empty"),
            Self::NoRounds => write!(f, "num_rounds must be at least 1"),
            Self::NoSpendingRange => write!(f, "max_spending must be at least 1"),
            Self::NegativeAmount(field, value) => {
                write!(f, "{field} must not be negative (got {value})")
            }
            Self::TooLarge(field, value, max) => {
                write!(f, "{field} must be at most {max} (got {value})")
            }
            Self::ProbabilityOutOfRange(value) => {
                write!(f, "basic_probability must be in [0, 100] (got {value})")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// One settled round for one participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundRecord {
    pub participant_id: String,
    pub round_number: u32,
    pub spending: u32,
    pub disrupted: bool,
    pub disruption_cost: i64,
    pub cumulative_cost: i64,
    pub expected_profit: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum RoundOrder {
    #[default]
    #[serde(rename = "asc")]
    Ascending,
    #[serde(rename = "desc")]
    Descending,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LiveRequest {
    CalculateResult { investment: i64 },
    NextRound,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LiveStatus {
    Success,
    Error,
    NextRound,
}

/// Payload returned to the game page after an interactive settlement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveResult {
    pub round: u32,
    pub investment: u32,
    pub is_disrupted: bool,
    #[serde(with = "serde_percent")]
    pub disruption_probability: f64,
    pub disruption_impact_if_occurs: i64,
    pub cost_of_disruption: i64,
    pub total_costs: i64,
    pub expected_profit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveResponse {
    pub status: LiveStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<LiveResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LiveResponse {
    pub fn success(result: LiveResult) -> Self {
        Self {
            status: LiveStatus::Success,
            result: Some(result),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: LiveStatus::Error,
            result: None,
            message: Some(message.into()),
        }
    }

    pub fn next_round() -> Self {
        Self {
            status: LiveStatus::NextRound,
            result: None,
            message: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    Landing,
    Game,
    Results,
    Finished,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantStatus {
    pub schema_version: String,
    pub experiment_id: String,
    pub participant_id: String,
    pub round_number: u32,
    pub num_rounds: u32,
    pub page: PageKind,
    pub money_input: Option<u32>,
    pub round_calculated: bool,
}

impl ParticipantStatus {
    pub fn is_finished(&self) -> bool {
        self.page == PageKind::Finished
    }
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "participant_id={} round={}/{} page={:?} round_calculated={}",
            self.participant_id,
            self.round_number,
            self.num_rounds,
            self.page,
            self.round_calculated
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperimentStatus {
    pub schema_version: String,
    pub experiment_id: String,
    pub num_rounds: u32,
    pub participant_count: usize,
    pub finished_participants: usize,
    pub settled_records: usize,
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "experiment_id={} rounds={} participants={} finished={} records={}",
            self.experiment_id,
            self.num_rounds,
            self.participant_count,
            self.finished_participants,
            self.settled_records
        )
    }
}

/// Totals shown on the game page once the final round is settled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FinalStats {
    pub total_investment: i64,
    pub total_disruption_cost: i64,
    pub final_profit: i64,
    pub initial_profit: i64,
    pub all_results: Vec<RoundRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FinalSummary {
    pub total_results: usize,
    pub total_spending: i64,
    pub total_disruption_cost: i64,
    pub final_profit: i64,
    pub initial_profit: i64,
    pub average_spending: i64,
    pub disruption_count: usize,
    pub profit_change: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GamePageView {
    pub schema_version: String,
    pub participant_id: String,
    pub round_number: u32,
    /// Rounds played so far, newest first.
    pub combined_result: Vec<RoundRecord>,
    pub current_round_result: Option<RoundRecord>,
    pub last_result: Option<RoundRecord>,
    pub average_cost: i64,
    pub initial_profit: i64,
    pub current_profit: i64,
    pub is_final_round: bool,
    pub game_completed: bool,
    pub final_stats: Option<FinalStats>,
    pub round_calculated: bool,
    pub previous_round_number: u32,
    pub next_round_number: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultsView {
    pub schema_version: String,
    pub participant_id: String,
    /// Rounds in play order.
    pub all_results: Vec<RoundRecord>,
    #[serde(flatten)]
    pub summary: FinalSummary,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ExperimentNotFound,
    ParticipantNotFound,
    InvalidInput,
    InvalidConfig,
    InvalidQuery,
    ExperimentStateConflict,
    InternalError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub schema_version: String,
    pub error_code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            error_code,
            message: message.into(),
            details,
        }
    }
}

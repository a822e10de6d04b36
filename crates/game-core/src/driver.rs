use std::collections::BTreeSet;
use std::fmt;

use contracts::{ExperimentConfig, LiveResult, RoundRecord};
use tracing::{debug, info, warn};

use crate::ledger::RoundLedger;
use crate::settlement::{self, Baseline, RandomSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    InvalidInput { spending: i64, max_spending: u32 },
    RoundOutOfRange { round_number: u32, num_rounds: u32 },
}

impl fmt::Display for SettlementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput { max_spending, .. } => {
                write!(f, "Investment must be between 0 and {max_spending}")
            }
            Self::RoundOutOfRange {
                round_number,
                num_rounds,
            } => write!(f, "round {round_number} is outside 1..={num_rounds}"),
        }
    }
}

impl std::error::Error for SettlementError {}

#[derive(Debug, Clone, PartialEq)]
pub struct SettlementResult {
    pub record: RoundRecord,
    pub disruption_probability: f64,
    pub disruption_impact: i64,
}

impl SettlementResult {
    pub fn to_live_result(&self) -> LiveResult {
        LiveResult {
            round: self.record.round_number,
            investment: self.record.spending,
            is_disrupted: self.record.disrupted,
            disruption_probability: self.disruption_probability,
            disruption_impact_if_occurs: self.disruption_impact,
            cost_of_disruption: self.record.disruption_cost,
            total_costs: self.record.cumulative_cost,
            expected_profit: self.record.expected_profit,
        }
    }
}

/// Validates submissions, settles them against the previous round, and writes the ledger.
///
/// A round can be reached from the interactive call and from the page-transition
/// fallback. The settled flag keeps the fallback from settling a round twice; the
/// interactive call always draws afresh and overwrites.
#[derive(Debug)]
pub struct SettlementDriver<L, R> {
    config: ExperimentConfig,
    ledger: L,
    rng: R,
    settled: BTreeSet<(String, u32)>,
}

impl<L: RoundLedger, R: RandomSource> SettlementDriver<L, R> {
    pub fn new(config: ExperimentConfig, ledger: L, rng: R) -> Self {
        Self {
            config,
            ledger,
            rng,
            settled: BTreeSet::new(),
        }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn validate_spending(&self, spending: i64) -> Result<u32, SettlementError> {
        if !self.config.spending_in_range(spending) {
            warn!(
                spending,
                max = self.config.max_spending,
                "rejected spending outside range"
            );
            return Err(SettlementError::InvalidInput {
                spending,
                max_spending: self.config.max_spending,
            });
        }
        u32::try_from(spending).map_err(|_| SettlementError::InvalidInput {
            spending,
            max_spending: self.config.max_spending,
        })
    }

    pub fn validate_round(&self, round_number: u32) -> Result<(), SettlementError> {
        if self.config.round_in_range(round_number) {
            Ok(())
        } else {
            Err(SettlementError::RoundOutOfRange {
                round_number,
                num_rounds: self.config.num_rounds,
            })
        }
    }

    /// Interactive settlement. Re-submitting the same round replaces its record.
    pub fn submit(
        &mut self,
        participant_id: &str,
        round_number: u32,
        spending: i64,
    ) -> Result<SettlementResult, SettlementError> {
        let spending = self.validate_spending(spending)?;
        self.validate_round(round_number)?;

        let result = self.settle_round(participant_id, round_number, spending);
        self.settled.insert((participant_id.to_string(), round_number));
        Ok(result)
    }

    /// Page-transition settlement for rounds the interactive call never reached.
    ///
    /// Returns `Ok(None)` when the round is already settled or no spending was entered.
    pub fn settle_fallback(
        &mut self,
        participant_id: &str,
        round_number: u32,
        spending: Option<u32>,
    ) -> Result<Option<SettlementResult>, SettlementError> {
        if self.is_settled(participant_id, round_number) {
            return Ok(None);
        }
        let Some(spending) = spending else {
            return Ok(None);
        };

        let spending = self.validate_spending(i64::from(spending))?;
        self.validate_round(round_number)?;

        let result = self.settle_round(participant_id, round_number, spending);
        self.settled.insert((participant_id.to_string(), round_number));
        info!(
            participant_id,
            round_number,
            spending,
            disrupted = result.record.disrupted,
            "fallback settlement applied"
        );
        Ok(Some(result))
    }

    pub fn is_settled(&self, participant_id: &str, round_number: u32) -> bool {
        self.settled.contains(&(participant_id.to_string(), round_number))
    }

    /// Clears the settled flag; returns whether it was set.
    pub fn reset_round_flag(&mut self, participant_id: &str, round_number: u32) -> bool {
        self.settled.remove(&(participant_id.to_string(), round_number))
    }

    fn baseline(&self, participant_id: &str, round_number: u32) -> Baseline {
        if round_number <= 1 {
            return Baseline::initial(&self.config);
        }
        self.ledger
            .get(participant_id, round_number - 1)
            .map(|previous| Baseline {
                cumulative_cost: previous.cumulative_cost,
                expected_profit: previous.expected_profit,
            })
            .unwrap_or_else(|| Baseline::initial(&self.config))
    }

    fn settle_round(
        &mut self,
        participant_id: &str,
        round_number: u32,
        spending: u32,
    ) -> SettlementResult {
        let baseline = self.baseline(participant_id, round_number);
        let outcome = settlement::settle(&self.config, spending, baseline, &mut self.rng);

        let record = RoundRecord {
            participant_id: participant_id.to_string(),
            round_number,
            spending,
            disrupted: outcome.disrupted,
            disruption_cost: outcome.disruption_cost,
            cumulative_cost: outcome.cumulative_cost,
            expected_profit: outcome.expected_profit,
        };
        self.ledger.put(record.clone());

        debug!(
            participant_id,
            round_number,
            spending,
            draw = outcome.draw,
            probability = outcome.disruption_probability,
            disrupted = outcome.disrupted,
            cumulative_cost = outcome.cumulative_cost,
            "round settled"
        );

        SettlementResult {
            record,
            disruption_probability: outcome.disruption_probability,
            disruption_impact: outcome.disruption_impact,
        }
    }
}

//! Synthetic cohorts for previewing outcome spreads before running a session.

use contracts::{ExperimentConfig, FinalSummary, RoundOrder};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::driver::{SettlementDriver, SettlementError};
use crate::ledger::{MemoryLedger, RoundLedger};
use crate::report;
use crate::settlement::SeededRandom;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CohortMember {
    pub participant_id: String,
    /// Spending per round; the last entry repeats once the schedule runs out.
    pub schedule: Vec<u32>,
}

impl CohortMember {
    pub fn constant(participant_id: impl Into<String>, spending: u32) -> Self {
        Self {
            participant_id: participant_id.into(),
            schedule: vec![spending],
        }
    }

    fn spending_for(&self, round_number: u32) -> u32 {
        let index = usize::try_from(round_number.saturating_sub(1)).unwrap_or(usize::MAX);
        self.schedule
            .get(index)
            .or_else(|| self.schedule.last())
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CohortOutcome {
    pub participant_id: String,
    pub disrupted_rounds: Vec<u32>,
    pub summary: FinalSummary,
}

/// Plays every member through all rounds with an independent seeded draw stream.
///
/// Results are in member order and identical for a given seed regardless of
/// `worker_threads`.
pub fn simulate_cohort(
    config: &ExperimentConfig,
    members: &[CohortMember],
    seed: u64,
    worker_threads: usize,
) -> Result<Vec<CohortOutcome>, SettlementError> {
    let run = || {
        members
            .par_iter()
            .enumerate()
            .map(|(index, member)| play_member(config, member, member_seed(seed, index)))
            .collect::<Result<Vec<_>, _>>()
    };

    if worker_threads > 1 {
        if let Ok(pool) = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_threads)
            .build()
        {
            return pool.install(run);
        }
    }

    members
        .iter()
        .enumerate()
        .map(|(index, member)| play_member(config, member, member_seed(seed, index)))
        .collect()
}

fn play_member(
    config: &ExperimentConfig,
    member: &CohortMember,
    seed: u64,
) -> Result<CohortOutcome, SettlementError> {
    let mut driver = SettlementDriver::new(
        config.clone(),
        MemoryLedger::new(),
        SeededRandom::from_seed(seed),
    );

    for round_number in 1..=config.num_rounds {
        let spending = member.spending_for(round_number);
        driver.submit(&member.participant_id, round_number, i64::from(spending))?;
    }

    let records = driver.ledger().list(
        &member.participant_id,
        config.num_rounds,
        RoundOrder::Ascending,
    );
    Ok(CohortOutcome {
        participant_id: member.participant_id.clone(),
        disrupted_rounds: records
            .iter()
            .filter(|r| r.disrupted)
            .map(|r| r.round_number)
            .collect(),
        summary: report::summarize(config, &records),
    })
}

fn member_seed(seed: u64, index: usize) -> u64 {
    let index = index as u64;
    seed ^ index.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members() -> Vec<CohortMember> {
        (0..=10)
            .map(|step| CohortMember::constant(format!("bot_{step:02}"), step * 10))
            .collect()
    }

    #[test]
    fn cohort_is_deterministic_across_thread_counts() {
        let config = ExperimentConfig::default();
        let sequential = simulate_cohort(&config, &members(), 99, 1).expect("sequential");
        let parallel = simulate_cohort(&config, &members(), 99, 4).expect("parallel");
        assert_eq!(sequential, parallel);
        assert_eq!(sequential.len(), 11);
    }

    #[test]
    fn full_spending_member_has_fixed_outcome() {
        let config = ExperimentConfig::default();
        let outcomes =
            simulate_cohort(&config, &[CohortMember::constant("max", 100)], 7, 1).expect("run");
        let summary = &outcomes[0].summary;
        assert_eq!(summary.total_spending, 1_000);
        assert_eq!(summary.average_spending, 100);
        assert_eq!(summary.disruption_count, 0);
        assert_eq!(summary.final_profit, 9_000);
        assert!(outcomes[0].disrupted_rounds.is_empty());
    }

    #[test]
    fn profit_and_cost_stay_balanced_for_every_member() {
        let config = ExperimentConfig::default();
        for outcome in simulate_cohort(&config, &members(), 3, 2).expect("run") {
            let summary = outcome.summary;
            assert_eq!(
                summary.initial_profit - summary.final_profit,
                summary.total_spending + summary.total_disruption_cost
            );
            assert_eq!(summary.disruption_count, outcome.disrupted_rounds.len());
        }
    }

    #[test]
    fn schedule_repeats_last_entry() {
        let member = CohortMember {
            participant_id: "p".to_string(),
            schedule: vec![5, 15],
        };
        assert_eq!(member.spending_for(1), 5);
        assert_eq!(member.spending_for(2), 15);
        assert_eq!(member.spending_for(9), 15);
    }

    #[test]
    fn out_of_range_schedule_is_rejected() {
        let config = ExperimentConfig::default();
        let err = simulate_cohort(&config, &[CohortMember::constant("bad", 150)], 1, 1)
            .expect_err("invalid spending");
        assert!(matches!(err, SettlementError::InvalidInput { .. }));
    }
}

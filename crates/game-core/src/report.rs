//! Summary statistics and page data derived from a participant's ledger.
//!
//! Nothing here sorts: callers pass records in the order the view needs
//! (`RoundOrder::Descending` for the game page history, ascending for results).

use contracts::{
    ExperimentConfig, FinalStats, FinalSummary, GamePageView, ResultsView, RoundRecord,
    SCHEMA_VERSION_V1,
};

/// Final-summary statistics. `final_profit` is taken from the last record as given.
///
/// `average_spending` divides by the configured round count, not by the number of
/// records, because the summary is only shown once every round has been played.
pub fn summarize(config: &ExperimentConfig, records: &[RoundRecord]) -> FinalSummary {
    let total_spending = records.iter().map(|r| i64::from(r.spending)).sum::<i64>();
    let total_disruption_cost = records.iter().map(|r| r.disruption_cost).sum::<i64>();
    let final_profit = records
        .last()
        .map(|r| r.expected_profit)
        .unwrap_or(config.initial_profit);
    let average_spending = if records.is_empty() {
        0
    } else {
        total_spending.div_euclid(i64::from(config.num_rounds.max(1)))
    };

    FinalSummary {
        total_results: records.len(),
        total_spending,
        total_disruption_cost,
        final_profit,
        initial_profit: config.initial_profit,
        average_spending,
        disruption_count: records.iter().filter(|r| r.disrupted).count(),
        profit_change: final_profit - config.initial_profit,
    }
}

/// In-progress average of cumulative cost over the records seen so far.
pub fn running_average_cost(records: &[RoundRecord]) -> i64 {
    if records.is_empty() {
        return 0;
    }
    let total = records.iter().map(|r| r.cumulative_cost).sum::<i64>();
    total.div_euclid(records.len() as i64)
}

/// Game page data. `history` holds rounds `1..=round_number`, newest first.
pub fn game_page_view(
    config: &ExperimentConfig,
    participant_id: &str,
    round_number: u32,
    round_calculated: bool,
    history: Vec<RoundRecord>,
) -> GamePageView {
    let current_record = history
        .iter()
        .find(|r| r.round_number == round_number)
        .cloned();
    let current_round_result = if round_calculated {
        current_record.clone()
    } else {
        None
    };

    let last_result = history.first().cloned();
    let current_profit = last_result
        .as_ref()
        .map(|r| r.expected_profit)
        .unwrap_or(config.initial_profit);

    let is_final_round = round_number == config.num_rounds;
    let game_completed = is_final_round && current_record.is_some();
    let final_stats = game_completed.then(|| FinalStats {
        total_investment: history.iter().map(|r| i64::from(r.spending)).sum(),
        total_disruption_cost: history.iter().map(|r| r.disruption_cost).sum(),
        final_profit: current_profit,
        initial_profit: config.initial_profit,
        all_results: history.clone(),
    });

    GamePageView {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        participant_id: participant_id.to_string(),
        round_number,
        average_cost: running_average_cost(&history),
        combined_result: history,
        current_round_result,
        last_result,
        initial_profit: config.initial_profit,
        current_profit,
        is_final_round,
        game_completed,
        final_stats,
        round_calculated,
        previous_round_number: round_number.saturating_sub(1),
        next_round_number: round_number + 1,
    }
}

/// Results page data. `records` must be in play order.
pub fn results_view(
    config: &ExperimentConfig,
    participant_id: &str,
    records: Vec<RoundRecord>,
) -> ResultsView {
    let summary = summarize(config, &records);
    ResultsView {
        schema_version: SCHEMA_VERSION_V1.to_string(),
        participant_id: participant_id.to_string(),
        all_results: records,
        summary,
    }
}

use std::collections::BTreeMap;
use std::fmt;

use contracts::{
    ExperimentConfig, ExperimentStatus, GamePageView, LiveRequest, LiveResponse, PageKind,
    ParticipantStatus, ResultsView, RoundOrder, RoundRecord, SCHEMA_VERSION_V1,
};
use tracing::{debug, info};

use crate::driver::{SettlementDriver, SettlementError, SettlementResult};
use crate::ledger::RoundLedger;
use crate::report;
use crate::settlement::RandomSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    UnknownParticipant(String),
    WrongPage {
        participant_id: String,
        page: PageKind,
    },
    MissingSpending {
        participant_id: String,
        round_number: u32,
    },
    Settlement(SettlementError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownParticipant(participant_id) => {
                write!(f, "unknown participant: {participant_id}")
            }
            Self::WrongPage {
                participant_id,
                page,
            } => write!(
                f,
                "participant {participant_id} is on the {page:?} page, not the game page"
            ),
            Self::MissingSpending {
                participant_id,
                round_number,
            } => write!(
                f,
                "participant {participant_id} has no spending for round {round_number}"
            ),
            Self::Settlement(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<SettlementError> for SessionError {
    fn from(value: SettlementError) -> Self {
        Self::Settlement(value)
    }
}

#[derive(Debug, Clone)]
struct ParticipantState {
    round_number: u32,
    page: PageKind,
    money_input: Option<u32>,
    /// The live call settled the current round; the page transition keeps its result.
    live_settled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdvanceOutcome {
    pub status: ParticipantStatus,
    /// Set when the page transition had to settle the round itself.
    pub fallback: Option<SettlementResult>,
}

/// Participant progression over the page sequence `Landing -> Game x N -> Results`.
///
/// The landing page is only shown in round 1 and the results page only after round N.
#[derive(Debug)]
pub struct ExperimentSession<L, R> {
    driver: SettlementDriver<L, R>,
    participants: BTreeMap<String, ParticipantState>,
}

impl<L: RoundLedger, R: RandomSource> ExperimentSession<L, R> {
    pub fn new(config: ExperimentConfig, ledger: L, rng: R) -> Self {
        Self {
            driver: SettlementDriver::new(config, ledger, rng),
            participants: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &ExperimentConfig {
        self.driver.config()
    }

    pub fn driver(&self) -> &SettlementDriver<L, R> {
        &self.driver
    }

    pub fn ledger(&self) -> &L {
        self.driver.ledger()
    }

    /// Registers the participant if needed; re-registering returns the current status.
    pub fn register(&mut self, participant_id: &str) -> ParticipantStatus {
        if !self.participants.contains_key(participant_id) {
            info!(participant_id, "participant registered");
            self.participants.insert(
                participant_id.to_string(),
                ParticipantState {
                    round_number: 1,
                    page: PageKind::Landing,
                    money_input: None,
                    live_settled: false,
                },
            );
        }
        self.status_of(participant_id, &self.participants[participant_id])
    }

    pub fn participant_status(
        &self,
        participant_id: &str,
    ) -> Result<ParticipantStatus, SessionError> {
        let state = self.state(participant_id)?;
        Ok(self.status_of(participant_id, state))
    }

    pub fn participants(&self) -> Vec<ParticipantStatus> {
        self.participants
            .iter()
            .map(|(participant_id, state)| self.status_of(participant_id, state))
            .collect()
    }

    pub fn status(&self) -> ExperimentStatus {
        let config = self.config();
        ExperimentStatus {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            experiment_id: config.experiment_id.clone(),
            num_rounds: config.num_rounds,
            participant_count: self.participants.len(),
            finished_participants: self
                .participants
                .values()
                .filter(|state| state.page == PageKind::Finished)
                .count(),
            settled_records: self.ledger().len(),
        }
    }

    /// Form submission of the round's spending field.
    pub fn record_spending(
        &mut self,
        participant_id: &str,
        spending: i64,
    ) -> Result<ParticipantStatus, SessionError> {
        self.require_game_page(participant_id)?;
        let spending = self.driver.validate_spending(spending)?;
        self.state_mut(participant_id)?.money_input = Some(spending);
        self.participant_status(participant_id)
    }

    /// Interactive call from the game page.
    ///
    /// Out-of-range input is answered with an `error` response rather than an `Err`.
    pub fn live(
        &mut self,
        participant_id: &str,
        request: LiveRequest,
    ) -> Result<LiveResponse, SessionError> {
        let round_number = self.require_game_page(participant_id)?;

        match request {
            LiveRequest::CalculateResult { investment } => {
                match self.driver.submit(participant_id, round_number, investment) {
                    Ok(result) => {
                        let state = self.state_mut(participant_id)?;
                        state.money_input = Some(result.record.spending);
                        state.live_settled = true;
                        Ok(LiveResponse::success(result.to_live_result()))
                    }
                    Err(err @ SettlementError::InvalidInput { .. }) => {
                        Ok(LiveResponse::error(err.to_string()))
                    }
                    Err(err) => Err(err.into()),
                }
            }
            LiveRequest::NextRound => {
                self.driver.reset_round_flag(participant_id, round_number);
                Ok(LiveResponse::next_round())
            }
        }
    }

    /// Page transition. Leaving the game page settles the round if nothing else did.
    pub fn advance(&mut self, participant_id: &str) -> Result<AdvanceOutcome, SessionError> {
        let state = self.state(participant_id)?.clone();
        let num_rounds = self.config().num_rounds;
        let mut fallback = None;

        let next = match state.page {
            PageKind::Landing => ParticipantState {
                page: PageKind::Game,
                ..state
            },
            PageKind::Game => {
                if !state.live_settled {
                    fallback = self.driver.settle_fallback(
                        participant_id,
                        state.round_number,
                        state.money_input,
                    )?;
                }
                let settled = state.live_settled
                    || self.driver.is_settled(participant_id, state.round_number);
                if !settled {
                    return Err(SessionError::MissingSpending {
                        participant_id: participant_id.to_string(),
                        round_number: state.round_number,
                    });
                }

                if state.round_number < num_rounds {
                    ParticipantState {
                        round_number: state.round_number + 1,
                        page: PageKind::Game,
                        money_input: None,
                        live_settled: false,
                    }
                } else {
                    ParticipantState {
                        page: PageKind::Results,
                        ..state
                    }
                }
            }
            PageKind::Results | PageKind::Finished => ParticipantState {
                page: PageKind::Finished,
                ..state
            },
        };

        debug!(
            participant_id,
            round_number = next.round_number,
            page = ?next.page,
            "participant advanced"
        );
        *self.state_mut(participant_id)? = next;

        Ok(AdvanceOutcome {
            status: self.participant_status(participant_id)?,
            fallback,
        })
    }

    /// Rounds played so far, up to and including the current one.
    pub fn history(
        &self,
        participant_id: &str,
        order: RoundOrder,
    ) -> Result<Vec<RoundRecord>, SessionError> {
        let state = self.state(participant_id)?;
        Ok(self.ledger().list(participant_id, state.round_number, order))
    }

    pub fn game_page(&self, participant_id: &str) -> Result<GamePageView, SessionError> {
        let state = self.state(participant_id)?;
        let history = self.history(participant_id, RoundOrder::Descending)?;
        Ok(report::game_page_view(
            self.config(),
            participant_id,
            state.round_number,
            self.driver.is_settled(participant_id, state.round_number),
            history,
        ))
    }

    pub fn results_page(&self, participant_id: &str) -> Result<ResultsView, SessionError> {
        self.state(participant_id)?;
        let records = self.ledger().list(
            participant_id,
            self.config().num_rounds,
            RoundOrder::Ascending,
        );
        Ok(report::results_view(self.config(), participant_id, records))
    }

    fn state(&self, participant_id: &str) -> Result<&ParticipantState, SessionError> {
        self.participants
            .get(participant_id)
            .ok_or_else(|| SessionError::UnknownParticipant(participant_id.to_string()))
    }

    fn state_mut(&mut self, participant_id: &str) -> Result<&mut ParticipantState, SessionError> {
        self.participants
            .get_mut(participant_id)
            .ok_or_else(|| SessionError::UnknownParticipant(participant_id.to_string()))
    }

    fn require_game_page(&self, participant_id: &str) -> Result<u32, SessionError> {
        let state = self.state(participant_id)?;
        if state.page != PageKind::Game {
            return Err(SessionError::WrongPage {
                participant_id: participant_id.to_string(),
                page: state.page,
            });
        }
        Ok(state.round_number)
    }

    fn status_of(&self, participant_id: &str, state: &ParticipantState) -> ParticipantStatus {
        ParticipantStatus {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            experiment_id: self.config().experiment_id.clone(),
            participant_id: participant_id.to_string(),
            round_number: state.round_number,
            num_rounds: self.config().num_rounds,
            page: state.page,
            money_input: state.money_input,
            round_calculated: self.driver.is_settled(participant_id, state.round_number),
        }
    }
}

#[cfg(test)]
mod tests {
    use contracts::LiveStatus;

    use super::*;
    use crate::ledger::MemoryLedger;
    use crate::settlement::{FixedDraw, ScriptedDraws};

    fn session<R: RandomSource>(rng: R) -> ExperimentSession<MemoryLedger, R> {
        ExperimentSession::new(ExperimentConfig::default(), MemoryLedger::new(), rng)
    }

    fn on_game_page<R: RandomSource>(session: &mut ExperimentSession<MemoryLedger, R>, id: &str) {
        session.register(id);
        session.advance(id).expect("leave landing page");
    }

    #[test]
    fn register_is_idempotent_and_starts_on_landing() {
        let mut session = session(FixedDraw(99.0));
        let first = session.register("p1");
        assert_eq!(first.page, PageKind::Landing);
        assert_eq!(first.round_number, 1);

        on_game_page(&mut session, "p1");
        let again = session.register("p1");
        assert_eq!(again.page, PageKind::Game);
        assert_eq!(session.status().participant_count, 1);
    }

    #[test]
    fn live_calculate_reports_success_and_records_input() {
        let mut session = session(FixedDraw(0.0));
        on_game_page(&mut session, "p1");

        let response = session
            .live("p1", LiveRequest::CalculateResult { investment: 0 })
            .expect("live call");
        assert_eq!(response.status, LiveStatus::Success);
        let result = response.result.expect("result payload");
        assert_eq!(result.cost_of_disruption, 2_000);
        assert_eq!(result.expected_profit, 8_000);

        let status = session.participant_status("p1").expect("status");
        assert_eq!(status.money_input, Some(0));
        assert!(status.round_calculated);
    }

    #[test]
    fn live_invalid_investment_is_an_error_response() {
        let mut session = session(FixedDraw(0.0));
        on_game_page(&mut session, "p1");

        let response = session
            .live("p1", LiveRequest::CalculateResult { investment: 101 })
            .expect("live call");
        assert_eq!(response.status, LiveStatus::Error);
        assert_eq!(
            response.message.as_deref(),
            Some("Investment must be between 0 and 100")
        );
        assert!(session.ledger().is_empty());
    }

    #[test]
    fn live_requires_game_page() {
        let mut session = session(FixedDraw(0.0));
        session.register("p1");
        let err = session
            .live("p1", LiveRequest::CalculateResult { investment: 10 })
            .expect_err("landing page");
        assert!(matches!(err, SessionError::WrongPage { .. }));
    }

    #[test]
    fn next_round_clears_calculated_flag() {
        let mut session = session(FixedDraw(99.0));
        on_game_page(&mut session, "p1");
        session
            .live("p1", LiveRequest::CalculateResult { investment: 10 })
            .expect("calculate");

        let response = session.live("p1", LiveRequest::NextRound).expect("next");
        assert_eq!(response.status, LiveStatus::NextRound);
        assert!(!session.participant_status("p1").expect("status").round_calculated);
    }

    #[test]
    fn advance_uses_fallback_when_live_path_skipped() {
        let mut session = session(FixedDraw(99.0));
        on_game_page(&mut session, "p1");
        session.record_spending("p1", 30).expect("form input");

        let outcome = session.advance("p1").expect("advance");
        let fallback = outcome.fallback.expect("fallback settlement");
        assert_eq!(fallback.record.cumulative_cost, 30);
        assert_eq!(outcome.status.round_number, 2);
        assert_eq!(outcome.status.money_input, None);
        assert!(!outcome.status.round_calculated);
    }

    #[test]
    fn advance_after_live_does_not_resettle() {
        let mut session = session(ScriptedDraws::new([0.0], 99.0));
        on_game_page(&mut session, "p1");
        session
            .live("p1", LiveRequest::CalculateResult { investment: 0 })
            .expect("calculate");

        let outcome = session.advance("p1").expect("advance");
        assert!(outcome.fallback.is_none());
        let record = session.ledger().get("p1", 1).expect("round 1 record");
        assert!(record.disrupted);
        assert_eq!(record.cumulative_cost, 2_000);
    }

    #[test]
    fn next_round_then_advance_keeps_shown_result() {
        let mut session = session(ScriptedDraws::new([0.0, 99.0], 99.0));
        on_game_page(&mut session, "p1");
        let shown = session
            .live("p1", LiveRequest::CalculateResult { investment: 0 })
            .expect("calculate")
            .result
            .expect("result payload");
        session.live("p1", LiveRequest::NextRound).expect("next");

        let outcome = session.advance("p1").expect("advance");
        assert!(outcome.fallback.is_none());
        assert_eq!(outcome.status.round_number, 2);

        let stored = session.ledger().get("p1", 1).expect("round 1 record");
        assert!(stored.disrupted);
        assert_eq!(stored.cumulative_cost, shown.total_costs);
        assert_eq!(stored.expected_profit, shown.expected_profit);
    }

    #[test]
    fn advance_without_any_spending_is_rejected() {
        let mut session = session(FixedDraw(99.0));
        on_game_page(&mut session, "p1");
        let err = session.advance("p1").expect_err("no spending");
        assert!(matches!(err, SessionError::MissingSpending { .. }));
        assert_eq!(
            session.participant_status("p1").expect("status").round_number,
            1
        );
    }

    #[test]
    fn full_game_reaches_results_then_finishes() {
        let mut config = ExperimentConfig::default();
        config.num_rounds = 3;
        let mut session = ExperimentSession::new(config, MemoryLedger::new(), FixedDraw(99.0));
        on_game_page(&mut session, "p1");

        for spending in [0, 50, 100] {
            session
                .live("p1", LiveRequest::CalculateResult { investment: spending })
                .expect("calculate");
            session.advance("p1").expect("advance");
        }

        let status = session.participant_status("p1").expect("status");
        assert_eq!(status.page, PageKind::Results);
        assert_eq!(status.round_number, 3);

        let results = session.results_page("p1").expect("results");
        let rounds: Vec<u32> = results.all_results.iter().map(|r| r.round_number).collect();
        assert_eq!(rounds, vec![1, 2, 3]);
        assert_eq!(results.summary.total_spending, 150);
        assert_eq!(results.summary.average_spending, 50);
        assert_eq!(results.summary.final_profit, 9_850);

        let game = session.game_page("p1").expect("game page");
        assert!(game.game_completed);

        let finished = session.advance("p1").expect("finish");
        assert!(finished.status.is_finished());
        assert_eq!(session.status().finished_participants, 1);
    }

    #[test]
    fn game_page_history_is_newest_first() {
        let mut session = session(FixedDraw(99.0));
        on_game_page(&mut session, "p1");
        for spending in [10, 20] {
            session.record_spending("p1", spending).expect("form");
            session.advance("p1").expect("advance");
        }

        let view = session.game_page("p1").expect("view");
        let rounds: Vec<u32> = view.combined_result.iter().map(|r| r.round_number).collect();
        assert_eq!(rounds, vec![2, 1]);
        assert_eq!(view.round_number, 3);
        assert!(view.current_round_result.is_none());
        assert_eq!(view.current_profit, 9_970);
    }

    #[test]
    fn unknown_participant_is_reported() {
        let session = session(FixedDraw(99.0));
        assert_eq!(
            session.game_page("ghost"),
            Err(SessionError::UnknownParticipant("ghost".to_string()))
        );
    }
}

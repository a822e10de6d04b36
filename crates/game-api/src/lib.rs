//! In-process experiment facade with participant progression and SQLite write-through.

mod persistence;
mod server;

use std::collections::BTreeMap;
use std::path::Path;

use contracts::{
    ConfigError, ExperimentConfig, ExperimentStatus, GamePageView, LiveRequest, LiveResponse,
    LiveStatus, ParticipantStatus, ResultsView, RoundOrder, RoundRecord,
};
use game_core::{
    AdvanceOutcome, ExperimentSession, MemoryLedger, RoundLedger, SeededRandom, SessionError,
};
pub use persistence::{PersistedExperimentSummary, PersistenceError, SqliteRoundStore};
pub use server::{serve, ServerError};
use tracing::warn;

#[derive(Debug)]
struct PersistenceState {
    store: SqliteRoundStore,
    /// Settled records not yet written, latest per (participant, round); kept across
    /// failed flushes.
    pending: BTreeMap<(String, u32), RoundRecord>,
}

#[derive(Debug)]
pub struct GameApi {
    session: ExperimentSession<MemoryLedger, SeededRandom>,
    persistence: Option<PersistenceState>,
    last_persistence_error: Option<String>,
}

impl GameApi {
    pub fn from_config(config: ExperimentConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = SeededRandom::for_config(&config);
        Ok(Self {
            session: ExperimentSession::new(config, MemoryLedger::new(), rng),
            persistence: None,
            last_persistence_error: None,
        })
    }

    pub fn attach_sqlite_store(&mut self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        let store = SqliteRoundStore::open(path)?;
        self.persistence = Some(PersistenceState {
            store,
            pending: BTreeMap::new(),
        });
        Ok(())
    }

    pub fn initialize_experiment_storage(
        &mut self,
        replace_existing: bool,
    ) -> Result<(), PersistenceError> {
        let Some(state) = self.persistence.as_mut() else {
            return Err(PersistenceError::NotAttached);
        };

        let config = self.session.config();
        if state.store.experiment_exists(&config.experiment_id)? {
            if replace_existing {
                state.store.delete_experiment(&config.experiment_id)?;
            } else {
                return Err(PersistenceError::ExperimentAlreadyExists(
                    config.experiment_id.clone(),
                ));
            }
        }

        state.store.upsert_experiment(config)?;
        let records: Vec<RoundRecord> = self.session.ledger().records().cloned().collect();
        state.store.persist_records(&config.experiment_id, &records)?;
        state.pending.clear();
        self.last_persistence_error = None;
        Ok(())
    }

    pub fn flush_persistence_checked(&mut self) -> Result<(), PersistenceError> {
        let Some(state) = self.persistence.as_mut() else {
            return Err(PersistenceError::NotAttached);
        };

        if !state.pending.is_empty() {
            let records: Vec<RoundRecord> = state.pending.values().cloned().collect();
            state
                .store
                .persist_records(&self.session.config().experiment_id, &records)?;
            state.pending.clear();
        }

        self.last_persistence_error = None;
        Ok(())
    }

    pub fn last_persistence_error(&self) -> Option<&str> {
        self.last_persistence_error.as_deref()
    }

    pub fn experiment_id(&self) -> &str {
        &self.session.config().experiment_id
    }

    pub fn config(&self) -> &ExperimentConfig {
        self.session.config()
    }

    pub fn status(&self) -> ExperimentStatus {
        self.session.status()
    }

    pub fn register_participant(&mut self, participant_id: &str) -> ParticipantStatus {
        self.session.register(participant_id)
    }

    pub fn participant_status(
        &self,
        participant_id: &str,
    ) -> Result<ParticipantStatus, SessionError> {
        self.session.participant_status(participant_id)
    }

    pub fn participants(&self) -> Vec<ParticipantStatus> {
        self.session.participants()
    }

    pub fn record_spending(
        &mut self,
        participant_id: &str,
        spending: i64,
    ) -> Result<ParticipantStatus, SessionError> {
        self.session.record_spending(participant_id, spending)
    }

    pub fn live(
        &mut self,
        participant_id: &str,
        request: LiveRequest,
    ) -> Result<LiveResponse, SessionError> {
        let response = self.session.live(participant_id, request)?;
        if response.status == LiveStatus::Success {
            if let Some(result) = response.result.as_ref() {
                self.queue_record(participant_id, result.round);
            }
            self.flush_persistence_if_enabled();
        }
        Ok(response)
    }

    pub fn advance(&mut self, participant_id: &str) -> Result<AdvanceOutcome, SessionError> {
        let outcome = self.session.advance(participant_id)?;
        if let Some(settled) = outcome.fallback.as_ref() {
            self.queue_record(participant_id, settled.record.round_number);
            self.flush_persistence_if_enabled();
        }
        Ok(outcome)
    }

    pub fn game_page(&self, participant_id: &str) -> Result<GamePageView, SessionError> {
        self.session.game_page(participant_id)
    }

    pub fn results_page(&self, participant_id: &str) -> Result<ResultsView, SessionError> {
        self.session.results_page(participant_id)
    }

    pub fn records(
        &self,
        participant_id: &str,
        order: RoundOrder,
    ) -> Result<Vec<RoundRecord>, SessionError> {
        self.session.history(participant_id, order)
    }

    fn queue_record(&mut self, participant_id: &str, round_number: u32) {
        let Some(state) = self.persistence.as_mut() else {
            return;
        };
        if let Some(record) = self.session.ledger().get(participant_id, round_number) {
            state
                .pending
                .insert((participant_id.to_string(), round_number), record);
        }
    }

    fn flush_persistence_if_enabled(&mut self) {
        if self.persistence.is_none() {
            return;
        }

        if let Err(err) = self.flush_persistence_checked() {
            warn!(error = %err, "round record write-through failed");
            self.last_persistence_error = Some(err.to_string());
        }
    }
}

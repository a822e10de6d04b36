use std::fmt;
use std::path::Path;

use contracts::{ExperimentConfig, RoundRecord};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedExperimentSummary {
    pub experiment_id: String,
    pub num_rounds: u32,
    pub participant_count: usize,
    pub record_count: usize,
}

#[derive(Debug)]
pub enum PersistenceError {
    Sqlite(rusqlite::Error),
    Serde(serde_json::Error),
    NotAttached,
    ExperimentAlreadyExists(String),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite error: {err}"),
            Self::Serde(err) => write!(f, "serde error: {err}"),
            Self::NotAttached => write!(f, "sqlite store is not attached"),
            Self::ExperimentAlreadyExists(experiment_id) => {
                write!(f, "experiment already exists: {experiment_id}")
            }
        }
    }
}

impl std::error::Error for PersistenceError {}

impl From<rusqlite::Error> for PersistenceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

/// SQLite copy of every experiment config and settled round.
#[derive(Debug)]
pub struct SqliteRoundStore {
    conn: Connection,
}

impl SqliteRoundStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path)?;
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    pub fn experiment_exists(&self, experiment_id: &str) -> Result<bool, PersistenceError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM experiments WHERE experiment_id = ?1",
                params![experiment_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn delete_experiment(&mut self, experiment_id: &str) -> Result<(), PersistenceError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM round_records WHERE experiment_id = ?1",
            params![experiment_id],
        )?;
        tx.execute(
            "DELETE FROM experiments WHERE experiment_id = ?1",
            params![experiment_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn upsert_experiment(&mut self, config: &ExperimentConfig) -> Result<(), PersistenceError> {
        let config_json = serde_json::to_string(config)?;
        self.conn.execute(
            "INSERT INTO experiments (experiment_id, schema_version, num_rounds, config_json)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(experiment_id) DO UPDATE SET
                schema_version = excluded.schema_version,
                num_rounds = excluded.num_rounds,
                config_json = excluded.config_json",
            params![
                config.experiment_id.as_str(),
                config.schema_version.as_str(),
                config.num_rounds,
                config_json,
            ],
        )?;
        Ok(())
    }

    /// Upserts records keyed by (experiment, participant, round).
    pub fn persist_records(
        &mut self,
        experiment_id: &str,
        records: &[RoundRecord],
    ) -> Result<(), PersistenceError> {
        let tx = self.conn.transaction()?;
        for record in records {
            tx.execute(
                "INSERT INTO round_records (
                    experiment_id,
                    participant_id,
                    round_number,
                    spending,
                    disrupted,
                    disruption_cost,
                    cumulative_cost,
                    expected_profit
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(experiment_id, participant_id, round_number) DO UPDATE SET
                    spending = excluded.spending,
                    disrupted = excluded.disrupted,
                    disruption_cost = excluded.disruption_cost,
                    cumulative_cost = excluded.cumulative_cost,
                    expected_profit = excluded.expected_profit",
                params![
                    experiment_id,
                    record.participant_id.as_str(),
                    record.round_number,
                    record.spending,
                    record.disrupted,
                    record.disruption_cost,
                    record.cumulative_cost,
                    record.expected_profit,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_config(
        &self,
        experiment_id: &str,
    ) -> Result<Option<ExperimentConfig>, PersistenceError> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT config_json FROM experiments WHERE experiment_id = ?1",
                params![experiment_id],
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            Some(raw) => Ok(Some(serde_json::from_str::<ExperimentConfig>(&raw)?)),
            None => Ok(None),
        }
    }

    /// Records ordered by participant, then round ascending.
    pub fn load_records(
        &self,
        experiment_id: &str,
        participant_id: Option<&str>,
    ) -> Result<Vec<RoundRecord>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT participant_id, round_number, spending, disrupted,
                    disruption_cost, cumulative_cost, expected_profit
             FROM round_records
             WHERE experiment_id = ?1 AND (?2 IS NULL OR participant_id = ?2)
             ORDER BY participant_id ASC, round_number ASC",
        )?;

        let rows = stmt.query_map(params![experiment_id, participant_id], record_from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn list_experiments(
        &self,
        limit: usize,
    ) -> Result<Vec<PersistedExperimentSummary>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT e.experiment_id,
                    e.num_rounds,
                    COUNT(DISTINCT r.participant_id),
                    COUNT(r.round_number)
             FROM experiments e
             LEFT JOIN round_records r ON r.experiment_id = e.experiment_id
             GROUP BY e.experiment_id, e.num_rounds
             ORDER BY e.experiment_id ASC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(
            params![i64::try_from(limit).unwrap_or(i64::MAX)],
            |row| {
                Ok(PersistedExperimentSummary {
                    experiment_id: row.get(0)?,
                    num_rounds: row.get(1)?,
                    participant_count: usize::try_from(row.get::<_, i64>(2)?).unwrap_or(0),
                    record_count: usize::try_from(row.get::<_, i64>(3)?).unwrap_or(0),
                })
            },
        )?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?);
        }
        Ok(summaries)
    }

    fn configure(&mut self) -> Result<(), PersistenceError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    fn migrate(&mut self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS experiments (
                experiment_id TEXT PRIMARY KEY,
                schema_version TEXT NOT NULL,
                num_rounds INTEGER NOT NULL,
                config_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS round_records (
                experiment_id TEXT NOT NULL REFERENCES experiments(experiment_id),
                participant_id TEXT NOT NULL,
                round_number INTEGER NOT NULL,
                spending INTEGER NOT NULL,
                disrupted INTEGER NOT NULL,
                disruption_cost INTEGER NOT NULL,
                cumulative_cost INTEGER NOT NULL,
                expected_profit INTEGER NOT NULL,
                PRIMARY KEY (experiment_id, participant_id, round_number)
            );

            CREATE INDEX IF NOT EXISTS idx_round_records_participant
                ON round_records(experiment_id, participant_id);
            ",
        )?;

        self.conn.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, name) VALUES(1, 'initial_v1')",
            [],
        )?;

        Ok(())
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<RoundRecord> {
    Ok(RoundRecord {
        participant_id: row.get(0)?,
        round_number: row.get(1)?,
        spending: row.get(2)?,
        disrupted: row.get(3)?,
        disruption_cost: row.get(4)?,
        cumulative_cost: row.get(5)?,
        expected_profit: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db_path(name: &str) -> std::path::PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();

        std::env::temp_dir().join(format!("resilience_store_{name}_{nanos}.sqlite"))
    }

    fn cleanup(path: &Path) {
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(path.with_extension("sqlite-wal"));
        let _ = std::fs::remove_file(path.with_extension("sqlite-shm"));
    }

    fn record(participant_id: &str, round_number: u32, spending: u32) -> RoundRecord {
        RoundRecord {
            participant_id: participant_id.to_string(),
            round_number,
            spending,
            disrupted: false,
            disruption_cost: 0,
            cumulative_cost: i64::from(spending),
            expected_profit: 10_000 - i64::from(spending),
        }
    }

    #[test]
    fn records_round_trip_and_overwrite() {
        let path = temp_db_path("overwrite");
        let mut store = SqliteRoundStore::open(&path).expect("open store");
        let config = ExperimentConfig {
            notes: Some("pilot cohort, lab B".to_string()),
            ..ExperimentConfig::default()
        };
        store.upsert_experiment(&config).expect("experiment");

        store
            .persist_records(&config.experiment_id, &[record("p1", 1, 10), record("p1", 2, 20)])
            .expect("persist");
        store
            .persist_records(&config.experiment_id, &[record("p1", 1, 70)])
            .expect("overwrite");

        let records = store
            .load_records(&config.experiment_id, Some("p1"))
            .expect("load");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].spending, 70);
        assert_eq!(records[1], record("p1", 2, 20));

        let loaded = store
            .load_config(&config.experiment_id)
            .expect("load config");
        assert_eq!(
            loaded.as_ref().and_then(|c| c.notes.as_deref()),
            Some("pilot cohort, lab B")
        );
        assert_eq!(loaded, Some(config));

        cleanup(&path);
    }

    #[test]
    fn lists_and_deletes_experiments() {
        let path = temp_db_path("list");
        let mut store = SqliteRoundStore::open(&path).expect("open store");
        let config = ExperimentConfig::default();
        store.upsert_experiment(&config).expect("experiment");
        store
            .persist_records(&config.experiment_id, &[record("a", 1, 0), record("b", 1, 5)])
            .expect("persist");

        let summaries = store.list_experiments(10).expect("list");
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].participant_count, 2);
        assert_eq!(summaries[0].record_count, 2);

        store
            .delete_experiment(&config.experiment_id)
            .expect("delete");
        assert!(!store
            .experiment_exists(&config.experiment_id)
            .expect("exists query"));
        assert!(store
            .load_records(&config.experiment_id, None)
            .expect("load")
            .is_empty());

        cleanup(&path);
    }
}

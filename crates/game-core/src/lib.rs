//! Round settlement, per-participant ledger, reporting, and session flow for the investment game.

pub mod cohort;
pub mod driver;
pub mod ledger;
pub mod report;
pub mod session;
pub mod settlement;

pub use driver::{SettlementDriver, SettlementError, SettlementResult};
pub use ledger::{MemoryLedger, RoundLedger};
pub use session::{AdvanceOutcome, ExperimentSession, SessionError};
pub use settlement::{Baseline, FixedDraw, RandomSource, ScriptedDraws, SeededRandom, Settlement};

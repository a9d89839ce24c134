//! Core engine — crash-point draw → flight → settlement → cooldown.

pub mod crash;
pub mod growth;
pub mod history;
pub mod ledger;
pub mod round;
pub mod session;

pub use crash::{CrashPointSource, RandomCrashPoints, ScriptedCrashPoints};
pub use ledger::SettlementLedger;
pub use round::{EngineConfig, RoundEngine, TickOutcome};
pub use session::{GameHandle, GameStatus};

//! Shared types for the HUMAN FLY round engine.
//!
//! These types form the data model used across the engine, the ledger
//! and the dashboard. They carry no behaviour beyond small projections
//! so that every module can depend on them without cycles.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lowest multiplier any round can crash at.
pub const MIN_CRASH_POINT: Decimal = dec!(1.01);

/// Multiplier at the start of every flight.
pub const BASE_MULTIPLIER: Decimal = dec!(1.00);

// ---------------------------------------------------------------------------
// Round state
// ---------------------------------------------------------------------------

/// Lifecycle state of the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoundState {
    Idle,
    Flying,
    Crashed,
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundState::Idle => write!(f, "IDLE"),
            RoundState::Flying => write!(f, "FLYING"),
            RoundState::Crashed => write!(f, "CRASHED"),
        }
    }
}

/// Unique identifier of a round, assigned at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoundId(pub Uuid);

impl RoundId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RoundId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Stakes
// ---------------------------------------------------------------------------

/// One of the two wager slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StakeId {
    One,
    Two,
}

impl StakeId {
    /// Both slots, in settlement order.
    pub const ALL: [StakeId; 2] = [StakeId::One, StakeId::Two];

    pub fn index(self) -> usize {
        match self {
            StakeId::One => 0,
            StakeId::Two => 1,
        }
    }

    /// Parse the 1-based slot number used by callers.
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(StakeId::One),
            2 => Some(StakeId::Two),
            _ => None,
        }
    }

    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }
}

impl fmt::Display for StakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bet {}", self.number())
    }
}

/// What the caller asks for in one slot when starting a round.
///
/// An `auto_cash_out` of `None`, or of any value not above 1.00, means the
/// slot is only settled by an explicit cash-out request.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StakeRequest {
    pub amount: Decimal,
    #[serde(default)]
    pub auto_cash_out: Option<Decimal>,
}

impl StakeRequest {
    pub fn new(amount: Decimal, auto_cash_out: Option<Decimal>) -> Self {
        Self { amount, auto_cash_out }
    }

    /// An empty slot.
    pub fn none() -> Self {
        Self::default()
    }
}

/// Per-slot bookkeeping held by the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stake {
    pub amount: Decimal,
    pub auto_cash_out: Option<Decimal>,
    pub cashed_out: bool,
    pub winnings: Decimal,
    /// Multiplier the stake was settled at, if any.
    pub cashed_out_at: Option<Decimal>,
}

impl Default for Stake {
    fn default() -> Self {
        Self {
            amount: Decimal::ZERO,
            auto_cash_out: None,
            cashed_out: false,
            winnings: Decimal::ZERO,
            cashed_out_at: None,
        }
    }
}

impl Stake {
    pub fn is_active(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    /// Whether this stake is still exposed to the crash.
    pub fn is_open(&self) -> bool {
        self.is_active() && !self.cashed_out
    }

    /// Auto-cash-out trigger reached at `multiplier`?
    pub fn auto_triggered(&self, multiplier: Decimal) -> bool {
        match self.auto_cash_out {
            Some(threshold) => self.is_open() && multiplier >= threshold,
            None => false,
        }
    }
}

impl fmt::Display for Stake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let auto = match self.auto_cash_out {
            Some(t) => format!("{t:.2}x"),
            None => "off".to_string(),
        };
        write!(
            f,
            "amount={:.2} auto={} cashed_out={} winnings={:.2}",
            self.amount, auto, self.cashed_out, self.winnings,
        )
    }
}

/// Outcome of a slot as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StakeOutcome {
    /// No stake placed in this slot.
    Inactive,
    /// Stake is riding the current flight.
    Pending { amount: Decimal },
    Won { amount: Decimal, multiplier: Decimal, winnings: Decimal },
    Lost { amount: Decimal },
}

impl fmt::Display for StakeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StakeOutcome::Inactive => write!(f, "-"),
            StakeOutcome::Pending { amount } => write!(f, "RIDING {amount:.2}"),
            StakeOutcome::Won { winnings, .. } => write!(f, "WON {winnings:.2}"),
            StakeOutcome::Lost { amount } => write!(f, "LOST {amount:.2}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Observable projections
// ---------------------------------------------------------------------------

/// Read-only view of the round, published to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub state: RoundState,
    pub multiplier: Decimal,
    /// Seconds since the flight began (0 while idle).
    pub elapsed_secs: f64,
    pub round_id: Option<RoundId>,
}

impl RoundSnapshot {
    pub fn idle() -> Self {
        Self {
            state: RoundState::Idle,
            multiplier: BASE_MULTIPLIER,
            elapsed_secs: 0.0,
            round_id: None,
        }
    }
}

impl fmt::Display for RoundSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.2}x after {:.2}s",
            self.state, self.multiplier, self.elapsed_secs,
        )
    }
}

/// Summary of a finished round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundReport {
    pub round_id: RoundId,
    pub crash_point: Decimal,
    pub total_staked: Decimal,
    pub total_won: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub outcomes: [StakeOutcome; 2],
    pub started_at: DateTime<Utc>,
    pub crashed_at: DateTime<Utc>,
}

impl RoundReport {
    /// Net result for the player (winnings minus stakes).
    pub fn net(&self) -> Decimal {
        self.total_won - self.total_staked
    }
}

impl fmt::Display for RoundReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Round {}: crashed at {:.2}x | staked={:.2} won={:.2} net={:.2} | balance {:.2} -> {:.2}",
            self.round_id,
            self.crash_point,
            self.total_staked,
            self.total_won,
            self.net(),
            self.balance_before,
            self.balance_after,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Caller-facing rejections. None of these leave the engine modified.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    #[error("Invalid stake: {0}")]
    InvalidStake(String),

    #[error("Insufficient balance: need {needed:.2}, have {available:.2}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Round engine — the crash game state machine.
//!
//! ```text
//!   Idle ──start()──▶ Flying ──multiplier ≥ crash point──▶ Crashed
//!    ▲                                                      │
//!    └──────────────────── cooldown elapsed ────────────────┘
//! ```
//!
//! The engine is synchronous: every operation takes the current instant
//! and runs to completion. Scheduling (the periodic tick and the cooldown
//! timer) lives in [`crate::engine::session`], which serializes access
//! behind a single lock.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::engine::crash::CrashPointSource;
use crate::engine::growth;
use crate::engine::history::{CrashHistory, DEFAULT_HISTORY_CAPACITY};
use crate::engine::ledger::SettlementLedger;
use crate::types::{
    GameError, RoundId, RoundReport, RoundSnapshot, RoundState, StakeId, StakeRequest,
    BASE_MULTIPLIER,
};

const MSG_WELCOME: &str = "Place one or two bets and start flying!";
const MSG_GOOD_LUCK: &str = "Good luck!";
const MSG_NEXT_ROUND: &str = "Place your bet for the next round.";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Timing and bookkeeping knobs for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Period of the flight tick.
    pub tick_interval: Duration,
    /// Time spent in `Crashed` before returning to `Idle`.
    pub cooldown: Duration,
    pub history_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(50),
            cooldown: Duration::from_secs(3),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

// ---------------------------------------------------------------------------
// Tick outcome
// ---------------------------------------------------------------------------

/// What a single call to [`RoundEngine::tick`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No round in progress.
    Idle,
    /// Still flying. Lists the stakes auto-settled on this tick.
    Flying {
        multiplier: Decimal,
        auto_settled: Vec<(StakeId, Decimal)>,
    },
    /// The round crashed on this tick.
    Crashed(RoundReport),
    /// Crashed, waiting for the cooldown to run out.
    CoolingDown,
    /// Cooldown finished; the engine is idle again.
    Reset,
    /// The engine has been closed.
    Halted,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct RoundEngine {
    config: EngineConfig,
    state: RoundState,
    round_id: Option<RoundId>,
    /// Hidden from callers until the round crashes.
    crash_point: Decimal,
    started_at: Option<Instant>,
    started_wall: DateTime<Utc>,
    crashed_at: Option<Instant>,
    elapsed: Duration,
    multiplier: Decimal,
    balance_before: Decimal,
    history: CrashHistory,
    ledger: SettlementLedger,
    source: Box<dyn CrashPointSource>,
    last_report: Option<RoundReport>,
    message: String,
    updates: watch::Sender<RoundSnapshot>,
    closed: bool,
}

impl RoundEngine {
    pub fn new(
        config: EngineConfig,
        initial_balance: Decimal,
        source: Box<dyn CrashPointSource>,
    ) -> Self {
        let (updates, _) = watch::channel(RoundSnapshot::idle());
        let history = CrashHistory::with_capacity(config.history_capacity);
        Self {
            config,
            state: RoundState::Idle,
            round_id: None,
            crash_point: BASE_MULTIPLIER,
            started_at: None,
            started_wall: Utc::now(),
            crashed_at: None,
            elapsed: Duration::ZERO,
            multiplier: BASE_MULTIPLIER,
            balance_before: initial_balance,
            history,
            ledger: SettlementLedger::new(initial_balance),
            source,
            last_report: None,
            message: MSG_WELCOME.to_string(),
            updates,
            closed: false,
        }
    }

    // -- Read-only projection ---------------------------------------------

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    pub fn multiplier(&self) -> Decimal {
        self.multiplier
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn round_id(&self) -> Option<RoundId> {
        self.round_id
    }

    pub fn balance(&self) -> Decimal {
        self.ledger.balance()
    }

    pub fn ledger(&self) -> &SettlementLedger {
        &self.ledger
    }

    /// Past crash points, most recent first.
    pub fn history(&self) -> Vec<Decimal> {
        self.history.to_vec()
    }

    /// Crash point of the most recent finished round.
    pub fn last_crash_point(&self) -> Option<Decimal> {
        self.history.latest()
    }

    pub fn last_report(&self) -> Option<&RoundReport> {
        self.last_report.as_ref()
    }

    /// Human-readable status line for the current moment.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The crash point, once the round has reached it.
    pub fn revealed_crash_point(&self) -> Option<Decimal> {
        match self.state {
            RoundState::Crashed => Some(self.crash_point),
            _ => None,
        }
    }

    /// When the current cooldown ends, if the round has crashed.
    pub fn cooldown_deadline(&self) -> Option<Instant> {
        match self.state {
            RoundState::Crashed => self.crashed_at.map(|at| at + self.config.cooldown),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        RoundSnapshot {
            state: self.state,
            multiplier: self.multiplier,
            elapsed_secs: self.elapsed.as_secs_f64(),
            round_id: self.round_id,
        }
    }

    /// Observe snapshots as they are published.
    pub fn subscribe(&self) -> watch::Receiver<RoundSnapshot> {
        self.updates.subscribe()
    }

    // -- Transitions --------------------------------------------------------

    /// `Idle → Flying`. Debits the stakes and draws a fresh crash point.
    /// A rejected start leaves the engine exactly as it was.
    pub fn start(
        &mut self,
        now: Instant,
        stakes: [StakeRequest; 2],
    ) -> Result<RoundId, GameError> {
        if self.closed {
            return Err(GameError::InvalidState {
                operation: "start",
                state: "shut down".to_string(),
            });
        }
        if self.state != RoundState::Idle {
            warn!(state = %self.state, "Start rejected: round in progress");
            return Err(GameError::InvalidState {
                operation: "start",
                state: self.state.to_string(),
            });
        }

        let balance_before = self.ledger.balance();
        let total = self.ledger.place_stakes(stakes).map_err(|e| {
            warn!(error = %e, "Start rejected");
            e
        })?;

        let round_id = RoundId::new();
        self.crash_point = self.source.next_crash_point();
        self.round_id = Some(round_id);
        self.state = RoundState::Flying;
        self.started_at = Some(now);
        self.started_wall = Utc::now();
        self.crashed_at = None;
        self.elapsed = Duration::ZERO;
        self.multiplier = BASE_MULTIPLIER;
        self.balance_before = balance_before;
        self.message = MSG_GOOD_LUCK.to_string();

        info!(
            round = %round_id,
            staked = format!("{:.2}", total),
            balance = format!("{:.2}", self.ledger.balance()),
            "Round started"
        );
        self.publish();
        Ok(round_id)
    }

    /// Advance the engine to `now`.
    ///
    /// While flying, the multiplier is recomputed from the absolute time
    /// since take-off, due auto-cash-outs are settled, and the crash is
    /// detected. While crashed, the cooldown is checked. Calling `tick`
    /// twice with the same `now` has no further effect.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if self.closed {
            return TickOutcome::Halted;
        }
        match self.state {
            RoundState::Idle => TickOutcome::Idle,
            RoundState::Flying => self.tick_flying(now),
            RoundState::Crashed => {
                let ready = self.cooldown_deadline().map_or(true, |deadline| now >= deadline);
                if ready {
                    self.reset();
                    TickOutcome::Reset
                } else {
                    TickOutcome::CoolingDown
                }
            }
        }
    }

    fn tick_flying(&mut self, now: Instant) -> TickOutcome {
        let started_at = self.started_at.unwrap_or(now);
        let elapsed = now.saturating_duration_since(started_at).max(self.elapsed);
        let multiplier = growth::multiplier_at(elapsed).max(self.multiplier);

        // A multiplier at or past the crash point is never observable, so no
        // stake can settle at it.
        if multiplier >= self.crash_point {
            self.elapsed = elapsed;
            return TickOutcome::Crashed(self.crash(now));
        }

        self.elapsed = elapsed;
        self.multiplier = multiplier;

        let mut auto_settled = Vec::new();
        for id in self.ledger.due_auto_cash_outs(multiplier) {
            let winnings = self.ledger.cash_out(id, multiplier);
            if winnings > Decimal::ZERO {
                self.message = format!("{id} auto-cashed out at {multiplier:.2}x!");
                auto_settled.push((id, winnings));
            }
        }

        trace!(
            multiplier = %multiplier,
            elapsed_secs = elapsed.as_secs_f64(),
            "Tick"
        );
        self.publish();
        TickOutcome::Flying {
            multiplier,
            auto_settled,
        }
    }

    /// `Flying → Crashed`.
    fn crash(&mut self, now: Instant) -> RoundReport {
        self.state = RoundState::Crashed;
        self.multiplier = self.crash_point;
        self.crashed_at = Some(now);
        self.history.record(self.crash_point);
        let forfeited = self.ledger.close_round();

        let report = RoundReport {
            round_id: self.round_id.unwrap_or_default(),
            crash_point: self.crash_point,
            total_staked: self.ledger.total_staked(),
            total_won: self.ledger.total_won(),
            balance_before: self.balance_before,
            balance_after: self.ledger.balance(),
            outcomes: self.ledger.outcomes(),
            started_at: self.started_wall,
            crashed_at: Utc::now(),
        };
        self.message = format!("Crashed at {:.2}x!", self.crash_point);

        info!(
            round = %report.round_id,
            crash_point = format!("{:.2}x", report.crash_point),
            elapsed_secs = format!("{:.2}", self.elapsed.as_secs_f64()),
            staked = format!("{:.2}", report.total_staked),
            won = format!("{:.2}", report.total_won),
            forfeited = format!("{:.2}", forfeited),
            balance = format!("{:.2}", report.balance_after),
            "Round crashed"
        );

        self.last_report = Some(report.clone());
        self.publish();
        report
    }

    /// `Crashed → Idle`.
    fn reset(&mut self) {
        self.state = RoundState::Idle;
        self.round_id = None;
        self.started_at = None;
        self.crashed_at = None;
        self.elapsed = Duration::ZERO;
        self.multiplier = BASE_MULTIPLIER;
        self.message = MSG_NEXT_ROUND.to_string();
        debug!("Cooldown complete, engine idle");
        self.publish();
    }

    /// Cash out a stake at the current multiplier. Returns zero when the
    /// request is not eligible; never errors.
    pub fn request_cash_out(&mut self, id: StakeId) -> Decimal {
        if self.closed || self.state != RoundState::Flying {
            debug!(stake = %id, state = %self.state, "Cash-out ignored");
            return Decimal::ZERO;
        }
        let winnings = self.ledger.cash_out(id, self.multiplier);
        if winnings > Decimal::ZERO {
            self.message = format!("{id} cashed out for {winnings:.2}!");
        }
        winnings
    }

    /// Stop accepting operations. Nothing mutates the engine afterwards.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        info!(state = %self.state, balance = %self.ledger.balance(), "Engine closed");
    }

    fn publish(&self) {
        self.updates.send_replace(self.snapshot());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

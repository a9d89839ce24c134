//! Game session — the engine behind a lock, plus its tick scheduler.
//!
//! `GameHandle` is what callers hold. It owns the shared [`RoundEngine`],
//! spawns one ticker task per round, and tears everything down exactly
//! once. Every engine access (ticks, starts, cash-outs, reads) goes
//! through the same `tokio::sync::Mutex`, so a cash-out is always ordered
//! entirely before or after a tick.

use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::engine::ledger::LedgerTotals;
use crate::engine::round::{RoundEngine, TickOutcome};
use crate::types::{
    GameError, RoundId, RoundReport, RoundSnapshot, Stake, StakeId, StakeOutcome, StakeRequest,
};

pub type SharedEngine = Arc<Mutex<RoundEngine>>;

// ---------------------------------------------------------------------------
// Status projection
// ---------------------------------------------------------------------------

/// Everything a client needs to render the game at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct GameStatus {
    pub snapshot: RoundSnapshot,
    pub balance: Decimal,
    pub message: String,
    pub stakes: [Stake; 2],
    pub outcomes: [StakeOutcome; 2],
    pub totals: LedgerTotals,
    /// Only present once the round has crashed.
    pub crash_point: Option<Decimal>,
    /// Crash point of the previous round, shown while the next one flies.
    pub last_crash_point: Option<Decimal>,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

pub struct GameHandle {
    engine: SharedEngine,
    updates: watch::Receiver<RoundSnapshot>,
    tick_interval: Duration,
    /// Ticker of the current (or last) round. Also serializes start/shutdown.
    ticker: Mutex<Option<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl GameHandle {
    pub fn new(engine: RoundEngine) -> Self {
        let updates = engine.subscribe();
        let tick_interval = engine.config().tick_interval;
        let (shutdown, _) = watch::channel(false);
        Self {
            engine: Arc::new(Mutex::new(engine)),
            updates,
            tick_interval,
            ticker: Mutex::new(None),
            shutdown,
        }
    }

    /// Shared engine, for callers that need several reads under one lock.
    pub fn engine(&self) -> &SharedEngine {
        &self.engine
    }

    /// Stream of round snapshots: once per tick while flying, and on every
    /// state change.
    pub fn subscribe(&self) -> watch::Receiver<RoundSnapshot> {
        self.updates.clone()
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Start a round with the given slots and begin ticking.
    pub async fn start(
        &self,
        stake_one: StakeRequest,
        stake_two: StakeRequest,
    ) -> Result<RoundId, GameError> {
        let mut ticker = self.ticker.lock().await;

        let round_id = {
            let mut engine = self.engine.lock().await;
            engine.start(Instant::now(), [stake_one, stake_two])?
        };

        // The previous ticker finished when its round went idle.
        if let Some(previous) = ticker.take() {
            reap_ticker(previous).await;
        }

        *ticker = Some(tokio::spawn(run_ticker(
            Arc::clone(&self.engine),
            self.tick_interval,
            self.shutdown.subscribe(),
        )));
        Ok(round_id)
    }

    /// Cash out a slot at the live multiplier. Zero when ineligible.
    pub async fn request_cash_out(&self, id: StakeId) -> Decimal {
        self.engine.lock().await.request_cash_out(id)
    }

    pub async fn snapshot(&self) -> RoundSnapshot {
        self.engine.lock().await.snapshot()
    }

    pub async fn balance(&self) -> Decimal {
        self.engine.lock().await.balance()
    }

    /// Past crash points, most recent first.
    pub async fn history(&self) -> Vec<Decimal> {
        self.engine.lock().await.history()
    }

    pub async fn last_report(&self) -> Option<RoundReport> {
        self.engine.lock().await.last_report().cloned()
    }

    pub async fn status(&self) -> GameStatus {
        let engine = self.engine.lock().await;
        let ledger = engine.ledger();
        GameStatus {
            snapshot: engine.snapshot(),
            balance: ledger.balance(),
            message: engine.message().to_string(),
            stakes: ledger.stakes().clone(),
            outcomes: ledger.outcomes(),
            totals: ledger.totals().clone(),
            crash_point: engine.revealed_crash_point(),
            last_crash_point: engine.last_crash_point(),
        }
    }

    /// Stop the ticker and close the engine. Safe to call more than once;
    /// only the first call does anything.
    pub async fn shutdown(&self) {
        let mut ticker = self.ticker.lock().await;
        if self.shutdown.send_replace(true) {
            return;
        }

        if let Some(task) = ticker.take() {
            reap_ticker(task).await;
        }
        self.engine.lock().await.close();
        info!("Game session shut down");
    }
}

impl Drop for GameHandle {
    fn drop(&mut self) {
        // The ticker observes this and exits without touching the engine.
        self.shutdown.send_replace(true);
    }
}

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

/// Await a finished or cancelled ticker. Returns `false` if it panicked.
async fn reap_ticker(task: JoinHandle<()>) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) => {
            error!(error = %e, "Ticker task failed");
            false
        }
    }
}

/// Drive one round: tick on a fixed period until the crash, then wait out
/// the cooldown and return the engine to idle.
async fn run_ticker(
    engine: SharedEngine,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    if *shutdown.borrow() {
        return;
    }

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let cooldown_until = loop {
        tokio::select! {
            _ = interval.tick() => {
                let mut engine = engine.lock().await;
                match engine.tick(Instant::now()) {
                    TickOutcome::Flying { .. } => {}
                    TickOutcome::Crashed(_) => break engine.cooldown_deadline(),
                    other => {
                        debug!(outcome = ?other, "Ticker found no flight, stopping");
                        break None;
                    }
                }
            }
            _ = shutdown.changed() => {
                debug!("Ticker cancelled in flight");
                return;
            }
        }
    };
    drop(interval);

    let Some(deadline) = cooldown_until else {
        return;
    };

    tokio::select! {
        _ = tokio::time::sleep_until(deadline) => {
            let mut engine = engine.lock().await;
            engine.tick(Instant::now());
        }
        _ = shutdown.changed() => {
            debug!("Ticker cancelled during cooldown");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::crash::ScriptedCrashPoints;
    use crate::engine::round::EngineConfig;
    use crate::types::RoundState;
    use rust_decimal_macros::dec;

    fn handle(balance: Decimal, crash_points: &[Decimal]) -> GameHandle {
        GameHandle::new(RoundEngine::new(
            EngineConfig::default(),
            balance,
            Box::new(ScriptedCrashPoints::new(crash_points.iter().copied())),
        ))
    }

    fn bet(amount: Decimal) -> StakeRequest {
        StakeRequest::new(amount, None)
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_crashes_and_cools_down() {
        let game = handle(dec!(1000), &[dec!(1.50)]);
        game.start(bet(dec!(10)), StakeRequest::none()).await.unwrap();
        assert_eq!(game.snapshot().await.state, RoundState::Flying);

        // 1.50x is reached a little under two seconds in.
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(game.snapshot().await.state, RoundState::Crashed);
        assert_eq!(game.snapshot().await.multiplier, dec!(1.50));
        assert_eq!(game.history().await, vec![dec!(1.50)]);
        assert_eq!(game.balance().await, dec!(990));

        tokio::time::sleep(Duration::from_secs(3)).await;
        let snap = game.snapshot().await;
        assert_eq!(snap.state, RoundState::Idle);
        assert_eq!(snap.multiplier, dec!(1.00));
        assert_eq!(snap.elapsed_secs, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cash_out_during_flight() {
        let game = handle(dec!(1000), &[dec!(5.00)]);
        game.start(bet(dec!(10)), StakeRequest::none()).await.unwrap();

        // Between ticks, so nothing moves while we read and cash out.
        tokio::time::sleep(Duration::from_millis(1_025)).await;
        let multiplier = game.snapshot().await.multiplier;
        let winnings = game.request_cash_out(StakeId::One).await;

        assert!(multiplier > dec!(1.00));
        assert_eq!(winnings, dec!(10) * multiplier);
        assert_eq!(game.request_cash_out(StakeId::One).await, Decimal::ZERO);
        assert_eq!(game.balance().await, dec!(990) + winnings);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_cash_out_without_caller() {
        let game = handle(dec!(1000), &[dec!(3.00)]);
        game.start(
            StakeRequest::new(dec!(10), Some(dec!(2.0))),
            StakeRequest::none(),
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        let status = game.status().await;
        let stake = &status.stakes[0];
        assert!(stake.cashed_out);
        assert!(stake.cashed_out_at.unwrap() >= dec!(2.0));
        assert!(stake.cashed_out_at.unwrap() < dec!(3.00));
        assert_eq!(status.balance, dec!(990) + stake.winnings);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_rejected_while_flying() {
        let game = handle(dec!(1000), &[dec!(10)]);
        game.start(bet(dec!(10)), StakeRequest::none()).await.unwrap();
        let err = game.start(bet(dec!(10)), StakeRequest::none()).await.unwrap_err();
        assert!(matches!(err, GameError::InvalidState { .. }));
        assert_eq!(game.balance().await, dec!(990));
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_rounds() {
        let game = handle(dec!(100), &[dec!(1.10), dec!(1.20)]);

        game.start(bet(dec!(5)), StakeRequest::none()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(game.snapshot().await.state, RoundState::Idle);

        game.start(bet(dec!(5)), StakeRequest::none()).await.unwrap();
        let status = game.status().await;
        assert_eq!(status.crash_point, None);
        assert_eq!(status.last_crash_point, Some(dec!(1.10)));
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(game.history().await, vec![dec!(1.20), dec!(1.10)]);
        assert_eq!(game.status().await.last_crash_point, Some(dec!(1.20)));
        assert_eq!(game.balance().await, dec!(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_updates() {
        let game = handle(dec!(1000), &[dec!(2.00)]);
        let mut rx = game.subscribe();
        game.start(bet(dec!(10)), StakeRequest::none()).await.unwrap();

        let mut saw_flying = false;
        let mut saw_crash = false;
        while !saw_crash {
            rx.changed().await.unwrap();
            let snap = rx.borrow_and_update().clone();
            match snap.state {
                RoundState::Flying => saw_flying = true,
                RoundState::Crashed => {
                    saw_crash = true;
                    assert_eq!(snap.multiplier, dec!(2.00));
                }
                RoundState::Idle => {}
            }
        }
        assert!(saw_flying);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_ticker_once() {
        let game = handle(dec!(1000), &[dec!(50)]);
        game.start(bet(dec!(10)), StakeRequest::none()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        game.shutdown().await;
        game.shutdown().await;
        assert!(game.is_shut_down());

        let frozen = game.snapshot().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(game.snapshot().await, frozen);
        assert_eq!(game.request_cash_out(StakeId::One).await, Decimal::ZERO);
        assert!(game.start(bet(dec!(1)), StakeRequest::none()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_cooldown() {
        let game = handle(dec!(1000), &[dec!(1.05)]);
        game.start(bet(dec!(10)), StakeRequest::none()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(game.snapshot().await.state, RoundState::Crashed);

        game.shutdown().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(game.snapshot().await.state, RoundState::Crashed);
    }

    #[tokio::test]
    async fn test_reap_ticker_reports_panic() {
        let clean = tokio::spawn(async {});
        assert!(reap_ticker(clean).await);

        let panicked = tokio::spawn(async { panic!("tick failed") });
        assert!(!reap_ticker(panicked).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_start_spawns_nothing() {
        let game = handle(dec!(50), &[dec!(2)]);
        let err = game.start(bet(dec!(60)), StakeRequest::none()).await.unwrap_err();
        assert!(matches!(err, GameError::InsufficientBalance { .. }));
        assert!(game.ticker.lock().await.is_none());
        assert_eq!(game.snapshot().await.state, RoundState::Idle);
        assert_eq!(game.balance().await, dec!(50));
    }
}

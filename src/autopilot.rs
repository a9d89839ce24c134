//! Autopilot — unattended play.
//!
//! Watches the round stream and starts a new round with the configured
//! stakes each time the engine returns to idle. Stops when the balance
//! can no longer cover the stakes or when cancelled.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::AutopilotConfig;
use crate::engine::session::GameHandle;
use crate::types::{GameError, RoundState};

/// Why the autopilot loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AutopilotExit {
    Cancelled,
    OutOfFunds,
    Rejected(GameError),
    StreamClosed,
}

pub async fn run(
    game: Arc<GameHandle>,
    config: AutopilotConfig,
    mut cancel: watch::Receiver<bool>,
) -> AutopilotExit {
    let (one, two) = config.stakes();
    let mut updates = game.subscribe();
    let mut rounds = 0u64;

    loop {
        if *cancel.borrow() {
            return AutopilotExit::Cancelled;
        }

        if updates.borrow_and_update().state == RoundState::Idle {
            match game.start(one, two).await {
                Ok(round_id) => {
                    rounds += 1;
                    info!(round = %round_id, rounds, "Autopilot started round");
                }
                Err(GameError::InsufficientBalance { needed, available }) => {
                    warn!(
                        needed = %needed,
                        available = %available,
                        rounds,
                        "Autopilot out of funds"
                    );
                    return AutopilotExit::OutOfFunds;
                }
                Err(GameError::InvalidState { .. }) => {}
                Err(e) => {
                    warn!(error = %e, "Autopilot stake rejected");
                    return AutopilotExit::Rejected(e);
                }
            }
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    return AutopilotExit::StreamClosed;
                }
            }
            res = cancel.changed() => {
                // A dropped sender can never signal again; treat it as a stop.
                if res.is_err() {
                    return AutopilotExit::Cancelled;
                }
            }
        }
    }
}

//! Settlement ledger — balance, stakes, and payouts.
//!
//! The ledger is the only place the player's balance changes. Stakes are
//! debited in full when a round opens; each cash-out credits
//! `amount × multiplier` exactly once. A stake that is still open when the
//! round closes is simply never credited.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::{GameError, Stake, StakeId, StakeOutcome, StakeRequest, BASE_MULTIPLIER};

// ---------------------------------------------------------------------------
// Lifetime totals
// ---------------------------------------------------------------------------

/// Running totals over the life of the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTotals {
    pub rounds_played: u64,
    pub total_staked: Decimal,
    pub total_won: Decimal,
    pub peak_balance: Decimal,
}

impl LedgerTotals {
    fn new(balance: Decimal) -> Self {
        Self {
            rounds_played: 0,
            total_staked: Decimal::ZERO,
            total_won: Decimal::ZERO,
            peak_balance: balance,
        }
    }

    /// Net player result across all rounds.
    pub fn net(&self) -> Decimal {
        self.total_won - self.total_staked
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SettlementLedger {
    balance: Decimal,
    stakes: [Stake; 2],
    /// True between `place_stakes` and `close_round`.
    round_open: bool,
    totals: LedgerTotals,
}

impl SettlementLedger {
    pub fn new(initial_balance: Decimal) -> Self {
        let balance = initial_balance.max(Decimal::ZERO);
        Self {
            balance,
            stakes: [Stake::default(), Stake::default()],
            round_open: false,
            totals: LedgerTotals::new(balance),
        }
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn stake(&self, id: StakeId) -> &Stake {
        &self.stakes[id.index()]
    }

    pub fn stakes(&self) -> &[Stake; 2] {
        &self.stakes
    }

    pub fn totals(&self) -> &LedgerTotals {
        &self.totals
    }

    pub fn is_round_open(&self) -> bool {
        self.round_open
    }

    /// Sum of the active stakes of the current (or last) round.
    pub fn total_staked(&self) -> Decimal {
        self.stakes.iter().map(|s| s.amount).sum()
    }

    /// Sum of the winnings credited in the current (or last) round.
    pub fn total_won(&self) -> Decimal {
        self.stakes.iter().map(|s| s.winnings).sum()
    }

    /// Check a stake pair without touching any state. Returns the total.
    pub fn validate(&self, requests: &[StakeRequest; 2]) -> Result<Decimal, GameError> {
        if let Some(bad) = requests.iter().find(|r| r.amount < Decimal::ZERO) {
            return Err(GameError::InvalidStake(format!(
                "stake amount cannot be negative ({:.2})",
                bad.amount
            )));
        }

        let total: Decimal = requests.iter().map(|r| r.amount).sum();
        if total <= Decimal::ZERO {
            return Err(GameError::InvalidStake(
                "place at least one bet".to_string(),
            ));
        }
        if total > self.balance {
            return Err(GameError::InsufficientBalance {
                needed: total,
                available: self.balance,
            });
        }
        Ok(total)
    }

    /// Debit both slots and open a round. Nothing changes on error.
    pub fn place_stakes(&mut self, requests: [StakeRequest; 2]) -> Result<Decimal, GameError> {
        if self.round_open {
            return Err(GameError::InvalidState {
                operation: "place stakes",
                state: "a round is open".to_string(),
            });
        }
        let total = self.validate(&requests)?;

        self.balance -= total;
        for (slot, req) in self.stakes.iter_mut().zip(requests) {
            *slot = Stake {
                amount: req.amount,
                auto_cash_out: req.auto_cash_out.filter(|t| *t > BASE_MULTIPLIER),
                ..Stake::default()
            };
        }
        self.round_open = true;
        self.totals.rounds_played += 1;
        self.totals.total_staked += total;

        debug!(
            total = %total,
            balance = %self.balance,
            "Stakes placed"
        );
        Ok(total)
    }

    /// Settle `id` at `multiplier`. Returns the winnings credited, or zero
    /// when the stake is not eligible (round closed, empty slot, already
    /// settled).
    pub fn cash_out(&mut self, id: StakeId, multiplier: Decimal) -> Decimal {
        if !self.round_open {
            return Decimal::ZERO;
        }
        let stake = &mut self.stakes[id.index()];
        if !stake.is_open() {
            return Decimal::ZERO;
        }

        let winnings = stake.amount * multiplier;
        stake.cashed_out = true;
        stake.winnings = winnings;
        stake.cashed_out_at = Some(multiplier);

        self.balance += winnings;
        self.totals.total_won += winnings;
        if self.balance > self.totals.peak_balance {
            self.totals.peak_balance = self.balance;
        }

        info!(
            stake = %id,
            multiplier = format!("{:.2}x", multiplier),
            winnings = format!("{:.2}", winnings),
            balance = format!("{:.2}", self.balance),
            "Stake cashed out"
        );
        winnings
    }

    /// Slots whose auto-cash-out threshold is reached at `multiplier`,
    /// in settlement order.
    pub fn due_auto_cash_outs(&self, multiplier: Decimal) -> Vec<StakeId> {
        if !self.round_open {
            return Vec::new();
        }
        StakeId::ALL
            .into_iter()
            .filter(|id| self.stake(*id).auto_triggered(multiplier))
            .collect()
    }

    /// Close the round. Open stakes are forfeited; their debit stands.
    /// Returns the amount forfeited.
    pub fn close_round(&mut self) -> Decimal {
        if !self.round_open {
            return Decimal::ZERO;
        }
        self.round_open = false;
        let forfeited: Decimal = self
            .stakes
            .iter()
            .filter(|s| s.is_open())
            .map(|s| s.amount)
            .sum();
        if forfeited > Decimal::ZERO {
            debug!(forfeited = %forfeited, "Open stakes forfeited");
        }
        forfeited
    }

    /// Caller-facing outcome of a slot.
    pub fn outcome(&self, id: StakeId) -> StakeOutcome {
        let stake = self.stake(id);
        if !stake.is_active() {
            return StakeOutcome::Inactive;
        }
        match (stake.cashed_out, self.round_open) {
            (true, _) => StakeOutcome::Won {
                amount: stake.amount,
                multiplier: stake.cashed_out_at.unwrap_or(BASE_MULTIPLIER),
                winnings: stake.winnings,
            },
            (false, true) => StakeOutcome::Pending { amount: stake.amount },
            (false, false) => StakeOutcome::Lost { amount: stake.amount },
        }
    }

    pub fn outcomes(&self) -> [StakeOutcome; 2] {
        [self.outcome(StakeId::One), self.outcome(StakeId::Two)]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Crash-point sampling.
//!
//! A round's crash point is drawn once at take-off:
//!
//! ```text
//! p          ~ U[0, 1)
//! crash_point = max(1.01, floor(100 / (1 - p)) / 100)
//! ```
//!
//! Most rounds end early, with a long right tail as `p → 1`. The value is
//! truncated (not rounded) to cents.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use tracing::debug;

use crate::types::MIN_CRASH_POINT;

// ---------------------------------------------------------------------------
// Uniform draws
// ---------------------------------------------------------------------------

/// A source of uniform draws in `[0, 1)`.
///
/// Implementations may occasionally return exactly `1.0` (some generators
/// work on the closed interval); [`crash_point_from_unit`] folds that back
/// into range before applying the formula.
#[cfg_attr(test, mockall::automock)]
pub trait UnitSource: Send {
    fn next_unit(&mut self) -> f64;
}

/// `rand`-backed uniform source.
pub struct RandomUnitSource {
    rng: StdRng,
}

impl RandomUnitSource {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Seeded generator for reproducible sessions.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl UnitSource for RandomUnitSource {
    fn next_unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// Largest `f64` strictly below 1.0.
const BELOW_ONE: f64 = 1.0 - f64::EPSILON / 2.0;

/// Map a uniform draw onto a crash point.
pub fn crash_point_from_unit(p: f64) -> Decimal {
    let p = if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, BELOW_ONE)
    };

    // Whole cents, truncated. 1 / (1 - p) is at most 2^53 so this fits i64.
    let cents = ((1.0 / (1.0 - p)) * 100.0).floor() as i64;
    Decimal::new(cents, 2).max(MIN_CRASH_POINT)
}

// ---------------------------------------------------------------------------
// Crash-point sources
// ---------------------------------------------------------------------------

/// Supplies one crash point per round.
pub trait CrashPointSource: Send {
    fn next_crash_point(&mut self) -> Decimal;
}

/// Production source: uniform draw through [`crash_point_from_unit`].
pub struct RandomCrashPoints<U: UnitSource = RandomUnitSource> {
    units: U,
}

impl RandomCrashPoints<RandomUnitSource> {
    pub fn from_entropy() -> Self {
        Self::new(RandomUnitSource::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(RandomUnitSource::seeded(seed))
    }
}

impl<U: UnitSource> RandomCrashPoints<U> {
    pub fn new(units: U) -> Self {
        Self { units }
    }
}

impl<U: UnitSource> CrashPointSource for RandomCrashPoints<U> {
    fn next_crash_point(&mut self) -> Decimal {
        let p = self.units.next_unit();
        let crash_point = crash_point_from_unit(p);
        debug!(p, crash_point = %crash_point, "Crash point drawn");
        crash_point
    }
}

/// Scripted crash points, replayed in order and then repeated from the
/// last value. Used for demos and deterministic tests.
#[derive(Debug, Clone)]
pub struct ScriptedCrashPoints {
    queue: VecDeque<Decimal>,
    last: Decimal,
}

impl ScriptedCrashPoints {
    pub fn new<I: IntoIterator<Item = Decimal>>(points: I) -> Self {
        let queue: VecDeque<Decimal> = points
            .into_iter()
            .map(|p| p.max(MIN_CRASH_POINT))
            .collect();
        let last = queue.back().copied().unwrap_or(MIN_CRASH_POINT);
        Self { queue, last }
    }

    pub fn fixed(point: Decimal) -> Self {
        Self::new([point])
    }
}

impl CrashPointSource for ScriptedCrashPoints {
    fn next_crash_point(&mut self) -> Decimal {
        if let Some(p) = self.queue.pop_front() {
            self.last = p;
        }
        self.last
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

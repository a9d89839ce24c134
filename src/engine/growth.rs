//! Multiplier growth curve.
//!
//! `multiplier(t) = round2(1 + 0.2·t + 0.05·t^1.5)` for `t` seconds of
//! flight. The curve is a pure function of absolute elapsed time so the
//! value never depends on how often, or how regularly, the engine ticks.

use rust_decimal::prelude::*;
use std::time::Duration;

use crate::types::BASE_MULTIPLIER;

/// Linear growth coefficient (per second).
const LINEAR_RATE: f64 = 0.2;

/// Coefficient of the `t^1.5` acceleration term.
const ACCEL_RATE: f64 = 0.05;

/// Unrounded curve value at `t` seconds.
pub fn raw_multiplier(t: f64) -> f64 {
    let t = t.max(0.0);
    1.0 + LINEAR_RATE * t + ACCEL_RATE * t.powf(1.5)
}

/// Multiplier displayed and settled at `t` seconds, rounded to cents.
pub fn multiplier_at_secs(t: f64) -> Decimal {
    Decimal::from_f64(raw_multiplier(t))
        .map(|m| m.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
        .unwrap_or(Decimal::MAX)
        .max(BASE_MULTIPLIER)
}

/// Multiplier after `elapsed` wall-clock time in flight.
pub fn multiplier_at(elapsed: Duration) -> Decimal {
    multiplier_at_secs(elapsed.as_secs_f64())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_starts_at_one() {
        assert_eq!(multiplier_at_secs(0.0), dec!(1.00));
        assert_eq!(multiplier_at(Duration::ZERO), dec!(1.00));
    }

    #[test]
    fn test_known_points() {
        // 1 + 0.2 + 0.05 = 1.25
        assert_eq!(multiplier_at_secs(1.0), dec!(1.25));
        // 1 + 0.8 + 0.05 * 8 = 2.20
        assert_eq!(multiplier_at_secs(4.0), dec!(2.20));
        // 1 + 3.42 * 0.2 + 0.05 * 3.42^1.5 ≈ 2.0002
        assert_eq!(multiplier_at_secs(3.42), dec!(2.00));
    }

    #[test]
    fn test_raw_curve_strictly_increasing() {
        let mut prev = raw_multiplier(0.0);
        for i in 1..10_000 {
            let next = raw_multiplier(i as f64 * 0.001);
            assert!(next > prev, "raw curve not increasing at step {i}");
            prev = next;
        }
    }

    #[test]
    fn test_rounded_curve_strictly_increasing_at_tick_resolution() {
        // The slope never drops below 0.2/s, so 100ms steps move at least
        // two cents and the rounded value must strictly increase.
        let mut prev = multiplier_at_secs(0.0);
        for i in 1..600 {
            let next = multiplier_at_secs(i as f64 * 0.1);
            assert!(next > prev, "rounded curve stalled at {:.1}s", i as f64 * 0.1);
            prev = next;
        }
    }

    #[test]
    fn test_rounded_curve_never_decreases() {
        let mut prev = multiplier_at_secs(0.0);
        for i in 1..20_000 {
            let next = multiplier_at_secs(i as f64 * 0.0007);
            assert!(next >= prev);
            prev = next;
        }
    }

    #[test]
    fn test_convex_growth() {
        // Equal time steps yield larger gains later in the flight.
        let early = raw_multiplier(2.0) - raw_multiplier(1.0);
        let late = raw_multiplier(11.0) - raw_multiplier(10.0);
        assert!(late > early);
    }

    #[test]
    fn test_negative_time_clamped() {
        assert_eq!(multiplier_at_secs(-5.0), dec!(1.00));
    }

    #[test]
    fn test_same_elapsed_same_value() {
        let a = multiplier_at(Duration::from_millis(2_750));
        let b = multiplier_at(Duration::from_millis(2_750));
        assert_eq!(a, b);
    }
}

//! Energy bookkeeping shared by every code path that reads or spends it.
//!
//! Energy regenerates linearly from `last_energy_update` and is always kept
//! inside `0..=max_energy`.

use chrono::{DateTime, Utc};

/// Energy after regenerating from `last_update` until `now`.
pub fn regenerated(
    energy: i64,
    max_energy: i64,
    regen_rate: i64,
    last_update: DateTime<Utc>,
    now: DateTime<Utc>,
) -> i64 {
    let elapsed = (now - last_update).num_seconds().max(0);
    let gained = elapsed.saturating_mul(regen_rate.max(0));
    energy.saturating_add(gained).clamp(0, max_energy.max(0))
}

/// What is actually applied from a submitted tap batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub taps: i64,
    pub coins: i64,
}

impl Settlement {
    pub fn is_clamped(&self, requested_taps: i64, requested_coins: i64) -> bool {
        self.taps != requested_taps || self.coins != requested_coins
    }
}

/// Settles a batch of `taps` worth `coins_earned` against available energy.
///
/// A batch larger than the energy left is cut down to the energy left, with
/// coins scaled by the per-tap value of the batch. Coins are then capped at
/// what `coins_per_tap` and the best live multiplier allow.
pub fn settle_taps(
    energy: i64,
    taps: i64,
    coins_earned: i64,
    coins_per_tap: i64,
    multiplier: f64,
) -> Settlement {
    let energy = energy.max(0);
    let (taps_applied, mut coins) = if energy < taps {
        let per_tap = if taps > 0 { coins_earned / taps } else { 0 };
        (energy, energy * per_tap)
    } else {
        (taps, coins_earned)
    };

    let ceiling = (taps_applied as f64 * coins_per_tap as f64 * multiplier.max(1.0)).floor() as i64;
    if coins > ceiling {
        coins = ceiling;
    }

    Settlement {
        taps: taps_applied,
        coins: coins.max(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn regenerates_by_elapsed_seconds() {
        assert_eq!(regenerated(100, 1000, 2, at(0), at(30)), 160);
    }

    #[test]
    fn regeneration_stops_at_max() {
        assert_eq!(regenerated(990, 1000, 5, at(0), at(60)), 1000);
    }

    #[test]
    fn partial_seconds_are_truncated() {
        let later = at(0) + Duration::milliseconds(2_900);
        assert_eq!(regenerated(10, 1000, 1, at(0), later), 12);
    }

    #[test]
    fn clock_skew_does_not_drain_energy() {
        assert_eq!(regenerated(500, 1000, 1, at(100), at(0)), 500);
    }

    #[test]
    fn energy_above_max_is_pulled_back() {
        assert_eq!(regenerated(1500, 1000, 1, at(0), at(0)), 1000);
        assert_eq!(regenerated(-3, 1000, 0, at(0), at(10)), 0);
    }

    #[test]
    fn huge_gaps_do_not_overflow() {
        assert_eq!(regenerated(0, 1000, i64::MAX, at(0), at(1_000_000)), 1000);
    }

    #[test]
    fn full_batch_is_applied_when_energy_allows() {
        let s = settle_taps(100, 10, 30, 3, 1.0);
        assert_eq!(s, Settlement { taps: 10, coins: 30 });
        assert!(!s.is_clamped(10, 30));
    }

    #[test]
    fn batch_is_cut_to_remaining_energy() {
        let s = settle_taps(4, 10, 30, 3, 1.0);
        assert_eq!(s, Settlement { taps: 4, coins: 12 });
        assert!(s.is_clamped(10, 30));
    }

    #[test]
    fn coins_are_capped_by_tap_value() {
        assert_eq!(settle_taps(100, 5, 1_000, 2, 1.0), Settlement { taps: 5, coins: 10 });
    }

    #[test]
    fn multiplier_raises_the_cap() {
        assert_eq!(settle_taps(100, 5, 20, 2, 2.0), Settlement { taps: 5, coins: 20 });
        assert_eq!(settle_taps(100, 5, 25, 2, 2.0), Settlement { taps: 5, coins: 20 });
    }

    #[test]
    fn no_energy_means_nothing_applied() {
        assert_eq!(settle_taps(0, 3, 3, 1, 1.0), Settlement { taps: 0, coins: 0 });
    }
}

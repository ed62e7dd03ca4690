//! Payout calculation
//!
//! Pure functions from a risk's terms and its observed rainfall to a payout
//! percentage scaled by [`PERCENTAGE_MULTIPLIER`]. The index ratio `r`
//! measures how far the observation deviates from the historical average:
//!
//! ```text
//!   excess:  r = (actual - hist) / hist      (0 when actual <= hist)
//!   deficit: r = (hist - actual) / hist      (0 when actual >= hist)
//!
//!   r <= trigger         -> 0
//!   r >= exit            -> 100%
//!   otherwise            -> r / exit                      (proportional)
//!                           (r - trigger) / (exit - trigger)  (interpolated)
//! ```
//!
//! Observations covering fewer days than the historical reference never pay.

use rainpool_common::{Amount, PERCENTAGE_MULTIPLIER};
use serde::{Deserialize, Serialize};

const SCALE: u128 = PERCENTAGE_MULTIPLIER as u128;

/// Shape of the payout curve between trigger and exit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutCurve {
    /// `r / exit`; jumps to `trigger / exit` just above the trigger
    #[default]
    Proportional,
    /// `(r - trigger) / (exit - trigger)`; continuous from 0
    Interpolated,
}

/// Which direction of deviation is insured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RainfallIndex {
    /// Too much rain
    #[default]
    Excess,
    /// Too little rain
    Deficit,
}

/// Trigger and exit thresholds, scaled by [`PERCENTAGE_MULTIPLIER`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub trigger: u64,
    pub exit: u64,
}

/// Precipitation over a number of days, scaled by `PRECIPITATION_MULTIPLIER`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Precipitation {
    pub amount: u64,
    pub days: u32,
}

/// Deviation of `actual` from `hist`, scaled by [`PERCENTAGE_MULTIPLIER`]
pub fn index_ratio(hist: u64, actual: u64, index: RainfallIndex) -> u64 {
    let deviation = match index {
        RainfallIndex::Excess => actual.saturating_sub(hist),
        RainfallIndex::Deficit => hist.saturating_sub(actual),
    };
    if deviation == 0 {
        return 0;
    }
    if hist == 0 {
        // any rain against a dry reference saturates the index
        return u64::MAX;
    }
    let ratio = deviation as u128 * SCALE / hist as u128;
    u64::try_from(ratio).unwrap_or(u64::MAX)
}

/// Payout percentage in `[0, PERCENTAGE_MULTIPLIER]`
pub fn payout_percentage(
    thresholds: Thresholds,
    hist: Precipitation,
    actual: Precipitation,
    index: RainfallIndex,
    curve: PayoutCurve,
) -> u64 {
    if actual.days < hist.days {
        return 0;
    }

    let r = index_ratio(hist.amount, actual.amount, index);
    if r <= thresholds.trigger {
        return 0;
    }
    if r >= thresholds.exit {
        return PERCENTAGE_MULTIPLIER;
    }

    let pct = match curve {
        PayoutCurve::Proportional => r as u128 * SCALE / thresholds.exit as u128,
        PayoutCurve::Interpolated => {
            (r - thresholds.trigger) as u128 * SCALE
                / (thresholds.exit - thresholds.trigger) as u128
        }
    };
    pct.min(SCALE) as u64
}

/// Apply a payout percentage to a sum insured
pub fn payout_amount(percentage: u64, sum_insured: Amount) -> Amount {
    let amount = percentage as u128 * sum_insured as u128 / SCALE;
    (amount as Amount).min(sum_insured)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pct(v: f64) -> u64 {
        (v * PERCENTAGE_MULTIPLIER as f64).round() as u64
    }

    fn prec(amount: u64, days: u32) -> Precipitation {
        Precipitation { amount, days }
    }

    fn proportional(t: Thresholds, hist: Precipitation, actual: Precipitation) -> u64 {
        payout_percentage(t, hist, actual, RainfallIndex::Excess, PayoutCurve::Proportional)
    }

    #[test]
    fn test_trigger_and_exit_band() {
        let t = Thresholds {
            trigger: pct(0.1),
            exit: pct(1.0),
        };
        assert_eq!(proportional(t, prec(500, 2), prec(525, 2)), 0);
        assert_eq!(proportional(t, prec(500, 2), prec(600, 2)), pct(0.2));
        assert_eq!(proportional(t, prec(500, 2), prec(1000, 2)), pct(1.0));
        assert_eq!(proportional(t, prec(500, 2), prec(5000, 2)), pct(1.0));
    }

    #[test]
    fn test_ratio_at_trigger_pays_nothing() {
        let t = Thresholds {
            trigger: pct(0.1),
            exit: pct(1.0),
        };
        assert_eq!(proportional(t, prec(500, 2), prec(550, 2)), 0);
    }

    #[test]
    fn test_proportional_examples() {
        let t = Thresholds {
            trigger: pct(0.75),
            exit: pct(2.0),
        };
        assert_eq!(proportional(t, prec(210, 1), prec(420, 2)), 500_000);

        let t = Thresholds {
            trigger: pct(0.1),
            exit: pct(1.0),
        };
        assert_eq!(proportional(t, prec(420, 1), prec(588, 1)), 400_000);
    }

    #[test]
    fn test_product_example_table() {
        let t = Thresholds {
            trigger: pct(0.05),
            exit: pct(1.0),
        };
        let hist = prec(500, 1);
        let expected = |day: u64| match day {
            0..=5 => 0,
            6..=9 => pct(0.2) * (day - 5),
            _ => pct(1.0),
        };
        for day in 0..=20u64 {
            assert_eq!(proportional(t, hist, prec(day * 100, 2)), expected(day), "day {}", day);
        }
    }

    #[test]
    fn test_fewer_observed_days_pay_nothing() {
        let t = Thresholds {
            trigger: pct(0.1),
            exit: pct(1.0),
        };
        assert_eq!(proportional(t, prec(420, 2), prec(588, 1)), 0);
    }

    #[test]
    fn test_interpolated_curve() {
        let t = Thresholds {
            trigger: pct(0.1),
            exit: pct(1.0),
        };
        let p = payout_percentage(
            t,
            prec(500, 2),
            prec(600, 2),
            RainfallIndex::Excess,
            PayoutCurve::Interpolated,
        );
        // (0.2 - 0.1) / 0.9
        assert_eq!(p, 111_111);
    }

    #[test]
    fn test_deficit_index() {
        let t = Thresholds {
            trigger: pct(0.1),
            exit: pct(0.5),
        };
        let deficit = |actual| {
            payout_percentage(
                t,
                prec(1000, 5),
                prec(actual, 5),
                RainfallIndex::Deficit,
                PayoutCurve::Proportional,
            )
        };
        assert_eq!(deficit(1200), 0);
        assert_eq!(deficit(800), pct(0.4));
        assert_eq!(deficit(0), pct(1.0));
    }

    #[test]
    fn test_zero_historical_reference() {
        assert_eq!(index_ratio(0, 0, RainfallIndex::Excess), 0);
        assert_eq!(index_ratio(0, 1, RainfallIndex::Excess), u64::MAX);
        assert_eq!(index_ratio(0, 10, RainfallIndex::Deficit), 0);
    }

    #[test]
    fn test_payout_amount() {
        assert_eq!(payout_amount(pct(0.2), 5000), 1000);
        assert_eq!(payout_amount(pct(1.0), 5000), 5000);
        assert_eq!(payout_amount(0, 5000), 0);
        assert_eq!(payout_amount(pct(0.333333), 10), 3);
    }

    fn thresholds() -> impl Strategy<Value = Thresholds> {
        (0u64..PERCENTAGE_MULTIPLIER).prop_flat_map(|trigger| {
            (trigger + 1..=4 * PERCENTAGE_MULTIPLIER)
                .prop_map(move |exit| Thresholds { trigger, exit })
        })
    }

    proptest! {
        #[test]
        fn test_percentage_bounded(
            t in thresholds(),
            hist in 1u64..100_000,
            actual in 0u64..1_000_000,
            interpolated in any::<bool>(),
        ) {
            let curve = if interpolated { PayoutCurve::Interpolated } else { PayoutCurve::Proportional };
            let p = payout_percentage(t, prec(hist, 3), prec(actual, 3), RainfallIndex::Excess, curve);
            prop_assert!(p <= PERCENTAGE_MULTIPLIER);
        }

        #[test]
        fn test_percentage_monotonic_in_actual(
            t in thresholds(),
            hist in 1u64..100_000,
            a in 0u64..1_000_000,
            b in 0u64..1_000_000,
            interpolated in any::<bool>(),
        ) {
            let curve = if interpolated { PayoutCurve::Interpolated } else { PayoutCurve::Proportional };
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let p_lo = payout_percentage(t, prec(hist, 3), prec(lo, 3), RainfallIndex::Excess, curve);
            let p_hi = payout_percentage(t, prec(hist, 3), prec(hi, 3), RainfallIndex::Excess, curve);
            prop_assert!(p_lo <= p_hi);
        }

        #[test]
        fn test_payout_never_exceeds_sum_insured(p in 0u64..=PERCENTAGE_MULTIPLIER, sum in 0u64..u64::MAX / 2) {
            prop_assert!(payout_amount(p, sum) <= sum);
        }
    }
}

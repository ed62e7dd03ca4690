//! Product settings

use rainpool_common::{FeeSpec, SECONDS_PER_DAY};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::claims::BatchOrder;
use crate::payout::PayoutCurve;

/// Default premium fee fraction (10%)
pub const DEFAULT_PREMIUM_FEE_FRACTION: Decimal = Decimal::from_parts(10, 0, 0, false, 2);

/// Rain product configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSettings {
    /// Fee charged on premium payments
    pub premium_fee: FeeSpec,
    /// Risk window bounds (seconds)
    pub min_risk_duration: i64,
    pub max_risk_duration: i64,
    /// Largest accepted oracle observation, in stored fixed-point units
    pub max_precipitation: u64,
    pub payout_curve: PayoutCurve,
    /// Order in which batch processing walks a risk's policies
    pub batch_order: BatchOrder,
}

impl Default for ProductSettings {
    fn default() -> Self {
        Self {
            premium_fee: FeeSpec {
                fixed: 0,
                fractional: DEFAULT_PREMIUM_FEE_FRACTION,
            },
            min_risk_duration: SECONDS_PER_DAY,
            max_risk_duration: 30 * SECONDS_PER_DAY,
            max_precipitation: 10_000,
            payout_curve: PayoutCurve::Proportional,
            batch_order: BatchOrder::NewestFirst,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults() {
        let settings = ProductSettings::default();
        assert_eq!(settings.premium_fee.fractional, dec!(0.10));
        assert_eq!(settings.premium_fee.gross_for(300), 330);
        assert_eq!(settings.batch_order, BatchOrder::NewestFirst);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_value(ProductSettings::default()).unwrap();
        assert_eq!(json["payout_curve"], "proportional");
        assert_eq!(json["batch_order"], "newest_first");

        let mut json = json;
        json["payout_curve"] = "interpolated".into();
        let parsed: ProductSettings = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.payout_curve, PayoutCurve::Interpolated);
    }
}

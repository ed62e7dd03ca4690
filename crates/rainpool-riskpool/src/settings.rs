//! Riskpool settings

use rainpool_common::{Amount, FeeSpec, Wallets, SECONDS_PER_DAY};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Default capital fee fraction (5%)
pub const DEFAULT_CAPITAL_FEE_FRACTION: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

/// Riskpool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskpoolSettings {
    /// Id of this riskpool, recorded on every bundle
    pub riskpool_id: u64,
    /// Fee charged on bundle funding
    pub capital_fee: FeeSpec,
    /// Sum insured as a percentage of protected balance
    pub sum_insured_percentage: u64,
    /// Bundle lifetime bounds (seconds)
    pub min_bundle_lifetime: i64,
    pub max_bundle_lifetime: i64,
    /// Policy duration bounds a bundle filter may use (seconds)
    pub min_policy_duration: i64,
    pub max_policy_duration: i64,
    /// Upper bound of a bundle's max protected balance
    pub max_protected_balance: Amount,
    /// Maximum number of simultaneously active bundles
    pub max_active_bundles: usize,
    /// Cap on total pool capital (None = unbounded)
    pub pool_capital_cap: Option<Amount>,
    /// Cap on any single bundle's capital (None = unbounded)
    pub bundle_capital_cap: Option<Amount>,
    /// Whether any investor may create bundles
    pub allow_all_accounts: bool,
    /// Fund routing accounts
    pub wallets: Wallets,
}

impl Default for RiskpoolSettings {
    fn default() -> Self {
        Self {
            riskpool_id: 1,
            capital_fee: FeeSpec {
                fixed: 0,
                fractional: DEFAULT_CAPITAL_FEE_FRACTION,
            },
            sum_insured_percentage: 100,
            min_bundle_lifetime: 14 * SECONDS_PER_DAY,
            max_bundle_lifetime: 180 * SECONDS_PER_DAY,
            min_policy_duration: SECONDS_PER_DAY,
            max_policy_duration: 30 * SECONDS_PER_DAY,
            max_protected_balance: 1_000_000,
            max_active_bundles: 10,
            pool_capital_cap: None,
            bundle_capital_cap: None,
            allow_all_accounts: true,
            wallets: Wallets::default(),
        }
    }
}

impl RiskpoolSettings {
    /// Sum insured covered by a protected balance
    pub fn sum_insured(&self, protected_balance: Amount) -> Amount {
        ((protected_balance as u128 * self.sum_insured_percentage as u128) / 100) as Amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults() {
        let settings = RiskpoolSettings::default();
        assert_eq!(settings.capital_fee.fractional, dec!(0.05));
        assert_eq!(settings.sum_insured(5000), 5000);
    }

    #[test]
    fn test_sum_insured_percentage() {
        let settings = RiskpoolSettings {
            sum_insured_percentage: 80,
            ..Default::default()
        };
        assert_eq!(settings.sum_insured(1000), 800);
    }
}

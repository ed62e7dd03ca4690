//! Node configuration

use anyhow::{anyhow, Context, Result};
use rainpool_common::FeeSpec;
use rainpool_product::{BatchOrder, PayoutCurve, ProductSettings};
use rainpool_riskpool::RiskpoolSettings;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Rainpool node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub riskpool: RiskpoolSettings,
    pub product: ProductSettings,
    /// Engine command channel capacity
    pub command_buffer: usize,
    /// Oracle relay poll interval
    pub relay_interval_ms: u64,
    /// JSON file of observations served by the relay, keyed by place
    pub observations_path: Option<String>,
    /// Run the scripted walkthrough and exit
    pub demo: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            riskpool: RiskpoolSettings::default(),
            product: ProductSettings::default(),
            command_buffer: 1024,
            relay_interval_ms: 500,
            observations_path: None,
            demo: false,
        }
    }
}

impl NodeConfig {
    /// Load configuration from `.env` and `RAINPOOL_*` environment variables
    pub fn load() -> Result<Self> {
        // Try to load .env file
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Self::default();

        // Riskpool settings
        if let Some(v) = lookup("RAINPOOL_CAPITAL_FEE_FIXED") {
            cfg.riskpool.capital_fee.fixed = parse("RAINPOOL_CAPITAL_FEE_FIXED", &v)?;
        }
        if let Some(v) = lookup("RAINPOOL_CAPITAL_FEE_FRACTION") {
            cfg.riskpool.capital_fee = fee(cfg.riskpool.capital_fee.fixed, "RAINPOOL_CAPITAL_FEE_FRACTION", &v)?;
        }
        if let Some(v) = lookup("RAINPOOL_SUM_INSURED_PERCENTAGE") {
            cfg.riskpool.sum_insured_percentage = parse("RAINPOOL_SUM_INSURED_PERCENTAGE", &v)?;
        }
        if let Some(v) = lookup("RAINPOOL_MAX_PROTECTED_BALANCE") {
            cfg.riskpool.max_protected_balance = parse("RAINPOOL_MAX_PROTECTED_BALANCE", &v)?;
        }
        if let Some(v) = lookup("RAINPOOL_MAX_ACTIVE_BUNDLES") {
            cfg.riskpool.max_active_bundles = parse("RAINPOOL_MAX_ACTIVE_BUNDLES", &v)?;
        }
        if let Some(v) = lookup("RAINPOOL_POOL_CAPITAL_CAP") {
            cfg.riskpool.pool_capital_cap = Some(parse("RAINPOOL_POOL_CAPITAL_CAP", &v)?);
        }
        if let Some(v) = lookup("RAINPOOL_BUNDLE_CAPITAL_CAP") {
            cfg.riskpool.bundle_capital_cap = Some(parse("RAINPOOL_BUNDLE_CAPITAL_CAP", &v)?);
        }
        if let Some(v) = lookup("RAINPOOL_ALLOW_ALL_ACCOUNTS") {
            cfg.riskpool.allow_all_accounts = parse("RAINPOOL_ALLOW_ALL_ACCOUNTS", &v)?;
        }

        // Product settings
        if let Some(v) = lookup("RAINPOOL_PREMIUM_FEE_FIXED") {
            cfg.product.premium_fee.fixed = parse("RAINPOOL_PREMIUM_FEE_FIXED", &v)?;
        }
        if let Some(v) = lookup("RAINPOOL_PREMIUM_FEE_FRACTION") {
            cfg.product.premium_fee = fee(cfg.product.premium_fee.fixed, "RAINPOOL_PREMIUM_FEE_FRACTION", &v)?;
        }
        if let Some(v) = lookup("RAINPOOL_MAX_PRECIPITATION") {
            cfg.product.max_precipitation = parse("RAINPOOL_MAX_PRECIPITATION", &v)?;
        }
        if let Some(v) = lookup("RAINPOOL_PAYOUT_CURVE") {
            cfg.product.payout_curve = match v.as_str() {
                "proportional" => PayoutCurve::Proportional,
                "interpolated" => PayoutCurve::Interpolated,
                other => return Err(anyhow!("RAINPOOL_PAYOUT_CURVE: unknown curve '{}'", other)),
            };
        }
        if let Some(v) = lookup("RAINPOOL_BATCH_ORDER") {
            cfg.product.batch_order = match v.as_str() {
                "newest_first" => BatchOrder::NewestFirst,
                "oldest_first" => BatchOrder::OldestFirst,
                other => return Err(anyhow!("RAINPOOL_BATCH_ORDER: unknown order '{}'", other)),
            };
        }

        // Node settings
        if let Some(v) = lookup("RAINPOOL_COMMAND_BUFFER") {
            cfg.command_buffer = parse("RAINPOOL_COMMAND_BUFFER", &v)?;
        }
        if let Some(v) = lookup("RAINPOOL_RELAY_INTERVAL_MS") {
            cfg.relay_interval_ms = parse("RAINPOOL_RELAY_INTERVAL_MS", &v)?;
        }
        cfg.observations_path = lookup("RAINPOOL_OBSERVATIONS");
        if let Some(v) = lookup("RAINPOOL_DEMO") {
            cfg.demo = parse("RAINPOOL_DEMO", &v)?;
        }

        Ok(cfg)
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("{}: invalid value '{}'", key, value))
}

fn fee(fixed: u64, key: &str, fraction: &str) -> Result<FeeSpec> {
    let fraction: Decimal = parse(key, fraction)?;
    FeeSpec::new(fixed, fraction).ok_or_else(|| anyhow!("{}: fraction must be in [0, 1)", key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<NodeConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        NodeConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.riskpool.capital_fee.fractional, dec!(0.05));
        assert_eq!(cfg.product.premium_fee.fractional, dec!(0.10));
        assert_eq!(cfg.riskpool.pool_capital_cap, None);
        assert!(!cfg.demo);
    }

    #[test]
    fn test_overrides() {
        let cfg = load(&[
            ("RAINPOOL_CAPITAL_FEE_FRACTION", "0.02"),
            ("RAINPOOL_BUNDLE_CAPITAL_CAP", "5000"),
            ("RAINPOOL_PAYOUT_CURVE", "interpolated"),
            ("RAINPOOL_BATCH_ORDER", "oldest_first"),
            ("RAINPOOL_DEMO", "true"),
        ])
        .unwrap();
        assert_eq!(cfg.riskpool.capital_fee.fractional, dec!(0.02));
        assert_eq!(cfg.riskpool.bundle_capital_cap, Some(5000));
        assert_eq!(cfg.product.payout_curve, PayoutCurve::Interpolated);
        assert_eq!(cfg.product.batch_order, BatchOrder::OldestFirst);
        assert!(cfg.demo);
    }

    #[test]
    fn test_invalid_values() {
        assert!(load(&[("RAINPOOL_PREMIUM_FEE_FRACTION", "1.5")]).is_err());
        assert!(load(&[("RAINPOOL_MAX_ACTIVE_BUNDLES", "many")]).is_err());
        assert!(load(&[("RAINPOOL_PAYOUT_CURVE", "cubic")]).is_err());
    }
}

//! Fee schedules
//!
//! A fee is a fixed amount plus a fraction of the reference amount. The
//! capital fee is charged on bundle funding, the premium fee on premium
//! payments. Fractions are held as `Decimal` and results truncate toward zero.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Amount;

/// Fixed + fractional fee specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSpec {
    /// Fixed fee in token units
    pub fixed: Amount,
    /// Fractional fee in `[0, 1)`
    pub fractional: Decimal,
}

impl FeeSpec {
    /// Fee schedule charging nothing
    pub const ZERO: FeeSpec = FeeSpec {
        fixed: 0,
        fractional: Decimal::ZERO,
    };

    /// Create a fee spec, returning `None` if the fraction is outside `[0, 1)`
    pub fn new(fixed: Amount, fractional: Decimal) -> Option<Self> {
        if fractional < Decimal::ZERO || fractional >= Decimal::ONE {
            return None;
        }
        Some(Self { fixed, fractional })
    }

    /// Fee due on `amount`
    pub fn fee_for(&self, amount: Amount) -> Amount {
        let variable = (Decimal::from(amount) * self.fractional)
            .trunc()
            .to_u64()
            .unwrap_or(0);
        self.fixed.saturating_add(variable)
    }

    /// Net amount left after deducting the fee from `gross`
    ///
    /// Returns `None` when the fee exceeds the gross amount.
    pub fn net_of(&self, gross: Amount) -> Option<Amount> {
        gross.checked_sub(self.fee_for(gross))
    }

    /// Gross amount a payer owes so that `net` arrives after fees
    pub fn gross_for(&self, net: Amount) -> Amount {
        net.saturating_add(self.fee_for(net))
    }

    /// Share of `expected_fee` attributable to a partial payment of `amount`
    /// out of `expected_gross`
    pub fn pro_rata(amount: Amount, expected_gross: Amount, expected_fee: Amount) -> Amount {
        if expected_gross == 0 {
            return 0;
        }
        let share = (amount as u128 * expected_fee as u128) / expected_gross as u128;
        share.min(amount as u128) as Amount
    }
}

impl Default for FeeSpec {
    fn default() -> Self {
        Self::ZERO
    }
}

impl std::fmt::Display for FeeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FeeSpec(fixed={}, fractional={})", self.fixed, self.fractional)
    }
}

//! Capital Account - per-bundle capital accounting
//!
//! Each bundle tracks three quantities:
//! - `capital`: funds committed to the bundle (net of capital fees)
//! - `locked`: capital reserved as collateral for active policies
//! - `balance`: funds actually held for the bundle
//!
//! Invariants: `locked <= capital` and `balance <= capital`. A version
//! counter is bumped on every mutation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::CapScope;
use crate::types::ids::BundleId;
use crate::types::Amount;

/// Capital ledger errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Insufficient capacity: required {required}, available {available}")]
    InsufficientCapacity { required: Amount, available: Amount },

    #[error("Insufficient locked capital: required {required}, locked {locked}")]
    InsufficientLocked { required: Amount, locked: Amount },

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Amount, available: Amount },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Capital cap exceeded ({scope}): requested {requested} > cap {cap}")]
    CapitalCapExceeded {
        scope: CapScope,
        cap: Amount,
        requested: Amount,
    },

    #[error("No capital account for bundle {0}")]
    UnknownAccount(BundleId),

    #[error("Capital account is closed")]
    Closed,
}

/// Capital account of a single bundle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapitalAccount {
    /// Committed capital
    pub capital: Amount,

    /// Capital reserved as policy collateral
    pub locked: Amount,

    /// Funds held for the bundle
    pub balance: Amount,

    /// Set once the bundle is burned; closed accounts are excluded from pool sums
    pub closed: bool,

    /// Version for change tracking
    pub version: u64,
}

impl CapitalAccount {
    /// Create an empty account
    pub fn new() -> Self {
        Self::default()
    }

    /// Unlocked capital available as collateral
    #[inline]
    pub fn capacity(&self) -> Amount {
        self.capital - self.locked
    }

    /// Add funds (funding, net premium)
    pub fn credit(&mut self, amount: Amount) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        self.ensure_open()?;

        self.capital += amount;
        self.balance += amount;
        self.touch();
        Ok(())
    }

    /// Remove unlocked funds (defunding, payout after release)
    pub fn debit(&mut self, amount: Amount) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        self.ensure_open()?;

        if self.capacity() < amount {
            return Err(LedgerError::InsufficientCapacity {
                required: amount,
                available: self.capacity(),
            });
        }
        if self.balance < amount {
            return Err(LedgerError::InsufficientBalance {
                required: amount,
                available: self.balance,
            });
        }

        self.capital -= amount;
        self.balance -= amount;
        self.touch();
        Ok(())
    }

    /// Reserve capital as collateral
    pub fn reserve(&mut self, amount: Amount) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        self.ensure_open()?;

        if self.capacity() < amount {
            return Err(LedgerError::InsufficientCapacity {
                required: amount,
                available: self.capacity(),
            });
        }

        self.locked += amount;
        self.touch();
        Ok(())
    }

    /// Return reserved collateral to capacity
    pub fn release(&mut self, amount: Amount) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }

        if self.locked < amount {
            return Err(LedgerError::InsufficientLocked {
                required: amount,
                locked: self.locked,
            });
        }

        self.locked -= amount;
        self.touch();
        Ok(())
    }

    /// Zero all fields and close the account, returning the residual balance
    pub fn close(&mut self) -> Amount {
        let residual = self.balance;
        self.capital = 0;
        self.locked = 0;
        self.balance = 0;
        self.closed = true;
        self.touch();
        residual
    }

    fn ensure_open(&self) -> Result<(), LedgerError> {
        if self.closed {
            return Err(LedgerError::Closed);
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.version += 1;
    }
}

impl std::fmt::Display for CapitalAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CapitalAccount(capital={}, locked={}, balance={})",
            self.capital, self.locked, self.balance
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_credit_debit() {
        let mut account = CapitalAccount::new();
        account.credit(1000).unwrap();
        assert_eq!(account.capital, 1000);
        assert_eq!(account.balance, 1000);

        account.debit(300).unwrap();
        assert_eq!(account.capital, 700);
        assert_eq!(account.balance, 700);
    }

    #[test]
    fn test_reserve_release() {
        let mut account = CapitalAccount::new();
        account.credit(1000).unwrap();

        account.reserve(400).unwrap();
        assert_eq!(account.locked, 400);
        assert_eq!(account.capacity(), 600);

        account.release(150).unwrap();
        assert_eq!(account.locked, 250);
        assert_eq!(account.capacity(), 750);
    }

    #[test]
    fn test_insufficient_capacity() {
        let mut account = CapitalAccount::new();
        account.credit(1000).unwrap();
        account.reserve(800).unwrap();

        let result = account.reserve(201);
        assert!(matches!(result, Err(LedgerError::InsufficientCapacity { required: 201, available: 200 })));

        // locked capital cannot be debited
        assert!(account.debit(300).is_err());
    }

    #[test]
    fn test_release_more_than_locked() {
        let mut account = CapitalAccount::new();
        account.credit(100).unwrap();
        account.reserve(50).unwrap();
        assert!(matches!(account.release(60), Err(LedgerError::InsufficientLocked { .. })));
    }

    #[test]
    fn test_zero_amount_rejected() {
        let mut account = CapitalAccount::new();
        assert_eq!(account.credit(0), Err(LedgerError::InvalidAmount));
        assert_eq!(account.reserve(0), Err(LedgerError::InvalidAmount));
    }

    #[test]
    fn test_close() {
        let mut account = CapitalAccount::new();
        account.credit(500).unwrap();
        let residual = account.close();
        assert_eq!(residual, 500);
        assert_eq!(account.capital, 0);
        assert_eq!(account.balance, 0);
        assert_eq!(account.credit(10), Err(LedgerError::Closed));
    }

    #[test]
    fn test_version_increment() {
        let mut account = CapitalAccount::new();
        account.credit(10).unwrap();
        account.reserve(5).unwrap();
        assert_eq!(account.version, 2);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Credit(u64),
        Debit(u64),
        Reserve(u64),
        Release(u64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1u64..10_000).prop_map(Op::Credit),
            (1u64..10_000).prop_map(Op::Debit),
            (1u64..10_000).prop_map(Op::Reserve),
            (1u64..10_000).prop_map(Op::Release),
        ]
    }

    proptest! {
        #[test]
        fn test_invariants_hold_for_any_sequence(ops in prop::collection::vec(op_strategy(), 0..100)) {
            let mut account = CapitalAccount::new();
            for op in ops {
                let _ = match op {
                    Op::Credit(a) => account.credit(a),
                    Op::Debit(a) => account.debit(a),
                    Op::Reserve(a) => account.reserve(a),
                    Op::Release(a) => account.release(a),
                };
                prop_assert!(account.locked <= account.capital);
                prop_assert!(account.balance <= account.capital);
            }
        }
    }
}

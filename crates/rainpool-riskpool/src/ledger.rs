//! Capital ledger
//!
//! Owns the [`CapitalAccount`] of every bundle in the pool and enforces the
//! pool and bundle capital caps. Pool aggregates are always computed as sums
//! over open (non-burned) accounts, so they cannot drift from the bundles.

use rainpool_common::{Amount, BundleId, CapScope, CapitalAccount, LedgerError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Pool and bundle capital caps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapitalCaps {
    pub pool: Option<Amount>,
    pub bundle: Option<Amount>,
}

/// Pool-level aggregates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolTotals {
    pub capital: Amount,
    pub locked: Amount,
    pub capacity: Amount,
    pub balance: Amount,
}

/// Capital ledger of one riskpool
#[derive(Debug, Default)]
pub struct CapitalLedger {
    accounts: BTreeMap<BundleId, CapitalAccount>,
    caps: CapitalCaps,
}

impl CapitalLedger {
    pub fn new(caps: CapitalCaps) -> Self {
        Self {
            accounts: BTreeMap::new(),
            caps,
        }
    }

    /// Open an empty account for a new bundle
    pub fn open(&mut self, bundle_id: BundleId) {
        self.accounts.entry(bundle_id).or_default();
    }

    pub fn account(&self, bundle_id: BundleId) -> Result<&CapitalAccount, LedgerError> {
        self.accounts
            .get(&bundle_id)
            .ok_or(LedgerError::UnknownAccount(bundle_id))
    }

    fn account_mut(&mut self, bundle_id: BundleId) -> Result<&mut CapitalAccount, LedgerError> {
        self.accounts
            .get_mut(&bundle_id)
            .ok_or(LedgerError::UnknownAccount(bundle_id))
    }

    /// Lock collateral; fails with `InsufficientCapacity` if
    /// `amount > capital - locked`
    pub fn reserve(&mut self, bundle_id: BundleId, amount: Amount) -> Result<(), LedgerError> {
        self.account_mut(bundle_id)?.reserve(amount)?;
        debug!(%bundle_id, amount, "collateral reserved");
        Ok(())
    }

    /// Unlock collateral
    pub fn release(&mut self, bundle_id: BundleId, amount: Amount) -> Result<(), LedgerError> {
        self.account_mut(bundle_id)?.release(amount)?;
        debug!(%bundle_id, amount, "collateral released");
        Ok(())
    }

    /// Add capital and balance
    pub fn credit(&mut self, bundle_id: BundleId, amount: Amount) -> Result<(), LedgerError> {
        self.account_mut(bundle_id)?.credit(amount)
    }

    /// Remove capital and balance from unlocked funds
    pub fn debit(&mut self, bundle_id: BundleId, amount: Amount) -> Result<(), LedgerError> {
        self.account_mut(bundle_id)?.debit(amount)
    }

    /// `capital - locked` of one bundle
    pub fn capacity(&self, bundle_id: BundleId) -> Result<Amount, LedgerError> {
        Ok(self.account(bundle_id)?.capacity())
    }

    /// Zero an account and exclude it from pool sums; returns the residual balance
    pub fn close(&mut self, bundle_id: BundleId) -> Result<Amount, LedgerError> {
        Ok(self.account_mut(bundle_id)?.close())
    }

    /// Check that adding `amount` of gross funding keeps the bundle and the
    /// pool within their caps. `bundle_id` is `None` for a bundle being created.
    pub fn check_caps(
        &self,
        bundle_id: Option<BundleId>,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        if let Some(cap) = self.caps.bundle {
            let current = match bundle_id {
                Some(id) => self.account(id)?.capital,
                None => 0,
            };
            let requested = current.saturating_add(amount);
            if requested > cap {
                return Err(LedgerError::CapitalCapExceeded {
                    scope: CapScope::Bundle,
                    cap,
                    requested,
                });
            }
        }

        if let Some(cap) = self.caps.pool {
            let requested = self.totals().capital.saturating_add(amount);
            if requested > cap {
                return Err(LedgerError::CapitalCapExceeded {
                    scope: CapScope::Pool,
                    cap,
                    requested,
                });
            }
        }

        Ok(())
    }

    pub fn caps(&self) -> CapitalCaps {
        self.caps
    }

    /// Replace the caps, returning the previous ones
    pub fn set_caps(&mut self, caps: CapitalCaps) -> CapitalCaps {
        std::mem::replace(&mut self.caps, caps)
    }

    /// Sums over all open accounts
    pub fn totals(&self) -> PoolTotals {
        self.accounts
            .values()
            .filter(|a| !a.closed)
            .fold(PoolTotals::default(), |mut t, a| {
                t.capital += a.capital;
                t.locked += a.locked;
                t.capacity += a.capacity();
                t.balance += a.balance;
                t
            })
    }

    /// Total pool capital
    pub fn capital(&self) -> Amount {
        self.totals().capital
    }

    /// Total locked capital
    pub fn total_value_locked(&self) -> Amount {
        self.totals().locked
    }

    /// Total unlocked capital
    pub fn pool_capacity(&self) -> Amount {
        self.totals().capacity
    }

    /// Total balance
    pub fn balance(&self) -> Amount {
        self.totals().balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ledger_with(bundles: &[(u64, Amount)]) -> CapitalLedger {
        let mut ledger = CapitalLedger::default();
        for (id, capital) in bundles {
            ledger.open(BundleId(*id));
            ledger.credit(BundleId(*id), *capital).unwrap();
        }
        ledger
    }

    #[test]
    fn test_pool_sums() {
        let mut ledger = ledger_with(&[(1, 1000), (2, 500)]);
        ledger.reserve(BundleId(1), 300).unwrap();

        let totals = ledger.totals();
        assert_eq!(totals.capital, 1500);
        assert_eq!(totals.locked, 300);
        assert_eq!(totals.capacity, 1200);
        assert_eq!(totals.balance, 1500);
    }

    #[test]
    fn test_closed_accounts_excluded() {
        let mut ledger = ledger_with(&[(1, 1000), (2, 500)]);
        assert_eq!(ledger.close(BundleId(2)).unwrap(), 500);
        assert_eq!(ledger.capital(), 1000);
        assert_eq!(ledger.account(BundleId(2)).unwrap().capital, 0);
    }

    #[test]
    fn test_bundle_cap() {
        let ledger = CapitalLedger::new(CapitalCaps {
            pool: None,
            bundle: Some(5000),
        });
        assert!(ledger.check_caps(None, 5000).is_ok());
        assert!(matches!(
            ledger.check_caps(None, 5001),
            Err(LedgerError::CapitalCapExceeded { scope: CapScope::Bundle, cap: 5000, requested: 5001 })
        ));
    }

    #[test]
    fn test_bundle_cap_counts_existing_capital() {
        let mut ledger = ledger_with(&[(1, 4000)]);
        ledger.set_caps(CapitalCaps {
            pool: None,
            bundle: Some(5000),
        });
        assert!(ledger.check_caps(Some(BundleId(1)), 1000).is_ok());
        assert!(ledger.check_caps(Some(BundleId(1)), 1001).is_err());
    }

    #[test]
    fn test_pool_cap() {
        let mut ledger = ledger_with(&[(1, 9000)]);
        let old = ledger.set_caps(CapitalCaps {
            pool: Some(10_000),
            bundle: None,
        });
        assert_eq!(old, CapitalCaps::default());
        assert!(ledger.check_caps(None, 1000).is_ok());
        assert!(matches!(
            ledger.check_caps(None, 1001),
            Err(LedgerError::CapitalCapExceeded { scope: CapScope::Pool, .. })
        ));
    }

    #[test]
    fn test_unknown_account() {
        let mut ledger = CapitalLedger::default();
        assert_eq!(
            ledger.reserve(BundleId(3), 1),
            Err(LedgerError::UnknownAccount(BundleId(3)))
        );
    }

    proptest! {
        #[test]
        fn test_totals_match_sum_of_accounts(
            fundings in prop::collection::vec(1u64..100_000, 1..8),
            reserves in prop::collection::vec(0u64..100_000, 1..8),
        ) {
            let mut ledger = CapitalLedger::default();
            for (i, f) in fundings.iter().enumerate() {
                let id = BundleId(i as u64 + 1);
                ledger.open(id);
                ledger.credit(id, *f).unwrap();
            }
            for (i, r) in reserves.iter().enumerate() {
                let id = BundleId((i % fundings.len()) as u64 + 1);
                let _ = ledger.reserve(id, *r);
            }

            let mut capital = 0;
            let mut locked = 0;
            for i in 0..fundings.len() {
                let account = ledger.account(BundleId(i as u64 + 1)).unwrap();
                prop_assert!(account.locked <= account.capital);
                capital += account.capital;
                locked += account.locked;
            }
            prop_assert_eq!(ledger.capital(), capital);
            prop_assert_eq!(ledger.total_value_locked(), locked);
        }
    }
}

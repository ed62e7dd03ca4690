//! Token transfer rail
//!
//! Pull-based transfers: a spender moves funds between accounts within the
//! allowance the owner granted it.

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::TransferError;
use crate::types::ids::AccountId;
use crate::types::Amount;

/// Single-denomination token rail
pub trait TokenRail: Send + Sync {
    /// Balance held by `account`
    fn balance_of(&self, account: &AccountId) -> Amount;

    /// Amount `spender` may move out of `owner`
    fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount;

    /// Set the allowance of `spender` over `owner`'s funds
    fn approve(&self, owner: &AccountId, spender: &AccountId, amount: Amount);

    /// Move `amount` from `from` to `to`, consuming `spender`'s allowance
    fn transfer_from(
        &self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TransferError>;

    /// Check that a `transfer_from` of `amount` would succeed
    fn can_transfer(
        &self,
        spender: &AccountId,
        from: &AccountId,
        amount: Amount,
    ) -> Result<(), TransferError> {
        let allowance = self.allowance(from, spender);
        if allowance < amount {
            return Err(TransferError::InsufficientAllowance {
                required: amount,
                allowance,
            });
        }
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(TransferError::TransferFailed {
                from: from.clone(),
                to: spender.clone(),
                amount,
                reason: format!("balance {} too low", balance),
            });
        }
        Ok(())
    }
}

/// In-memory token ledger
///
/// Uses DashMap for balances and allowances; transfers are serialized by a
/// mutex so check-then-move is atomic.
#[derive(Default)]
pub struct InMemoryToken {
    balances: DashMap<AccountId, Amount>,
    allowances: DashMap<(AccountId, AccountId), Amount>,
    transfer_lock: Mutex<()>,
}

impl InMemoryToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create tokens for `account`
    pub fn mint(&self, account: &AccountId, amount: Amount) {
        let _guard = self.transfer_lock.lock();
        *self.balances.entry(account.clone()).or_insert(0) += amount;
    }

    /// Direct transfer by the holder
    pub fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TransferError> {
        let _guard = self.transfer_lock.lock();
        self.move_funds(from, to, amount)
    }

    fn move_funds(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TransferError> {
        let available = self.balance_of(from);
        if available < amount {
            return Err(TransferError::TransferFailed {
                from: from.clone(),
                to: to.clone(),
                amount,
                reason: format!("balance {} too low", available),
            });
        }
        if amount == 0 || from == to {
            return Ok(());
        }

        self.balances.insert(from.clone(), available - amount);
        *self.balances.entry(to.clone()).or_insert(0) += amount;
        Ok(())
    }
}

impl TokenRail for InMemoryToken {
    fn balance_of(&self, account: &AccountId) -> Amount {
        self.balances.get(account).map(|b| *b).unwrap_or(0)
    }

    fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount {
        self.allowances
            .get(&(owner.clone(), spender.clone()))
            .map(|a| *a)
            .unwrap_or(0)
    }

    fn approve(&self, owner: &AccountId, spender: &AccountId, amount: Amount) {
        self.allowances
            .insert((owner.clone(), spender.clone()), amount);
    }

    fn transfer_from(
        &self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TransferError> {
        let _guard = self.transfer_lock.lock();

        let allowance = self.allowance(from, spender);
        if allowance < amount {
            return Err(TransferError::InsufficientAllowance {
                required: amount,
                allowance,
            });
        }

        self.move_funds(from, to, amount)?;
        if allowance != Amount::MAX {
            self.allowances
                .insert((from.clone(), spender.clone()), allowance - amount);
        }
        debug!(%from, %to, amount, "token transfer");
        Ok(())
    }
}

//! Premium pricing and collection
//!
//! The gross premium is the net premium plus the premium fee. Payments may
//! arrive in parts; each part carries its pro-rata share of the expected fee.
//! Funds move with the treasury as spender: fee to the instance wallet, net
//! to the riskpool wallet.

use rainpool_common::ports::{Role, TokenRail};
use rainpool_common::{
    AccountId, Amount, Event, FeeSpec, PolicyError, ProcessId, Result, TransferError, Wallets,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::product::RainProduct;

/// Fee/net split of one premium payment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiumSplit {
    pub fee: Amount,
    pub net: Amount,
}

/// Result of a premium collection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiumReceipt {
    pub success: bool,
    pub fee: Amount,
    pub net: Amount,
}

pub struct PremiumLedger {
    fee: FeeSpec,
    token: Arc<dyn TokenRail>,
    wallets: Wallets,
}

impl PremiumLedger {
    pub fn new(fee: FeeSpec, token: Arc<dyn TokenRail>, wallets: Wallets) -> Self {
        Self {
            fee,
            token,
            wallets,
        }
    }

    pub fn fee_spec(&self) -> FeeSpec {
        self.fee
    }

    /// Gross premium due for a net premium
    pub fn calculate_premium(&self, net_premium: Amount) -> Amount {
        self.fee.gross_for(net_premium)
    }

    /// Split a payment of `amount` made after `paid` of `expected_gross`
    /// (whose net part is `net_premium`) was already collected
    ///
    /// Fees are apportioned on the cumulative amount, so a fully paid premium
    /// carries exactly the expected fee however it was split.
    pub fn split(
        &self,
        amount: Amount,
        paid: Amount,
        expected_gross: Amount,
        net_premium: Amount,
    ) -> PremiumSplit {
        let expected_fee = expected_gross.saturating_sub(net_premium);
        let before = FeeSpec::pro_rata(paid, expected_gross, expected_fee);
        let after = FeeSpec::pro_rata(paid.saturating_add(amount), expected_gross, expected_fee);
        let fee = after.saturating_sub(before).min(amount);
        PremiumSplit {
            fee,
            net: amount - fee,
        }
    }

    /// Check the payer could cover `amount` right now
    pub fn can_collect(
        &self,
        payer: &AccountId,
        amount: Amount,
    ) -> std::result::Result<(), TransferError> {
        self.token.can_transfer(&self.wallets.treasury, payer, amount)
    }

    /// Pull a split payment from `payer`
    pub fn collect(
        &self,
        payer: &AccountId,
        split: PremiumSplit,
    ) -> std::result::Result<(), TransferError> {
        let amount = split.fee + split.net;
        if amount == 0 {
            return Ok(());
        }
        self.can_collect(payer, amount)?;
        let treasury = &self.wallets.treasury;
        if split.fee > 0 {
            self.token
                .transfer_from(treasury, payer, &self.wallets.instance_wallet, split.fee)?;
        }
        if split.net > 0 {
            self.token
                .transfer_from(treasury, payer, &self.wallets.riskpool_wallet, split.net)?;
        }
        debug!(%payer, fee = split.fee, net = split.net, "premium collected");
        Ok(())
    }
}

impl RainProduct {
    /// Collect the outstanding premium from the policy holder
    #[instrument(skip(self))]
    pub fn collect_premium(
        &mut self,
        caller: &AccountId,
        process_id: ProcessId,
    ) -> Result<PremiumReceipt> {
        self.access.require(Role::Insurer, caller)?;
        let policy = self.book.get(process_id)?;
        let (holder, remaining) = (policy.holder.clone(), policy.remaining_premium());
        self.pull_premium(process_id, &holder, remaining)
    }

    /// Collect `amount` of premium from `payer`, who may differ from the
    /// holder when the premium is subsidized
    #[instrument(skip(self))]
    pub fn collect_premium_from(
        &mut self,
        caller: &AccountId,
        process_id: ProcessId,
        payer: &AccountId,
        amount: Amount,
    ) -> Result<PremiumReceipt> {
        self.access.require(Role::Insurer, caller)?;
        self.pull_premium(process_id, payer, amount)
    }

    pub(crate) fn pull_premium(
        &mut self,
        process_id: ProcessId,
        payer: &AccountId,
        amount: Amount,
    ) -> Result<PremiumReceipt> {
        let policy = self.book.get(process_id)?;
        if !policy.is_underwritten() {
            return Err(PolicyError::NotUnderwritten(process_id).into());
        }
        if !policy.is_active() {
            return Err(PolicyError::AlreadyProcessed(process_id).into());
        }
        let remaining = policy.remaining_premium();
        if amount > remaining {
            return Err(PolicyError::PremiumExceedsExpected { amount, remaining }.into());
        }
        let Some(bundle_id) = policy.bundle_id else {
            return Err(PolicyError::NotUnderwritten(process_id).into());
        };

        let split = self.premiums.split(
            amount,
            policy.premium_paid,
            policy.premium_expected,
            policy.net_premium,
        );
        if amount > 0 {
            self.premiums.collect(payer, split)?;
            self.riskpool.credit_premium(bundle_id, split.net)?;
        }

        let now = self.now();
        let policy = self.book.get_mut(process_id)?;
        policy.premium_paid += amount;
        policy.updated_at = now;

        info!(%process_id, %payer, amount, fee = split.fee, net = split.net, "premium collected");
        self.emit(Event::PremiumCollected {
            process_id,
            payer: payer.clone(),
            amount,
            fee: split.fee,
            net: split.net,
        });
        Ok(PremiumReceipt {
            success: true,
            fee: split.fee,
            net: split.net,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use rainpool_common::ports::InMemoryToken;
    use rust_decimal_macros::dec;

    mock! {
        Rail {}
        impl TokenRail for Rail {
            fn balance_of(&self, account: &AccountId) -> Amount;
            fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount;
            fn approve(&self, owner: &AccountId, spender: &AccountId, amount: Amount);
            fn transfer_from(
                &self,
                spender: &AccountId,
                from: &AccountId,
                to: &AccountId,
                amount: Amount,
            ) -> std::result::Result<(), TransferError>;
        }
    }

    fn ledger() -> (PremiumLedger, Arc<InMemoryToken>) {
        let token = Arc::new(InMemoryToken::new());
        let fee = FeeSpec::new(0, dec!(0.1)).unwrap();
        (
            PremiumLedger::new(fee, token.clone(), Wallets::default()),
            token,
        )
    }

    #[test]
    fn test_calculate_premium() {
        let (ledger, _) = ledger();
        assert_eq!(ledger.calculate_premium(300), 330);
        assert_eq!(ledger.calculate_premium(75), 82);
    }

    #[test]
    fn test_partial_split() {
        let (ledger, _) = ledger();
        let split = ledger.split(110, 0, 330, 300);
        assert_eq!(split, PremiumSplit { fee: 10, net: 100 });

        let full = ledger.split(330, 0, 330, 300);
        assert_eq!(full, PremiumSplit { fee: 30, net: 300 });
    }

    #[test]
    fn test_uneven_parts_sum_to_expected_fee() {
        let (ledger, _) = ledger();
        // 75 net -> 82 gross, 7 fee
        let parts = [41, 20, 21];
        let mut paid = 0;
        let mut fees = 0;
        for part in parts {
            fees += ledger.split(part, paid, 82, 75).fee;
            paid += part;
        }
        assert_eq!(paid, 82);
        assert_eq!(fees, 7);
    }

    #[test]
    fn test_collect_routes_fee_and_net() {
        let (ledger, token) = ledger();
        let payer = AccountId::from("customer");
        let wallets = Wallets::default();
        token.mint(&payer, 500);
        token.approve(&payer, &wallets.treasury, Amount::MAX);

        ledger
            .collect(&payer, PremiumSplit { fee: 30, net: 300 })
            .unwrap();
        assert_eq!(token.balance_of(&payer), 170);
        assert_eq!(token.balance_of(&wallets.instance_wallet), 30);
        assert_eq!(token.balance_of(&wallets.riskpool_wallet), 300);
    }

    #[test]
    fn test_collect_without_allowance() {
        let (ledger, token) = ledger();
        let payer = AccountId::from("customer");
        token.mint(&payer, 500);

        let err = ledger
            .collect(&payer, PremiumSplit { fee: 30, net: 300 })
            .unwrap_err();
        assert!(matches!(err, TransferError::InsufficientAllowance { .. }));
        assert_eq!(token.balance_of(&payer), 500);
    }

    #[test]
    fn test_rail_failure_surfaces_transfer_error() {
        let mut rail = MockRail::new();
        rail.expect_allowance().return_const(Amount::MAX);
        rail.expect_balance_of().return_const(1_000u64);
        rail.expect_transfer_from()
            .times(1)
            .returning(|_, from, to, amount| {
                Err(TransferError::TransferFailed {
                    from: from.clone(),
                    to: to.clone(),
                    amount,
                    reason: "rail offline".to_string(),
                })
            });

        let ledger = PremiumLedger::new(FeeSpec::ZERO, Arc::new(rail), Wallets::default());
        let err = ledger
            .collect(&AccountId::from("customer"), PremiumSplit { fee: 0, net: 300 })
            .unwrap_err();
        assert!(matches!(err, TransferError::TransferFailed { amount: 300, .. }));
    }
}

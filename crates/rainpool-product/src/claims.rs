//! Claim processing
//!
//! Once a risk has its oracle response every active policy on it is settled
//! in one step: a claim is opened and confirmed for the computed amount, the
//! collateral is released, a payout is made from the riskpool wallet when the
//! amount is positive, and the policy is expired and closed.
//!
//! The funding rail is checked before anything is mutated, so a rail failure
//! leaves the policy active and the call can be retried.

use rainpool_common::ports::Role;
use rainpool_common::{
    AccountId, Amount, Event, PolicyError, ProcessId, RainpoolError, Result, RiskId,
    TransferError,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::policy::{Claim, ClaimState, Payout, PayoutState, PolicyState};
use crate::product::RainProduct;

/// Order in which batch processing walks a risk's policies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOrder {
    /// Most recent application first
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Result of settling one policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub process_id: ProcessId,
    pub amount: Amount,
    /// Set when a payout was made
    pub payout_id: Option<u64>,
}

impl RainProduct {
    /// Settle one policy against its risk's oracle response
    #[instrument(skip(self))]
    pub fn process_policy(&mut self, caller: &AccountId, process_id: ProcessId) -> Result<Settlement> {
        self.access.require(Role::Insurer, caller)?;
        let amount = self.settleable(process_id)?;
        self.check_payout_rail(amount)?;
        self.settle(process_id, amount)
    }

    /// Settle up to `batch_size` active policies of a risk; 0 means all
    ///
    /// Returns the settled process ids in processing order.
    #[instrument(skip(self))]
    pub fn process_policies_for_risk(
        &mut self,
        caller: &AccountId,
        risk_id: RiskId,
        batch_size: usize,
    ) -> Result<Vec<ProcessId>> {
        self.access.require(Role::Insurer, caller)?;
        self.risks.get(risk_id)?;

        let mut batch = self.book.active_for_risk(risk_id);
        if self.settings.batch_order == BatchOrder::NewestFirst {
            batch.reverse();
        }
        if batch_size > 0 {
            batch.truncate(batch_size);
        }
        if batch.is_empty() {
            return Ok(batch);
        }

        let mut amounts = Vec::with_capacity(batch.len());
        for process_id in &batch {
            amounts.push(self.settleable(*process_id)?);
        }
        let total = amounts.iter().fold(0, |acc: Amount, a| acc.saturating_add(*a));
        self.check_payout_rail(total)?;

        for (process_id, amount) in batch.iter().zip(amounts) {
            self.settle(*process_id, amount)?;
        }
        info!(%risk_id, processed = batch.len(), total, "risk policies processed");
        Ok(batch)
    }

    /// Payout due on an active policy whose risk has a response
    fn settleable(&self, process_id: ProcessId) -> Result<Amount> {
        let policy = self.book.get(process_id)?;
        if !policy.is_underwritten() {
            return Err(PolicyError::NotUnderwritten(process_id).into());
        }
        if !policy.is_active() {
            return Err(PolicyError::AlreadyProcessed(process_id).into());
        }
        self.expected_payout(process_id)
    }

    /// The riskpool wallet must have granted the treasury enough allowance
    /// and hold enough funds for `amount`
    fn check_payout_rail(&self, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let wallets = &self.wallets;
        let allowance = self
            .token
            .allowance(&wallets.riskpool_wallet, &wallets.treasury);
        if allowance < amount {
            return Err(TransferError::PayoutAllowanceTooSmall {
                required: amount,
                allowance,
            }
            .into());
        }
        self.token
            .can_transfer(&wallets.treasury, &wallets.riskpool_wallet, amount)?;
        Ok(())
    }

    fn settle(&mut self, process_id: ProcessId, amount: Amount) -> Result<Settlement> {
        let now = self.now();
        let policy = self.book.get(process_id)?;
        let (risk_id, sum_insured, recipient) =
            (policy.risk_id, policy.sum_insured, policy.wallet.clone());
        let bundle_id = policy
            .bundle_id
            .ok_or(PolicyError::NotUnderwritten(process_id))?;
        let policy_state = policy
            .policy_state
            .ok_or(PolicyError::NotUnderwritten(process_id))?
            .transition(PolicyState::Expired)
            .and_then(|s| s.transition(PolicyState::Closed))
            .map_err(illegal_transition)?;
        let claim_state = ClaimState::Applied
            .transition(ClaimState::Confirmed)
            .and_then(|s| s.transition(ClaimState::Closed))
            .map_err(illegal_transition)?;

        if amount > 0 {
            let wallets = &self.wallets;
            self.token.transfer_from(
                &wallets.treasury,
                &wallets.riskpool_wallet,
                &recipient,
                amount,
            )?;
        }
        self.riskpool.release_collateral(bundle_id, sum_insured)?;
        if amount > 0 {
            self.riskpool.debit_payout(bundle_id, amount)?;
        }

        let policy = self.book.get_mut(process_id)?;
        let claim_id = policy.claims.len() as u64;
        let payout_id = if amount > 0 {
            let payout_id = policy.payouts.len() as u64;
            policy.payouts.push(Payout {
                id: payout_id,
                claim_id,
                amount,
                recipient: recipient.clone(),
                state: PayoutState::PaidOut,
                created_at: now,
            });
            policy.payout_amount += amount;
            Some(payout_id)
        } else {
            None
        };
        policy.claims.push(Claim {
            id: claim_id,
            amount,
            state: claim_state,
            created_at: now,
        });
        policy.policy_state = Some(policy_state);
        policy.updated_at = now;

        info!(%process_id, %risk_id, claim = amount, "policy processed");
        self.emit(Event::ClaimCreated {
            process_id,
            claim_id,
            amount,
        });
        if let Some(payout_id) = payout_id {
            self.emit(Event::PayoutCreated {
                process_id,
                payout_id,
                amount,
                recipient,
            });
        }
        self.emit(Event::PolicyProcessed {
            process_id,
            risk_id,
            payout: amount,
        });

        Ok(Settlement {
            process_id,
            amount,
            payout_id,
        })
    }
}

fn illegal_transition<S: std::fmt::Display>((from, to): (S, S)) -> RainpoolError {
    RainpoolError::Internal(format!("illegal transition {} -> {}", from, to))
}

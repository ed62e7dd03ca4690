//! Application and underwriting
//!
//! An application is always recorded, even when no bundle matches or the
//! matched bundle lacks capacity. Underwriting then reports
//! [`UnderwritingOutcome::PendingCapacity`] and can be retried later with
//! [`RainProduct::underwrite`]. Only validation and state errors fail the call.

use rainpool_common::ports::Role;
use rainpool_common::{
    AccountId, Amount, BundleId, Event, LedgerError, PolicyError, ProcessId, RainpoolError,
    Result, RiskId,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::policy::{ApplicationState, Policy, PolicyState};
use crate::premium::PremiumReceipt;
use crate::product::RainProduct;
use crate::risk::{OracleStatus, Risk};

/// Application input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRequest {
    pub holder: AccountId,
    /// Payout recipient; the holder when unset
    pub wallet: Option<AccountId>,
    /// Net premium
    pub premium: Amount,
    pub sum_insured: Amount,
    pub risk_id: RiskId,
    /// Bundle to underwrite against; matched automatically when unset
    pub bundle_id: Option<BundleId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnderwritingOutcome {
    Underwritten { bundle_id: BundleId },
    /// No bundle matched or the bundle lacked capacity; the application
    /// stays `Applied`
    PendingCapacity { bundle_id: Option<BundleId> },
}

impl UnderwritingOutcome {
    pub fn is_underwritten(&self) -> bool {
        matches!(self, UnderwritingOutcome::Underwritten { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationReceipt {
    pub process_id: ProcessId,
    pub outcome: UnderwritingOutcome,
    /// Set when the premium was collected right after underwriting
    pub premium: Option<PremiumReceipt>,
}

impl RainProduct {
    /// Record an application and try to underwrite it immediately
    #[instrument(skip(self, request), fields(holder = %request.holder, risk_id = %request.risk_id))]
    pub fn apply_for_policy(&mut self, request: ApplicationRequest) -> Result<ApplicationReceipt> {
        if request.sum_insured == 0 {
            return Err(PolicyError::InvalidSumInsured.into());
        }
        let risk = self.open_risk(request.risk_id)?;
        let place = risk.place.clone();
        let duration = risk.duration();

        let bundle_id = match request.bundle_id {
            Some(bundle_id) => {
                if let Err(reason) =
                    self.riskpool
                        .check_match(bundle_id, &place, request.sum_insured, duration)?
                {
                    self.emit(Event::BundleMatchFailed {
                        customer: request.holder.clone(),
                        risk_id: request.risk_id,
                        bundle_id,
                        reason,
                    });
                    return Err(PolicyError::BundleMismatch { bundle_id, reason }.into());
                }
                Some(bundle_id)
            }
            None => self
                .riskpool
                .find_matching_bundle(&place, request.sum_insured, duration),
        };

        let process_id = self.book.next_id();
        let now = self.now();
        let premium_expected = self.premiums.calculate_premium(request.premium);
        self.book.insert(Policy {
            process_id,
            wallet: request.wallet.unwrap_or_else(|| request.holder.clone()),
            holder: request.holder.clone(),
            risk_id: request.risk_id,
            bundle_id,
            sum_insured: request.sum_insured,
            net_premium: request.premium,
            premium_expected,
            premium_paid: 0,
            application_state: ApplicationState::Applied,
            policy_state: None,
            claims: Vec::new(),
            payouts: Vec::new(),
            payout_amount: 0,
            created_at: now,
            updated_at: now,
        });
        info!(%process_id, ?bundle_id, premium_expected, "application created");
        self.emit(Event::ApplicationCreated {
            process_id,
            customer: request.holder,
            premium: request.premium,
            sum_insured: request.sum_insured,
            risk_id: request.risk_id,
            bundle_id,
        });

        let outcome = self.collateralize(process_id)?;
        let premium = match outcome {
            UnderwritingOutcome::Underwritten { .. } => self.try_collect_premium(process_id)?,
            UnderwritingOutcome::PendingCapacity { .. } => None,
        };
        Ok(ApplicationReceipt {
            process_id,
            outcome,
            premium,
        })
    }

    /// Retry collateralization of an `Applied` application
    ///
    /// Already underwritten applications report their bundle again.
    #[instrument(skip(self))]
    pub fn underwrite(
        &mut self,
        caller: &AccountId,
        process_id: ProcessId,
    ) -> Result<UnderwritingOutcome> {
        self.access.require(Role::Insurer, caller)?;
        let policy = self.book.get(process_id)?;
        match (policy.application_state, policy.bundle_id) {
            (ApplicationState::Applied, _) => {}
            (ApplicationState::Underwritten, Some(bundle_id)) => {
                return Ok(UnderwritingOutcome::Underwritten { bundle_id });
            }
            (state, _) => {
                return Err(PolicyError::InvalidApplicationState {
                    process_id,
                    state: state.to_string(),
                }
                .into())
            }
        }
        self.open_risk(policy.risk_id)?;

        let outcome = self.collateralize(process_id)?;
        if outcome.is_underwritten() {
            self.try_collect_premium(process_id)?;
        }
        Ok(outcome)
    }

    /// Risk that still accepts applications: no oracle request was ever made
    fn open_risk(&self, risk_id: RiskId) -> Result<&Risk> {
        let risk = self.risks.get(risk_id)?;
        if risk.oracle_status() != OracleStatus::NotTriggered {
            return Err(PolicyError::RiskClosedForApplications(risk_id).into());
        }
        Ok(risk)
    }

    /// Lock collateral for an application, recording a bundle if none was
    /// selected yet
    fn collateralize(&mut self, process_id: ProcessId) -> Result<UnderwritingOutcome> {
        let policy = self.book.get(process_id)?;
        let (recorded, sum_insured, risk_id) =
            (policy.bundle_id, policy.sum_insured, policy.risk_id);
        let risk = self.risks.get(risk_id)?;
        let (place, duration) = (risk.place.clone(), risk.duration());

        let selected = match recorded {
            Some(bundle_id) => {
                match self
                    .riskpool
                    .check_match(bundle_id, &place, sum_insured, duration)?
                {
                    Ok(()) => Some(bundle_id),
                    Err(reason) => {
                        warn!(%process_id, %bundle_id, %reason, "recorded bundle no longer matches");
                        None
                    }
                }
            }
            None => self
                .riskpool
                .find_matching_bundle(&place, sum_insured, duration),
        };

        let Some(bundle_id) = selected else {
            return Ok(self.pending(process_id, recorded, sum_insured));
        };

        match self.riskpool.reserve_collateral(bundle_id, sum_insured) {
            Ok(()) => {}
            Err(RainpoolError::Ledger(LedgerError::InsufficientCapacity { required, available })) => {
                warn!(%process_id, %bundle_id, required, available, "collateralization failed");
                return Ok(self.pending(process_id, Some(bundle_id), sum_insured));
            }
            Err(e) => return Err(e),
        }

        let now = self.now();
        let policy = self.book.get_mut(process_id)?;
        policy.bundle_id = Some(bundle_id);
        policy.application_state = ApplicationState::Underwritten;
        policy.policy_state = Some(PolicyState::Active);
        policy.updated_at = now;

        info!(%process_id, %bundle_id, locked = sum_insured, "policy underwritten");
        self.emit(Event::PolicyUnderwritten {
            process_id,
            bundle_id,
            locked: sum_insured,
        });
        Ok(UnderwritingOutcome::Underwritten { bundle_id })
    }

    fn pending(
        &mut self,
        process_id: ProcessId,
        bundle_id: Option<BundleId>,
        required: Amount,
    ) -> UnderwritingOutcome {
        if let Ok(policy) = self.book.get_mut(process_id) {
            if policy.bundle_id.is_none() {
                policy.bundle_id = bundle_id;
            }
        }
        self.emit(Event::CollateralizationFailed {
            process_id,
            bundle_id,
            required,
        });
        UnderwritingOutcome::PendingCapacity { bundle_id }
    }

    /// Collect the outstanding premium from the holder if the rail allows it
    fn try_collect_premium(&mut self, process_id: ProcessId) -> Result<Option<PremiumReceipt>> {
        let policy = self.book.get(process_id)?;
        let (holder, remaining) = (policy.holder.clone(), policy.remaining_premium());
        if remaining == 0 {
            return Ok(None);
        }

        if let Err(e) = self.premiums.can_collect(&holder, remaining) {
            warn!(%process_id, %holder, error = %e, "premium not collected on underwriting");
            self.emit(Event::PremiumCollectionFailed {
                process_id,
                payer: holder,
                amount: remaining,
            });
            return Ok(None);
        }
        self.pull_premium(process_id, &holder, remaining).map(Some)
    }
}

//! Rain product facade
//!
//! [`RainProduct`] owns the risk registry, the policy book, the oracle
//! coordinator and the premium ledger, and drives the riskpool's
//! [`BundleRegistry`] for collateral. Underwriting and claim processing live
//! in their own modules as further `impl RainProduct` blocks.

use rainpool_common::ports::{AccessControl, Clock, Role, TokenRail};
use rainpool_common::{
    AccountId, Amount, Event, EventLog, PolicyError, Ports, ProcessId, RequestId, Result, RiskId,
    Wallets,
};
use rainpool_riskpool::{BundleRegistry, RiskpoolSettings};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::oracle::{OracleCoordinator, OracleRequest};
use crate::payout::{payout_amount, payout_percentage};
use crate::policy::{Policy, PolicyBook};
use crate::premium::PremiumLedger;
use crate::risk::{Risk, RiskAdjustment, RiskRegistry, RiskSpec};
use crate::settings::ProductSettings;

pub struct RainProduct {
    pub(crate) settings: ProductSettings,
    pub(crate) risks: RiskRegistry,
    pub(crate) book: PolicyBook,
    pub(crate) oracle: OracleCoordinator,
    pub(crate) premiums: PremiumLedger,
    pub(crate) riskpool: BundleRegistry,
    pub(crate) token: Arc<dyn TokenRail>,
    pub(crate) access: Arc<dyn AccessControl>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) wallets: Wallets,
    pub(crate) events: EventLog,
}

impl RainProduct {
    pub fn new(
        settings: ProductSettings,
        riskpool_settings: RiskpoolSettings,
        ports: &Ports,
        events: EventLog,
    ) -> Self {
        let wallets = riskpool_settings.wallets.clone();
        Self {
            risks: RiskRegistry::new(settings.min_risk_duration, settings.max_risk_duration),
            book: PolicyBook::new(),
            oracle: OracleCoordinator::new(ports.oracle.clone(), settings.max_precipitation),
            premiums: PremiumLedger::new(
                settings.premium_fee,
                ports.token.clone(),
                wallets.clone(),
            ),
            riskpool: BundleRegistry::new(riskpool_settings, ports, events.clone()),
            token: ports.token.clone(),
            access: ports.access.clone(),
            clock: ports.clock.clone(),
            wallets,
            events,
            settings,
        }
    }

    pub fn settings(&self) -> &ProductSettings {
        &self.settings
    }

    pub fn riskpool(&self) -> &BundleRegistry {
        &self.riskpool
    }

    /// Bundle lifecycle and pool administration
    pub fn riskpool_mut(&mut self) -> &mut BundleRegistry {
        &mut self.riskpool
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub(crate) fn now(&self) -> i64 {
        self.clock.timestamp()
    }

    pub(crate) fn emit(&self, event: Event) {
        self.events.emit(self.clock.now(), event);
    }

    // ============ RISKS ============

    #[instrument(skip(self, spec), fields(place = %spec.place))]
    pub fn create_risk(&mut self, caller: &AccountId, spec: RiskSpec) -> Result<RiskId> {
        self.access.require(Role::Insurer, caller)?;
        let now = self.now();
        let risk_id = self.risks.create(spec, now)?;

        let risk = self.risks.get(risk_id)?;
        info!(%risk_id, start = risk.start, end = risk.end, "risk created");
        self.emit(Event::RiskCreated {
            risk_id,
            place: risk.place.clone(),
            start: risk.start,
            end: risk.end,
        });
        Ok(risk_id)
    }

    /// Replace the payout terms of a risk no application references yet
    #[instrument(skip(self))]
    pub fn adjust_risk(
        &mut self,
        caller: &AccountId,
        risk_id: RiskId,
        adjustment: RiskAdjustment,
    ) -> Result<()> {
        self.access.require(Role::Insurer, caller)?;
        let referencing = self.book.for_risk(risk_id).len();
        let now = self.now();
        self.risks.adjust(risk_id, adjustment, referencing, now)?;

        self.emit(Event::RiskAdjusted {
            risk_id,
            trigger: adjustment.trigger,
            exit: adjustment.exit,
            prec_hist: adjustment.prec_hist,
            prec_days: adjustment.prec_days,
        });
        Ok(())
    }

    pub fn risk(&self, risk_id: RiskId) -> Result<&Risk> {
        Ok(self.risks.get(risk_id)?)
    }

    /// Number of risks created
    pub fn risks(&self) -> usize {
        self.risks.len()
    }

    /// Risk id at creation index
    pub fn risk_id(&self, idx: usize) -> Option<RiskId> {
        self.risks.id_at(idx)
    }

    // ============ ORACLE ============

    /// Request rainfall data for the risk of `process_id`
    #[instrument(skip(self))]
    pub fn trigger_oracle(&mut self, caller: &AccountId, process_id: ProcessId) -> Result<RequestId> {
        self.access.require(Role::Insurer, caller)?;
        let risk_id = self.book.get(process_id)?.risk_id;
        let now = self.now();

        let risk = self.risks.get_mut(risk_id)?;
        let (request_id, superseded) = self.oracle.trigger(risk, now)?;
        let request = (risk.place.clone(), risk.start, risk.end);

        if let Some(previous) = superseded {
            info!(%previous, %request_id, "pending oracle request superseded");
            self.emit(Event::RiskDataRequestCancelled {
                request_id: previous,
                risk_id,
            });
        }
        info!(%risk_id, %request_id, "oracle triggered");
        self.emit(Event::RiskDataRequested {
            request_id,
            risk_id,
            place: request.0,
            start: request.1,
            end: request.2,
        });
        Ok(request_id)
    }

    /// Cancel the pending oracle request for the risk of `process_id`
    #[instrument(skip(self))]
    pub fn cancel_oracle_request(
        &mut self,
        caller: &AccountId,
        process_id: ProcessId,
    ) -> Result<RequestId> {
        self.access.require(Role::Insurer, caller)?;
        let risk_id = self.book.get(process_id)?.risk_id;
        let now = self.now();

        let risk = self.risks.get(risk_id)?;
        let request_id = self.oracle.cancel(risk, now)?;
        info!(%risk_id, %request_id, "oracle request cancelled");
        self.emit(Event::RiskDataRequestCancelled {
            request_id,
            risk_id,
        });
        Ok(request_id)
    }

    pub fn oracle_request(&self, request_id: RequestId) -> Option<&OracleRequest> {
        self.oracle.request(request_id)
    }

    /// Deliver an oracle observation
    ///
    /// `days` defaults to the whole days of the risk window. Returns `false`
    /// and leaves all state unchanged for unknown, cancelled or answered
    /// requests and for out-of-range values.
    #[instrument(skip(self))]
    pub fn fulfill(&mut self, request_id: RequestId, prec_actual: u64, days: Option<u32>) -> bool {
        let risk_id = match self.oracle.check_response(request_id, prec_actual) {
            Ok(risk_id) => risk_id,
            Err(rejection) => {
                warn!(%request_id, %rejection, "oracle response rejected");
                self.emit(Event::RiskDataRejected {
                    request_id,
                    reason: rejection.to_string(),
                });
                return false;
            }
        };

        let now = self.now();
        let Ok(risk) = self.risks.get_mut(risk_id) else {
            warn!(%request_id, %risk_id, "oracle response for unknown risk");
            return false;
        };
        let prec_days = days.unwrap_or_else(|| risk.duration_days());
        self.oracle
            .apply_response(request_id, risk, prec_actual, prec_days, now);

        info!(%risk_id, %request_id, prec_actual, prec_days, "oracle response received");
        self.emit(Event::RiskDataReceived {
            request_id,
            risk_id,
            prec_actual,
            prec_days,
        });
        true
    }

    // ============ PRICING ============

    /// Gross premium for a net premium
    pub fn calculate_premium(&self, net_premium: Amount) -> Amount {
        self.premiums.calculate_premium(net_premium)
    }

    /// Payout percentage for a risk that has an oracle response
    pub fn payout_percentage(&self, risk_id: RiskId) -> Result<u64> {
        let risk = self.risks.get(risk_id)?;
        let observed = risk
            .observed()
            .ok_or(PolicyError::OracleResponseMissing(risk_id))?;
        Ok(payout_percentage(
            risk.thresholds(),
            risk.historical(),
            observed,
            risk.index,
            self.settings.payout_curve,
        ))
    }

    /// Payout due on a policy given its risk's oracle response
    pub fn expected_payout(&self, process_id: ProcessId) -> Result<Amount> {
        let policy = self.book.get(process_id)?;
        let percentage = self.payout_percentage(policy.risk_id)?;
        Ok(payout_amount(percentage, policy.sum_insured))
    }

    // ============ QUERIES ============

    /// Number of applications ever made
    pub fn applications(&self) -> usize {
        self.book.len()
    }

    pub fn application(&self, process_id: ProcessId) -> Result<&Policy> {
        Ok(self.book.get(process_id)?)
    }

    /// Number of unprocessed policies on `risk_id`
    pub fn policies(&self, risk_id: RiskId) -> usize {
        self.book.active_for_risk(risk_id).len()
    }

    /// Unprocessed policy on `risk_id` at `idx`, in application order
    pub fn get_policy_id(&self, risk_id: RiskId, idx: usize) -> Result<ProcessId> {
        let active = self.book.active_for_risk(risk_id);
        active.get(idx).copied().ok_or_else(|| {
            PolicyError::IndexOutOfRange {
                index: idx,
                count: active.len(),
            }
            .into()
        })
    }

    /// Number of applications made by `holder`
    pub fn process_ids(&self, holder: &AccountId) -> usize {
        self.book.for_holder(holder).len()
    }

    pub fn process_ids_for_holder(&self, holder: &AccountId) -> &[ProcessId] {
        self.book.for_holder(holder)
    }

    /// Application of `holder` at `idx`
    pub fn get_process_id(&self, holder: &AccountId, idx: usize) -> Result<ProcessId> {
        let ids = self.book.for_holder(holder);
        if ids.is_empty() {
            return Err(PolicyError::NoPolicies(holder.clone()).into());
        }
        ids.get(idx).copied().ok_or_else(|| {
            PolicyError::IndexOutOfRange {
                index: idx,
                count: ids.len(),
            }
            .into()
        })
    }
}

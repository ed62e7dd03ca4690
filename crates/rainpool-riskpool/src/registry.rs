//! Bundle registry
//!
//! Owns every bundle of one riskpool together with the [`CapitalLedger`]
//! that backs them. All fund movements go through the token rail with the
//! treasury as spender:
//! - funding: investor -> instance wallet (fee), investor -> riskpool wallet (net)
//! - defunding and burn: riskpool wallet -> owner
//!
//! Before a bundle is touched its lifetime is checked; an expired `Active`
//! bundle is moved to `Locked` first.

use rainpool_common::ports::{AccessControl, BundleToken, Clock, Role, TokenRail};
use rainpool_common::{
    AccountId, Amount, BundleError, BundleId, CapitalAccount, Event, EventLog, FilterViolation,
    LedgerError, MatchFailure, Ports, Result, Wallets,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::bundle::{Bundle, BundleFilter, BundleInfo, BundleSpec, BundleState};
use crate::ledger::{CapitalCaps, CapitalLedger, PoolTotals};
use crate::settings::RiskpoolSettings;

/// Registry of bundles and their capital
pub struct BundleRegistry {
    settings: RiskpoolSettings,
    bundles: BTreeMap<BundleId, Bundle>,
    ledger: CapitalLedger,
    allowed: HashSet<AccountId>,
    names: HashSet<String>,
    token: Arc<dyn TokenRail>,
    bundle_token: Arc<dyn BundleToken>,
    access: Arc<dyn AccessControl>,
    clock: Arc<dyn Clock>,
    events: EventLog,
}

impl BundleRegistry {
    pub fn new(settings: RiskpoolSettings, ports: &Ports, events: EventLog) -> Self {
        let ledger = CapitalLedger::new(CapitalCaps {
            pool: settings.pool_capital_cap,
            bundle: settings.bundle_capital_cap,
        });
        Self {
            settings,
            bundles: BTreeMap::new(),
            ledger,
            allowed: HashSet::new(),
            names: HashSet::new(),
            token: ports.token.clone(),
            bundle_token: ports.bundle_token.clone(),
            access: ports.access.clone(),
            clock: ports.clock.clone(),
            events,
        }
    }

    pub fn settings(&self) -> &RiskpoolSettings {
        &self.settings
    }

    fn wallets(&self) -> &Wallets {
        &self.settings.wallets
    }

    // ============ LIFECYCLE ============

    /// Create and fund a new bundle owned by `owner`
    pub fn create_bundle(
        &mut self,
        owner: &AccountId,
        spec: BundleSpec,
        funding: Amount,
    ) -> Result<BundleId> {
        self.access.require(Role::Investor, owner)?;
        if !self.settings.allow_all_accounts && !self.allowed.contains(owner) {
            return Err(BundleError::AccountNotAllowed(owner.clone()).into());
        }

        self.refresh_expired();
        if self.active_bundle_ids().len() >= self.settings.max_active_bundles {
            return Err(BundleError::TooManyActiveBundles {
                max: self.settings.max_active_bundles,
            }
            .into());
        }

        let filter = self.build_filter(spec)?;
        if !filter.name.is_empty() && self.names.contains(&filter.name) {
            return Err(BundleError::NameNotUnique(filter.name).into());
        }

        if funding == 0 {
            return Err(BundleError::InvalidFunding.into());
        }
        self.ledger.check_caps(None, funding)?;
        let (fee, net) = self.split_funding(funding)?;
        self.collect_funding(owner, fee, net)?;

        let now = self.clock.timestamp();
        let bundle_id = BundleId(self.bundles.len() as u64 + 1);
        let token_id = self.bundle_token.mint(owner, bundle_id);

        self.ledger.open(bundle_id);
        self.ledger.credit(bundle_id, net)?;

        if !filter.name.is_empty() {
            self.names.insert(filter.name.clone());
        }
        self.bundles.insert(
            bundle_id,
            Bundle {
                id: bundle_id,
                riskpool_id: self.settings.riskpool_id,
                token_id,
                owner: owner.clone(),
                filter,
                state: BundleState::Active,
                created_at: now,
                updated_at: now,
            },
        );

        info!(%bundle_id, %owner, funding, fee, capital = net, "bundle created");
        self.events.emit(
            self.clock.now(),
            Event::BundleCreated {
                bundle_id,
                owner: owner.clone(),
                token_id,
                funding,
                fee,
                capital: net,
            },
        );
        Ok(bundle_id)
    }

    /// Add funds to a bundle; returns the net amount credited
    pub fn fund_bundle(
        &mut self,
        caller: &AccountId,
        bundle_id: BundleId,
        amount: Amount,
    ) -> Result<Amount> {
        self.refresh_bundle(bundle_id)?;
        let bundle = self.owned_bundle(caller, bundle_id)?;
        if !matches!(bundle.state, BundleState::Active | BundleState::Locked) {
            return Err(invalid_state(bundle, "fund"));
        }
        if amount == 0 {
            return Err(BundleError::InvalidFunding.into());
        }

        self.ledger.check_caps(Some(bundle_id), amount)?;
        let (fee, net) = self.split_funding(amount)?;
        self.collect_funding(caller, fee, net)?;
        self.ledger.credit(bundle_id, net)?;
        self.touch(bundle_id);

        let capital = self.ledger.account(bundle_id)?.capital;
        info!(%bundle_id, amount, fee, capital, "bundle funded");
        self.events.emit(
            self.clock.now(),
            Event::BundleFunded {
                bundle_id,
                amount,
                fee,
                capital,
            },
        );
        Ok(net)
    }

    /// Withdraw unlocked funds to the owner (fee-free)
    pub fn defund_bundle(
        &mut self,
        caller: &AccountId,
        bundle_id: BundleId,
        amount: Amount,
    ) -> Result<()> {
        self.refresh_bundle(bundle_id)?;
        let bundle = self.owned_bundle(caller, bundle_id)?;
        if !bundle.state.holds_capital() {
            return Err(invalid_state(bundle, "defund"));
        }
        if amount == 0 {
            return Err(BundleError::InvalidFunding.into());
        }

        let capacity = self.ledger.capacity(bundle_id)?;
        if capacity < amount {
            return Err(LedgerError::InsufficientCapacity {
                required: amount,
                available: capacity,
            }
            .into());
        }

        let wallets = self.wallets().clone();
        self.token
            .can_transfer(&wallets.treasury, &wallets.riskpool_wallet, amount)?;
        self.ledger.debit(bundle_id, amount)?;
        self.token.transfer_from(
            &wallets.treasury,
            &wallets.riskpool_wallet,
            caller,
            amount,
        )?;
        self.touch(bundle_id);

        let capital = self.ledger.account(bundle_id)?.capital;
        info!(%bundle_id, amount, capital, "bundle defunded");
        self.events.emit(
            self.clock.now(),
            Event::BundleDefunded {
                bundle_id,
                amount,
                capital,
            },
        );
        Ok(())
    }

    /// Stop accepting new policies
    pub fn lock_bundle(&mut self, caller: &AccountId, bundle_id: BundleId) -> Result<()> {
        self.refresh_bundle(bundle_id)?;
        self.owned_bundle(caller, bundle_id)?;
        self.transition(bundle_id, BundleState::Locked, "lock")?;
        self.events.emit(
            self.clock.now(),
            Event::BundleLocked {
                bundle_id,
                expired: false,
            },
        );
        Ok(())
    }

    /// Close a bundle without locked capital
    pub fn close_bundle(&mut self, caller: &AccountId, bundle_id: BundleId) -> Result<()> {
        self.refresh_bundle(bundle_id)?;
        self.owned_bundle(caller, bundle_id)?;

        let locked = self.ledger.account(bundle_id)?.locked;
        if locked > 0 {
            return Err(BundleError::WithActivePolicies { bundle_id, locked }.into());
        }

        self.transition(bundle_id, BundleState::Closed, "close")?;
        info!(%bundle_id, "bundle closed");
        self.events
            .emit(self.clock.now(), Event::BundleClosed { bundle_id });
        Ok(())
    }

    /// Burn a closed bundle, returning its residual balance to the owner
    pub fn burn_bundle(&mut self, caller: &AccountId, bundle_id: BundleId) -> Result<Amount> {
        let bundle = self.owned_bundle(caller, bundle_id)?;
        if bundle.state != BundleState::Closed {
            return Err(invalid_state(bundle, "burn"));
        }
        let token_id = bundle.token_id;

        let wallets = self.wallets().clone();
        let residual = self.ledger.account(bundle_id)?.balance;
        if residual > 0 {
            self.token
                .can_transfer(&wallets.treasury, &wallets.riskpool_wallet, residual)?;
        }

        self.transition(bundle_id, BundleState::Burned, "burn")?;
        self.ledger.close(bundle_id)?;
        if residual > 0 {
            self.token.transfer_from(
                &wallets.treasury,
                &wallets.riskpool_wallet,
                caller,
                residual,
            )?;
        }
        self.bundle_token.burn(token_id)?;

        info!(%bundle_id, returned = residual, "bundle burned");
        self.events.emit(
            self.clock.now(),
            Event::BundleBurned {
                bundle_id,
                owner: caller.clone(),
                returned: residual,
            },
        );
        Ok(residual)
    }

    /// Move every expired `Active` bundle to `Locked`
    pub fn refresh_expired(&mut self) {
        let now = self.clock.timestamp();
        let expired: Vec<BundleId> = self
            .bundles
            .values()
            .filter(|b| b.state == BundleState::Active && b.is_expired(now))
            .map(|b| b.id)
            .collect();
        for bundle_id in expired {
            self.lock_expired(bundle_id, now);
        }
    }

    fn refresh_bundle(&mut self, bundle_id: BundleId) -> Result<()> {
        let now = self.clock.timestamp();
        let bundle = self.get(bundle_id)?;
        if bundle.state == BundleState::Active && bundle.is_expired(now) {
            self.lock_expired(bundle_id, now);
        }
        Ok(())
    }

    fn lock_expired(&mut self, bundle_id: BundleId, now: i64) {
        if let Some(bundle) = self.bundles.get_mut(&bundle_id) {
            bundle.state = BundleState::Locked;
            bundle.updated_at = now;
            info!(%bundle_id, "bundle lifetime expired, locked");
            self.events.emit(
                self.clock.now(),
                Event::BundleLocked {
                    bundle_id,
                    expired: true,
                },
            );
        }
    }

    // ============ ADMINISTRATION ============

    /// Replace the capital caps (riskpool keeper only)
    pub fn set_capital_caps(
        &mut self,
        caller: &AccountId,
        pool_cap: Option<Amount>,
        bundle_cap: Option<Amount>,
    ) -> Result<()> {
        self.access.require(Role::RiskpoolKeeper, caller)?;
        let old = self.ledger.set_caps(CapitalCaps {
            pool: pool_cap,
            bundle: bundle_cap,
        });
        self.settings.pool_capital_cap = pool_cap;
        self.settings.bundle_capital_cap = bundle_cap;

        info!(?pool_cap, ?bundle_cap, "capital caps set");
        self.events.emit(
            self.clock.now(),
            Event::CapitalCapsSet {
                old_pool_cap: old.pool,
                new_pool_cap: pool_cap,
                old_bundle_cap: old.bundle,
                new_bundle_cap: bundle_cap,
            },
        );
        Ok(())
    }

    /// Toggle the allow-list
    pub fn set_allow_all_accounts(&mut self, caller: &AccountId, allow_all: bool) -> Result<()> {
        self.access.require(Role::RiskpoolKeeper, caller)?;
        self.settings.allow_all_accounts = allow_all;
        Ok(())
    }

    /// Grant or revoke bundle creation for one account
    pub fn allow_account(
        &mut self,
        caller: &AccountId,
        account: &AccountId,
        allowed: bool,
    ) -> Result<()> {
        self.access.require(Role::RiskpoolKeeper, caller)?;
        if allowed {
            self.allowed.insert(account.clone());
        } else {
            self.allowed.remove(account);
        }
        Ok(())
    }

    pub fn is_allowed(&self, account: &AccountId) -> bool {
        self.settings.allow_all_accounts || self.allowed.contains(account)
    }

    pub fn set_max_active_bundles(&mut self, caller: &AccountId, max: usize) -> Result<()> {
        self.access.require(Role::RiskpoolKeeper, caller)?;
        self.settings.max_active_bundles = max;
        Ok(())
    }

    // ============ COLLATERAL ============

    /// First active, unexpired bundle accepting the application
    pub fn find_matching_bundle(
        &mut self,
        place: &str,
        sum_insured: Amount,
        duration: i64,
    ) -> Option<BundleId> {
        self.refresh_expired();
        let now = self.clock.timestamp();
        self.bundles
            .values()
            .find(|b| b.check_match(place, sum_insured, duration, now).is_ok())
            .map(|b| b.id)
    }

    /// Check one bundle against an application
    pub fn check_match(
        &mut self,
        bundle_id: BundleId,
        place: &str,
        sum_insured: Amount,
        duration: i64,
    ) -> Result<std::result::Result<(), MatchFailure>> {
        self.refresh_bundle(bundle_id)?;
        let now = self.clock.timestamp();
        Ok(self
            .get(bundle_id)?
            .check_match(place, sum_insured, duration, now))
    }

    /// Lock collateral for a policy
    pub fn reserve_collateral(&mut self, bundle_id: BundleId, amount: Amount) -> Result<()> {
        self.get(bundle_id)?;
        self.ledger.reserve(bundle_id, amount)?;
        self.touch(bundle_id);
        Ok(())
    }

    /// Unlock collateral of a settled policy
    pub fn release_collateral(&mut self, bundle_id: BundleId, amount: Amount) -> Result<()> {
        self.ledger.release(bundle_id, amount)?;
        self.touch(bundle_id);
        Ok(())
    }

    /// Credit a net premium to the bundle
    pub fn credit_premium(&mut self, bundle_id: BundleId, net: Amount) -> Result<()> {
        if net == 0 {
            return Ok(());
        }
        self.ledger.credit(bundle_id, net)?;
        self.touch(bundle_id);
        Ok(())
    }

    /// Debit a paid-out claim amount from the bundle
    pub fn debit_payout(&mut self, bundle_id: BundleId, amount: Amount) -> Result<()> {
        self.ledger.debit(bundle_id, amount)?;
        self.touch(bundle_id);
        Ok(())
    }

    // ============ QUERIES ============

    /// Number of bundles ever created
    pub fn bundles(&self) -> usize {
        self.bundles.len()
    }

    /// Bundle id at creation index
    pub fn bundle_id(&self, idx: usize) -> Option<BundleId> {
        self.bundles.keys().nth(idx).copied()
    }

    pub fn bundle(&self, bundle_id: BundleId) -> Result<&Bundle> {
        self.get(bundle_id)
    }

    pub fn capital(&self, bundle_id: BundleId) -> Result<&CapitalAccount> {
        Ok(self.ledger.account(bundle_id)?)
    }

    pub fn bundle_info(&self, bundle_id: BundleId) -> Result<BundleInfo> {
        Ok(BundleInfo {
            bundle: self.get(bundle_id)?.clone(),
            capital: self.ledger.account(bundle_id)?.clone(),
        })
    }

    pub fn active_bundle_ids(&self) -> Vec<BundleId> {
        self.bundles
            .values()
            .filter(|b| b.state == BundleState::Active)
            .map(|b| b.id)
            .collect()
    }

    /// Bundles whose filter covers `place`, wildcards included
    pub fn bundle_ids_for_place(&self, place: &str) -> Vec<BundleId> {
        self.bundles
            .values()
            .filter(|b| b.filter.covers_place(place))
            .map(|b| b.id)
            .collect()
    }

    pub fn totals(&self) -> PoolTotals {
        self.ledger.totals()
    }

    pub fn caps(&self) -> CapitalCaps {
        self.ledger.caps()
    }

    pub fn ledger(&self) -> &CapitalLedger {
        &self.ledger
    }

    // ============ HELPERS ============

    fn get(&self, bundle_id: BundleId) -> Result<&Bundle> {
        Ok(self
            .bundles
            .get(&bundle_id)
            .ok_or(BundleError::NotFound(bundle_id))?)
    }

    fn owned_bundle(&self, caller: &AccountId, bundle_id: BundleId) -> Result<&Bundle> {
        let bundle = self.get(bundle_id)?;
        if &bundle.owner != caller {
            warn!(%bundle_id, %caller, "bundle operation by non-owner");
            return Err(BundleError::NotOwner {
                bundle_id,
                caller: caller.clone(),
            }
            .into());
        }
        Ok(bundle)
    }

    fn transition(&mut self, bundle_id: BundleId, to: BundleState, operation: &str) -> Result<()> {
        let now = self.clock.timestamp();
        let bundle = self
            .bundles
            .get_mut(&bundle_id)
            .ok_or(BundleError::NotFound(bundle_id))?;
        bundle.state = bundle
            .state
            .transition(to)
            .map_err(|(from, _)| BundleError::InvalidState {
                bundle_id,
                state: from.to_string(),
                operation: operation.to_string(),
            })?;
        bundle.updated_at = now;
        Ok(())
    }

    fn touch(&mut self, bundle_id: BundleId) {
        let now = self.clock.timestamp();
        if let Some(bundle) = self.bundles.get_mut(&bundle_id) {
            bundle.updated_at = now;
        }
    }

    fn build_filter(&self, spec: BundleSpec) -> Result<BundleFilter> {
        let s = &self.settings;
        let violation = if spec.place.is_empty() {
            Some(FilterViolation::PlaceMissing)
        } else if spec.lifetime < s.min_bundle_lifetime || spec.lifetime > s.max_bundle_lifetime {
            Some(FilterViolation::LifetimeInvalid)
        } else if spec.max_protected_balance == 0
            || spec.max_protected_balance > s.max_protected_balance
            || spec.max_protected_balance < spec.min_protected_balance
        {
            Some(FilterViolation::MaxProtectedBalanceInvalid)
        } else if spec.min_protected_balance == 0 {
            Some(FilterViolation::MinProtectedBalanceInvalid)
        } else if spec.min_duration < s.min_policy_duration
            || spec.max_duration > s.max_policy_duration
            || spec.min_duration > spec.max_duration
        {
            Some(FilterViolation::DurationInvalid)
        } else {
            None
        };

        if let Some(violation) = violation {
            return Err(BundleError::InvalidFilter(violation).into());
        }

        Ok(BundleFilter {
            min_sum_insured: s.sum_insured(spec.min_protected_balance),
            max_sum_insured: s.sum_insured(spec.max_protected_balance),
            name: spec.name,
            lifetime: spec.lifetime,
            min_duration: spec.min_duration,
            max_duration: spec.max_duration,
            place: spec.place,
        })
    }

    fn split_funding(&self, gross: Amount) -> Result<(Amount, Amount)> {
        let fee = self.settings.capital_fee.fee_for(gross);
        match gross.checked_sub(fee) {
            Some(net) if net > 0 => Ok((fee, net)),
            _ => Err(BundleError::InvalidFunding.into()),
        }
    }

    fn collect_funding(&self, from: &AccountId, fee: Amount, net: Amount) -> Result<()> {
        let wallets = self.wallets();
        self.token.can_transfer(&wallets.treasury, from, fee + net)?;
        if fee > 0 {
            self.token
                .transfer_from(&wallets.treasury, from, &wallets.instance_wallet, fee)?;
        }
        self.token
            .transfer_from(&wallets.treasury, from, &wallets.riskpool_wallet, net)?;
        Ok(())
    }
}

fn invalid_state(bundle: &Bundle, operation: &str) -> rainpool_common::RainpoolError {
    BundleError::InvalidState {
        bundle_id: bundle.id,
        state: bundle.state.to_string(),
        operation: operation.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rainpool_common::ports::{
        InMemoryAccessControl, InMemoryBundleToken, InMemoryToken, ManualClock,
        QueuedOracleTransport,
    };
    use rainpool_common::{CapScope, RainpoolError, SECONDS_PER_DAY};

    struct Fixture {
        registry: BundleRegistry,
        token: Arc<InMemoryToken>,
        bundle_token: Arc<InMemoryBundleToken>,
        access: Arc<InMemoryAccessControl>,
        clock: Arc<ManualClock>,
        events: EventLog,
    }

    fn investor() -> AccountId {
        AccountId::from("investor")
    }

    fn keeper() -> AccountId {
        AccountId::from("keeper")
    }

    fn fixture(settings: RiskpoolSettings) -> Fixture {
        let token = Arc::new(InMemoryToken::new());
        let bundle_token = Arc::new(InMemoryBundleToken::new());
        let access = Arc::new(InMemoryAccessControl::new());
        let clock = Arc::new(ManualClock::at_timestamp(1_700_000_000));
        let events = EventLog::new();

        access.grant(Role::Investor, &investor());
        access.grant(Role::RiskpoolKeeper, &keeper());

        let wallets = settings.wallets.clone();
        token.approve(&wallets.riskpool_wallet, &wallets.treasury, Amount::MAX);
        token.mint(&investor(), 1_000_000);
        token.approve(&investor(), &wallets.treasury, Amount::MAX);

        let ports = Ports {
            token: token.clone(),
            access: access.clone(),
            bundle_token: bundle_token.clone(),
            oracle: Arc::new(QueuedOracleTransport::new()),
            clock: clock.clone(),
        };
        Fixture {
            registry: BundleRegistry::new(settings, &ports, events.clone()),
            token,
            bundle_token,
            access,
            clock,
            events,
        }
    }

    fn spec(name: &str) -> BundleSpec {
        BundleSpec {
            name: name.to_string(),
            lifetime: 90 * SECONDS_PER_DAY,
            min_protected_balance: 100,
            max_protected_balance: 5000,
            min_duration: SECONDS_PER_DAY,
            max_duration: 15 * SECONDS_PER_DAY,
            place: "10001.saopaulo".to_string(),
        }
    }

    #[test]
    fn test_create_bundle_deducts_capital_fee() {
        let mut f = fixture(RiskpoolSettings::default());
        let id = f.registry.create_bundle(&investor(), spec(""), 200_000).unwrap();

        assert_eq!(id, BundleId(1));
        let capital = f.registry.capital(id).unwrap();
        assert_eq!(capital.capital, 190_000);
        assert_eq!(capital.balance, 190_000);
        assert_eq!(capital.locked, 0);

        let wallets = f.registry.settings().wallets.clone();
        assert_eq!(f.token.balance_of(&wallets.riskpool_wallet), 190_000);
        assert_eq!(f.token.balance_of(&wallets.instance_wallet), 10_000);
        assert_eq!(f.token.balance_of(&investor()), 800_000);

        let bundle = f.registry.bundle(id).unwrap();
        assert_eq!(f.bundle_token.owner_of(bundle.token_id).unwrap(), investor());
        assert!(matches!(f.events.last(), Some(Event::BundleCreated { capital: 190_000, fee: 10_000, .. })));
    }

    #[test]
    fn test_create_requires_investor_role() {
        let mut f = fixture(RiskpoolSettings::default());
        let outsider = AccountId::from("outsider");
        let result = f.registry.create_bundle(&outsider, spec(""), 1000);
        assert!(matches!(result, Err(RainpoolError::Unauthorized { .. })));
    }

    #[test]
    fn test_lifetime_bounds() {
        let mut f = fixture(RiskpoolSettings::default());
        for (days, ok) in [(1, false), (60, true), (500, false)] {
            let mut s = spec("");
            s.lifetime = days * SECONDS_PER_DAY;
            let result = f.registry.create_bundle(&investor(), s, 10_000);
            if ok {
                assert!(result.is_ok(), "{} days should be valid", days);
            } else {
                assert!(matches!(
                    result,
                    Err(RainpoolError::Bundle(BundleError::InvalidFilter(FilterViolation::LifetimeInvalid)))
                ));
            }
        }
    }

    #[test]
    fn test_protected_balance_bounds() {
        let mut f = fixture(RiskpoolSettings::default());
        let cases = [
            (2000, 0, Some(FilterViolation::MaxProtectedBalanceInvalid)),
            (2000, 3000, None),
            (2000, 10_000_000, Some(FilterViolation::MaxProtectedBalanceInvalid)),
            (0, 5000, Some(FilterViolation::MinProtectedBalanceInvalid)),
            (4999, 5000, None),
            (5001, 5000, Some(FilterViolation::MaxProtectedBalanceInvalid)),
        ];
        for (min, max, expected) in cases {
            let mut s = spec("");
            s.min_protected_balance = min;
            s.max_protected_balance = max;
            let result = f.registry.create_bundle(&investor(), s, 10_000);
            match expected {
                None => assert!(result.is_ok()),
                Some(v) => assert!(matches!(
                    result,
                    Err(RainpoolError::Bundle(BundleError::InvalidFilter(got))) if got == v
                )),
            }
        }
    }

    #[test]
    fn test_name_uniqueness() {
        let mut f = fixture(RiskpoolSettings::default());
        f.registry.create_bundle(&investor(), spec(""), 1000).unwrap();
        f.registry.create_bundle(&investor(), spec(""), 1000).unwrap();
        f.registry.create_bundle(&investor(), spec("alpha"), 1000).unwrap();

        let result = f.registry.create_bundle(&investor(), spec("alpha"), 1000);
        assert!(matches!(
            result,
            Err(RainpoolError::Bundle(BundleError::NameNotUnique(name))) if name == "alpha"
        ));
    }

    #[test]
    fn test_zero_funding_rejected() {
        let mut f = fixture(RiskpoolSettings::default());
        let result = f.registry.create_bundle(&investor(), spec(""), 0);
        assert!(matches!(result, Err(RainpoolError::Bundle(BundleError::InvalidFunding))));
        assert_eq!(f.registry.bundles(), 0);
    }

    #[test]
    fn test_bundle_cap_on_creation() {
        let settings = RiskpoolSettings {
            bundle_capital_cap: Some(5000),
            ..Default::default()
        };
        let mut f = fixture(settings);

        let result = f.registry.create_bundle(&investor(), spec(""), 5001);
        assert!(matches!(
            result,
            Err(RainpoolError::Ledger(LedgerError::CapitalCapExceeded { scope: CapScope::Bundle, .. }))
        ));
        assert!(f.registry.create_bundle(&investor(), spec(""), 5000).is_ok());
    }

    #[test]
    fn test_pool_cap_on_funding() {
        let mut f = fixture(RiskpoolSettings::default());
        let id = f.registry.create_bundle(&investor(), spec(""), 10_000).unwrap();
        f.registry
            .set_capital_caps(&keeper(), Some(12_000), None)
            .unwrap();

        // capital 9500 + 2501 > 12000
        let result = f.registry.fund_bundle(&investor(), id, 2501);
        assert!(matches!(
            result,
            Err(RainpoolError::Ledger(LedgerError::CapitalCapExceeded { scope: CapScope::Pool, .. }))
        ));
        assert_eq!(f.registry.fund_bundle(&investor(), id, 2500).unwrap(), 2375);
    }

    #[test]
    fn test_set_caps_requires_keeper() {
        let mut f = fixture(RiskpoolSettings::default());
        assert!(f.registry.set_capital_caps(&investor(), Some(1), None).is_err());
        f.registry.set_capital_caps(&keeper(), Some(1), Some(2)).unwrap();
        assert_eq!(f.registry.caps(), CapitalCaps { pool: Some(1), bundle: Some(2) });
        assert!(matches!(
            f.events.last(),
            Some(Event::CapitalCapsSet { old_pool_cap: None, new_pool_cap: Some(1), .. })
        ));
    }

    #[test]
    fn test_defund_then_fund_round_trip() {
        let mut f = fixture(RiskpoolSettings::default());
        let id = f.registry.create_bundle(&investor(), spec(""), 200_000).unwrap();
        let before = f.registry.capital(id).unwrap().capital;

        f.registry.defund_bundle(&investor(), id, 10_000).unwrap();
        assert_eq!(f.registry.capital(id).unwrap().capital, before - 10_000);

        let net = f.registry.fund_bundle(&investor(), id, 10_000).unwrap();
        assert_eq!(net, 9_500);
        assert_eq!(f.registry.capital(id).unwrap().capital, before - 500);
    }

    #[test]
    fn test_defund_limited_by_capacity() {
        let mut f = fixture(RiskpoolSettings::default());
        let id = f.registry.create_bundle(&investor(), spec(""), 10_000).unwrap();
        f.registry.reserve_collateral(id, 9_000).unwrap();

        let result = f.registry.defund_bundle(&investor(), id, 501);
        assert!(matches!(
            result,
            Err(RainpoolError::Ledger(LedgerError::InsufficientCapacity { required: 501, available: 500 }))
        ));
    }

    #[test]
    fn test_defund_requires_treasury_allowance() {
        let mut f = fixture(RiskpoolSettings::default());
        let id = f.registry.create_bundle(&investor(), spec(""), 10_000).unwrap();
        let wallets = f.registry.settings().wallets.clone();
        f.token.approve(&wallets.riskpool_wallet, &wallets.treasury, 100);

        assert!(f.registry.defund_bundle(&investor(), id, 101).is_err());
        assert_eq!(f.registry.capital(id).unwrap().capital, 9_500);
        assert!(f.registry.defund_bundle(&investor(), id, 100).is_ok());
    }

    #[test]
    fn test_close_requires_no_locked_capital() {
        let mut f = fixture(RiskpoolSettings::default());
        let id = f.registry.create_bundle(&investor(), spec(""), 10_000).unwrap();
        f.registry.reserve_collateral(id, 1_000).unwrap();

        let result = f.registry.close_bundle(&investor(), id);
        assert!(matches!(
            result,
            Err(RainpoolError::Bundle(BundleError::WithActivePolicies { locked: 1_000, .. }))
        ));

        f.registry.release_collateral(id, 1_000).unwrap();
        f.registry.close_bundle(&investor(), id).unwrap();
        assert_eq!(f.registry.bundle(id).unwrap().state, BundleState::Closed);
    }

    #[test]
    fn test_burn_returns_balance_and_burns_token() {
        let mut f = fixture(RiskpoolSettings::default());
        let id = f.registry.create_bundle(&investor(), spec(""), 10_000).unwrap();
        let token_id = f.registry.bundle(id).unwrap().token_id;

        // burn requires Closed
        assert!(matches!(
            f.registry.burn_bundle(&investor(), id),
            Err(RainpoolError::Bundle(BundleError::InvalidState { .. }))
        ));

        f.registry.close_bundle(&investor(), id).unwrap();
        let returned = f.registry.burn_bundle(&investor(), id).unwrap();

        assert_eq!(returned, 9_500);
        assert_eq!(f.token.balance_of(&investor()), 1_000_000 - 500);
        let info = f.registry.bundle_info(id).unwrap();
        assert_eq!(info.bundle.state, BundleState::Burned);
        assert_eq!(info.capital.capital, 0);
        assert_eq!(info.capital.locked, 0);
        assert_eq!(info.capital.balance, 0);
        assert!(f.bundle_token.burned(token_id));
        assert!(f.bundle_token.owner_of(token_id).is_err());
        assert_eq!(f.registry.totals().capital, 0);
    }

    #[test]
    fn test_non_owner_rejected() {
        let mut f = fixture(RiskpoolSettings::default());
        let id = f.registry.create_bundle(&investor(), spec(""), 10_000).unwrap();
        let result = f.registry.fund_bundle(&keeper(), id, 100);
        assert!(matches!(result, Err(RainpoolError::Bundle(BundleError::NotOwner { .. }))));
    }

    #[test]
    fn test_expired_bundle_auto_locks() {
        let mut f = fixture(RiskpoolSettings::default());
        let id = f.registry.create_bundle(&investor(), spec(""), 10_000).unwrap();

        f.clock.advance(chrono::Duration::days(91));
        assert_eq!(
            f.registry.find_matching_bundle("10001.saopaulo", 1000, 2 * SECONDS_PER_DAY),
            None
        );
        assert_eq!(f.registry.bundle(id).unwrap().state, BundleState::Locked);
        assert!(f.events.events().contains(&Event::BundleLocked { bundle_id: id, expired: true }));

        // Locked bundles still accept funding
        assert!(f.registry.fund_bundle(&investor(), id, 100).is_ok());
    }

    #[test]
    fn test_allow_list() {
        let mut f = fixture(RiskpoolSettings::default());
        f.registry.set_allow_all_accounts(&keeper(), false).unwrap();

        let result = f.registry.create_bundle(&investor(), spec(""), 1000);
        assert!(matches!(result, Err(RainpoolError::Bundle(BundleError::AccountNotAllowed(_)))));

        f.registry.allow_account(&keeper(), &investor(), true).unwrap();
        assert!(f.registry.create_bundle(&investor(), spec(""), 1000).is_ok());
    }

    #[test]
    fn test_max_active_bundles() {
        let mut f = fixture(RiskpoolSettings::default());
        f.registry.set_max_active_bundles(&keeper(), 1).unwrap();
        let first = f.registry.create_bundle(&investor(), spec(""), 1000).unwrap();

        let result = f.registry.create_bundle(&investor(), spec(""), 1000);
        assert!(matches!(result, Err(RainpoolError::Bundle(BundleError::TooManyActiveBundles { max: 1 }))));

        f.registry.lock_bundle(&investor(), first).unwrap();
        assert!(f.registry.create_bundle(&investor(), spec(""), 1000).is_ok());
    }

    #[test]
    fn test_bundles_for_place() {
        let mut f = fixture(RiskpoolSettings::default());
        let a = f.registry.create_bundle(&investor(), spec(""), 1000).unwrap();
        let mut wildcard = spec("");
        wildcard.place = "*".to_string();
        let b = f.registry.create_bundle(&investor(), wildcard, 1000).unwrap();
        let mut other = spec("");
        other.place = "10002.rio".to_string();
        f.registry.create_bundle(&investor(), other, 1000).unwrap();

        assert_eq!(f.registry.bundle_ids_for_place("10001.saopaulo"), vec![a, b]);
        assert_eq!(f.registry.bundle_id(1), Some(b));
        assert_eq!(f.registry.active_bundle_ids().len(), 3);
        assert!(f.access.has_role(Role::Investor, &investor()));
    }
}

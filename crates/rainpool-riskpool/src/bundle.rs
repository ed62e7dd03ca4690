//! Bundle entity, matching filter, and lifecycle state machine

use rainpool_common::{
    AccountId, Amount, BundleId, CapitalAccount, MatchFailure, TokenId, WILDCARD_PLACE,
};
use serde::{Deserialize, Serialize};

/// Bundle lifecycle state
///
/// `Active -> Locked -> Closed -> Burned`; `Active -> Closed` is also legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BundleState {
    Active,
    Locked,
    Closed,
    Burned,
}

impl BundleState {
    /// Apply a transition, returning the new state or the rejected pair
    pub fn transition(self, to: BundleState) -> Result<BundleState, (BundleState, BundleState)> {
        use BundleState::*;
        match (self, to) {
            (Active, Locked) | (Active, Closed) | (Locked, Closed) | (Closed, Burned) => Ok(to),
            (from, to) => Err((from, to)),
        }
    }

    /// Whether the bundle can still receive or return capital
    pub fn holds_capital(self) -> bool {
        !matches!(self, BundleState::Burned)
    }
}

impl std::fmt::Display for BundleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BundleState::Active => "Active",
            BundleState::Locked => "Locked",
            BundleState::Closed => "Closed",
            BundleState::Burned => "Burned",
        };
        write!(f, "{}", s)
    }
}

/// Bundle creation input, expressed in protected balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleSpec {
    pub name: String,
    /// Seconds the bundle accepts new policies
    pub lifetime: i64,
    pub min_protected_balance: Amount,
    pub max_protected_balance: Amount,
    /// Policy duration window (seconds)
    pub min_duration: i64,
    pub max_duration: i64,
    /// Risk place or `*`
    pub place: String,
}

/// Matching filter stored on a bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleFilter {
    pub name: String,
    pub lifetime: i64,
    pub min_sum_insured: Amount,
    pub max_sum_insured: Amount,
    pub min_duration: i64,
    pub max_duration: i64,
    pub place: String,
}

impl BundleFilter {
    /// Whether the filter covers `place`
    pub fn covers_place(&self, place: &str) -> bool {
        self.place == WILDCARD_PLACE || self.place == place
    }
}

/// A unit of pooled risk capital
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub id: BundleId,
    pub riskpool_id: u64,
    pub token_id: TokenId,
    pub owner: AccountId,
    pub filter: BundleFilter,
    pub state: BundleState,
    /// Unix seconds
    pub created_at: i64,
    pub updated_at: i64,
}

impl Bundle {
    /// End of the bundle's underwriting window
    pub fn open_until(&self) -> i64 {
        self.created_at.saturating_add(self.filter.lifetime)
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now > self.open_until()
    }

    /// Check whether an application for `sum_insured` over `duration`
    /// seconds at `place` fits this bundle
    pub fn check_match(
        &self,
        place: &str,
        sum_insured: Amount,
        duration: i64,
        now: i64,
    ) -> Result<(), MatchFailure> {
        if self.state != BundleState::Active {
            return Err(MatchFailure::BundleNotActive);
        }
        if self.is_expired(now) {
            return Err(MatchFailure::BundleExpired);
        }
        if !self.filter.covers_place(place) {
            return Err(MatchFailure::PlaceMismatch);
        }
        if sum_insured < self.filter.min_sum_insured {
            return Err(MatchFailure::SumInsuredTooSmall);
        }
        if sum_insured > self.filter.max_sum_insured {
            return Err(MatchFailure::SumInsuredTooLarge);
        }
        if duration < self.filter.min_duration {
            return Err(MatchFailure::DurationTooShort);
        }
        if duration > self.filter.max_duration {
            return Err(MatchFailure::DurationTooLong);
        }
        Ok(())
    }
}

/// Bundle together with its capital account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleInfo {
    pub bundle: Bundle,
    pub capital: CapitalAccount,
}

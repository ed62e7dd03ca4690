//! Applications, policies, claims and payouts
//!
//! Every application gets a [`ProcessId`] and keeps it for life. The
//! [`PolicyBook`] stores them in an arena keyed by process id with
//! secondary indices by risk (application order) and by holder.

use rainpool_common::{AccountId, Amount, BundleId, PolicyError, ProcessId, RiskId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

macro_rules! state_display {
    ($ty:ident { $($variant:ident),+ $(,)? }) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let s = match self {
                    $($ty::$variant => stringify!($variant),)+
                };
                write!(f, "{}", s)
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationState {
    Applied,
    Underwritten,
    Declined,
    Revoked,
}

impl ApplicationState {
    pub fn transition(self, to: Self) -> Result<Self, (Self, Self)> {
        use ApplicationState::*;
        match (self, to) {
            (Applied, Underwritten) | (Applied, Declined) | (Applied, Revoked) => Ok(to),
            (from, to) => Err((from, to)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyState {
    Active,
    Expired,
    Closed,
}

impl PolicyState {
    pub fn transition(self, to: Self) -> Result<Self, (Self, Self)> {
        use PolicyState::*;
        match (self, to) {
            (Active, Expired) | (Active, Closed) | (Expired, Closed) => Ok(to),
            (from, to) => Err((from, to)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimState {
    Applied,
    Confirmed,
    Declined,
    Closed,
}

impl ClaimState {
    pub fn transition(self, to: Self) -> Result<Self, (Self, Self)> {
        use ClaimState::*;
        match (self, to) {
            (Applied, Confirmed) | (Applied, Declined) | (Confirmed, Closed) | (Declined, Closed) => {
                Ok(to)
            }
            (from, to) => Err((from, to)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutState {
    Expected,
    PaidOut,
}

state_display!(ApplicationState { Applied, Underwritten, Declined, Revoked });
state_display!(PolicyState { Active, Expired, Closed });
state_display!(ClaimState { Applied, Confirmed, Declined, Closed });
state_display!(PayoutState { Expected, PaidOut });

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub id: u64,
    pub amount: Amount,
    pub state: ClaimState,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub id: u64,
    pub claim_id: u64,
    pub amount: Amount,
    pub recipient: AccountId,
    pub state: PayoutState,
    pub created_at: i64,
}

/// An application and, once underwritten, the policy it became
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub process_id: ProcessId,
    pub holder: AccountId,
    /// Receives payouts; defaults to the holder
    pub wallet: AccountId,
    pub risk_id: RiskId,
    pub bundle_id: Option<BundleId>,
    pub sum_insured: Amount,
    /// Premium that reaches the pool after fees
    pub net_premium: Amount,
    /// Gross premium the holder owes
    pub premium_expected: Amount,
    pub premium_paid: Amount,
    pub application_state: ApplicationState,
    pub policy_state: Option<PolicyState>,
    pub claims: Vec<Claim>,
    pub payouts: Vec<Payout>,
    pub payout_amount: Amount,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Policy {
    pub fn is_underwritten(&self) -> bool {
        self.application_state == ApplicationState::Underwritten
    }

    /// Underwritten and not yet processed
    pub fn is_active(&self) -> bool {
        self.is_underwritten() && self.policy_state == Some(PolicyState::Active)
    }

    pub fn remaining_premium(&self) -> Amount {
        self.premium_expected.saturating_sub(self.premium_paid)
    }

    pub fn open_claims(&self) -> usize {
        self.claims
            .iter()
            .filter(|c| c.state != ClaimState::Closed)
            .count()
    }
}

/// Arena of applications with lookup indices
#[derive(Debug, Default)]
pub struct PolicyBook {
    policies: BTreeMap<ProcessId, Policy>,
    by_risk: HashMap<RiskId, Vec<ProcessId>>,
    by_holder: HashMap<AccountId, Vec<ProcessId>>,
}

impl PolicyBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next process id; ids are sequential from 1
    pub fn next_id(&self) -> ProcessId {
        ProcessId(self.policies.len() as u64 + 1)
    }

    pub fn insert(&mut self, policy: Policy) {
        let id = policy.process_id;
        self.by_risk.entry(policy.risk_id).or_default().push(id);
        self.by_holder.entry(policy.holder.clone()).or_default().push(id);
        self.policies.insert(id, policy);
    }

    pub fn get(&self, id: ProcessId) -> Result<&Policy, PolicyError> {
        self.policies
            .get(&id)
            .ok_or(PolicyError::ApplicationNotFound(id))
    }

    pub fn get_mut(&mut self, id: ProcessId) -> Result<&mut Policy, PolicyError> {
        self.policies
            .get_mut(&id)
            .ok_or(PolicyError::ApplicationNotFound(id))
    }

    /// Number of applications ever made
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Applications referencing `risk_id`, in application order
    pub fn for_risk(&self, risk_id: RiskId) -> &[ProcessId] {
        self.by_risk.get(&risk_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Active policies on `risk_id`, in application order
    pub fn active_for_risk(&self, risk_id: RiskId) -> Vec<ProcessId> {
        self.for_risk(risk_id)
            .iter()
            .copied()
            .filter(|id| self.policies.get(id).is_some_and(Policy::is_active))
            .collect()
    }

    /// Applications held by `holder`, in application order
    pub fn for_holder(&self, holder: &AccountId) -> &[ProcessId] {
        self.by_holder.get(holder).map(Vec::as_slice).unwrap_or(&[])
    }
}

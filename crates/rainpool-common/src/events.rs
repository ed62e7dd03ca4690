//! Lifecycle events
//!
//! Every state change of a bundle, risk, application, or policy is recorded
//! as an [`Event`]. Events are the primary observation mechanism for
//! operators and for tests.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::MatchFailure;
use crate::types::ids::{AccountId, BundleId, ProcessId, RequestId, RiskId, TokenId};
use crate::types::Amount;

/// Lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // Riskpool
    BundleCreated {
        bundle_id: BundleId,
        owner: AccountId,
        token_id: TokenId,
        funding: Amount,
        fee: Amount,
        capital: Amount,
    },
    BundleFunded {
        bundle_id: BundleId,
        amount: Amount,
        fee: Amount,
        capital: Amount,
    },
    BundleDefunded {
        bundle_id: BundleId,
        amount: Amount,
        capital: Amount,
    },
    BundleLocked {
        bundle_id: BundleId,
        expired: bool,
    },
    BundleClosed {
        bundle_id: BundleId,
    },
    BundleBurned {
        bundle_id: BundleId,
        owner: AccountId,
        returned: Amount,
    },
    CapitalCapsSet {
        old_pool_cap: Option<Amount>,
        new_pool_cap: Option<Amount>,
        old_bundle_cap: Option<Amount>,
        new_bundle_cap: Option<Amount>,
    },

    // Risks
    RiskCreated {
        risk_id: RiskId,
        place: String,
        start: i64,
        end: i64,
    },
    RiskAdjusted {
        risk_id: RiskId,
        trigger: u64,
        exit: u64,
        prec_hist: u64,
        prec_days: u32,
    },

    // Applications and premiums
    ApplicationCreated {
        process_id: ProcessId,
        customer: AccountId,
        premium: Amount,
        sum_insured: Amount,
        risk_id: RiskId,
        bundle_id: Option<BundleId>,
    },
    /// Rejected application; no process id is assigned
    BundleMatchFailed {
        customer: AccountId,
        risk_id: RiskId,
        bundle_id: BundleId,
        reason: MatchFailure,
    },
    PolicyUnderwritten {
        process_id: ProcessId,
        bundle_id: BundleId,
        locked: Amount,
    },
    CollateralizationFailed {
        process_id: ProcessId,
        bundle_id: Option<BundleId>,
        required: Amount,
    },
    PremiumCollected {
        process_id: ProcessId,
        payer: AccountId,
        amount: Amount,
        fee: Amount,
        net: Amount,
    },
    PremiumCollectionFailed {
        process_id: ProcessId,
        payer: AccountId,
        amount: Amount,
    },

    // Oracle
    RiskDataRequested {
        request_id: RequestId,
        risk_id: RiskId,
        place: String,
        start: i64,
        end: i64,
    },
    RiskDataRequestCancelled {
        request_id: RequestId,
        risk_id: RiskId,
    },
    RiskDataReceived {
        request_id: RequestId,
        risk_id: RiskId,
        prec_actual: u64,
        prec_days: u32,
    },
    RiskDataRejected {
        request_id: RequestId,
        reason: String,
    },

    // Claims
    ClaimCreated {
        process_id: ProcessId,
        claim_id: u64,
        amount: Amount,
    },
    PayoutCreated {
        process_id: ProcessId,
        payout_id: u64,
        amount: Amount,
        recipient: AccountId,
    },
    PolicyProcessed {
        process_id: ProcessId,
        risk_id: RiskId,
        payout: Amount,
    },
}

impl Event {
    /// Short event name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Event::BundleCreated { .. } => "bundle_created",
            Event::BundleFunded { .. } => "bundle_funded",
            Event::BundleDefunded { .. } => "bundle_defunded",
            Event::BundleLocked { .. } => "bundle_locked",
            Event::BundleClosed { .. } => "bundle_closed",
            Event::BundleBurned { .. } => "bundle_burned",
            Event::CapitalCapsSet { .. } => "capital_caps_set",
            Event::RiskCreated { .. } => "risk_created",
            Event::RiskAdjusted { .. } => "risk_adjusted",
            Event::ApplicationCreated { .. } => "application_created",
            Event::BundleMatchFailed { .. } => "bundle_match_failed",
            Event::PolicyUnderwritten { .. } => "policy_underwritten",
            Event::CollateralizationFailed { .. } => "collateralization_failed",
            Event::PremiumCollected { .. } => "premium_collected",
            Event::PremiumCollectionFailed { .. } => "premium_collection_failed",
            Event::RiskDataRequested { .. } => "risk_data_requested",
            Event::RiskDataRequestCancelled { .. } => "risk_data_request_cancelled",
            Event::RiskDataReceived { .. } => "risk_data_received",
            Event::RiskDataRejected { .. } => "risk_data_rejected",
            Event::ClaimCreated { .. } => "claim_created",
            Event::PayoutCreated { .. } => "payout_created",
            Event::PolicyProcessed { .. } => "policy_processed",
        }
    }
}

/// Recorded event with sequence number and timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique event id
    pub id: Uuid,
    /// Position in the log, starting at 0
    pub seq: u64,
    /// Time of the state change
    pub at: DateTime<Utc>,
    /// The event
    pub event: Event,
}

impl EventRecord {
    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Append-only event log
///
/// Cloning yields another handle to the same log.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    records: Arc<RwLock<Vec<EventRecord>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event
    pub fn emit(&self, at: DateTime<Utc>, event: Event) {
        let mut records = self.records.write();
        let seq = records.len() as u64;
        debug!(seq, event = event.name(), "event");
        records.push(EventRecord {
            id: Uuid::now_v7(),
            seq,
            at,
            event,
        });
    }

    /// Number of recorded events
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// All events in order
    pub fn events(&self) -> Vec<Event> {
        self.records.read().iter().map(|r| r.event.clone()).collect()
    }

    /// Records with `seq >= from`
    pub fn since(&self, from: u64) -> Vec<EventRecord> {
        self.records
            .read()
            .iter()
            .skip(from as usize)
            .cloned()
            .collect()
    }

    /// Most recent event
    pub fn last(&self) -> Option<Event> {
        self.records.read().last().map(|r| r.event.clone())
    }
}

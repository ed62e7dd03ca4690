//! Error types for Rainpool
//!
//! Provides a unified error type and domain-specific error variants

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ids::{AccountId, BundleId, ProcessId, RequestId, RiskId, TokenId};
use crate::types::Amount;

/// Result type alias using RainpoolError
pub type Result<T> = std::result::Result<T, RainpoolError>;

/// Unified error type for Rainpool operations
#[derive(Debug, Error)]
pub enum RainpoolError {
    // Capital ledger errors
    #[error("Ledger error: {0}")]
    Ledger(#[from] crate::types::capital::LedgerError),

    // Bundle errors
    #[error("Bundle error: {0}")]
    Bundle(#[from] BundleError),

    // Risk errors
    #[error("Risk error: {0}")]
    Risk(#[from] RiskError),

    // Application/policy errors
    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    // Oracle errors
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    // Token rail errors
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Account {account} lacks role {role}")]
    Unauthorized { role: String, account: AccountId },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Which capital cap was violated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapScope {
    Pool,
    Bundle,
}

impl std::fmt::Display for CapScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapScope::Pool => write!(f, "pool"),
            CapScope::Bundle => write!(f, "bundle"),
        }
    }
}

/// Rejected bundle filter field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterViolation {
    LifetimeInvalid,
    MinProtectedBalanceInvalid,
    MaxProtectedBalanceInvalid,
    DurationInvalid,
    PlaceMissing,
}

impl std::fmt::Display for FilterViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FilterViolation::LifetimeInvalid => "LIFETIME_INVALID",
            FilterViolation::MinProtectedBalanceInvalid => "MIN_PROTECTED_BALANCE_INVALID",
            FilterViolation::MaxProtectedBalanceInvalid => "MAX_PROTECTED_BALANCE_INVALID",
            FilterViolation::DurationInvalid => "DURATION_INVALID",
            FilterViolation::PlaceMissing => "PLACE_MISSING",
        };
        write!(f, "{}", s)
    }
}

/// Reason a bundle does not accept an application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchFailure {
    BundleNotActive,
    BundleExpired,
    PlaceMismatch,
    SumInsuredTooSmall,
    SumInsuredTooLarge,
    DurationTooShort,
    DurationTooLong,
}

impl std::fmt::Display for MatchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MatchFailure::BundleNotActive => "bundle not active",
            MatchFailure::BundleExpired => "bundle expired",
            MatchFailure::PlaceMismatch => "place mismatch",
            MatchFailure::SumInsuredTooSmall => "sum insured too small",
            MatchFailure::SumInsuredTooLarge => "sum insured too large",
            MatchFailure::DurationTooShort => "policy duration too short",
            MatchFailure::DurationTooLong => "policy duration too long",
        };
        write!(f, "{}", s)
    }
}

/// Bundle lifecycle and registry errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BundleError {
    #[error("Invalid bundle filter: {0}")]
    InvalidFilter(FilterViolation),

    #[error("Bundle name not unique: {0}")]
    NameNotUnique(String),

    #[error("Bundle funding must be positive")]
    InvalidFunding,

    #[error("Bundle not found: {0}")]
    NotFound(BundleId),

    #[error("Account {caller} is not the owner of bundle {bundle_id}")]
    NotOwner { bundle_id: BundleId, caller: AccountId },

    #[error("Bundle {bundle_id} in state {state} does not allow {operation}")]
    InvalidState {
        bundle_id: BundleId,
        state: String,
        operation: String,
    },

    #[error("Bundle {bundle_id} has active policies: locked capital {locked}")]
    WithActivePolicies { bundle_id: BundleId, locked: Amount },

    #[error("Account not allowed for bundle creation: {0}")]
    AccountNotAllowed(AccountId),

    #[error("Active bundle limit reached: {max}")]
    TooManyActiveBundles { max: usize },

    #[error("Bundle token not found: {0}")]
    TokenNotFound(TokenId),

    #[error("Bundle token already burned: {0}")]
    TokenBurned(TokenId),
}

/// Risk definition errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RiskError {
    #[error("Risk already exists: {0}")]
    AlreadyExists(RiskId),

    #[error("Risk not found: {0}")]
    NotFound(RiskId),

    #[error("Risk place is required")]
    PlaceMissing,

    #[error("Trigger too large: {trigger} > {max}")]
    TriggerTooLarge { trigger: u64, max: u64 },

    #[error("Exit {exit} not larger than trigger {trigger}")]
    ExitNotLargerThanTrigger { trigger: u64, exit: u64 },

    #[error("Start date must be in the future")]
    StartDateInvalid,

    #[error("End date must be after start date")]
    EndDateInvalid,

    #[error("Risk duration too short: {duration}s < {min}s")]
    DurationTooShort { duration: i64, min: i64 },

    #[error("Risk duration too long: {duration}s > {max}s")]
    DurationTooLong { duration: i64, max: i64 },

    #[error("Historical precipitation baseline must be positive")]
    HistoricalPrecipitationInvalid,

    #[error("Historical precipitation day count must be positive")]
    HistoricalDaysInvalid,

    #[error("Risk {risk_id} referenced by {policies} policies is not adjustable")]
    WithPoliciesNotAdjustable { risk_id: RiskId, policies: usize },
}

/// Application, policy, and claim errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PolicyError {
    #[error("Application not found: {0}")]
    ApplicationNotFound(ProcessId),

    #[error("Application does not match bundle {bundle_id}: {reason}")]
    BundleMismatch {
        bundle_id: BundleId,
        reason: MatchFailure,
    },

    #[error("Risk {0} has an oracle request, no new applications or underwriting")]
    RiskClosedForApplications(RiskId),

    #[error("Application {0} is not underwritten")]
    NotUnderwritten(ProcessId),

    #[error("Application {process_id} in state {state} cannot be underwritten")]
    InvalidApplicationState { process_id: ProcessId, state: String },

    #[error("Policy already processed: {0}")]
    AlreadyProcessed(ProcessId),

    #[error("Premium {amount} exceeds remaining expected premium {remaining}")]
    PremiumExceedsExpected { amount: Amount, remaining: Amount },

    #[error("Sum insured must be positive")]
    InvalidSumInsured,

    #[error("No policies for holder {0}")]
    NoPolicies(AccountId),

    #[error("Policy index {index} out of range ({count} available)")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("Oracle response missing for risk {0}")]
    OracleResponseMissing(RiskId),
}

/// Oracle request coordination errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OracleError {
    #[error("Oracle already triggered and responded for risk {0}")]
    AlreadyTriggered(RiskId),

    #[error("No pending oracle request for risk {0}")]
    NotTriggered(RiskId),

    #[error("Unknown oracle request: {0}")]
    UnknownRequest(RequestId),

    #[error("Oracle transport error: {0}")]
    Transport(String),
}

/// Token rail errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransferError {
    #[error("Transfer of {amount} from {from} to {to} failed: {reason}")]
    TransferFailed {
        from: AccountId,
        to: AccountId,
        amount: Amount,
        reason: String,
    },

    #[error("Insufficient allowance: required {required}, allowance {allowance}")]
    InsufficientAllowance { required: Amount, allowance: Amount },

    #[error("Payout allowance too small: required {required}, allowance {allowance}")]
    PayoutAllowanceTooSmall { required: Amount, allowance: Amount },
}

// Implement From for common external error types
impl From<serde_json::Error> for RainpoolError {
    fn from(err: serde_json::Error) -> Self {
        RainpoolError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for RainpoolError {
    fn from(err: anyhow::Error) -> Self {
        RainpoolError::Internal(err.to_string())
    }
}

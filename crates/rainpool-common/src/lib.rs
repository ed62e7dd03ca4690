//! # Rainpool Common
//!
//! Shared types, errors, lifecycle events, and collaborator ports for the
//! Rainpool parametric rain insurance engine.
//!
//! ## Core Types
//!
//! - [`RiskId`], [`BundleId`], [`ProcessId`], [`RequestId`]: entity identifiers
//! - [`CapitalAccount`]: per-bundle capital, locked capital, and balance
//! - [`FeeSpec`]: fixed + fractional fee schedule
//! - [`Event`]/[`EventLog`]: lifecycle events observed by operators and tests
//!
//! ## Ports
//!
//! - [`ports::token`]: token transfer rail with allowances
//! - [`ports::access`]: role checks
//! - [`ports::bundle_token`]: bundle ownership token
//! - [`ports::oracle`]: external rainfall data transport
//! - [`ports::clock`]: wall clock abstraction

pub mod error;
pub mod events;
pub mod ports;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{
    BundleError, CapScope, FilterViolation, MatchFailure, OracleError, PolicyError,
    RainpoolError, Result, RiskError, TransferError,
};
pub use events::{Event, EventLog, EventRecord};
pub use ports::{Ports, Wallets};
pub use types::{
    capital::{CapitalAccount, LedgerError},
    fees::FeeSpec,
    ids::{AccountId, BundleId, ProcessId, RequestId, RiskId, TokenId},
    Amount,
};

/// Rainpool version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fixed-point scale for percentages (trigger, exit, payout percentage)
pub const PERCENTAGE_MULTIPLIER: u64 = 1_000_000;

/// Fixed-point scale for precipitation values (hundredths of a unit)
pub const PRECIPITATION_MULTIPLIER: u64 = 100;

/// Fixed-point scale for latitude/longitude
pub const COORDINATES_MULTIPLIER: i64 = 1_000_000;

/// Seconds in one day
pub const SECONDS_PER_DAY: i64 = 24 * 3600;

/// Place value matching every risk place in a bundle filter
pub const WILDCARD_PLACE: &str = "*";

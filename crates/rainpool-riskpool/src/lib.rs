//! # Rainpool Riskpool
//!
//! Capital side of the insurance engine.
//!
//! ## Components
//!
//! - [`CapitalLedger`]: per-bundle and pool-wide capital, locked capital,
//!   and balance, with pool and bundle capital caps
//! - [`BundleRegistry`]: bundle creation, funding, matching filters, and the
//!   `Active -> Locked -> Closed -> Burned` lifecycle
//!
//! ## Flow
//!
//! ```text
//! investor --create/fund--> BundleRegistry --credit--> CapitalLedger
//!                                |                         ^
//!                                | match                   | reserve/release
//!                                v                         |
//!                       application (product) -------------+
//! ```

pub mod bundle;
pub mod ledger;
pub mod registry;
pub mod settings;

pub use bundle::{Bundle, BundleFilter, BundleInfo, BundleSpec, BundleState};
pub use ledger::{CapitalCaps, CapitalLedger, PoolTotals};
pub use registry::BundleRegistry;
pub use settings::RiskpoolSettings;

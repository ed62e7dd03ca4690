//! # Rainpool Product
//!
//! The rain insurance product: risks, applications and policies, premium
//! collection, oracle coordination, payout calculation and claim processing.
//!
//! ## Policy lifecycle
//!
//! ```text
//! apply_for_policy ──► Applied ──(collateral locked)──► Underwritten / Active
//!                        │  ▲                                 │
//!                        └──┘ underwrite (retry)              │ premium collection
//!                                                             ▼
//! trigger_oracle ──► fulfill ──► process_policy ──► claim + payout ──► Closed
//! ```
//!
//! [`RainProduct`] is single-threaded; wrap it in [`SharedProduct`] to share
//! it across tasks.

pub mod claims;
pub mod oracle;
pub mod payout;
pub mod policy;
pub mod premium;
pub mod product;
pub mod risk;
pub mod settings;
pub mod shared;
pub mod underwriting;

pub use claims::{BatchOrder, Settlement};
pub use oracle::{OracleCoordinator, OracleRequest, Rejection, RequestState};
pub use payout::{
    index_ratio, payout_amount, payout_percentage, PayoutCurve, Precipitation, RainfallIndex,
    Thresholds,
};
pub use policy::{
    ApplicationState, Claim, ClaimState, Payout, PayoutState, Policy, PolicyBook, PolicyState,
};
pub use premium::{PremiumLedger, PremiumReceipt, PremiumSplit};
pub use product::RainProduct;
pub use risk::{OracleStatus, Risk, RiskAdjustment, RiskRegistry, RiskSpec};
pub use settings::ProductSettings;
pub use shared::SharedProduct;
pub use underwriting::{ApplicationReceipt, ApplicationRequest, UnderwritingOutcome};

//! Collaborator ports
//!
//! Narrow interfaces to the systems the engine does not own: the token
//! rail, role checks, bundle ownership tokens, the oracle network, and the
//! clock. Each port ships with an in-memory implementation used by the
//! node and by tests.

pub mod access;
pub mod bundle_token;
pub mod clock;
pub mod oracle;
pub mod token;

pub use access::{AccessControl, InMemoryAccessControl, Role};
pub use bundle_token::{BundleToken, InMemoryBundleToken};
pub use clock::{Clock, ManualClock, SystemClock};
pub use oracle::{OracleTransport, QueuedOracleTransport, RiskDataRequest};
pub use token::{InMemoryToken, TokenRail};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::types::ids::AccountId;

/// Handles to every external collaborator
#[derive(Clone)]
pub struct Ports {
    pub token: Arc<dyn TokenRail>,
    pub access: Arc<dyn AccessControl>,
    pub bundle_token: Arc<dyn BundleToken>,
    pub oracle: Arc<dyn OracleTransport>,
    pub clock: Arc<dyn Clock>,
}

/// Accounts that hold or route funds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallets {
    /// Spender that executes every pull transfer
    pub treasury: AccountId,
    /// Holds bundle capital and net premiums
    pub riskpool_wallet: AccountId,
    /// Receives capital and premium fees
    pub instance_wallet: AccountId,
}

impl Default for Wallets {
    fn default() -> Self {
        Self {
            treasury: AccountId::from("treasury"),
            riskpool_wallet: AccountId::from("riskpool-wallet"),
            instance_wallet: AccountId::from("instance-wallet"),
        }
    }
}

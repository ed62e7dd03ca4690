//! Entity identifiers
//!
//! Every cross-entity reference is stored as one of these ids, never as a
//! pointer. Bundles, applications, and oracle requests use sequential
//! integers; risks are content-addressed by place and time window.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Bundle identifier (sequential, starting at 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BundleId(pub u64);

/// Application/policy process identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProcessId(pub u64);

/// External oracle request identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

/// Bundle ownership token identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenId(pub u64);

/// Account (wallet) identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub String);

/// Risk identifier: blake3 digest of place, start, and end
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RiskId(pub [u8; 32]);

impl RiskId {
    /// Derive the deterministic id of a risk definition
    pub fn derive(place: &str, start: i64, end: i64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(place.as_bytes());
        hasher.update(b"|");
        hasher.update(&start.to_be_bytes());
        hasher.update(b"|");
        hasher.update(&end.to_be_bytes());
        RiskId(*hasher.finalize().as_bytes())
    }

    /// Hex representation
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(RiskId(arr))
    }
}

impl fmt::Display for RiskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", &self.to_hex()[..16])
    }
}

impl AccountId {
    pub fn new(name: impl Into<String>) -> Self {
        AccountId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        AccountId(s.to_string())
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! numeric_id_display {
    ($($ty:ident => $prefix:literal),* $(,)?) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, concat!($prefix, "{}"), self.0)
                }
            }
        )*
    };
}

numeric_id_display! {
    BundleId => "bundle#",
    ProcessId => "process#",
    RequestId => "request#",
    TokenId => "token#",
}

//! Role-based access checks

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::RainpoolError;
use crate::types::ids::AccountId;

/// Actor roles recognised by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Operates the instance and receives fees
    InstanceOperator,
    /// Manages riskpool caps and the bundle allow-list
    RiskpoolKeeper,
    /// Provides capital through bundles
    Investor,
    /// Creates risks, triggers the oracle, and processes claims
    Insurer,
    /// Delivers oracle responses
    OracleProvider,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::InstanceOperator => "instance_operator",
            Role::RiskpoolKeeper => "riskpool_keeper",
            Role::Investor => "investor",
            Role::Insurer => "insurer",
            Role::OracleProvider => "oracle_provider",
        };
        write!(f, "{}", s)
    }
}

/// Role membership check
pub trait AccessControl: Send + Sync {
    fn has_role(&self, role: Role, account: &AccountId) -> bool;

    /// Fail with `Unauthorized` unless `account` holds `role`
    fn require(&self, role: Role, account: &AccountId) -> Result<(), RainpoolError> {
        if self.has_role(role, account) {
            Ok(())
        } else {
            Err(RainpoolError::Unauthorized {
                role: role.to_string(),
                account: account.clone(),
            })
        }
    }
}

/// In-memory role table
#[derive(Debug, Default)]
pub struct InMemoryAccessControl {
    grants: RwLock<HashSet<(Role, AccountId)>>,
}

impl InMemoryAccessControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, role: Role, account: &AccountId) {
        self.grants.write().insert((role, account.clone()));
    }

    pub fn revoke(&self, role: Role, account: &AccountId) {
        self.grants.write().remove(&(role, account.clone()));
    }
}

impl AccessControl for InMemoryAccessControl {
    fn has_role(&self, role: Role, account: &AccountId) -> bool {
        self.grants.read().contains(&(role, account.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_revoke() {
        let access = InMemoryAccessControl::new();
        let insurer = AccountId::from("insurer");

        assert!(!access.has_role(Role::Insurer, &insurer));
        access.grant(Role::Insurer, &insurer);
        assert!(access.has_role(Role::Insurer, &insurer));
        assert!(!access.has_role(Role::Investor, &insurer));

        access.revoke(Role::Insurer, &insurer);
        assert!(access.require(Role::Insurer, &insurer).is_err());
    }
}

//! Bundle ownership token
//!
//! One non-fungible token per bundle. Ownership decides who may fund,
//! defund, close, and burn the bundle and who receives funds at burn time.

use parking_lot::Mutex;
use std::collections::BTreeMap;

use crate::error::BundleError;
use crate::types::ids::{AccountId, BundleId, TokenId};

/// Ownership token registry
pub trait BundleToken: Send + Sync {
    /// Mint a token for `bundle_id` to `owner`
    fn mint(&self, owner: &AccountId, bundle_id: BundleId) -> TokenId;

    /// Burn a token
    fn burn(&self, token_id: TokenId) -> Result<(), BundleError>;

    /// Current owner of a live token
    fn owner_of(&self, token_id: TokenId) -> Result<AccountId, BundleError>;

    /// Whether the token was ever minted
    fn exists(&self, token_id: TokenId) -> bool;

    /// Whether the token has been burned
    fn burned(&self, token_id: TokenId) -> bool;
}

#[derive(Debug, Clone)]
struct TokenEntry {
    owner: AccountId,
    bundle_id: BundleId,
    burned: bool,
}

#[derive(Debug, Default)]
struct Inner {
    last_id: u64,
    tokens: BTreeMap<TokenId, TokenEntry>,
}

/// In-memory ownership token registry; ids start at 1
#[derive(Debug, Default)]
pub struct InMemoryBundleToken {
    inner: Mutex<Inner>,
}

impl InMemoryBundleToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bundle a token was minted for
    pub fn bundle_of(&self, token_id: TokenId) -> Option<BundleId> {
        self.inner.lock().tokens.get(&token_id).map(|t| t.bundle_id)
    }

    /// Number of minted tokens, burned included
    pub fn total_minted(&self) -> usize {
        self.inner.lock().tokens.len()
    }
}

impl BundleToken for InMemoryBundleToken {
    fn mint(&self, owner: &AccountId, bundle_id: BundleId) -> TokenId {
        let mut inner = self.inner.lock();
        inner.last_id += 1;
        let token_id = TokenId(inner.last_id);
        inner.tokens.insert(
            token_id,
            TokenEntry {
                owner: owner.clone(),
                bundle_id,
                burned: false,
            },
        );
        token_id
    }

    fn burn(&self, token_id: TokenId) -> Result<(), BundleError> {
        let mut inner = self.inner.lock();
        let entry = inner
            .tokens
            .get_mut(&token_id)
            .ok_or(BundleError::TokenNotFound(token_id))?;
        if entry.burned {
            return Err(BundleError::TokenBurned(token_id));
        }
        entry.burned = true;
        Ok(())
    }

    fn owner_of(&self, token_id: TokenId) -> Result<AccountId, BundleError> {
        let inner = self.inner.lock();
        let entry = inner
            .tokens
            .get(&token_id)
            .ok_or(BundleError::TokenNotFound(token_id))?;
        if entry.burned {
            return Err(BundleError::TokenBurned(token_id));
        }
        Ok(entry.owner.clone())
    }

    fn exists(&self, token_id: TokenId) -> bool {
        self.inner.lock().tokens.contains_key(&token_id)
    }

    fn burned(&self, token_id: TokenId) -> bool {
        self.inner
            .lock()
            .tokens
            .get(&token_id)
            .map(|t| t.burned)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_burn() {
        let tokens = InMemoryBundleToken::new();
        let owner = AccountId::from("investor");

        let id = tokens.mint(&owner, BundleId(1));
        assert_eq!(id, TokenId(1));
        assert_eq!(tokens.owner_of(id).unwrap(), owner);
        assert_eq!(tokens.bundle_of(id), Some(BundleId(1)));

        tokens.burn(id).unwrap();
        assert!(tokens.exists(id));
        assert!(tokens.burned(id));
        assert_eq!(tokens.owner_of(id), Err(BundleError::TokenBurned(id)));
        assert_eq!(tokens.burn(id), Err(BundleError::TokenBurned(id)));
    }

    #[test]
    fn test_unknown_token() {
        let tokens = InMemoryBundleToken::new();
        assert_eq!(tokens.owner_of(TokenId(9)), Err(BundleError::TokenNotFound(TokenId(9))));
        assert!(!tokens.exists(TokenId(9)));
    }
}

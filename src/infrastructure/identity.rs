use crate::domain::identity::Identity;
use crate::domain::ports::IdentityProvider;
use crate::error::{CartError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Bearer tokens registered up front, mapped to identities.
///
/// With `trust_unknown` set, any other non-empty token is taken as the
/// shopper identity itself, which is how the replay tool authenticates rows.
#[derive(Default, Clone)]
pub struct StaticIdentityProvider {
    tokens: Arc<RwLock<HashMap<String, Identity>>>,
    trust_unknown: bool,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trusting() -> Self {
        Self {
            trust_unknown: true,
            ..Self::default()
        }
    }

    pub async fn register(&self, token: impl Into<String>, identity: Identity) {
        let mut tokens = self.tokens.write().await;
        tokens.insert(token.into(), identity);
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn authenticate(&self, credential: &str) -> Result<Identity> {
        let token = credential
            .strip_prefix("Bearer ")
            .unwrap_or(credential)
            .trim();
        if token.is_empty() {
            return Err(CartError::Unauthenticated);
        }

        let tokens = self.tokens.read().await;
        if let Some(identity) = tokens.get(token) {
            return Ok(identity.clone());
        }
        if self.trust_unknown {
            return Ok(Identity::shopper(token));
        }
        Err(CartError::Unauthenticated)
    }
}

//! Caller identity.
//!
//! Identity is issued outside this service. Handlers only see the resolved
//! [`Identity`] (user ID and role) for a bearer token.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use mercado_core::{Role, UserId};

use crate::models::Identity;

/// Resolves bearer tokens to identities.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The identity for `token`, or `None` if the token is not recognised.
    async fn authenticate(&self, token: &str) -> Option<Identity>;
}

/// Errors parsing a static token list.
#[derive(Debug, Error)]
pub enum IdentityConfigError {
    #[error("token entry must be `token:user-id:role` (entry {0})")]
    Malformed(usize),
    #[error("invalid user id in token entry {0}")]
    InvalidUser(usize),
    #[error("invalid role in token entry {0}: {1}")]
    InvalidRole(usize, String),
}

/// Fixed token table, loaded from configuration.
#[derive(Default)]
pub struct StaticTokenIdentity {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenIdentity {
    /// Build from `(token, identity)` pairs.
    pub fn new(tokens: impl IntoIterator<Item = (String, Identity)>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }

    /// Parse a comma-separated `token:user-id:role` list.
    ///
    /// Entries are numbered from 1 in errors so the token itself never appears
    /// in logs.
    ///
    /// # Errors
    ///
    /// Returns `IdentityConfigError` for the first malformed entry.
    pub fn parse(list: &str) -> Result<Self, IdentityConfigError> {
        let mut tokens = HashMap::new();

        for (index, entry) in list
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .enumerate()
        {
            let position = index + 1;
            let mut parts = entry.splitn(3, ':');
            let (Some(token), Some(user), Some(role)) = (parts.next(), parts.next(), parts.next())
            else {
                return Err(IdentityConfigError::Malformed(position));
            };
            if token.is_empty() {
                return Err(IdentityConfigError::Malformed(position));
            }

            let user_id = user
                .parse::<UserId>()
                .map_err(|_| IdentityConfigError::InvalidUser(position))?;
            let role = role
                .parse::<Role>()
                .map_err(|e| IdentityConfigError::InvalidRole(position, e))?;

            tokens.insert(token.to_string(), Identity { user_id, role });
        }

        Ok(Self { tokens })
    }

    /// Number of configured tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no tokens are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl std::fmt::Debug for StaticTokenIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenIdentity")
            .field("tokens", &format_args!("[{} REDACTED]", self.tokens.len()))
            .finish()
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenIdentity {
    async fn authenticate(&self, token: &str) -> Option<Identity> {
        self.tokens.get(token).copied()
    }
}

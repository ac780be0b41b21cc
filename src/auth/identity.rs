//! Caller identity resolution
//!
//! Requests carrying an `auth-token` header are resolved to an [`Identity`]
//! before dispatch. The lookup itself sits behind [`IdentityProvider`]: a
//! static token table for local deployments and tests, and (with the
//! `remote-auth` feature) an HTTP call to an external identity service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Header carrying the caller's token
pub const AUTH_TOKEN_HEADER: &str = "auth-token";

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Role name; absent means `public`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Identity {
    pub fn new(username: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: None,
            role: Some(role.into()),
        }
    }
}

/// Token resolution errors
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid authentication token")]
    InvalidToken,

    #[error("User auth response is invalid: {0}")]
    InvalidResponse(String),

    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Resolves a bearer token to the caller's identity
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Identity, IdentityError>;
}

/// Fixed token table
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    tokens: HashMap<String, Identity>,
}

impl StaticIdentityProvider {
    pub fn new(tokens: HashMap<String, Identity>) -> Self {
        Self { tokens }
    }

    pub fn with_token(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn resolve(&self, token: &str) -> Result<Identity, IdentityError> {
        if token.is_empty() {
            return Err(IdentityError::InvalidToken);
        }
        self.tokens
            .get(token)
            .cloned()
            .ok_or(IdentityError::InvalidToken)
    }
}

/// Identity service reached over HTTP (`GET <auth_url>/_api/auth/me`)
#[cfg(feature = "remote-auth")]
pub struct RemoteIdentityProvider {
    client: reqwest::Client,
    endpoint: String,
}

#[cfg(feature = "remote-auth")]
impl RemoteIdentityProvider {
    pub fn new(auth_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/_api/auth/me", auth_url.trim_end_matches('/')),
        }
    }
}

#[cfg(feature = "remote-auth")]
#[async_trait]
impl IdentityProvider for RemoteIdentityProvider {
    async fn resolve(&self, token: &str) -> Result<Identity, IdentityError> {
        if token.is_empty() {
            return Err(IdentityError::InvalidToken);
        }

        let response = self
            .client
            .get(&self.endpoint)
            .header(AUTH_TOKEN_HEADER, token)
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            tracing::debug!("Identity service rejected token: {}", response.status());
            return Err(IdentityError::InvalidToken);
        }

        response
            .json::<Identity>()
            .await
            .map_err(|e| IdentityError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_provider_resolves_known_tokens() {
        let provider =
            StaticIdentityProvider::default().with_token("t-admin", Identity::new("root", "admin"));

        let identity = provider.resolve("t-admin").await.unwrap();
        assert_eq!(identity.username, "root");
        assert_eq!(identity.role.as_deref(), Some("admin"));

        assert!(matches!(
            provider.resolve("nope").await,
            Err(IdentityError::InvalidToken)
        ));
        assert!(matches!(
            provider.resolve("").await,
            Err(IdentityError::InvalidToken)
        ));
    }

    #[test]
    fn test_identity_role_is_optional() {
        let identity: Identity = serde_json::from_str(r#"{"username":"guest"}"#).unwrap();
        assert_eq!(identity.role, None);
    }
}

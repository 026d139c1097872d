//! Tenant-scoped credential lookup.
//!
//! Credential storage is owned by an external vault. Adapters only need to
//! fetch decrypted credential data by `(credential id, tenant id)`; the
//! engine itself never touches credentials.

use crate::error::CredentialError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use switchyard_core::{CredentialId, TenantId};
use tokio::sync::RwLock;

/// The type of credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    /// OAuth 2.0 access token.
    Oauth2,
    /// API key sent in a header.
    ApiKey,
    /// Username and password.
    BasicAuth,
    /// Bearer token.
    BearerToken,
}

/// Decrypted credential data handed to adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialData {
    /// OAuth 2.0 access token.
    Oauth2 {
        access_token: String,
        token_type: String,
        expires_at: Option<DateTime<Utc>>,
    },
    /// API key.
    ApiKey {
        key: String,
        header_name: Option<String>,
    },
    /// Basic authentication.
    BasicAuth { username: String, password: String },
    /// Bearer token.
    BearerToken { token: String },
}

impl CredentialData {
    /// Creates OAuth2 credential data with no expiry.
    #[must_use]
    pub fn oauth2(access_token: impl Into<String>) -> Self {
        Self::Oauth2 {
            access_token: access_token.into(),
            token_type: "Bearer".to_string(),
            expires_at: None,
        }
    }

    /// Creates API key credential data sent in `X-API-Key`.
    #[must_use]
    pub fn api_key(key: impl Into<String>) -> Self {
        Self::ApiKey {
            key: key.into(),
            header_name: None,
        }
    }

    /// Creates basic auth credential data.
    #[must_use]
    pub fn basic_auth(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::BasicAuth {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Creates bearer token credential data.
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::BearerToken {
            token: token.into(),
        }
    }

    /// Returns the credential type.
    #[must_use]
    pub fn credential_type(&self) -> CredentialType {
        match self {
            Self::Oauth2 { .. } => CredentialType::Oauth2,
            Self::ApiKey { .. } => CredentialType::ApiKey,
            Self::BasicAuth { .. } => CredentialType::BasicAuth,
            Self::BearerToken { .. } => CredentialType::BearerToken,
        }
    }

    /// Returns true if an OAuth2 token has passed its expiry.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        matches!(
            self,
            Self::Oauth2 {
                expires_at: Some(expires),
                ..
            } if *expires <= Utc::now()
        )
    }
}

/// Capability for fetching credential data on behalf of a tenant.
#[async_trait]
pub trait CredentialLookup: Send + Sync {
    /// Fetches decrypted credential data.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the credential does not exist for this tenant.
    async fn lookup(
        &self,
        id: CredentialId,
        tenant_id: TenantId,
    ) -> Result<CredentialData, Report<CredentialError>>;
}

/// An in-memory credential store keyed by `(credential id, tenant id)`.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    credentials: RwLock<HashMap<(CredentialId, TenantId), CredentialData>>,
}

impl InMemoryCredentialStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores credential data for a tenant, replacing any previous value.
    pub async fn insert(&self, id: CredentialId, tenant_id: TenantId, data: CredentialData) {
        self.credentials.write().await.insert((id, tenant_id), data);
    }

    /// Removes a credential.
    pub async fn remove(&self, id: CredentialId, tenant_id: TenantId) -> Option<CredentialData> {
        self.credentials.write().await.remove(&(id, tenant_id))
    }
}

#[async_trait]
impl CredentialLookup for InMemoryCredentialStore {
    async fn lookup(
        &self,
        id: CredentialId,
        tenant_id: TenantId,
    ) -> Result<CredentialData, Report<CredentialError>> {
        self.credentials
            .read()
            .await
            .get(&(id, tenant_id))
            .cloned()
            .ok_or_else(|| CredentialError::NotFound { id, tenant_id }.into())
    }
}

//! ARM Authentication
//!
//! Bearer tokens come either from a pre-issued access token or from the
//! OAuth2 client-credentials flow against Microsoft Entra ID. Tokens are
//! cached and refreshed shortly before they expire.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Default authority for the client-credentials flow
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Token expiry buffer - refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// TTL assumed for static tokens, whose expiry we cannot see
const STATIC_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Where tokens come from
#[derive(Debug, Clone)]
pub enum TokenSource {
    /// A pre-issued bearer token (e.g. `az account get-access-token`)
    Static(String),
    /// Service principal with a client secret
    ClientSecret {
        authority: String,
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
}

/// ARM credentials holder with token caching
#[derive(Clone)]
pub struct ArmCredentials {
    source: Arc<TokenSource>,
    scope: String,
    http: reqwest::Client,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl ArmCredentials {
    pub fn new(source: TokenSource, resource_endpoint: &str) -> Self {
        Self {
            source: Arc::new(source),
            scope: format!("{}/.default", resource_endpoint.trim_end_matches('/')),
            http: reqwest::Client::new(),
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Credentials that always hand out the same token
    pub fn from_static(token: impl Into<String>) -> Self {
        Self::new(TokenSource::Static(token.into()), super::client::DEFAULT_ENDPOINT)
    }

    /// Read credentials from `ARM_ACCESS_TOKEN`, or from `ARM_TENANT_ID`,
    /// `ARM_CLIENT_ID` and `ARM_CLIENT_SECRET`
    pub fn from_env(resource_endpoint: &str) -> Result<Self> {
        if let Ok(token) = std::env::var("ARM_ACCESS_TOKEN") {
            if !token.is_empty() {
                return Ok(Self::new(TokenSource::Static(token), resource_endpoint));
            }
        }

        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::Auth(format!("{} is not set", name)))
        };

        let source = TokenSource::ClientSecret {
            authority: std::env::var("ARM_AUTHORITY").unwrap_or_else(|_| DEFAULT_AUTHORITY.to_string()),
            tenant_id: var("ARM_TENANT_ID")?,
            client_id: var("ARM_CLIENT_ID")?,
            client_secret: var("ARM_CLIENT_SECRET")?,
        };

        Ok(Self::new(source, resource_endpoint))
    }

    /// Get an access token for API calls
    pub async fn get_token(&self) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let (token, ttl) = match self.source.as_ref() {
            TokenSource::Static(token) => (token.clone(), STATIC_TOKEN_TTL),
            TokenSource::ClientSecret {
                authority,
                tenant_id,
                client_id,
                client_secret,
            } => {
                self.client_credentials(authority, tenant_id, client_id, client_secret)
                    .await?
            }
        };

        let now = Instant::now();
        // `expires_in` comes from the token endpoint and may be absurdly large
        let expires_at = now
            .checked_add(ttl.saturating_sub(TOKEN_EXPIRY_BUFFER))
            .unwrap_or(now + STATIC_TOKEN_TTL);
        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token.clone(),
                expires_at,
            });
        }

        tracing::debug!(
            "New token cached, expires in ~{} minutes",
            ttl.saturating_sub(TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(token)
    }

    /// Force refresh the token
    pub async fn refresh_token(&self) -> Result<String> {
        {
            let mut cache = self.token_cache.write().await;
            *cache = None;
        }
        self.get_token().await
    }

    async fn client_credentials(
        &self,
        authority: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<(String, Duration)> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            authority.trim_end_matches('/'),
            tenant_id
        );
        tracing::debug!("Requesting token from {}", url);

        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("scope", self.scope.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Auth(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            // Security: never log the token endpoint's response body
            return Err(Error::Auth(format!("token endpoint returned {}", status)));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("invalid token response: {}", e)))?;

        let ttl = body
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(STATIC_TOKEN_TTL);

        Ok((body.access_token, ttl))
    }
}

/// Validate an Azure subscription ID (a GUID: 8-4-4-4-12 hex digits)
pub fn validate_subscription_id(subscription_id: &str) -> bool {
    let groups: Vec<&str> = subscription_id.split('-').collect();
    let expected = [8, 4, 4, 4, 12];

    groups.len() == expected.len()
        && groups
            .iter()
            .zip(expected)
            .all(|(group, len)| group.len() == len && group.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Read the default subscription from the environment
/// Security: Validates the subscription ID format before returning
pub fn get_default_subscription() -> Option<String> {
    for var in ["ARM_SUBSCRIPTION_ID", "AZURE_SUBSCRIPTION_ID"] {
        if let Ok(subscription) = std::env::var(var) {
            if validate_subscription_id(&subscription) {
                return Some(subscription);
            }
            tracing::warn!("Invalid subscription ID format in {}", var);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_subscription_id() {
        assert!(validate_subscription_id("12345678-1234-9876-4563-123456789012"));
        assert!(validate_subscription_id("abcdef01-ABCD-9876-4563-123456789012"));
        assert!(!validate_subscription_id(""));
        assert!(!validate_subscription_id("12345678-1234-9876-4563"));
        assert!(!validate_subscription_id("1234567-81234-9876-4563-123456789012"));
        assert!(!validate_subscription_id("1234567g-1234-9876-4563-123456789012"));
    }

    #[tokio::test]
    async fn test_static_token_is_cached() {
        let credentials = ArmCredentials::from_static("token-1");
        assert_eq!(credentials.get_token().await.unwrap(), "token-1");
        assert_eq!(credentials.refresh_token().await.unwrap(), "token-1");
    }
}

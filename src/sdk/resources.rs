//! Resource provider registration client

use crate::arm::ArmClient;
use crate::error::Result;
use crate::resource_id;
use crate::resourceid::ResourceId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const API_VERSION: &str = "2016-02-01";

pub const REGISTERED: &str = "Registered";
pub const REGISTERING: &str = "Registering";
pub const UNREGISTERED: &str = "Unregistered";
pub const UNREGISTERING: &str = "Unregistering";

resource_id! {
    /// A resource provider namespace within a subscription
    pub struct ResourceProviderId("Resource Provider") {
        "subscriptions" => subscription_id,
        "providers" => resource_provider,
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_state: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Provider {
    pub fn state(&self) -> &str {
        self.registration_state.as_deref().unwrap_or(UNREGISTERED)
    }

    pub fn is_registered(&self) -> bool {
        self.state().eq_ignore_ascii_case(REGISTERED)
    }
}

/// Client for `/subscriptions/{id}/providers`
pub struct ProvidersClient<'a> {
    client: &'a ArmClient,
}

impl<'a> ProvidersClient<'a> {
    pub fn new(client: &'a ArmClient) -> Self {
        Self { client }
    }

    pub async fn get(&self, id: &ResourceProviderId) -> Result<Provider> {
        self.client.get(&id.to_url_path(), API_VERSION).await?.json()
    }

    /// Every provider namespace visible to the subscription
    pub async fn list(&self, subscription_id: &str) -> Result<Vec<Provider>> {
        let path = format!("/subscriptions/{}/providers", urlencoding::encode(subscription_id));
        self.client.list_all(&path, API_VERSION).await
    }

    pub async fn register(&self, id: &ResourceProviderId) -> Result<Provider> {
        tracing::info!("Registering resource provider {}", id.resource_provider);
        let path = format!("{}/register", id.to_url_path());
        self.client.post(&path, API_VERSION, None).await?.json()
    }

    pub async fn unregister(&self, id: &ResourceProviderId) -> Result<Provider> {
        tracing::info!("Unregistering resource provider {}", id.resource_provider);
        let path = format!("{}/unregister", id.to_url_path());
        self.client.post(&path, API_VERSION, None).await?.json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_id() {
        let id = ResourceProviderId::parse("/subscriptions/sub/providers/Microsoft.Devices").unwrap();
        assert_eq!(id.resource_provider, "Microsoft.Devices");
        assert!(ResourceProviderId::parse("/subscriptions/sub/providers/Microsoft.Devices/extra").is_err());
        assert!(ResourceProviderId::parse("/subscriptions/sub/Providers/Microsoft.Devices").is_err());
    }

    #[test]
    fn test_missing_state_is_unregistered() {
        let provider = Provider::default();
        assert_eq!(provider.state(), UNREGISTERED);
        assert!(!provider.is_registered());
    }
}

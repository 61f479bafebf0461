//! Preview feature registration client (`Microsoft.Features`)

use super::resources::ResourceProviderId;
use crate::arm::ArmClient;
use crate::error::Result;
use crate::resource_id;
use crate::resourceid::ResourceId;
use serde::{Deserialize, Serialize};

pub const API_VERSION: &str = "2015-12-01";

resource_id! {
    /// A preview feature of a resource provider
    pub struct FeatureId("Feature") {
        "subscriptions" => subscription_id,
        "providers" = "Microsoft.Features",
        "providers" => provider_namespace,
        "features" => name,
    }
}

impl FeatureId {
    pub fn provider(&self) -> ResourceProviderId {
        ResourceProviderId::new(&self.subscription_id, &self.provider_namespace)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureResult {
    /// `{namespace}/{feature}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<FeatureProperties>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl FeatureResult {
    pub fn state(&self) -> &str {
        self.properties
            .as_ref()
            .and_then(|p| p.state.as_deref())
            .unwrap_or("NotRegistered")
    }

    /// Feature name without the namespace prefix
    pub fn short_name(&self) -> Option<&str> {
        let name = self.name.as_deref()?;
        Some(name.rsplit_once('/').map_or(name, |(_, short)| short))
    }
}

/// Client for `Microsoft.Features`
pub struct FeaturesClient<'a> {
    client: &'a ArmClient,
}

impl<'a> FeaturesClient<'a> {
    pub fn new(client: &'a ArmClient) -> Self {
        Self { client }
    }

    pub async fn get(&self, id: &FeatureId) -> Result<FeatureResult> {
        self.client.get(&id.to_url_path(), API_VERSION).await?.json()
    }

    /// Features of one provider namespace
    pub async fn list(&self, provider: &ResourceProviderId) -> Result<Vec<FeatureResult>> {
        let path = format!(
            "/subscriptions/{}/providers/Microsoft.Features/providers/{}/features",
            urlencoding::encode(&provider.subscription_id),
            urlencoding::encode(&provider.resource_provider)
        );
        self.client.list_all(&path, API_VERSION).await
    }

    /// Features of every namespace in the subscription
    pub async fn list_all(&self, subscription_id: &str) -> Result<Vec<FeatureResult>> {
        let path = format!(
            "/subscriptions/{}/providers/Microsoft.Features/features",
            urlencoding::encode(subscription_id)
        );
        self.client.list_all(&path, API_VERSION).await
    }

    pub async fn register(&self, id: &FeatureId) -> Result<FeatureResult> {
        tracing::info!("Registering feature {}/{}", id.provider_namespace, id.name);
        let path = format!("{}/register", id.to_url_path());
        self.client.post(&path, API_VERSION, None).await?.json()
    }

    pub async fn unregister(&self, id: &FeatureId) -> Result<FeatureResult> {
        tracing::info!("Unregistering feature {}/{}", id.provider_namespace, id.name);
        let path = format!("{}/unregister", id.to_url_path());
        self.client.post(&path, API_VERSION, None).await?.json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_id_has_two_provider_segments() {
        let input = "/subscriptions/sub/providers/Microsoft.Features/providers/Microsoft.Devices/features/preview1";
        let id = FeatureId::parse(input).unwrap();
        assert_eq!(id.provider_namespace, "Microsoft.Devices");
        assert_eq!(id.name, "preview1");
        assert_eq!(id.id(), input);
        assert_eq!(id.provider().id(), "/subscriptions/sub/providers/Microsoft.Devices");
    }

    #[test]
    fn test_feature_id_rejects_other_fixed_namespace() {
        let input = "/subscriptions/sub/providers/Microsoft.Other/providers/Microsoft.Devices/features/preview1";
        assert!(FeatureId::parse(input).is_err());
    }

    #[test]
    fn test_short_name() {
        let feature = FeatureResult {
            name: Some("Microsoft.Devices/preview1".to_string()),
            ..FeatureResult::default()
        };
        assert_eq!(feature.short_name(), Some("preview1"));
        assert_eq!(feature.state(), "NotRegistered");
    }
}

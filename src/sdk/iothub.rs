//! IoT Hub REST client
//!
//! Routing configuration (routes, the fallback route and enrichments) lives
//! inside the hub resource itself, so every routing change is a
//! read-modify-write of the whole hub followed by a PUT.

use super::{begin, to_body};
use crate::arm::{ArmClient, Poller};
use crate::error::Result;
use crate::resource_id;
use crate::resourceid::ResourceId;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;

pub const API_VERSION: &str = "2020-03-01";

/// Message sources a route may select from
pub const ROUTING_SOURCES: &[&str] = &[
    "DeviceConnectionStateEvents",
    "DeviceJobLifecycleEvents",
    "DeviceLifecycleEvents",
    "DeviceMessages",
    "Invalid",
    "TwinChangeEvents",
];

resource_id! {
    /// An IoT Hub
    pub struct IotHubId("IotHub") {
        "subscriptions" => subscription_id,
        "resourceGroups" => resource_group,
        "providers" = "Microsoft.Devices",
        "IotHubs" => name,
    }
}

resource_id! {
    /// The fallback route of an IoT Hub. A hub has at most one, always named `default`.
    pub struct FallbackRouteId("IotHub Fallback Route") {
        "subscriptions" => subscription_id,
        "resourceGroups" => resource_group,
        "providers" = "Microsoft.Devices",
        "IotHubs" => iothub_name,
        "FallbackRoute" => name,
    }
}

resource_id! {
    /// A named route of an IoT Hub
    pub struct RouteId("IotHub Route") {
        "subscriptions" => subscription_id,
        "resourceGroups" => resource_group,
        "providers" = "Microsoft.Devices",
        "IotHubs" => iothub_name,
        "Routes" => name,
    }
}

resource_id! {
    /// A message enrichment of an IoT Hub, named by its key
    pub struct EnrichmentId("IotHub Enrichment") {
        "subscriptions" => subscription_id,
        "resourceGroups" => resource_group,
        "providers" = "Microsoft.Devices",
        "IotHubs" => iothub_name,
        "Enrichments" => name,
    }
}

resource_id! {
    /// A consumer group on one of an IoT Hub's built-in Event Hub endpoints
    pub struct ConsumerGroupId("Consumer Group") {
        "subscriptions" => subscription_id,
        "resourceGroups" => resource_group,
        "providers" = "Microsoft.Devices",
        "IotHubs" => iothub_name,
        "eventHubEndpoints" => eventhub_endpoint_name,
        "ConsumerGroups" => name,
    }
}

impl FallbackRouteId {
    /// Name of the only fallback route a hub can have
    pub const DEFAULT_NAME: &'static str = "default";

    pub fn hub(&self) -> IotHubId {
        IotHubId::new(&self.subscription_id, &self.resource_group, &self.iothub_name)
    }
}

impl RouteId {
    pub fn hub(&self) -> IotHubId {
        IotHubId::new(&self.subscription_id, &self.resource_group, &self.iothub_name)
    }
}

impl EnrichmentId {
    pub fn hub(&self) -> IotHubId {
        IotHubId::new(&self.subscription_id, &self.resource_group, &self.iothub_name)
    }
}

impl ConsumerGroupId {
    pub fn hub(&self) -> IotHubId {
        IotHubId::new(&self.subscription_id, &self.resource_group, &self.iothub_name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IotHubDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<IotHubProperties>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IotHubDescription {
    pub fn routing(&self) -> Option<&RoutingProperties> {
        self.properties.as_ref().and_then(|p| p.routing.as_ref())
    }

    /// Routing section, created empty when the hub has none yet
    pub fn routing_mut(&mut self) -> &mut RoutingProperties {
        self.properties
            .get_or_insert_with(IotHubProperties::default)
            .routing
            .get_or_insert_with(RoutingProperties::default)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IotHubProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingProperties>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routes: Option<Vec<RouteProperties>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_route: Option<FallbackRouteProperties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichments: Option<Vec<EnrichmentProperties>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteProperties {
    pub name: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default)]
    pub endpoint_names: Vec<String>,
    #[serde(default)]
    pub is_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackRouteProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default)]
    pub endpoint_names: Vec<String>,
    #[serde(default)]
    pub is_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentProperties {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub endpoint_names: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsumerGroupInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
}

/// Client for `Microsoft.Devices/IotHubs`
pub struct IotHubClient<'a> {
    client: &'a ArmClient,
}

impl<'a> IotHubClient<'a> {
    pub fn new(client: &'a ArmClient) -> Self {
        Self { client }
    }

    pub async fn get(&self, id: &IotHubId) -> Result<IotHubDescription> {
        tracing::debug!("Fetching IoT Hub {}", id);
        self.client.get(&id.to_url_path(), API_VERSION).await?.json()
    }

    /// Start a create-or-update of the whole hub
    ///
    /// `if_match` sends the hub's etag so a concurrent writer makes the PUT
    /// fail instead of being silently overwritten.
    pub async fn create_or_update(
        &self,
        id: &IotHubId,
        hub: &IotHubDescription,
        if_match: Option<&str>,
    ) -> Result<Poller> {
        tracing::debug!("Updating IoT Hub {}", id);
        let url = self.client.resource_url(&id.to_url_path(), API_VERSION)?;
        let body = to_body(hub)?;
        begin(self.client, Method::PUT, url, Some(&body), if_match).await
    }

    /// [`create_or_update`](Self::create_or_update) driven to completion
    pub async fn create_or_update_then_poll(
        &self,
        id: &IotHubId,
        hub: &IotHubDescription,
        if_match: Option<&str>,
        deadline: Instant,
    ) -> Result<IotHubDescription> {
        let mut poller = self.create_or_update(id, hub, if_match).await?;
        let body = poller.poll_until_done(deadline).await?;
        Ok(serde_json::from_value(body)?)
    }

    pub async fn get_consumer_group(&self, id: &ConsumerGroupId) -> Result<ConsumerGroupInfo> {
        self.client.get(&id.to_url_path(), API_VERSION).await?.json()
    }

    pub async fn create_consumer_group(
        &self,
        id: &ConsumerGroupId,
        group: &ConsumerGroupInfo,
    ) -> Result<ConsumerGroupInfo> {
        tracing::debug!("Creating consumer group {}", id);
        let body = to_body(group)?;
        self.client.put(&id.to_url_path(), API_VERSION, &body).await?.json()
    }

    pub async fn delete_consumer_group(&self, id: &ConsumerGroupId) -> Result<()> {
        tracing::debug!("Deleting consumer group {}", id);
        self.client.delete(&id.to_url_path(), API_VERSION).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_consumer_group_id_parses() {
        let input = "/subscriptions/12345678-1234-9876-4563-123456789012/resourceGroups/resGroup1/providers/Microsoft.Devices/IotHubs/hub1/eventHubEndpoints/events/ConsumerGroups/group1";
        let id = ConsumerGroupId::parse(input).unwrap();
        assert_eq!(id.subscription_id, "12345678-1234-9876-4563-123456789012");
        assert_eq!(id.resource_group, "resGroup1");
        assert_eq!(id.iothub_name, "hub1");
        assert_eq!(id.eventhub_endpoint_name, "events");
        assert_eq!(id.name, "group1");
        assert_eq!(id.id(), input);
    }

    #[test]
    fn test_fallback_route_id_rejects_lower_cased_label() {
        let input = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Devices/IotHubs/hub1/fallbackroute/default";
        assert!(FallbackRouteId::parse(input).is_err());
    }

    #[test]
    fn test_hub_of_sub_resource() {
        let id = RouteId::new("sub", "rg", "hub1", "route1");
        assert_eq!(
            id.hub().id(),
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Devices/IotHubs/hub1"
        );
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let body = json!({
            "id": "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Devices/IotHubs/hub1",
            "name": "hub1",
            "location": "westeurope",
            "etag": "AAAA",
            "sku": {"name": "S1", "capacity": 1},
            "properties": {
                "eventHubEndpoints": {"events": {"partitionCount": 2}},
                "routing": {
                    "endpoints": {"eventHubs": []},
                    "routes": [{
                        "name": "r1",
                        "source": "DeviceMessages",
                        "condition": "true",
                        "endpointNames": ["events"],
                        "isEnabled": true
                    }]
                }
            }
        });

        let hub: IotHubDescription = serde_json::from_value(body.clone()).unwrap();
        assert_eq!(hub.routing().and_then(|r| r.routes.as_ref()).map(Vec::len), Some(1));

        let back = serde_json::to_value(&hub).unwrap();
        assert_eq!(back, body);
    }

    #[test]
    fn test_routing_mut_creates_missing_sections() {
        let mut hub = IotHubDescription::default();
        hub.routing_mut().fallback_route = Some(FallbackRouteProperties {
            name: Some("$fallback".to_string()),
            source: "DeviceMessages".to_string(),
            condition: Some("true".to_string()),
            endpoint_names: vec!["events".to_string()],
            is_enabled: true,
        });
        let value = serde_json::to_value(&hub).unwrap();
        assert_eq!(value["properties"]["routing"]["fallbackRoute"]["isEnabled"], true);
    }
}

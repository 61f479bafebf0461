//! Resource Registry - type name to handler lookup
//!
//! The registry is an owned value built once at startup and handed to
//! whoever dispatches CRUD requests by type name (the CLI).

use super::consumer_group::ConsumerGroup;
use super::enrichment::Enrichment;
use super::fallback_route::FallbackRoute;
use super::provider_registration::ProviderRegistration;
use super::purview_account::PurviewAccount;
use super::route::Route;
use super::{DynResource, Erased, Resource};
use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// Map from resource type name to its handler
#[derive(Default)]
pub struct ResourceRegistry {
    resources: BTreeMap<&'static str, Box<dyn DynResource>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every resource type this crate implements
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(FallbackRoute);
        registry.register(Route);
        registry.register(Enrichment);
        registry.register(ConsumerGroup);
        registry.register(PurviewAccount);
        registry.register(ProviderRegistration);
        registry
    }

    /// Add a handler, replacing any previous one for the same type name
    pub fn register<R: Resource + 'static>(&mut self, resource: R) {
        let type_name = resource.type_name();
        if self.resources.insert(type_name, Box::new(Erased(resource))).is_some() {
            tracing::warn!("Replaced handler for {}", type_name);
        }
    }

    pub fn get(&self, type_name: &str) -> Option<&dyn DynResource> {
        self.resources.get(type_name).map(|r| r.as_ref())
    }

    /// Like [`get`](Self::get), with an error naming the known types
    pub fn require(&self, type_name: &str) -> Result<&dyn DynResource> {
        self.get(type_name).ok_or_else(|| {
            Error::Validation(format!(
                "unknown resource type {:?}, expected one of: {}",
                type_name,
                self.type_names().join(", ")
            ))
        })
    }

    /// All type names, sorted
    pub fn type_names(&self) -> Vec<&'static str> {
        self.resources.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_has_all_types() {
        let registry = ResourceRegistry::builtin();
        assert_eq!(
            registry.type_names(),
            vec![
                "azurerm_iothub_consumer_group",
                "azurerm_iothub_enrichment",
                "azurerm_iothub_fallback_route",
                "azurerm_iothub_route",
                "azurerm_purview_account",
                "azurerm_resource_provider_registration",
            ]
        );
    }

    #[test]
    fn test_parse_id_through_registry() {
        let registry = ResourceRegistry::builtin();
        let route = registry.require("azurerm_iothub_route").unwrap();
        let id = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Devices/IotHubs/hub1/Routes/r1";
        assert_eq!(route.parse_id(id).unwrap(), id);
        assert!(route.parse_id(&id.replace("Routes", "routes")).is_err());
    }

    #[test]
    fn test_unknown_type() {
        let registry = ResourceRegistry::builtin();
        let err = registry.require("azurerm_nope").err().unwrap();
        assert!(err.to_string().contains("azurerm_iothub_route"));
    }
}

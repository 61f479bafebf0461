//! `azurerm_iothub_route`

use super::fallback_route::default_condition;
use super::iothub::{get_hub, update_routing};
use super::{ensure_same_id, validate, Operation, ProviderContext, Resource, ResourceModel, ResourceState};
use crate::error::{Error, Result};
use crate::resourceid::ResourceId;
use crate::sdk::iothub::{IotHubDescription, RouteId, RouteProperties, ROUTING_SOURCES};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

pub const TYPE_NAME: &str = "azurerm_iothub_route";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteModel {
    pub name: String,
    pub resource_group_name: String,
    pub iothub_name: String,
    pub source: String,
    #[serde(default = "default_condition")]
    pub condition: String,
    pub endpoint_names: Vec<String>,
    pub enabled: bool,
}

impl ResourceModel for RouteModel {
    type Id = RouteId;
    type Body = RouteProperties;

    fn validate(&self) -> Result<()> {
        validate::route_name("name", &self.name)?;
        validate::resource_group_name(&self.resource_group_name)?;
        validate::iothub_name(&self.iothub_name)?;
        if !ROUTING_SOURCES.contains(&self.source.as_str()) {
            return Err(Error::Validation(format!(
                "source {:?} must be one of {}",
                self.source,
                ROUTING_SOURCES.join(", ")
            )));
        }
        if self.endpoint_names.len() != 1 {
            return Err(Error::Validation(format!(
                "endpoint_names must contain exactly one endpoint, got {}",
                self.endpoint_names.len()
            )));
        }
        self.endpoint_names.iter().try_for_each(|name| validate::endpoint_name(name))
    }

    fn id(&self, subscription_id: &str) -> RouteId {
        RouteId::new(subscription_id, &self.resource_group_name, &self.iothub_name, &self.name)
    }

    fn to_request_body(&self) -> RouteProperties {
        RouteProperties {
            name: self.name.clone(),
            source: self.source.clone(),
            condition: Some(self.condition.clone()),
            endpoint_names: self.endpoint_names.clone(),
            is_enabled: self.enabled,
        }
    }

    fn from_response_body(id: &RouteId, body: &RouteProperties) -> Self {
        Self {
            name: body.name.clone(),
            resource_group_name: id.resource_group.clone(),
            iothub_name: id.iothub_name.clone(),
            source: body.source.clone(),
            condition: body.condition.clone().unwrap_or_else(default_condition),
            endpoint_names: body.endpoint_names.clone(),
            enabled: body.is_enabled,
        }
    }
}

/// Route names are unique per hub regardless of case
fn find_route<'a>(hub: &'a IotHubDescription, name: &str) -> Option<&'a RouteProperties> {
    hub.routing()
        .and_then(|routing| routing.routes.as_ref())
        .and_then(|routes| routes.iter().find(|route| route.name.eq_ignore_ascii_case(name)))
}

/// Handler for [`RouteModel`]
pub struct Route;

impl Route {
    async fn upsert(
        ctx: &ProviderContext,
        id: &RouteId,
        model: &RouteModel,
        deadline: Instant,
        is_new: bool,
    ) -> Result<ResourceState<RouteModel>> {
        model.validate()?;
        let body = model.to_request_body();
        let existing_id = id.id();

        let hub = update_routing(ctx, &id.hub(), deadline, move |routing| {
            let routes = routing.routes.get_or_insert_with(Vec::new);
            match routes.iter_mut().find(|route| route.name.eq_ignore_ascii_case(&body.name)) {
                Some(_) if is_new => Err(Error::AlreadyExists { id: existing_id }),
                Some(existing) if *existing == body => Ok(false),
                Some(existing) => {
                    *existing = body;
                    Ok(true)
                }
                None => {
                    routes.push(body);
                    Ok(true)
                }
            }
        })
        .await?;

        let stored = find_route(&hub, &id.name)
            .map(|body| RouteModel::from_response_body(id, body))
            .unwrap_or_else(|| model.clone());
        Ok(ResourceState::new(id, stored))
    }

    async fn fetch(ctx: &ProviderContext, id: &RouteId) -> Result<Option<ResourceState<RouteModel>>> {
        let Some(hub) = get_hub(ctx, &id.hub()).await? else {
            return Ok(None);
        };
        Ok(find_route(&hub, &id.name).map(|body| ResourceState::new(id, RouteModel::from_response_body(id, body))))
    }

    async fn remove(ctx: &ProviderContext, id: &RouteId, deadline: Instant) -> Result<()> {
        let name = id.name.clone();
        update_routing(ctx, &id.hub(), deadline, move |routing| {
            let Some(routes) = routing.routes.as_mut() else {
                return Ok(false);
            };
            let before = routes.len();
            routes.retain(|route| !route.name.eq_ignore_ascii_case(&name));
            Ok(routes.len() != before)
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Resource for Route {
    type Model = RouteModel;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    async fn create(&self, ctx: &ProviderContext, model: &RouteModel) -> Result<ResourceState<RouteModel>> {
        let id = model.id(ctx.subscription_id());
        ctx.run(Operation::Create, &id, |deadline| Self::upsert(ctx, &id, model, deadline, true))
            .await
    }

    async fn read(&self, ctx: &ProviderContext, id: &RouteId) -> Result<Option<ResourceState<RouteModel>>> {
        ctx.run(Operation::Read, id, |_| Self::fetch(ctx, id)).await
    }

    async fn update(&self, ctx: &ProviderContext, id: &RouteId, model: &RouteModel) -> Result<ResourceState<RouteModel>> {
        ctx.run(Operation::Update, id, |deadline| async move {
            ensure_same_id(id, &model.id(&id.subscription_id))?;
            Self::upsert(ctx, id, model, deadline, false).await
        })
        .await
    }

    async fn delete(&self, ctx: &ProviderContext, id: &RouteId) -> Result<()> {
        ctx.run(Operation::Delete, id, |deadline| Self::remove(ctx, id, deadline)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> RouteModel {
        RouteModel {
            name: "route1".to_string(),
            resource_group_name: "rg1".to_string(),
            iothub_name: "hub1".to_string(),
            source: "DeviceMessages".to_string(),
            condition: "true".to_string(),
            endpoint_names: vec!["export".to_string()],
            enabled: true,
        }
    }

    #[test]
    fn test_validate_source() {
        let mut model = model();
        assert!(model.validate().is_ok());
        model.source = "Telemetry".to_string();
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_find_route_ignores_case() {
        let mut hub = IotHubDescription::default();
        hub.routing_mut().routes = Some(vec![model().to_request_body()]);
        assert!(find_route(&hub, "ROUTE1").is_some());
        assert!(find_route(&hub, "route2").is_none());
    }

    #[test]
    fn test_update_rejects_moved_route() {
        let id = model().id("sub");
        let mut moved = model();
        moved.iothub_name = "hub2".to_string();
        assert!(ensure_same_id(&id, &moved.id("sub")).is_err());
        assert!(ensure_same_id(&id, &model().id("sub")).is_ok());
    }
}

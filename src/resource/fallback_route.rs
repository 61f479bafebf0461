//! `azurerm_iothub_fallback_route`
//!
//! Every hub already has a fallback route, so create never refuses an
//! existing one. Deleting removes it from the hub; deleting when the hub has
//! none is a no-op.

use super::iothub::{get_hub, update_routing};
use super::{ensure_same_id, validate, Operation, ProviderContext, Resource, ResourceModel, ResourceState};
use crate::error::{Error, Result};
use crate::sdk::iothub::{FallbackRouteId, FallbackRouteProperties, IotHubDescription};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

pub const TYPE_NAME: &str = "azurerm_iothub_fallback_route";

pub(crate) fn default_condition() -> String {
    "true".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackRouteModel {
    pub resource_group_name: String,
    pub iothub_name: String,
    #[serde(default = "default_condition")]
    pub condition: String,
    pub endpoint_names: Vec<String>,
    pub enabled: bool,
}

impl ResourceModel for FallbackRouteModel {
    type Id = FallbackRouteId;
    type Body = FallbackRouteProperties;

    fn validate(&self) -> Result<()> {
        validate::resource_group_name(&self.resource_group_name)?;
        validate::iothub_name(&self.iothub_name)?;
        // The service accepts a single endpoint for the fallback route
        if self.endpoint_names.len() != 1 {
            return Err(Error::Validation(format!(
                "endpoint_names must contain exactly one endpoint, got {}",
                self.endpoint_names.len()
            )));
        }
        self.endpoint_names.iter().try_for_each(|name| validate::endpoint_name(name))
    }

    fn id(&self, subscription_id: &str) -> FallbackRouteId {
        FallbackRouteId::new(
            subscription_id,
            &self.resource_group_name,
            &self.iothub_name,
            FallbackRouteId::DEFAULT_NAME,
        )
    }

    fn to_request_body(&self) -> FallbackRouteProperties {
        FallbackRouteProperties {
            name: None,
            source: "DeviceMessages".to_string(),
            condition: Some(self.condition.clone()),
            endpoint_names: self.endpoint_names.clone(),
            is_enabled: self.enabled,
        }
    }

    fn from_response_body(id: &FallbackRouteId, body: &FallbackRouteProperties) -> Self {
        Self {
            resource_group_name: id.resource_group.clone(),
            iothub_name: id.iothub_name.clone(),
            condition: body.condition.clone().unwrap_or_else(default_condition),
            endpoint_names: body.endpoint_names.clone(),
            enabled: body.is_enabled,
        }
    }
}

fn fallback_of(hub: &IotHubDescription) -> Option<&FallbackRouteProperties> {
    hub.routing().and_then(|routing| routing.fallback_route.as_ref())
}

/// Handler for [`FallbackRouteModel`]
pub struct FallbackRoute;

impl FallbackRoute {
    async fn upsert(
        ctx: &ProviderContext,
        id: &FallbackRouteId,
        model: &FallbackRouteModel,
        deadline: Instant,
    ) -> Result<ResourceState<FallbackRouteModel>> {
        model.validate()?;
        let body = model.to_request_body();

        let hub = update_routing(ctx, &id.hub(), deadline, |routing| {
            if routing.fallback_route.as_ref() == Some(&body) {
                return Ok(false);
            }
            routing.fallback_route = Some(body);
            Ok(true)
        })
        .await?;

        let stored = fallback_of(&hub)
            .map(|body| FallbackRouteModel::from_response_body(id, body))
            .unwrap_or_else(|| model.clone());
        Ok(ResourceState::new(id, stored))
    }

    async fn fetch(ctx: &ProviderContext, id: &FallbackRouteId) -> Result<Option<ResourceState<FallbackRouteModel>>> {
        let Some(hub) = get_hub(ctx, &id.hub()).await? else {
            tracing::info!("IoT Hub {} is gone, dropping {}", id.iothub_name, id);
            return Ok(None);
        };
        Ok(fallback_of(&hub).map(|body| ResourceState::new(id, FallbackRouteModel::from_response_body(id, body))))
    }

    async fn remove(ctx: &ProviderContext, id: &FallbackRouteId, deadline: Instant) -> Result<()> {
        update_routing(ctx, &id.hub(), deadline, |routing| Ok(routing.fallback_route.take().is_some())).await?;
        Ok(())
    }
}

#[async_trait]
impl Resource for FallbackRoute {
    type Model = FallbackRouteModel;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    async fn create(&self, ctx: &ProviderContext, model: &FallbackRouteModel) -> Result<ResourceState<FallbackRouteModel>> {
        let id = model.id(ctx.subscription_id());
        ctx.run(Operation::Create, &id, |deadline| Self::upsert(ctx, &id, model, deadline))
            .await
    }

    async fn read(&self, ctx: &ProviderContext, id: &FallbackRouteId) -> Result<Option<ResourceState<FallbackRouteModel>>> {
        ctx.run(Operation::Read, id, |_| Self::fetch(ctx, id)).await
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &FallbackRouteId,
        model: &FallbackRouteModel,
    ) -> Result<ResourceState<FallbackRouteModel>> {
        ctx.run(Operation::Update, id, |deadline| async move {
            ensure_same_id(id, &model.id(&id.subscription_id))?;
            Self::upsert(ctx, id, model, deadline).await
        })
        .await
    }

    async fn delete(&self, ctx: &ProviderContext, id: &FallbackRouteId) -> Result<()> {
        ctx.run(Operation::Delete, id, |deadline| Self::remove(ctx, id, deadline)).await
    }
}

//! `azurerm_iothub_enrichment`
//!
//! An enrichment is keyed by `name`, which becomes the enrichment's `key`
//! on the hub.

use super::iothub::{get_hub, update_routing};
use super::{ensure_same_id, validate, Operation, ProviderContext, Resource, ResourceModel, ResourceState};
use crate::error::{Error, Result};
use crate::resourceid::ResourceId;
use crate::sdk::iothub::{EnrichmentId, EnrichmentProperties, IotHubDescription};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

pub const TYPE_NAME: &str = "azurerm_iothub_enrichment";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentModel {
    pub name: String,
    pub resource_group_name: String,
    pub iothub_name: String,
    pub value: String,
    pub endpoint_names: Vec<String>,
}

impl ResourceModel for EnrichmentModel {
    type Id = EnrichmentId;
    type Body = EnrichmentProperties;

    fn validate(&self) -> Result<()> {
        validate::route_name("name", &self.name)?;
        validate::resource_group_name(&self.resource_group_name)?;
        validate::iothub_name(&self.iothub_name)?;
        validate::non_empty("value", &self.value)?;
        if self.endpoint_names.is_empty() {
            return Err(Error::Validation("endpoint_names must contain at least one endpoint".to_string()));
        }
        self.endpoint_names.iter().try_for_each(|name| validate::endpoint_name(name))
    }

    fn id(&self, subscription_id: &str) -> EnrichmentId {
        EnrichmentId::new(subscription_id, &self.resource_group_name, &self.iothub_name, &self.name)
    }

    fn to_request_body(&self) -> EnrichmentProperties {
        EnrichmentProperties {
            key: self.name.clone(),
            value: self.value.clone(),
            endpoint_names: self.endpoint_names.clone(),
        }
    }

    fn from_response_body(id: &EnrichmentId, body: &EnrichmentProperties) -> Self {
        Self {
            name: body.key.clone(),
            resource_group_name: id.resource_group.clone(),
            iothub_name: id.iothub_name.clone(),
            value: body.value.clone(),
            endpoint_names: body.endpoint_names.clone(),
        }
    }
}

fn find_enrichment<'a>(hub: &'a IotHubDescription, key: &str) -> Option<&'a EnrichmentProperties> {
    hub.routing()
        .and_then(|routing| routing.enrichments.as_ref())
        .and_then(|enrichments| enrichments.iter().find(|e| e.key.eq_ignore_ascii_case(key)))
}

/// Handler for [`EnrichmentModel`]
pub struct Enrichment;

impl Enrichment {
    async fn upsert(
        ctx: &ProviderContext,
        id: &EnrichmentId,
        model: &EnrichmentModel,
        deadline: Instant,
        is_new: bool,
    ) -> Result<ResourceState<EnrichmentModel>> {
        model.validate()?;
        let body = model.to_request_body();
        let existing_id = id.id();

        let hub = update_routing(ctx, &id.hub(), deadline, move |routing| {
            let enrichments = routing.enrichments.get_or_insert_with(Vec::new);
            match enrichments.iter_mut().find(|e| e.key.eq_ignore_ascii_case(&body.key)) {
                Some(_) if is_new => Err(Error::AlreadyExists { id: existing_id }),
                Some(existing) if *existing == body => Ok(false),
                Some(existing) => {
                    *existing = body;
                    Ok(true)
                }
                None => {
                    enrichments.push(body);
                    Ok(true)
                }
            }
        })
        .await?;

        let stored = find_enrichment(&hub, &id.name)
            .map(|body| EnrichmentModel::from_response_body(id, body))
            .unwrap_or_else(|| model.clone());
        Ok(ResourceState::new(id, stored))
    }

    async fn fetch(ctx: &ProviderContext, id: &EnrichmentId) -> Result<Option<ResourceState<EnrichmentModel>>> {
        let Some(hub) = get_hub(ctx, &id.hub()).await? else {
            return Ok(None);
        };
        Ok(find_enrichment(&hub, &id.name)
            .map(|body| ResourceState::new(id, EnrichmentModel::from_response_body(id, body))))
    }

    async fn remove(ctx: &ProviderContext, id: &EnrichmentId, deadline: Instant) -> Result<()> {
        let key = id.name.clone();
        update_routing(ctx, &id.hub(), deadline, move |routing| {
            let Some(enrichments) = routing.enrichments.as_mut() else {
                return Ok(false);
            };
            let before = enrichments.len();
            enrichments.retain(|e| !e.key.eq_ignore_ascii_case(&key));
            Ok(enrichments.len() != before)
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Resource for Enrichment {
    type Model = EnrichmentModel;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    async fn create(&self, ctx: &ProviderContext, model: &EnrichmentModel) -> Result<ResourceState<EnrichmentModel>> {
        let id = model.id(ctx.subscription_id());
        ctx.run(Operation::Create, &id, |deadline| Self::upsert(ctx, &id, model, deadline, true))
            .await
    }

    async fn read(&self, ctx: &ProviderContext, id: &EnrichmentId) -> Result<Option<ResourceState<EnrichmentModel>>> {
        ctx.run(Operation::Read, id, |_| Self::fetch(ctx, id)).await
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &EnrichmentId,
        model: &EnrichmentModel,
    ) -> Result<ResourceState<EnrichmentModel>> {
        ctx.run(Operation::Update, id, |deadline| async move {
            ensure_same_id(id, &model.id(&id.subscription_id))?;
            Self::upsert(ctx, id, model, deadline, false).await
        })
        .await
    }

    async fn delete(&self, ctx: &ProviderContext, id: &EnrichmentId) -> Result<()> {
        ctx.run(Operation::Delete, id, |deadline| Self::remove(ctx, id, deadline)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        let mut model = EnrichmentModel {
            name: "region".to_string(),
            resource_group_name: "rg1".to_string(),
            iothub_name: "hub1".to_string(),
            value: "$twin.tags.region".to_string(),
            endpoint_names: vec!["export1".to_string(), "export2".to_string()],
        };
        assert!(model.validate().is_ok());

        model.endpoint_names.clear();
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_name_is_the_key() {
        let model = EnrichmentModel {
            name: "region".to_string(),
            resource_group_name: "rg1".to_string(),
            iothub_name: "hub1".to_string(),
            value: "eu".to_string(),
            endpoint_names: vec!["events".to_string()],
        };
        let body = model.to_request_body();
        assert_eq!(body.key, "region");
        assert_eq!(
            model.id("sub").id(),
            "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.Devices/IotHubs/hub1/Enrichments/region"
        );
    }
}

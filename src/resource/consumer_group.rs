//! `azurerm_iothub_consumer_group`

use super::iothub::hub_lock;
use super::{ensure_same_id, validate, Operation, ProviderContext, Resource, ResourceModel, ResourceState};
use crate::error::{Error, Result};
use crate::resourceid::ResourceId;
use crate::sdk::iothub::{ConsumerGroupId, ConsumerGroupInfo, IotHubClient};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const TYPE_NAME: &str = "azurerm_iothub_consumer_group";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerGroupModel {
    pub name: String,
    pub resource_group_name: String,
    pub iothub_name: String,
    pub eventhub_endpoint_name: String,
}

impl ResourceModel for ConsumerGroupModel {
    type Id = ConsumerGroupId;
    type Body = ConsumerGroupInfo;

    fn validate(&self) -> Result<()> {
        validate::consumer_group_name(&self.name)?;
        validate::resource_group_name(&self.resource_group_name)?;
        validate::iothub_name(&self.iothub_name)?;
        validate::non_empty("eventhub_endpoint_name", &self.eventhub_endpoint_name)
    }

    fn id(&self, subscription_id: &str) -> ConsumerGroupId {
        ConsumerGroupId::new(
            subscription_id,
            &self.resource_group_name,
            &self.iothub_name,
            &self.eventhub_endpoint_name,
            &self.name,
        )
    }

    fn to_request_body(&self) -> ConsumerGroupInfo {
        let mut properties = serde_json::Map::new();
        properties.insert("name".to_string(), self.name.clone().into());
        ConsumerGroupInfo {
            properties: Some(properties),
            ..ConsumerGroupInfo::default()
        }
    }

    fn from_response_body(id: &ConsumerGroupId, body: &ConsumerGroupInfo) -> Self {
        Self {
            name: body.name.clone().unwrap_or_else(|| id.name.clone()),
            resource_group_name: id.resource_group.clone(),
            iothub_name: id.iothub_name.clone(),
            eventhub_endpoint_name: id.eventhub_endpoint_name.clone(),
        }
    }
}

/// Handler for [`ConsumerGroupModel`]
pub struct ConsumerGroup;

impl ConsumerGroup {
    async fn put(
        ctx: &ProviderContext,
        id: &ConsumerGroupId,
        model: &ConsumerGroupModel,
        is_new: bool,
    ) -> Result<ResourceState<ConsumerGroupModel>> {
        model.validate()?;
        let _guard = ctx.locks.acquire(&hub_lock(&id.hub())).await;
        let client = IotHubClient::new(&ctx.client);

        if is_new {
            match client.get_consumer_group(id).await {
                Ok(_) => return Err(Error::AlreadyExists { id: id.id() }),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        let created = client.create_consumer_group(id, &model.to_request_body()).await?;
        Ok(ResourceState::new(id, ConsumerGroupModel::from_response_body(id, &created)))
    }

    async fn fetch(ctx: &ProviderContext, id: &ConsumerGroupId) -> Result<Option<ResourceState<ConsumerGroupModel>>> {
        match IotHubClient::new(&ctx.client).get_consumer_group(id).await {
            Ok(group) => Ok(Some(ResourceState::new(id, ConsumerGroupModel::from_response_body(id, &group)))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn remove(ctx: &ProviderContext, id: &ConsumerGroupId) -> Result<()> {
        let _guard = ctx.locks.acquire(&hub_lock(&id.hub())).await;
        match IotHubClient::new(&ctx.client).delete_consumer_group(id).await {
            Err(e) if e.is_not_found() => {
                tracing::debug!("{} was already gone", id);
                Ok(())
            }
            other => other,
        }
    }
}

#[async_trait]
impl Resource for ConsumerGroup {
    type Model = ConsumerGroupModel;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    async fn create(&self, ctx: &ProviderContext, model: &ConsumerGroupModel) -> Result<ResourceState<ConsumerGroupModel>> {
        let id = model.id(ctx.subscription_id());
        ctx.run(Operation::Create, &id, |_| Self::put(ctx, &id, model, true)).await
    }

    async fn read(&self, ctx: &ProviderContext, id: &ConsumerGroupId) -> Result<Option<ResourceState<ConsumerGroupModel>>> {
        ctx.run(Operation::Read, id, |_| Self::fetch(ctx, id)).await
    }

    /// Every attribute is part of the identifier, so an update only
    /// re-asserts that the group exists
    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &ConsumerGroupId,
        model: &ConsumerGroupModel,
    ) -> Result<ResourceState<ConsumerGroupModel>> {
        ctx.run(Operation::Update, id, |_| async move {
            ensure_same_id(id, &model.id(&id.subscription_id))?;
            Self::put(ctx, id, model, false).await
        })
        .await
    }

    async fn delete(&self, ctx: &ProviderContext, id: &ConsumerGroupId) -> Result<()> {
        ctx.run(Operation::Delete, id, |_| Self::remove(ctx, id)).await
    }
}

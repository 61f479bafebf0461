//! `azurerm_purview_account`

use super::{ensure_same_id, validate, Operation, ProviderContext, Resource, ResourceModel, ResourceState};
use crate::error::{Error, Result};
use crate::resourceid::ResourceId;
use crate::sdk::purview::{
    Account, AccountProperties, AccountSku, AccountUpdateParameters, AccountsClient, Identity, PurviewAccountId,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::time::Instant;

pub const TYPE_NAME: &str = "azurerm_purview_account";

fn default_true() -> bool {
    true
}

/// Managed identity assigned by the service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityModel {
    pub principal_id: String,
    pub tenant_id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurviewAccountModel {
    pub name: String,
    pub resource_group_name: String,
    pub location: String,
    pub sku_name: String,
    #[serde(default = "default_true")]
    pub public_network_enabled: bool,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    // Computed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardian_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_resource_group_name: Option<String>,
}

/// Locations are compared without case or spaces, `West Europe` == `westeurope`
fn normalize_location(location: &str) -> String {
    location.replace(' ', "").to_lowercase()
}

impl ResourceModel for PurviewAccountModel {
    type Id = PurviewAccountId;
    type Body = Account;

    fn validate(&self) -> Result<()> {
        validate::purview_account_name(&self.name)?;
        validate::resource_group_name(&self.resource_group_name)?;
        validate::non_empty("location", &self.location)?;
        validate::purview_sku_name(&self.sku_name)?;
        Ok(())
    }

    fn id(&self, subscription_id: &str) -> PurviewAccountId {
        PurviewAccountId::new(subscription_id, &self.resource_group_name, &self.name)
    }

    fn to_request_body(&self) -> Account {
        let capacity = validate::purview_sku_name(&self.sku_name).ok();
        Account {
            location: Some(normalize_location(&self.location)),
            identity: Some(Identity {
                kind: Some("SystemAssigned".to_string()),
                ..Identity::default()
            }),
            sku: Some(AccountSku {
                name: Some("Standard".to_string()),
                capacity,
            }),
            tags: Some(self.tags.clone()),
            properties: Some(AccountProperties {
                public_network_access: Some(if self.public_network_enabled { "Enabled" } else { "Disabled" }.to_string()),
                ..AccountProperties::default()
            }),
            ..Account::default()
        }
    }

    fn from_response_body(id: &PurviewAccountId, body: &Account) -> Self {
        let sku_name = match &body.sku {
            Some(AccountSku {
                name: Some(name),
                capacity: Some(capacity),
            }) => format!("{}_{}", name, capacity),
            Some(AccountSku { name: Some(name), .. }) => name.clone(),
            _ => String::new(),
        };
        let properties = body.properties.clone().unwrap_or_default();
        let endpoints = properties.endpoints.unwrap_or_default();

        Self {
            name: id.name.clone(),
            resource_group_name: id.resource_group.clone(),
            location: body.location.as_deref().map(normalize_location).unwrap_or_default(),
            sku_name,
            public_network_enabled: properties
                .public_network_access
                .map_or(true, |access| !access.eq_ignore_ascii_case("Disabled")),
            tags: body.tags.clone().unwrap_or_default(),
            identity: body.identity.as_ref().map(|identity| IdentityModel {
                principal_id: identity.principal_id.clone().unwrap_or_default(),
                tenant_id: identity.tenant_id.clone().unwrap_or_default(),
                kind: identity.kind.clone().unwrap_or_default(),
            }),
            catalog_endpoint: endpoints.catalog,
            guardian_endpoint: endpoints.guardian,
            scan_endpoint: endpoints.scan,
            managed_resource_group_name: properties.managed_resource_group_name,
        }
    }
}

/// Handler for [`PurviewAccountModel`]
pub struct PurviewAccount;

impl PurviewAccount {
    async fn get(ctx: &ProviderContext, id: &PurviewAccountId) -> Result<Option<Account>> {
        match AccountsClient::new(&ctx.client).get(id).await {
            Ok(account) => Ok(Some(account)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn put(
        ctx: &ProviderContext,
        id: &PurviewAccountId,
        model: &PurviewAccountModel,
        deadline: Instant,
    ) -> Result<ResourceState<PurviewAccountModel>> {
        let mut poller = AccountsClient::new(&ctx.client)
            .create_or_update(id, &model.to_request_body())
            .await?;
        let account: Account = serde_json::from_value(poller.poll_until_done(deadline).await?)?;
        Ok(ResourceState::new(id, PurviewAccountModel::from_response_body(id, &account)))
    }

    async fn provision(
        ctx: &ProviderContext,
        id: &PurviewAccountId,
        model: &PurviewAccountModel,
        deadline: Instant,
    ) -> Result<ResourceState<PurviewAccountModel>> {
        model.validate()?;
        if Self::get(ctx, id).await?.is_some() {
            return Err(Error::AlreadyExists { id: id.id() });
        }
        Self::put(ctx, id, model, deadline).await
    }

    /// Tag-only changes go through PATCH, anything else re-submits the account
    async fn change(
        ctx: &ProviderContext,
        id: &PurviewAccountId,
        model: &PurviewAccountModel,
        deadline: Instant,
    ) -> Result<ResourceState<PurviewAccountModel>> {
        model.validate()?;
        ensure_same_id(id, &model.id(&id.subscription_id))?;

        let current = Self::get(ctx, id)
            .await?
            .ok_or_else(|| Error::NotFound { resource: id.id() })?;
        let current = PurviewAccountModel::from_response_body(id, &current);

        let tags_only = current.location == normalize_location(&model.location)
            && current.sku_name == model.sku_name
            && current.public_network_enabled == model.public_network_enabled;
        if !tags_only {
            return Self::put(ctx, id, model, deadline).await;
        }

        let params = AccountUpdateParameters {
            tags: Some(model.tags.clone()),
        };
        let mut poller = AccountsClient::new(&ctx.client).update(id, &params).await?;
        poller.poll_until_done(deadline).await?;

        // PATCH answers with the pre-update body on some API versions
        let account = Self::get(ctx, id)
            .await?
            .ok_or_else(|| Error::NotFound { resource: id.id() })?;
        Ok(ResourceState::new(id, PurviewAccountModel::from_response_body(id, &account)))
    }

    async fn remove(ctx: &ProviderContext, id: &PurviewAccountId, deadline: Instant) -> Result<()> {
        let mut poller = match AccountsClient::new(&ctx.client).delete(id).await {
            Ok(poller) => poller,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        poller.poll_until_done(deadline).await?;
        Ok(())
    }
}

#[async_trait]
impl Resource for PurviewAccount {
    type Model = PurviewAccountModel;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    async fn create(&self, ctx: &ProviderContext, model: &PurviewAccountModel) -> Result<ResourceState<PurviewAccountModel>> {
        let id = model.id(ctx.subscription_id());
        ctx.run(Operation::Create, &id, |deadline| Self::provision(ctx, &id, model, deadline))
            .await
    }

    async fn read(&self, ctx: &ProviderContext, id: &PurviewAccountId) -> Result<Option<ResourceState<PurviewAccountModel>>> {
        ctx.run(Operation::Read, id, |_| async move {
            let account = Self::get(ctx, id).await?;
            Ok(account.map(|account| ResourceState::new(id, PurviewAccountModel::from_response_body(id, &account))))
        })
        .await
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &PurviewAccountId,
        model: &PurviewAccountModel,
    ) -> Result<ResourceState<PurviewAccountModel>> {
        ctx.run(Operation::Update, id, |deadline| Self::change(ctx, id, model, deadline))
            .await
    }

    async fn delete(&self, ctx: &ProviderContext, id: &PurviewAccountId) -> Result<()> {
        ctx.run(Operation::Delete, id, |deadline| Self::remove(ctx, id, deadline)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn model() -> PurviewAccountModel {
        serde_json::from_value(json!({
            "name": "acctest-pa-1",
            "resource_group_name": "acctestRG-purview-1",
            "location": "West Europe",
            "sku_name": "Standard_1",
            "tags": {"ENV": "Test"}
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let model = model();
        assert!(model.public_network_enabled);
        assert!(model.identity.is_none());
        assert!(model.validate().is_ok());
    }

    #[test]
    fn test_request_body() {
        let body = serde_json::to_value(model().to_request_body()).unwrap();
        assert_eq!(body["location"], "westeurope");
        assert_eq!(body["identity"]["type"], "SystemAssigned");
        assert_eq!(body["sku"], json!({"name": "Standard", "capacity": 1}));
        assert_eq!(body["tags"]["ENV"], "Test");
        assert_eq!(body["properties"]["publicNetworkAccess"], "Enabled");
    }

    #[test]
    fn test_from_response_fills_computed_fields() {
        let account: Account = serde_json::from_value(json!({
            "location": "westeurope",
            "identity": {"type": "SystemAssigned", "principalId": "p1", "tenantId": "t1"},
            "sku": {"name": "Standard", "capacity": 1},
            "tags": {"ENV": "Test"},
            "properties": {
                "publicNetworkAccess": "Disabled",
                "endpoints": {"catalog": "https://c", "guardian": "https://g", "scan": "https://s"},
                "managedResourceGroupName": "managed-rg-1"
            }
        }))
        .unwrap();
        let id = model().id("sub");
        let read = PurviewAccountModel::from_response_body(&id, &account);

        assert_eq!(read.sku_name, "Standard_1");
        assert!(!read.public_network_enabled);
        assert_eq!(read.identity.unwrap().principal_id, "p1");
        assert_eq!(read.catalog_endpoint.as_deref(), Some("https://c"));
        assert_eq!(read.managed_resource_group_name.as_deref(), Some("managed-rg-1"));
        assert_eq!(read.location, "westeurope");
    }
}

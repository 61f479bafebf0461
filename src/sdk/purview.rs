//! Purview accounts REST client

use super::{begin, to_body};
use crate::arm::{ArmClient, Poller};
use crate::error::Result;
use crate::resource_id;
use crate::resourceid::ResourceId;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const API_VERSION: &str = "2020-12-01-preview";

resource_id! {
    /// A Purview account
    pub struct PurviewAccountId("Purview Account") {
        "subscriptions" => subscription_id,
        "resourceGroups" => resource_group,
        "providers" = "Microsoft.Purview",
        "accounts" => name,
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<AccountSku>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<AccountProperties>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSku {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProperties {
    /// `Enabled`, `Disabled` or `NotSpecified`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_network_access: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<AccountEndpoints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_resource_group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEndpoints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardian: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan: Option<String>,
}

/// Body of a PATCH against an account
#[derive(Debug, Clone, Default, Serialize)]
pub struct AccountUpdateParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
}

/// Client for `Microsoft.Purview/accounts`
pub struct AccountsClient<'a> {
    client: &'a ArmClient,
}

impl<'a> AccountsClient<'a> {
    pub fn new(client: &'a ArmClient) -> Self {
        Self { client }
    }

    pub async fn get(&self, id: &PurviewAccountId) -> Result<Account> {
        self.client.get(&id.to_url_path(), API_VERSION).await?.json()
    }

    pub async fn create_or_update(&self, id: &PurviewAccountId, account: &Account) -> Result<Poller> {
        tracing::debug!("Creating Purview account {}", id);
        let url = self.client.resource_url(&id.to_url_path(), API_VERSION)?;
        let body = to_body(account)?;
        begin(self.client, Method::PUT, url, Some(&body), None).await
    }

    pub async fn update(&self, id: &PurviewAccountId, params: &AccountUpdateParameters) -> Result<Poller> {
        tracing::debug!("Updating Purview account {}", id);
        let url = self.client.resource_url(&id.to_url_path(), API_VERSION)?;
        let body = to_body(params)?;
        begin(self.client, Method::PATCH, url, Some(&body), None).await
    }

    pub async fn delete(&self, id: &PurviewAccountId) -> Result<Poller> {
        tracing::debug!("Deleting Purview account {}", id);
        let url = self.client.resource_url(&id.to_url_path(), API_VERSION)?;
        begin(self.client, Method::DELETE, url, None, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_account_id_round_trip() {
        let id = PurviewAccountId::new("sub", "rg", "acct1");
        assert_eq!(
            id.id(),
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Purview/accounts/acct1"
        );
        assert_eq!(PurviewAccountId::parse(&id.id()).unwrap(), id);
    }

    #[test]
    fn test_account_deserializes_computed_fields() {
        let account: Account = serde_json::from_value(json!({
            "name": "acct1",
            "location": "westus",
            "identity": {"type": "SystemAssigned", "principalId": "p", "tenantId": "t"},
            "sku": {"name": "Standard", "capacity": 4},
            "properties": {
                "publicNetworkAccess": "Enabled",
                "endpoints": {"catalog": "https://c", "guardian": "https://g", "scan": "https://s"},
                "managedResourceGroupName": "managed-rg-acct1",
                "createdBy": "someone"
            }
        }))
        .unwrap();

        let identity = account.identity.unwrap();
        assert_eq!(identity.kind.as_deref(), Some("SystemAssigned"));
        assert_eq!(identity.principal_id.as_deref(), Some("p"));
        let properties = account.properties.unwrap();
        assert_eq!(properties.endpoints.unwrap().scan.as_deref(), Some("https://s"));
        assert_eq!(properties.extra["createdBy"], "someone");
    }

    #[test]
    fn test_update_parameters_skip_empty_tags() {
        let body = serde_json::to_value(AccountUpdateParameters::default()).unwrap();
        assert_eq!(body, json!({}));
    }
}

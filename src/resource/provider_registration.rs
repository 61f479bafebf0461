//! `azurerm_resource_provider_registration`
//!
//! Registers a resource provider namespace with the subscription and
//! optionally registers or unregisters preview features of it. Neither
//! operation is a long-running operation; progress is observed by polling
//! the registration state.

use super::{ensure_same_id, validate, Operation, ProviderContext, Resource, ResourceModel, ResourceState};
use crate::arm::poller::wait_for_state;
use crate::error::{Error, Result};
use crate::locks::LockKey;
use crate::resourceid::ResourceId;
use crate::sdk::features::{FeatureId, FeatureProperties, FeatureResult, FeaturesClient};
use crate::sdk::resources::{
    Provider, ProvidersClient, ResourceProviderId, REGISTERED, REGISTERING, UNREGISTERED, UNREGISTERING,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::time::Instant;

pub const TYPE_NAME: &str = "azurerm_resource_provider_registration";

const LOCK_NAMESPACE: &str = "azurerm_resource_provider_registration";

/// Features gated on approval stay `Pending` until someone approves them
const FEATURE_PENDING: &str = "Pending";
const FEATURE_NOT_REGISTERED: &str = "NotRegistered";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureModel {
    pub name: String,
    pub registered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRegistrationModel {
    pub name: String,
    #[serde(default, rename = "feature")]
    pub features: Vec<FeatureModel>,
}

/// Registration state of a provider and the features that matter for it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrationStatus {
    pub provider: Provider,
    #[serde(default)]
    pub features: Vec<FeatureResult>,
}

fn feature_is_registered(state: &str) -> bool {
    state.eq_ignore_ascii_case(REGISTERED) || state.eq_ignore_ascii_case(FEATURE_PENDING)
}

impl ResourceModel for ProviderRegistrationModel {
    type Id = ResourceProviderId;
    type Body = RegistrationStatus;

    fn validate(&self) -> Result<()> {
        validate::provider_namespace(&self.name)?;
        let mut seen = HashSet::new();
        for feature in &self.features {
            validate::non_empty("feature.name", &feature.name)?;
            if !seen.insert(feature.name.to_ascii_lowercase()) {
                return Err(Error::Validation(format!(
                    "feature {:?} is declared more than once",
                    feature.name
                )));
            }
        }
        Ok(())
    }

    fn id(&self, subscription_id: &str) -> ResourceProviderId {
        ResourceProviderId::new(subscription_id, &self.name)
    }

    /// The state this configuration asks for
    fn to_request_body(&self) -> RegistrationStatus {
        RegistrationStatus {
            provider: Provider {
                namespace: Some(self.name.clone()),
                registration_state: Some(REGISTERED.to_string()),
                ..Provider::default()
            },
            features: self
                .features
                .iter()
                .map(|feature| FeatureResult {
                    name: Some(format!("{}/{}", self.name, feature.name)),
                    properties: Some(FeatureProperties {
                        state: Some(
                            if feature.registered { REGISTERED } else { UNREGISTERED }.to_string(),
                        ),
                    }),
                    ..FeatureResult::default()
                })
                .collect(),
        }
    }

    fn from_response_body(id: &ResourceProviderId, body: &RegistrationStatus) -> Self {
        Self {
            name: body
                .provider
                .namespace
                .clone()
                .unwrap_or_else(|| id.resource_provider.clone()),
            features: body
                .features
                .iter()
                .filter_map(|feature| {
                    Some(FeatureModel {
                        name: feature.short_name()?.to_string(),
                        registered: feature_is_registered(feature.state()),
                    })
                })
                .collect(),
        }
    }
}

/// Handler for [`ProviderRegistrationModel`]
pub struct ProviderRegistration;

impl ProviderRegistration {
    async fn get_provider(ctx: &ProviderContext, id: &ResourceProviderId) -> Result<Option<Provider>> {
        match ProvidersClient::new(&ctx.client).get(id).await {
            Ok(provider) => Ok(Some(provider)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn register_provider(ctx: &ProviderContext, id: &ResourceProviderId, deadline: Instant) -> Result<()> {
        let client = &ProvidersClient::new(&ctx.client);
        client.register(id).await?;
        wait_for_state(
            &format!("resource provider {}", id.resource_provider),
            &[REGISTERING, UNREGISTERED, FEATURE_NOT_REGISTERED],
            &[REGISTERED],
            ctx.client.poll,
            deadline,
            || async move { Ok::<_, Error>(client.get(id).await?.state().to_string()) },
        )
        .await?;
        Ok(())
    }

    async fn unregister_provider(ctx: &ProviderContext, id: &ResourceProviderId, deadline: Instant) -> Result<()> {
        let client = &ProvidersClient::new(&ctx.client);
        client.unregister(id).await?;
        wait_for_state(
            &format!("resource provider {}", id.resource_provider),
            &[UNREGISTERING, REGISTERED],
            &[UNREGISTERED, FEATURE_NOT_REGISTERED],
            ctx.client.poll,
            deadline,
            || async move { Ok::<_, Error>(client.get(id).await?.state().to_string()) },
        )
        .await?;
        Ok(())
    }

    /// Bring each configured feature to its desired state
    async fn reconcile_features(
        ctx: &ProviderContext,
        id: &ResourceProviderId,
        features: &[FeatureModel],
        deadline: Instant,
    ) -> Result<Vec<FeatureResult>> {
        let client = &FeaturesClient::new(&ctx.client);
        let mut results = Vec::with_capacity(features.len());

        for feature in features {
            let feature_id = &FeatureId::new(&id.subscription_id, &id.resource_provider, &feature.name);
            let current = client.get(feature_id).await?;
            if feature_is_registered(current.state()) == feature.registered {
                results.push(current);
                continue;
            }

            let description = format!("feature {}/{}", id.resource_provider, feature.name);
            let refresh = || async move { Ok::<_, Error>(client.get(feature_id).await?.state().to_string()) };
            if feature.registered {
                client.register(feature_id).await?;
                wait_for_state(
                    &description,
                    &[REGISTERING, UNREGISTERED, FEATURE_NOT_REGISTERED],
                    &[REGISTERED, FEATURE_PENDING],
                    ctx.client.poll,
                    deadline,
                    refresh,
                )
                .await?;
            } else {
                client.unregister(feature_id).await?;
                wait_for_state(
                    &description,
                    &[UNREGISTERING, REGISTERED, FEATURE_PENDING],
                    &[UNREGISTERED, FEATURE_NOT_REGISTERED],
                    ctx.client.poll,
                    deadline,
                    refresh,
                )
                .await?;
            }
            results.push(client.get(feature_id).await?);
        }

        Ok(results)
    }

    async fn apply(
        ctx: &ProviderContext,
        id: &ResourceProviderId,
        model: &ProviderRegistrationModel,
        deadline: Instant,
        is_new: bool,
    ) -> Result<ResourceState<ProviderRegistrationModel>> {
        model.validate()?;
        let _guard = ctx
            .locks
            .acquire(&LockKey::new(LOCK_NAMESPACE, id.resource_provider.as_str()))
            .await;

        let registered = Self::get_provider(ctx, id)
            .await?
            .is_some_and(|provider| provider.is_registered());
        if registered && is_new {
            return Err(Error::AlreadyExists { id: id.id() });
        }
        if !registered {
            Self::register_provider(ctx, id, deadline).await?;
        }

        let features = Self::reconcile_features(ctx, id, &model.features, deadline).await?;
        let provider = ProvidersClient::new(&ctx.client).get(id).await?;
        let status = RegistrationStatus { provider, features };
        Ok(ResourceState::new(id, ProviderRegistrationModel::from_response_body(id, &status)))
    }

    async fn fetch(
        ctx: &ProviderContext,
        id: &ResourceProviderId,
    ) -> Result<Option<ResourceState<ProviderRegistrationModel>>> {
        let provider = match Self::get_provider(ctx, id).await? {
            Some(provider) if provider.is_registered() => provider,
            _ => {
                tracing::info!("Resource provider {} is not registered", id.resource_provider);
                return Ok(None);
            }
        };

        // Only features that were explicitly registered are reported
        let features = FeaturesClient::new(&ctx.client)
            .list(id)
            .await?
            .into_iter()
            .filter(|feature| feature_is_registered(feature.state()))
            .collect();

        let status = RegistrationStatus { provider, features };
        Ok(Some(ResourceState::new(id, ProviderRegistrationModel::from_response_body(id, &status))))
    }

    async fn remove(ctx: &ProviderContext, id: &ResourceProviderId, deadline: Instant) -> Result<()> {
        let _guard = ctx
            .locks
            .acquire(&LockKey::new(LOCK_NAMESPACE, id.resource_provider.as_str()))
            .await;

        match Self::get_provider(ctx, id).await? {
            Some(provider) if provider.is_registered() => Self::unregister_provider(ctx, id, deadline).await,
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Resource for ProviderRegistration {
    type Model = ProviderRegistrationModel;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        model: &ProviderRegistrationModel,
    ) -> Result<ResourceState<ProviderRegistrationModel>> {
        let id = model.id(ctx.subscription_id());
        ctx.run(Operation::Create, &id, |deadline| Self::apply(ctx, &id, model, deadline, true))
            .await
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &ResourceProviderId,
    ) -> Result<Option<ResourceState<ProviderRegistrationModel>>> {
        ctx.run(Operation::Read, id, |_| Self::fetch(ctx, id)).await
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &ResourceProviderId,
        model: &ProviderRegistrationModel,
    ) -> Result<ResourceState<ProviderRegistrationModel>> {
        ctx.run(Operation::Update, id, |deadline| async move {
            ensure_same_id(id, &model.id(&id.subscription_id))?;
            Self::apply(ctx, id, model, deadline, false).await
        })
        .await
    }

    async fn delete(&self, ctx: &ProviderContext, id: &ResourceProviderId) -> Result<()> {
        ctx.run(Operation::Delete, id, |deadline| Self::remove(ctx, id, deadline)).await
    }
}

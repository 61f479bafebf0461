//! Resource abstraction layer
//!
//! Each resource type is a typed configuration model ([`ResourceModel`])
//! plus a handler ([`Resource`]) that maps create/read/update/delete onto
//! the typed REST clients in [`crate::sdk`].
//!
//! # Architecture
//!
//! - [`registry`] - Owned map from type name to handler, used by the CLI
//! - [`validate`] - Attribute validators shared by the models
//! - one module per resource type
//!
//! Handlers follow the same shape: build or parse the identifier, take the
//! lock on the remote object being mutated, read the current state, change a
//! local copy, submit it, poll if the service answers asynchronously. The
//! lock guard is dropped on every exit path.
//!
//! # Example
//!
//! ```ignore
//! use azrm::resource::{ProviderContext, Resource};
//! use azrm::resource::fallback_route::{FallbackRoute, FallbackRouteModel};
//!
//! async fn enable(ctx: &ProviderContext, model: FallbackRouteModel) -> azrm::Result<String> {
//!     let state = FallbackRoute.create(ctx, &model).await?;
//!     Ok(state.id)
//! }
//! ```

pub mod consumer_group;
pub mod enrichment;
pub mod fallback_route;
mod iothub;
pub mod provider_registration;
pub mod purview_account;
pub mod registry;
pub mod route;
pub mod validate;

pub use registry::ResourceRegistry;

use crate::arm::ArmClient;
use crate::error::{Error, Result, ResultExt};
use crate::locks::LockManager;
use crate::resourceid::ResourceId;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// CRUD operation kinds, each with its own deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    pub fn verb(&self) -> &'static str {
        match self {
            Operation::Create => "creating",
            Operation::Read => "reading",
            Operation::Update => "updating",
            Operation::Delete => "deleting",
        }
    }
}

/// Stand-in deadline for timeouts too large to add to an `Instant`
const UNBOUNDED_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// Upper bound on each CRUD operation, polling included
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(with = "minutes")]
    pub create: Duration,
    #[serde(with = "minutes")]
    pub read: Duration,
    #[serde(with = "minutes")]
    pub update: Duration,
    #[serde(with = "minutes")]
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(30 * 60),
            read: Duration::from_secs(5 * 60),
            update: Duration::from_secs(30 * 60),
            delete: Duration::from_secs(30 * 60),
        }
    }
}

impl Timeouts {
    pub fn for_operation(&self, operation: Operation) -> Duration {
        match operation {
            Operation::Create => self.create,
            Operation::Read => self.read,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }
}

mod minutes {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs() / 60)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(|m| Duration::from_secs(m.saturating_mul(60)))
    }
}

/// Everything a handler needs: the ARM client, the shared lock registry and
/// the per-operation timeouts
#[derive(Clone)]
pub struct ProviderContext {
    pub client: ArmClient,
    pub locks: Arc<LockManager>,
    pub timeouts: Timeouts,
}

impl ProviderContext {
    pub fn new(client: ArmClient) -> Self {
        Self {
            client,
            locks: Arc::new(LockManager::new()),
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_locks(mut self, locks: Arc<LockManager>) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn subscription_id(&self) -> &str {
        &self.client.subscription_id
    }

    /// Run one CRUD operation under its deadline
    ///
    /// The closure receives the deadline so poll loops inside it stop at the
    /// same instant. Any error is wrapped with the operation and `id`.
    pub async fn run<T, F, Fut>(
        &self,
        operation: Operation,
        id: &(dyn fmt::Display + Sync),
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(Instant) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let deadline = started
            .checked_add(self.timeouts.for_operation(operation))
            .unwrap_or(started + UNBOUNDED_TIMEOUT);
        tracing::info!("{} {}", operation.verb(), id);

        let result = match tokio::time::timeout_at(deadline, f(deadline)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                after: started.elapsed(),
            }),
        };

        match &result {
            Ok(_) => tracing::info!("Finished {} {} in {:?}", operation.verb(), id, started.elapsed()),
            Err(e) => tracing::warn!("Failed {} {}: {}", operation.verb(), id, e),
        }
        result.context_for(operation.verb(), id)
    }
}

/// A typed configuration model and its mapping to the wire
pub trait ResourceModel: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static {
    type Id: ResourceId + Clone + Send + Sync + 'static;
    /// Wire representation of the object this model manages
    type Body: Serialize + DeserializeOwned + Send + Sync;

    /// Reject configuration that can never be applied
    fn validate(&self) -> Result<()>;

    /// Identifier of the object this configuration describes
    fn id(&self, subscription_id: &str) -> Self::Id;

    fn to_request_body(&self) -> Self::Body;

    /// Rebuild the model from what the service reports
    fn from_response_body(id: &Self::Id, body: &Self::Body) -> Self;
}

/// Result of a successful create, read or update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState<M> {
    /// Canonical identifier to persist
    pub id: String,
    pub model: M,
}

impl<M: ResourceModel> ResourceState<M> {
    pub fn new(id: &M::Id, model: M) -> Self {
        Self { id: id.id(), model }
    }
}

/// Identifying attributes cannot change in place
pub(crate) fn ensure_same_id<I: ResourceId + PartialEq>(id: &I, configured: &I) -> Result<()> {
    if id != configured {
        return Err(Error::Validation(format!(
            "configuration describes {} but the resource is {}, changing identifying attributes requires replacing the resource",
            configured, id
        )));
    }
    Ok(())
}

/// CRUD handler for one resource type
#[async_trait]
pub trait Resource: Send + Sync {
    type Model: ResourceModel;

    /// Type name as used in configuration, e.g. `azurerm_iothub_route`
    fn type_name(&self) -> &'static str;

    async fn create(&self, ctx: &ProviderContext, model: &Self::Model) -> Result<ResourceState<Self::Model>>;

    /// `Ok(None)` when the remote object no longer exists
    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &<Self::Model as ResourceModel>::Id,
    ) -> Result<Option<ResourceState<Self::Model>>>;

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &<Self::Model as ResourceModel>::Id,
        model: &Self::Model,
    ) -> Result<ResourceState<Self::Model>>;

    async fn delete(&self, ctx: &ProviderContext, id: &<Self::Model as ResourceModel>::Id) -> Result<()>;
}

/// [`Resource`] with the model type erased to JSON, for the registry
#[async_trait]
pub trait DynResource: Send + Sync {
    fn type_name(&self) -> &'static str;

    /// Validate an identifier string, returning it in canonical form
    fn parse_id(&self, id: &str) -> Result<String>;

    async fn create(&self, ctx: &ProviderContext, config: Value) -> Result<ResourceState<Value>>;

    async fn read(&self, ctx: &ProviderContext, id: &str) -> Result<Option<ResourceState<Value>>>;

    async fn update(&self, ctx: &ProviderContext, id: &str, config: Value) -> Result<ResourceState<Value>>;

    async fn delete(&self, ctx: &ProviderContext, id: &str) -> Result<()>;
}

fn decode_config<M: ResourceModel>(type_name: &str, config: Value) -> Result<M> {
    serde_json::from_value(config)
        .map_err(|e| Error::Validation(format!("invalid {} configuration: {}", type_name, e)))
}

fn erase<M: ResourceModel>(state: ResourceState<M>) -> Result<ResourceState<Value>> {
    Ok(ResourceState {
        id: state.id,
        model: serde_json::to_value(state.model)?,
    })
}

/// Adapter exposing a [`Resource`] as a [`DynResource`]
pub struct Erased<R>(pub R);

#[async_trait]
impl<R> DynResource for Erased<R>
where
    R: Resource,
{
    fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    fn parse_id(&self, id: &str) -> Result<String> {
        <<R::Model as ResourceModel>::Id as ResourceId>::parse(id).map(|id| id.id())
    }

    async fn create(&self, ctx: &ProviderContext, config: Value) -> Result<ResourceState<Value>> {
        let model: R::Model = decode_config(self.0.type_name(), config)?;
        erase(self.0.create(ctx, &model).await?)
    }

    async fn read(&self, ctx: &ProviderContext, id: &str) -> Result<Option<ResourceState<Value>>> {
        let id = <<R::Model as ResourceModel>::Id as ResourceId>::parse(id)?;
        self.0.read(ctx, &id).await?.map(erase).transpose()
    }

    async fn update(&self, ctx: &ProviderContext, id: &str, config: Value) -> Result<ResourceState<Value>> {
        let id = <<R::Model as ResourceModel>::Id as ResourceId>::parse(id)?;
        let model: R::Model = decode_config(self.0.type_name(), config)?;
        erase(self.0.update(ctx, &id, &model).await?)
    }

    async fn delete(&self, ctx: &ProviderContext, id: &str) -> Result<()> {
        let id = <<R::Model as ResourceModel>::Id as ResourceId>::parse(id)?;
        self.0.delete(ctx, &id).await
    }
}

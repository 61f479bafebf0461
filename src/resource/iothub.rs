//! Shared read-modify-write of an IoT Hub's routing section
//!
//! Routes, the fallback route and enrichments are all stored in the hub
//! resource, so every handler touching them takes the same hub lock.

use super::ProviderContext;
use crate::error::Result;
use crate::locks::LockKey;
use crate::sdk::iothub::{IotHubClient, IotHubDescription, IotHubId, RoutingProperties};
use tokio::time::Instant;

pub(crate) const LOCK_NAMESPACE: &str = "azurerm_iothub";

pub(crate) fn hub_lock(hub: &IotHubId) -> LockKey {
    LockKey::new(LOCK_NAMESPACE, hub.name.as_str())
}

/// The hub, or `None` when it no longer exists
pub(crate) async fn get_hub(ctx: &ProviderContext, hub: &IotHubId) -> Result<Option<IotHubDescription>> {
    match IotHubClient::new(&ctx.client).get(hub).await {
        Ok(description) => Ok(Some(description)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Apply `mutate` to the hub's routing and write the hub back
///
/// `mutate` returns `false` when the routing already matches, in which case
/// nothing is written. The hub lock is held from the read until the write
/// has finished.
pub(crate) async fn update_routing<F>(
    ctx: &ProviderContext,
    hub: &IotHubId,
    deadline: Instant,
    mutate: F,
) -> Result<IotHubDescription>
where
    F: FnOnce(&mut RoutingProperties) -> Result<bool> + Send,
{
    let _guard = ctx.locks.acquire(&hub_lock(hub)).await;
    let client = IotHubClient::new(&ctx.client);

    let mut description = client.get(hub).await?;
    if !mutate(description.routing_mut())? {
        tracing::debug!("Routing of {} is unchanged, skipping update", hub);
        return Ok(description);
    }

    client
        .create_or_update_then_poll(hub, &description, None, deadline)
        .await
}

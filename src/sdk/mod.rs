//! Typed REST clients
//!
//! One module per ARM service. Each declares its resource ID types, the wire
//! models exchanged with the service and a thin client over
//! [`ArmClient`](crate::arm::ArmClient). Wire models keep unknown fields in a
//! flattened `extra` map so read-modify-write cycles never drop properties
//! this crate does not model.
//!
//! - [`iothub`] - IoT Hubs, routing and consumer groups (`2020-03-01`)
//! - [`purview`] - Purview accounts (`2020-12-01-preview`)
//! - [`resources`] - Resource provider registration (`2016-02-01`)
//! - [`features`] - Preview feature registration (`2015-12-01`)
//! - [`streamanalytics`] - Stream Analytics output testing (`2020-03-01`)

pub mod features;
pub mod iothub;
pub mod purview;
pub mod resources;
pub mod streamanalytics;

use crate::arm::{ArmClient, Poller};
use crate::error::Result;
use reqwest::Method;
use serde_json::Value;
use url::Url;

/// Send the initial request of a long-running operation
pub(crate) async fn begin(
    client: &ArmClient,
    method: Method,
    url: Url,
    body: Option<&Value>,
    if_match: Option<&str>,
) -> Result<Poller> {
    let response = client.send(method.clone(), &url, body, if_match).await?;
    Poller::from_response(client.clone(), method, url, response)
}

/// Serialize a wire model for a request body
pub(crate) fn to_body<T: serde::Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

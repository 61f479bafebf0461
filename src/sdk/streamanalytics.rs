//! Stream Analytics outputs client
//!
//! Only the connectivity test is exposed. It is a POST long-running
//! operation whose result is a [`ResourceTestStatus`].

use super::{begin, to_body};
use crate::arm::{ArmClient, Poller};
use crate::error::{Error, Result};
use crate::resource_id;
use crate::resourceid::ResourceId;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;

pub const API_VERSION: &str = "2020-03-01";

resource_id! {
    /// An output of a Stream Analytics job
    pub struct OutputId("Output") {
        "subscriptions" => subscription_id,
        "resourceGroups" => resource_group,
        "providers" = "Microsoft.StreamAnalytics",
        "streamingjobs" => streaming_job_name,
        "outputs" => name,
    }
}

/// Output definition to test. An empty body tests the output as stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Output {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTestStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TestError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub struct OutputsClient<'a> {
    client: &'a ArmClient,
}

impl<'a> OutputsClient<'a> {
    pub fn new(client: &'a ArmClient) -> Self {
        Self { client }
    }

    /// Start testing whether the output's datasource is reachable
    pub async fn test(&self, id: &OutputId, output: &Output) -> Result<Poller> {
        tracing::debug!("Testing output {}", id);
        let path = format!("{}/test", id.to_url_path());
        let url = self.client.resource_url(&path, API_VERSION)?;
        let body = to_body(output)?;
        begin(self.client, Method::POST, url, Some(&body), None).await
    }

    /// [`test`](Self::test) driven to completion
    pub async fn test_then_poll(
        &self,
        id: &OutputId,
        output: &Output,
        deadline: Instant,
    ) -> Result<ResourceTestStatus> {
        let mut poller = self.test(id, output).await?;
        let body = poller.poll_until_done(deadline).await?;
        if body.is_null() {
            return Err(Error::OperationFailed {
                code: "EmptyResult".to_string(),
                message: format!("testing {} returned no status", id),
            });
        }
        Ok(serde_json::from_value(body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_id() {
        let input = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.StreamAnalytics/streamingjobs/job1/outputs/out1";
        let id = OutputId::parse(input).unwrap();
        assert_eq!(id.streaming_job_name, "job1");
        assert_eq!(id.name, "out1");
        assert!(OutputId::parse(&input.replace("streamingjobs", "streamingJobs")).is_err());
    }

    #[test]
    fn test_empty_output_body() {
        assert_eq!(serde_json::to_value(Output::default()).unwrap(), serde_json::json!({}));
    }
}

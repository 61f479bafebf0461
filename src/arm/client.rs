//! ARM Client
//!
//! Main client for interacting with Azure Resource Manager, combining
//! authentication, HTTP and polling settings.

use super::auth::ArmCredentials;
use super::http::{ApiResponse, ArmHttpClient};
use super::retry::RetryPolicy;
use crate::error::{Error, Result};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Public cloud Resource Manager endpoint
pub const DEFAULT_ENDPOINT: &str = "https://management.azure.com";

/// Default delay between polls when the server sends no `Retry-After`
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// How long-running operations are polled
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            retry: RetryPolicy::default(),
        }
    }
}

/// Main ARM client
#[derive(Clone)]
pub struct ArmClient {
    pub credentials: ArmCredentials,
    pub http: ArmHttpClient,
    pub subscription_id: String,
    pub poll: PollSettings,
    base_url: Url,
}

/// One page of an ARM list response
#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "nextLink", default)]
    next_link: Option<String>,
}

impl ArmClient {
    pub fn new(credentials: ArmCredentials, subscription_id: &str, endpoint: &str) -> Result<Self> {
        let base_url = Url::parse(endpoint)
            .map_err(|e| Error::Validation(format!("invalid endpoint {:?}: {}", endpoint, e)))?;

        Ok(Self {
            credentials,
            http: ArmHttpClient::new()?,
            subscription_id: subscription_id.to_string(),
            poll: PollSettings::default(),
            base_url,
        })
    }

    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.base_url
    }

    /// Build a request URL from an ID-style path and an API version
    pub fn resource_url(&self, path: &str, api_version: &str) -> Result<Url> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| Error::Validation(format!("invalid request path {:?}: {}", path, e)))?;
        url.query_pairs_mut().append_pair("api-version", api_version);
        Ok(url)
    }

    /// Resolve a URL handed out by the server (polling or paging links)
    pub fn absolute_url(&self, link: &str) -> Result<Url> {
        self.base_url
            .join(link)
            .map_err(|e| Error::Validation(format!("invalid link {:?}: {}", link, e)))
    }

    /// Send a request to an already-built URL
    pub async fn send(
        &self,
        method: Method,
        url: &Url,
        body: Option<&Value>,
        if_match: Option<&str>,
    ) -> Result<ApiResponse> {
        let token = self.credentials.get_token().await?;
        self.http.send(method, url, &token, body, if_match).await
    }

    pub async fn get(&self, path: &str, api_version: &str) -> Result<ApiResponse> {
        let url = self.resource_url(path, api_version)?;
        self.send(Method::GET, &url, None, None).await
    }

    pub async fn put(&self, path: &str, api_version: &str, body: &Value) -> Result<ApiResponse> {
        let url = self.resource_url(path, api_version)?;
        self.send(Method::PUT, &url, Some(body), None).await
    }

    pub async fn patch(&self, path: &str, api_version: &str, body: &Value) -> Result<ApiResponse> {
        let url = self.resource_url(path, api_version)?;
        self.send(Method::PATCH, &url, Some(body), None).await
    }

    pub async fn post(&self, path: &str, api_version: &str, body: Option<&Value>) -> Result<ApiResponse> {
        let url = self.resource_url(path, api_version)?;
        self.send(Method::POST, &url, body, None).await
    }

    pub async fn delete(&self, path: &str, api_version: &str) -> Result<ApiResponse> {
        let url = self.resource_url(path, api_version)?;
        self.send(Method::DELETE, &url, None, None).await
    }

    /// Fetch every item of a list operation, following `nextLink`
    pub async fn list_all<T: DeserializeOwned>(&self, path: &str, api_version: &str) -> Result<Vec<T>> {
        let mut all_items = Vec::new();
        let mut url = self.resource_url(path, api_version)?;

        loop {
            let response = self.send(Method::GET, &url, None, None).await?;
            let page: Page<T> = response.json()?;
            all_items.extend(page.value);

            match page.next_link.filter(|link| !link.is_empty()) {
                Some(link) => url = self.absolute_url(&link)?,
                None => break,
            }
        }

        Ok(all_items)
    }

    /// `/subscriptions/{id}` for the configured subscription
    pub fn subscription_path(&self) -> String {
        format!("/subscriptions/{}", self.subscription_id)
    }
}

//! Configuration Management
//!
//! Handles persistent configuration storage for azrm. Values resolve as
//! command line flag, then config file, then environment.

use crate::arm::auth::{self, ArmCredentials, TokenSource, DEFAULT_AUTHORITY};
use crate::arm::client::{DEFAULT_ENDPOINT, DEFAULT_POLL_INTERVAL};
use crate::arm::retry::RetryPolicy;
use crate::arm::PollSettings;
use crate::resource::Timeouts;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Subscription to manage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    /// Entra ID tenant for the client-credentials flow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Service principal application ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Resource Manager endpoint, for sovereign clouds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Delay between polls when the service sends no `Retry-After`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeouts: Option<Timeouts>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("azrm").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from an explicit path, falling back to defaults when the file
    /// is missing or unreadable
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid config file {:?}: {}", path, e);
                Self::default()
            }),
            Err(e) => {
                tracing::warn!("Could not read config file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("writing config file {:?}", path))?;

        Ok(())
    }

    /// Get effective subscription (CLI > config > environment)
    pub fn effective_subscription(&self, cli: Option<&str>) -> Option<String> {
        cli.map(str::to_string)
            .or_else(|| self.subscription_id.clone())
            .or_else(auth::get_default_subscription)
    }

    /// Get effective endpoint (CLI > config > `ARM_ENDPOINT` > public cloud)
    pub fn effective_endpoint(&self, cli: Option<&str>) -> String {
        cli.map(str::to_string)
            .or_else(|| self.endpoint.clone())
            .or_else(|| env_var("ARM_ENDPOINT"))
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: self
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
            retry: self.retry.unwrap_or_default(),
        }
    }

    pub fn effective_timeouts(&self) -> Timeouts {
        self.timeouts.unwrap_or_default()
    }

    /// Build credentials for `endpoint`
    ///
    /// `ARM_ACCESS_TOKEN` wins when set. Otherwise a service principal is
    /// used: tenant and client ID from config or environment, the secret
    /// only ever from `ARM_CLIENT_SECRET`.
    pub fn credentials(&self, endpoint: &str) -> Result<ArmCredentials> {
        if self.tenant_id.is_none() && self.client_id.is_none() {
            return ArmCredentials::from_env(endpoint).context("no ARM credentials configured");
        }

        if let Some(token) = env_var("ARM_ACCESS_TOKEN") {
            return Ok(ArmCredentials::new(TokenSource::Static(token), endpoint));
        }

        let tenant_id = self
            .tenant_id
            .clone()
            .or_else(|| env_var("ARM_TENANT_ID"))
            .context("no tenant configured, set ARM_TENANT_ID or tenant_id in the config file")?;
        let client_id = self
            .client_id
            .clone()
            .or_else(|| env_var("ARM_CLIENT_ID"))
            .context("no client configured, set ARM_CLIENT_ID or client_id in the config file")?;
        let client_secret = env_var("ARM_CLIENT_SECRET").context("ARM_CLIENT_SECRET is not set")?;

        let source = TokenSource::ClientSecret {
            authority: env_var("ARM_AUTHORITY").unwrap_or_else(|| DEFAULT_AUTHORITY.to_string()),
            tenant_id,
            client_id,
            client_secret,
        };
        Ok(ArmCredentials::new(source, endpoint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("azrm-config-test-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn test_round_trip_through_file() {
        let path = temp_path("config.json");
        let config = Config {
            subscription_id: Some("12345678-1234-9876-4563-123456789012".to_string()),
            poll_interval_secs: Some(3),
            retry: Some(RetryPolicy {
                max_retries: 2,
                ..RetryPolicy::default()
            }),
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path), config);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_missing_or_invalid_file_gives_defaults() {
        let path = temp_path("config.json");
        assert_eq!(Config::load_from(&path), Config::default());

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_cli_takes_precedence() {
        let config = Config {
            subscription_id: Some("from-config".to_string()),
            endpoint: Some("https://management.usgovcloudapi.net".to_string()),
            ..Config::default()
        };
        assert_eq!(config.effective_subscription(Some("from-cli")).as_deref(), Some("from-cli"));
        assert_eq!(config.effective_subscription(None).as_deref(), Some("from-config"));
        assert_eq!(
            config.effective_endpoint(Some("http://localhost:8080")),
            "http://localhost:8080"
        );
        assert_eq!(config.effective_endpoint(None), "https://management.usgovcloudapi.net");
    }

    #[test]
    fn test_poll_settings_defaults() {
        let settings = Config::default().poll_settings();
        assert_eq!(settings.interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(settings.retry, RetryPolicy::default());

        let config = Config {
            poll_interval_secs: Some(1),
            ..Config::default()
        };
        assert_eq!(config.poll_settings().interval, Duration::from_secs(1));
    }
}

//! Azure Resource Manager interaction module
//!
//! This module provides the core functionality for talking to the ARM REST
//! API: authentication, the HTTP client, URL building and paging, and
//! long-running operation polling.
//!
//! # Module Structure
//!
//! - [`auth`] - Bearer tokens from a static token or a service principal
//! - [`client`] - Main ARM client for making API requests
//! - [`http`] - HTTP utilities and error classification
//! - [`poller`] - Long-running operation polling
//! - [`retry`] - Backoff policy for transient failures
//!
//! # Example
//!
//! ```ignore
//! use azrm::arm::{auth::ArmCredentials, client::ArmClient};
//!
//! async fn example() -> azrm::Result<()> {
//!     let credentials = ArmCredentials::from_env("https://management.azure.com")?;
//!     let client = ArmClient::new(credentials, "00000000-0000-0000-0000-000000000000", "https://management.azure.com")?;
//!     let providers = client.get("/subscriptions/00000000-0000-0000-0000-000000000000/providers", "2016-02-01").await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod poller;
pub mod retry;

pub use client::{ArmClient, PollSettings};
pub use poller::{Outcome, PollState, PollStrategy, Poller};

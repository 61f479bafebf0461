//! azrm - Azure Resource Manager provider
//!
//! Typed resource identifiers, a long-running-operation poller and a named
//! lock, plus resource handlers built on them.

pub mod arm;
pub mod config;
pub mod error;
pub mod locks;
pub mod resource;
pub mod resourceid;
pub mod sdk;

pub use error::{Error, Result};

//! Error types
//!
//! Every fallible operation in the library returns [`Error`]. Handlers wrap
//! failures with the operation name and resource ID via [`ResultExt`] before
//! they reach the caller, so the original cause is always preserved in the
//! `source()` chain.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using the provider [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Provider error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed resource ID {input:?}: {reason}")]
    MalformedIdentifier { input: String, reason: String },

    #[error("{resource} was not found")]
    NotFound { resource: String },

    #[error("transient transport error: {message}")]
    Transient { message: String },

    #[error("API request failed with status {status}: {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("long-running operation failed: {code}: {message}")]
    OperationFailed { code: String, message: String },

    #[error("operation timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("{id} already exists - it must be imported into state to be managed")]
    AlreadyExists { id: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{operation} {id}: {source}")]
    Context {
        operation: String,
        id: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn malformed(input: &str, reason: impl Into<String>) -> Self {
        Self::MalformedIdentifier {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Wrap this error with the failing operation and resource ID
    pub fn context(self, operation: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Context {
            operation: operation.into(),
            id: id.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any `Context` wrappers
    pub fn root(&self) -> &Error {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::NotFound { .. })
    }

    /// Whether retrying the same request could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self.root(), Self::Transient { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), Self::Timeout { .. })
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return Self::transient(err.to_string());
        }
        if let Some(status) = err.status() {
            if status.is_server_error() || status.as_u16() == 429 {
                return Self::transient(err.to_string());
            }
            return Self::Api {
                status: status.as_u16(),
                code: status.canonical_reason().unwrap_or("Unknown").to_string(),
                message: err.to_string(),
            };
        }
        if err.is_decode() {
            return Self::Api {
                status: 0,
                code: "InvalidResponse".to_string(),
                message: err.to_string(),
            };
        }
        Self::transient(err.to_string())
    }
}

/// Adds handler context to results
pub trait ResultExt<T> {
    fn context_for(self, operation: &str, id: &dyn std::fmt::Display) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context_for(self, operation: &str, id: &dyn std::fmt::Display) -> Result<T> {
        self.map_err(|e| e.context(operation, id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_preserves_classification() {
        let err = Error::NotFound {
            resource: "hub1".to_string(),
        }
        .context("reading", "/subscriptions/x");
        assert!(err.is_not_found());
        assert!(!err.is_transient());

        let err = Error::transient("connection reset").context("polling", "op");
        assert!(err.is_transient());
    }

    #[test]
    fn test_context_display_includes_operation_and_id() {
        let err = Error::Validation("bad".to_string()).context("creating", "hub1");
        let rendered = err.to_string();
        assert!(rendered.starts_with("creating hub1:"));
        assert!(rendered.contains("invalid configuration: bad"));
    }

    #[test]
    fn test_source_chain() {
        use std::error::Error as _;
        let err = Error::Timeout {
            after: Duration::from_secs(3),
        }
        .context("deleting", "x");
        let source = err.source().expect("context has a source");
        assert!(source.to_string().contains("timed out"));
        assert!(err.is_timeout());
    }
}

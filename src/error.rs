//! # Provisioner Error Types
//!
//! Structured error handling for the provisioning state machine using
//! thiserror instead of `Box<dyn Error>` patterns.
//!
//! The taxonomy follows the handling policy of the state machine: structural
//! errors (corrupted progress context) are fatal and never retried; cloud
//! collaborator failures carry the operation that raised them; everything a
//! step classifies as benign or transient never surfaces here at all.

use crate::clients::CloudError;
use thiserror::Error;

/// Errors surfaced by the dispatcher and lifecycle entry points.
#[derive(Error, Debug)]
pub enum ProvisionerError {
    /// The persisted progress context carries a status tag that matches no
    /// registered step. Indicates context corruption; never retryable.
    #[error("context corruption: unknown status tag '{tag}'")]
    UnknownStatusTag { tag: String },

    /// A step required a context key that earlier steps should have written.
    #[error("context corruption: missing required key '{key}' for status '{status}'")]
    MissingContextKey { key: String, status: String },

    /// The progress context wire map could not be decoded.
    #[error("context decode error: {message}")]
    ContextDecode { message: String },

    /// A cloud collaborator call failed in a way the step could not classify
    /// as benign or transient.
    #[error("cloud operation '{operation}' failed: {source}")]
    Cloud {
        operation: String,
        #[source]
        source: CloudError,
    },

    /// Configuration could not be loaded or validated.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Internal invariant violation.
    #[error("internal provisioner error: {message}")]
    Internal { message: String },
}

impl ProvisionerError {
    /// Create an unknown-status-tag error.
    pub fn unknown_status_tag(tag: impl Into<String>) -> Self {
        Self::UnknownStatusTag { tag: tag.into() }
    }

    /// Create a missing-context-key error.
    pub fn missing_context_key(key: impl Into<String>, status: impl Into<String>) -> Self {
        Self::MissingContextKey {
            key: key.into(),
            status: status.into(),
        }
    }

    /// Create a context decode error.
    pub fn context_decode(message: impl Into<String>) -> Self {
        Self::ContextDecode {
            message: message.into(),
        }
    }

    /// Wrap a cloud collaborator failure with the operation that raised it.
    pub fn cloud(operation: impl Into<String>, source: CloudError) -> Self {
        Self::Cloud {
            operation: operation.into(),
            source,
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Structural errors indicate a corrupted progress context and must be
    /// surfaced to the host as an internal failure, never retried.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::UnknownStatusTag { .. }
                | Self::MissingContextKey { .. }
                | Self::ContextDecode { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ProvisionerError>;

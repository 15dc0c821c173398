//! Error types for the reconciliation core
//!
//! Only fatal conditions are errors. Per-resource apply failures are
//! reported as [`ChangeResult`](crate::types::ChangeResult) values instead.

use crate::types::Operation;
use crate::validation::ValidationErrors;
use thiserror::Error;

/// Errors that abort a reconciliation
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed configuration (extension parameters, connection settings)
    #[error("invalid configuration for {scope}: {message}")]
    Configuration {
        /// Extension or configuration section the error belongs to
        scope: String,
        /// What is wrong
        message: String,
    },

    /// One or more validations rejected the desired state
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// The remote control-plane did not report enough nodes in time
    #[error(
        "remote system not ready after {elapsed_ms}ms: \
         {available} node(s) available, {required} required"
    )]
    ReadinessTimeout {
        /// Minimum number of nodes required
        required: usize,
        /// Nodes reported by the last successful poll
        available: usize,
        /// Time spent waiting
        elapsed_ms: u128,
    },

    /// The connection to the remote system could not be established
    #[error("connection error: {0}")]
    Connection(String),

    /// A remote call failed as a whole (not attributable to a single resource)
    #[error("remote error: {0}")]
    Remote(String),

    /// No handler is registered for an operation on a resource kind
    #[error("no change handler registered for {operation} on kind {kind}")]
    MissingHandler {
        /// Resource kind
        kind: String,
        /// Operation without handler
        operation: Operation,
    },
}

impl Error {
    /// Shorthand for a configuration error
    pub fn configuration(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            scope: scope.into(),
            message: message.into(),
        }
    }

    /// Whether the error means the remote system or the setup is unusable.
    ///
    /// Only configuration, readiness and connection errors are fatal.
    /// Validation errors describe the desired state, and remote or
    /// missing-handler errors concern one reconciliation run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::ReadinessTimeout { .. } | Self::Connection(_)
        )
    }
}

/// Result type for reconciliation operations
pub type Result<T> = std::result::Result<T, Error>;

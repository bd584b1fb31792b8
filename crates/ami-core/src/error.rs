//! Error types for ami-core
//!
//! Every outcome a command caller can observe is one of these variants:
//! a protocol-level failure carried in an `Error` response, a generic
//! failure for responses with a missing or unknown status, a transmission
//! failure reported synchronously by the connection, or a teardown failure
//! (`ConnectionLost`, `Timeout`) issued by the correlation registry.

use thiserror::Error;

use crate::correlation::ActionId;

/// Errors produced by the AMI correlation and dispatch layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmiError {
    /// An action ID was registered while a previous registration with the
    /// same ID was still pending
    #[error("Duplicate action ID: {0}")]
    DuplicateActionId(ActionId),

    /// The connection refused to accept the action for transmission
    #[error("Transmission failed: {0}")]
    Transmission(String),

    /// Asterisk answered with `Response: Error`
    #[error("{message}")]
    Protocol { message: String },

    /// Asterisk answered with a missing or unexpected response status
    #[error("error")]
    Failed,

    /// The connection went away while the action was pending
    #[error("Connection lost: {reason}")]
    ConnectionLost { reason: String },

    /// No response arrived before the registration deadline
    #[error("No response for action {0} before deadline")]
    Timeout(ActionId),

    /// No command handler is registered under the requested name
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// A required command argument was not supplied
    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    /// A command argument was supplied but is unusable
    #[error("Invalid argument {name}: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    /// A handler faulted while processing a frame
    #[error("Internal error: {0}")]
    Internal(String),

    /// The downstream event sink was already attached
    #[error("Event sink already attached")]
    AlreadyAttached,

    /// Configuration is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Wire data could not be decoded
    #[error("Codec error: {0}")]
    Codec(String),
}

impl AmiError {
    /// Returns true if the error originated on the Asterisk side
    pub fn is_protocol(&self) -> bool {
        matches!(self, AmiError::Protocol { .. } | AmiError::Failed)
    }

    /// Returns true if the error was issued because the action could not be
    /// delivered or its connection went away
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            AmiError::Transmission(_) | AmiError::ConnectionLost { .. } | AmiError::Timeout(_)
        )
    }
}

/// Result type for ami-core operations
pub type AmiResult<T> = std::result::Result<T, AmiError>;

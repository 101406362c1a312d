//! Error types for the SkyWatch collaborator layer.

use thiserror::Error;

/// Errors returned by collaborators (track source, registry, areas, channel).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvError {
    /// Request could not be delivered or the peer is unreachable
    #[error("Transport error: {0}")]
    Transport(String),

    /// Requested entity does not exist on the collaborator side
    #[error("Not found: {0}")]
    NotFound(String),

    /// Entity with the same unique key already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Request was understood but refused (missing parameters, etc.)
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Payload serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EnvError {
    /// Creates a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates a not-found error.
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    /// True for failures where retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, EnvError::Transport(_))
    }
}

impl From<serde_json::Error> for EnvError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

//! Shardline Error Types

use thiserror::Error;

use crate::types::{DataType, NodeId, RoutingKey};

/// Result type alias for Shardline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Shardline error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid layout document: {0}")]
    LayoutParse(#[from] serde_json::Error),

    /// Raised when a raw selection policy value does not name a known policy.
    /// This is a programming or deployment defect and is never retried.
    #[error("Unknown member selection policy: {0}")]
    UnknownPolicy(String),

    #[error("Unknown data type: {0}")]
    UnknownDataType(DataType),

    // Addressing errors
    #[error("No members found for {0}")]
    NoMembers(RoutingKey),

    #[error("Node {node} does not host {key}")]
    NodeNotInShard { node: NodeId, key: RoutingKey },

    #[error("Node {node} is not a member of the shard for {key}; ordered calls are not allowed")]
    NotAShardMember { node: NodeId, key: RoutingKey },

    // Call errors
    #[error("Node {0} is unreachable")]
    NodeUnreachable(NodeId),

    #[error("Call timed out after {0:?}")]
    CallTimeout(std::time::Duration),

    #[error("Pending result was dropped before a reply arrived")]
    ResultDropped,

    #[error("Unexpected reply: expected {expected}, got {actual}")]
    UnexpectedReply {
        expected: &'static str,
        actual: &'static str,
    },

    // Lifecycle errors
    #[error("Action dispatcher is closed")]
    DispatcherClosed,

    #[error("Shutdown in progress")]
    ShuttingDown,

    #[error("Node {0} has left the group")]
    NotInGroup(NodeId),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error is retryable
    ///
    /// A retry is the caller's job: refresh the member cache with
    /// `pick_member(.., retry = true)` and reissue the call.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::NodeUnreachable(_)
                | Error::CallTimeout(_)
                | Error::NodeNotInShard { .. }
                | Error::NoMembers(_)
        )
    }

    /// Check if this error should stop the program rather than be handled
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::UnknownPolicy(_))
    }
}

//! Error types for coordination operations.
//!
//! `CoordinationError` mirrors the error codes a ZooKeeper-like service
//! reports, plus transport-level failures, so callers can tell a benign race
//! (`NodeExists`) from a fatal one (`NoAuth`) from a transient one.
//! `NodeError` covers misuse of a [`PersistentNode`].
//!
//! [`PersistentNode`]: crate::node::PersistentNode

use thiserror::Error;

/// Top-level error type for the zk-coordination crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinationError {
    /// The node (or, for create, its parent) does not exist.
    #[error("no node: {0}")]
    NoNode(String),

    /// A node already exists at the path.
    #[error("node exists: {0}")]
    NodeExists(String),

    /// The session is not authorised to perform the operation.
    #[error("not authorised: {0}")]
    NoAuth(String),

    /// The node has children and the delete was not recursive.
    #[error("node not empty: {0}")]
    NotEmpty(String),

    /// Conditional update did not match the node's current version.
    #[error("bad version for {path}: expected {expected}, found {actual}")]
    BadVersion {
        path: String,
        expected: i32,
        actual: i32,
    },

    /// Ephemeral nodes cannot have children.
    #[error("ephemeral nodes cannot have children: {0}")]
    NoChildrenForEphemerals(String),

    /// The path is malformed.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The session expired; ephemeral nodes owned by it are gone.
    #[error("session expired")]
    SessionExpired,

    /// Connection or transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Operation timed out waiting for a response.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The client is not connected or was closed.
    #[error("not connected: {0}")]
    NotConnected(String),

    /// Codec error during serialization or deserialization.
    #[error("codec error: {0}")]
    Codec(String),
}

impl CoordinationError {
    /// Returns true if this error indicates a transient failure that may
    /// succeed on retry (transport, timeout, or lost connection).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoordinationError::Transport(_)
                | CoordinationError::Timeout(_)
                | CoordinationError::NotConnected(_)
        )
    }

    /// Returns true for `NoNode`.
    pub fn is_no_node(&self) -> bool {
        matches!(self, CoordinationError::NoNode(_))
    }

    /// Returns true for `NodeExists`.
    pub fn is_node_exists(&self) -> bool {
        matches!(self, CoordinationError::NodeExists(_))
    }

    /// Returns true for `NoAuth`.
    pub fn is_no_auth(&self) -> bool {
        matches!(self, CoordinationError::NoAuth(_))
    }
}

/// Shorthand result alias for coordination operations.
pub type CoordinationResult<T> = Result<T, CoordinationError>;

/// Usage errors surfaced by [`PersistentNode`].
///
/// [`PersistentNode`]: crate::node::PersistentNode
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("already started")]
    AlreadyStarted,

    #[error("node was closed and cannot be started again")]
    NotStartable,

    #[error("not started")]
    NotStarted,

    #[error("data is empty")]
    EmptyData,

    #[error("initial create has not been processed")]
    NotCreated,

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error(transparent)]
    Coordination(#[from] CoordinationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let transport = CoordinationError::Transport("conn reset".into());
        assert!(transport.is_retryable());
        assert!(!transport.is_no_node());

        let timeout = CoordinationError::Timeout("deadline exceeded".into());
        assert!(timeout.is_retryable());

        let not_conn = CoordinationError::NotConnected("closed".into());
        assert!(not_conn.is_retryable());

        let exists = CoordinationError::NodeExists("/a".into());
        assert!(!exists.is_retryable());
        assert!(exists.is_node_exists());

        let auth = CoordinationError::NoAuth("/a".into());
        assert!(!auth.is_retryable());
        assert!(auth.is_no_auth());

        assert!(CoordinationError::NoNode("/a".into()).is_no_node());
        assert!(!CoordinationError::SessionExpired.is_retryable());
        assert!(!CoordinationError::Codec("bad json".into()).is_retryable());
        assert!(!CoordinationError::NotEmpty("/a".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = CoordinationError::BadVersion {
            path: "/a".into(),
            expected: 1,
            actual: 2,
        };
        let msg = format!("{err}");
        assert!(msg.contains("expected 1"));
        assert!(msg.contains("found 2"));

        let err = NodeError::from(CoordinationError::NoAuth("/locks".into()));
        assert_eq!(err.to_string(), "not authorised: /locks");
        assert_eq!(NodeError::AlreadyStarted.to_string(), "already started");
    }
}

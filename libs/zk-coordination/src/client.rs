//! Coordination client contract.
//!
//! `CoordinationClient` is the seam between this crate and the service that
//! actually holds the tree. It owns the session, reconnection and any retry
//! of its own; callers only see completed operations, single-use [`Watch`]
//! tokens and a broadcast of [`ConnectionState`] transitions.

use async_trait::async_trait;
use tokio::sync::{broadcast, oneshot};

use crate::error::CoordinationResult;
use crate::models::{ConnectionState, CreateMode, Stat, WatchedEvent};

/// Operations a coordination service client must provide.
///
/// Every async method completes on whatever task awaits it, so a caller that
/// wants callback semantics spawns the call and handles the result there.
#[async_trait]
pub trait CoordinationClient: Send + Sync + std::fmt::Debug + 'static {
    /// Create a node and return the path the service assigned (differs from
    /// `path` for sequential modes).
    ///
    /// With `create_parents`, missing ancestors are created as persistent
    /// empty nodes.
    async fn create(
        &self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
        create_parents: bool,
    ) -> CoordinationResult<String>;

    /// Replace a node's data. `version` makes the write conditional.
    async fn set_data(&self, path: &str, data: &[u8], version: Option<i32>)
    -> CoordinationResult<Stat>;

    /// Read a node's data and stat.
    async fn get_data(&self, path: &str) -> CoordinationResult<(Vec<u8>, Stat)>;

    /// Stat of the node, `None` if it does not exist.
    async fn check_exists(&self, path: &str) -> CoordinationResult<Option<Stat>>;

    /// Like [`check_exists`], and arm a one-shot watch on `path`.
    ///
    /// The watch is armed whether or not the node exists; it reports the
    /// next create, delete or data change exactly once.
    ///
    /// [`check_exists`]: CoordinationClient::check_exists
    async fn check_exists_and_watch(&self, path: &str)
    -> CoordinationResult<(Option<Stat>, Watch)>;

    /// Names (not paths) of the node's direct children.
    async fn get_children(&self, path: &str) -> CoordinationResult<Vec<String>>;

    /// Delete a node, and its whole subtree when `delete_children` is set.
    async fn delete(&self, path: &str, delete_children: bool) -> CoordinationResult<()>;

    /// Subscribe to connection state transitions.
    fn connection_events(&self) -> broadcast::Receiver<ConnectionState>;

    /// Last known connection state.
    fn connection_state(&self) -> ConnectionState;

    /// Current session id, used as the owner of ephemeral nodes.
    fn session_id(&self) -> i64;

    /// End the session. Ephemeral nodes owned by it are removed.
    async fn close(&self) -> CoordinationResult<()>;
}

/// Single-use watch token returned by
/// [`CoordinationClient::check_exists_and_watch`].
///
/// Resolves to the event that fired it, or `None` if the service discarded
/// the watch (session loss, client closed).
#[derive(Debug)]
pub struct Watch {
    path: String,
    rx: oneshot::Receiver<WatchedEvent>,
}

impl Watch {
    /// Create a watch and the sender a client implementation fires it with.
    pub fn channel(path: impl Into<String>) -> (oneshot::Sender<WatchedEvent>, Watch) {
        let (tx, rx) = oneshot::channel();
        (
            tx,
            Watch {
                path: path.into(),
                rx,
            },
        )
    }

    /// Path the watch was armed on.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Wait for the watch to fire.
    pub async fn fired(self) -> Option<WatchedEvent> {
        self.rx.await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventType;

    #[tokio::test]
    async fn test_watch_fires_once() {
        let (tx, watch) = Watch::channel("/a");
        assert_eq!(watch.path(), "/a");
        tx.send(WatchedEvent {
            event_type: EventType::NodeDeleted,
            path: "/a".into(),
        })
        .unwrap();
        let event = watch.fired().await.unwrap();
        assert_eq!(event.event_type, EventType::NodeDeleted);
    }

    #[tokio::test]
    async fn test_dropped_watch_resolves_none() {
        let (tx, watch) = Watch::channel("/a");
        drop(tx);
        assert!(watch.fired().await.is_none());
    }
}

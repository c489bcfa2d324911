//! Path-level helpers on top of a [`CoordinationClient`].
//!
//! `NodeStore` is a thin convenience layer: child listing, get/set/delete by
//! path, JSON payloads and root bootstrap. It does not take part in the
//! [`PersistentNode`] lifecycle beyond constructing managers. Calls are
//! retried on transient errors with the store's [`RetryPolicy`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::client::CoordinationClient;
use crate::error::{CoordinationError, CoordinationResult, NodeError};
use crate::models::{CreateMode, decode, encode};
use crate::node::PersistentNode;
use crate::paths::{join_path, validate_path};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct NodeStore {
    client: Arc<dyn CoordinationClient>,
    root_path: String,
    retry: RetryPolicy,
}

impl NodeStore {
    /// Wrap `client` and make sure `root_path` exists.
    pub async fn connect(
        client: Arc<dyn CoordinationClient>,
        root_path: impl Into<String>,
        retry: RetryPolicy,
    ) -> CoordinationResult<Self> {
        let root_path = root_path.into();
        validate_path(&root_path)?;
        let store = Self {
            client,
            root_path,
            retry,
        };
        if store.root_path != "/" {
            store.create_path(&store.root_path).await?;
        }
        info!(root = %store.root_path, session = store.client.session_id(), "node store connected");
        Ok(store)
    }

    pub fn client(&self) -> &Arc<dyn CoordinationClient> {
        &self.client
    }

    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    /// Resolve `name` under the root path.
    pub fn path_of(&self, name: &str) -> String {
        join_path(&self.root_path, name)
    }

    /// Child names of `path`, empty if the node does not exist.
    pub async fn get_children(&self, path: &str) -> CoordinationResult<Vec<String>> {
        let client = &self.client;
        match self.retry.run("get_children", move || client.get_children(path)).await {
            Ok(mut children) => {
                children.sort();
                Ok(children)
            }
            Err(err) if err.is_no_node() => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    /// Create `path` and any missing ancestors as empty persistent nodes.
    pub async fn create_path(&self, path: &str) -> CoordinationResult<()> {
        let client = &self.client;
        match self
            .retry
            .run("create_path", move || {
                client.create(path, &[], CreateMode::Persistent, true)
            })
            .await
        {
            Ok(_) => {
                debug!(path, "path created");
                Ok(())
            }
            Err(err) if err.is_node_exists() => Ok(()),
            Err(err) => Err(err),
        }
    }

    pub async fn exists(&self, path: &str) -> CoordinationResult<bool> {
        let client = &self.client;
        let stat = self
            .retry
            .run("exists", move || client.check_exists(path))
            .await?;
        Ok(stat.is_some())
    }

    pub async fn get_data(&self, path: &str) -> CoordinationResult<Vec<u8>> {
        let client = &self.client;
        let (data, _) = self
            .retry
            .run("get_data", move || client.get_data(path))
            .await?;
        Ok(data)
    }

    /// Node data as UTF-8 text.
    pub async fn get_string_data(&self, path: &str) -> CoordinationResult<String> {
        let data = self.get_data(path).await?;
        String::from_utf8(data)
            .map_err(|e| CoordinationError::Codec(format!("{path}: data is not utf-8: {e}")))
    }

    /// Node data parsed as JSON.
    pub async fn get_node(&self, path: &str) -> CoordinationResult<serde_json::Value> {
        self.get_object(path).await
    }

    /// Node data deserialized into `T`.
    pub async fn get_object<T: DeserializeOwned>(&self, path: &str) -> CoordinationResult<T> {
        let data = self.get_data(path).await?;
        decode(&data)
    }

    /// JSON data of every child of `path` that carries any, keyed by name.
    pub async fn get_nodes(
        &self,
        path: &str,
    ) -> CoordinationResult<BTreeMap<String, serde_json::Value>> {
        let mut nodes = BTreeMap::new();
        for name in self.get_children(path).await? {
            let child = join_path(path, &name);
            let data = match self.get_data(&child).await {
                Ok(data) => data,
                // removed between listing and reading
                Err(err) if err.is_no_node() => continue,
                Err(err) => return Err(err),
            };
            if data.is_empty() {
                continue;
            }
            nodes.insert(name, decode(&data)?);
        }
        Ok(nodes)
    }

    /// Store `value` as JSON at a persistent node, creating it if needed.
    pub async fn set_object<T: Serialize>(&self, path: &str, value: &T) -> CoordinationResult<()> {
        let data = encode(value)?;
        self.set_data(path, &data, CreateMode::Persistent).await
    }

    pub async fn set_bytes(&self, path: &str, data: &[u8]) -> CoordinationResult<()> {
        self.set_data(path, data, CreateMode::Persistent).await
    }

    /// Update the node's data, or create it with `mode` if it does not exist.
    pub async fn set_data(&self, path: &str, data: &[u8], mode: CreateMode) -> CoordinationResult<()> {
        let client = &self.client;
        if self.exists(path).await? {
            match self
                .retry
                .run("set_data", move || client.set_data(path, data, None))
                .await
            {
                Ok(_) => return Ok(()),
                // deleted since the existence check, fall through to create
                Err(err) if err.is_no_node() => {}
                Err(err) => return Err(err),
            }
        }
        match self.create_node(path, data, mode).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_node_exists() => {
                self.retry
                    .run("set_data", move || client.set_data(path, data, None))
                    .await?;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Delete `path`; a node that does not exist is not an error.
    pub async fn delete(&self, path: &str, delete_children: bool) -> CoordinationResult<()> {
        let client = &self.client;
        match self
            .retry
            .run("delete", move || client.delete(path, delete_children))
            .await
        {
            Ok(()) => {
                debug!(path, "node deleted");
                Ok(())
            }
            Err(err) if err.is_no_node() => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Create a node (and missing parents) and return its assigned path.
    pub async fn create_node(
        &self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
    ) -> CoordinationResult<String> {
        let client = &self.client;
        self.retry
            .run("create", move || client.create(path, data, mode, true))
            .await
    }

    /// Create an ephemeral node, replacing whatever is at `path`.
    pub async fn create_ephemeral_node(&self, path: &str, data: &[u8]) -> CoordinationResult<String> {
        self.delete(path, true).await?;
        self.create_node(path, data, CreateMode::Ephemeral).await
    }

    /// Start a [`PersistentNode`] holding `value` as JSON.
    ///
    /// The returned manager is already started; the caller owns its
    /// lifetime and must `close` it.
    pub fn persistent_node<T: Serialize>(
        &self,
        path: &str,
        value: &T,
        mode: CreateMode,
    ) -> Result<PersistentNode, NodeError> {
        let data = encode(value)?;
        let node = PersistentNode::with_retry_policy(
            Arc::clone(&self.client),
            mode,
            false,
            path,
            &data,
            self.retry,
        )?;
        node.start()?;
        Ok(node)
    }

    /// End the underlying session.
    pub async fn close(&self) -> CoordinationResult<()> {
        info!(root = %self.root_path, "closing node store");
        self.client.close().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::memory::MemoryCoordinator;
    use crate::models::{LiveNodeInfo, ServiceType};
    use crate::node::Lifecycle;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    async fn store() -> (Arc<MemoryCoordinator>, NodeStore) {
        let zk = Arc::new(MemoryCoordinator::new());
        let store = NodeStore::connect(zk.clone(), "/services", fast_retry())
            .await
            .unwrap();
        (zk, store)
    }

    fn live_info(name: &str) -> LiveNodeInfo {
        LiveNodeInfo {
            name: name.into(),
            start_time: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            host: "10.0.0.7".into(),
            jmx_port: 9010,
            status_url: format!("http://10.0.0.7/{name}/status"),
        }
    }

    #[tokio::test]
    async fn test_connect_bootstraps_root() {
        let (zk, store) = store().await;
        assert_eq!(store.root_path(), "/services");
        assert!(zk.paths().contains(&"/services".to_owned()));
        assert_eq!(store.path_of("adapters"), "/services/adapters");

        // connecting again is fine
        NodeStore::connect(zk.clone(), "/services", fast_retry())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_root() {
        let zk = Arc::new(MemoryCoordinator::new());
        assert!(matches!(
            NodeStore::connect(zk, "services", fast_retry()).await,
            Err(CoordinationError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_children_of_missing_node_are_empty() {
        let (_zk, store) = store().await;
        assert!(store.get_children("/services/none").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_data_creates_then_updates() {
        let (_zk, store) = store().await;
        store
            .set_data("/services/config/a", b"one", CreateMode::Persistent)
            .await
            .unwrap();
        assert_eq!(store.get_data("/services/config/a").await.unwrap(), b"one");

        store.set_bytes("/services/config/a", b"two").await.unwrap();
        assert_eq!(
            store.get_string_data("/services/config/a").await.unwrap(),
            "two"
        );
        assert!(store.exists("/services/config/a").await.unwrap());
        assert!(!store.exists("/services/config/b").await.unwrap());
    }

    #[tokio::test]
    async fn test_objects_round_trip_through_nodes() {
        let (_zk, store) = store().await;
        store
            .set_object("/services/live/core-1", &live_info("core-1"))
            .await
            .unwrap();
        store
            .set_object("/services/live/core-2", &live_info("core-2"))
            .await
            .unwrap();
        store.create_path("/services/live/empty").await.unwrap();

        let info: LiveNodeInfo = store.get_object("/services/live/core-1").await.unwrap();
        assert_eq!(info, live_info("core-1"));

        let value = store.get_node("/services/live/core-2").await.unwrap();
        assert_eq!(value["jmxPort"], 9010);

        let nodes = store.get_nodes("/services/live").await.unwrap();
        assert_eq!(
            nodes.keys().collect::<Vec<_>>(),
            vec!["core-1", "core-2"]
        );
        assert_eq!(
            store.get_children("/services/live").await.unwrap(),
            vec!["core-1", "core-2", "empty"]
        );
    }

    #[tokio::test]
    async fn test_bad_json_is_codec_error() {
        let (_zk, store) = store().await;
        store.set_bytes("/services/raw", b"not json").await.unwrap();
        assert!(matches!(
            store.get_object::<LiveNodeInfo>("/services/raw").await,
            Err(CoordinationError::Codec(_))
        ));
        store.set_bytes("/services/raw", &[0xff, 0xfe]).await.unwrap();
        assert!(matches!(
            store.get_string_data("/services/raw").await,
            Err(CoordinationError::Codec(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_missing_node_is_ok() {
        let (zk, store) = store().await;
        store.delete("/services/none", false).await.unwrap();

        store.set_bytes("/services/a/b", b"x").await.unwrap();
        store.delete("/services/a", true).await.unwrap();
        assert!(!zk.paths().iter().any(|p| p.starts_with("/services/a")));
    }

    #[tokio::test]
    async fn test_create_ephemeral_node_replaces_existing() {
        let (zk, store) = store().await;
        store.set_bytes("/services/lock", b"old").await.unwrap();
        let path = store
            .create_ephemeral_node("/services/lock", b"new")
            .await
            .unwrap();
        assert_eq!(path, "/services/lock");
        assert_eq!(zk.data_of("/services/lock").unwrap(), b"new");
        let (_, stat) = zk.get_data("/services/lock").await.unwrap();
        assert!(stat.is_ephemeral());
    }

    #[tokio::test]
    async fn test_create_node_sequential() {
        let (_zk, store) = store().await;
        let first = store
            .create_node("/services/q/item-", b"a", CreateMode::PersistentSequential)
            .await
            .unwrap();
        let second = store
            .create_node("/services/q/item-", b"b", CreateMode::PersistentSequential)
            .await
            .unwrap();
        assert_eq!(first, "/services/q/item-0000000000");
        assert_eq!(second, "/services/q/item-0000000001");
    }

    #[tokio::test]
    async fn test_create_retries_transient_errors() {
        let (zk, store) = store().await;
        zk.inject_create_failures([
            CoordinationError::Transport("reset".into()),
            CoordinationError::Timeout("slow".into()),
        ]);
        let path = store
            .create_node("/services/flaky", b"x", CreateMode::Persistent)
            .await
            .unwrap();
        assert_eq!(path, "/services/flaky");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_persistent_node_holds_json() {
        let (zk, store) = store().await;
        let node = store
            .persistent_node(
                "/services/live/adapter-1",
                &serde_json::json!({"type": ServiceType::LiveAdapter, "name": "adapter-1"}),
                CreateMode::Ephemeral,
            )
            .unwrap();
        assert_eq!(node.lifecycle(), Lifecycle::Started);
        assert!(node.wait_for_initial_create(Duration::from_secs(2)).await.unwrap());

        let value = store.get_node("/services/live/adapter-1").await.unwrap();
        assert_eq!(value["type"], "LIVE_ADAPTER");

        node.close().await.unwrap();
        assert!(zk.data_of("/services/live/adapter-1").is_none());
    }

    #[tokio::test]
    async fn test_close_ends_session() {
        let (zk, store) = store().await;
        store
            .create_ephemeral_node("/services/e", b"x")
            .await
            .unwrap();
        store.close().await.unwrap();
        assert!(zk.data_of("/services/e").is_none());
        assert!(matches!(
            store.exists("/services").await,
            Err(CoordinationError::NotConnected(_))
        ));
    }
}

//! In-process coordination service.
//!
//! `MemoryCoordinator` keeps a znode tree behind a mutex and implements
//! [`CoordinationClient`] for a single session. It is used by the tests and
//! the soak tool, and carries fault-injection hooks (session expiry,
//! suspended connections, denied writes, failing or slow creates) so the
//! self-healing paths can be driven deterministically.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, oneshot};
use tracing::debug;

use crate::client::{CoordinationClient, Watch};
use crate::error::{CoordinationError, CoordinationResult};
use crate::models::{ConnectionState, CreateMode, EventType, Stat, WatchedEvent};
use crate::paths::{ancestors, parent_path, validate_path};

const EVENT_CHANNEL_SIZE: usize = 64;

/// Number of operations issued against the coordinator, per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounters {
    pub create: u64,
    pub set_data: u64,
    pub check_exists: u64,
    pub delete: u64,
}

#[derive(Debug, Clone)]
pub struct MemoryCoordinator {
    inner: Arc<Mutex<Tree>>,
    events: broadcast::Sender<ConnectionState>,
}

#[derive(Debug)]
struct Tree {
    nodes: BTreeMap<String, Znode>,
    watches: HashMap<String, Vec<oneshot::Sender<WatchedEvent>>>,
    zxid: i64,
    session_id: i64,
    state: ConnectionState,
    closed: bool,
    denied: Vec<String>,
    create_faults: VecDeque<CoordinationError>,
    create_delay: Duration,
    counters: CallCounters,
}

#[derive(Debug, Clone)]
struct Znode {
    data: Vec<u8>,
    stat: Stat,
}

impl Default for MemoryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "/".to_owned(),
            Znode {
                data: Vec::new(),
                stat: Stat::default(),
            },
        );
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            inner: Arc::new(Mutex::new(Tree {
                nodes,
                watches: HashMap::new(),
                zxid: 0,
                session_id: 1,
                state: ConnectionState::Connected,
                closed: false,
                denied: Vec::new(),
                create_faults: VecDeque::new(),
                create_delay: Duration::ZERO,
                counters: CallCounters::default(),
            })),
            events,
        }
    }

    fn tree(&self) -> MutexGuard<'_, Tree> {
        self.inner.lock().expect("memory coordinator lock poisoned")
    }

    fn publish(&self, state: ConnectionState) {
        self.tree().state = state;
        // no subscribers is fine
        let _ = self.events.send(state);
    }

    /// Expire the session: ephemeral nodes it owns disappear and every
    /// pending watch is discarded without firing, then the client reconnects
    /// with a fresh session (`Lost` followed by `Reconnected`).
    pub fn expire_session(&self) {
        self.lose_session();
        self.reconnect();
    }

    /// Expire the session without reconnecting. Operations fail with
    /// `SessionExpired` until [`reconnect`](Self::reconnect), which then
    /// runs under a fresh session.
    pub fn lose_session(&self) {
        {
            let mut tree = self.tree();
            let owner = tree.session_id;
            tree.watches.clear();
            let ephemerals: Vec<String> = tree
                .nodes
                .iter()
                .filter(|(_, node)| node.stat.ephemeral_owner == owner)
                .map(|(path, _)| path.clone())
                .collect();
            for path in ephemerals.iter().rev() {
                tree.remove_node(path);
            }
            tree.session_id += 1;
            debug!(
                expired = owner,
                removed = ephemerals.len(),
                "memory coordinator session expired"
            );
        }
        self.publish(ConnectionState::Lost);
    }

    /// Drop the connection without losing the session. Operations fail with
    /// a transport error until [`reconnect`](Self::reconnect).
    pub fn suspend(&self) {
        self.publish(ConnectionState::Suspended);
    }

    /// Re-establish the connection within the same session.
    pub fn reconnect(&self) {
        self.publish(ConnectionState::Reconnected);
    }

    /// Any write at or below `prefix` fails with `NoAuth`.
    pub fn deny_writes_under(&self, prefix: impl Into<String>) {
        self.tree().denied.push(prefix.into());
    }

    pub fn allow_all_writes(&self) {
        self.tree().denied.clear();
    }

    /// The next creates fail with these errors, in order.
    pub fn inject_create_failures(&self, errors: impl IntoIterator<Item = CoordinationError>) {
        self.tree().create_faults.extend(errors);
    }

    /// Every create waits this long before it is applied.
    pub fn set_create_delay(&self, delay: Duration) {
        self.tree().create_delay = delay;
    }

    pub fn counters(&self) -> CallCounters {
        self.tree().counters
    }

    /// All paths in the tree, root included, in lexical order.
    pub fn paths(&self) -> Vec<String> {
        self.tree().nodes.keys().cloned().collect()
    }

    /// Watches armed on `path` whose receiver is still alive.
    pub fn pending_watches(&self, path: &str) -> usize {
        self.tree()
            .watches
            .get(path)
            .map_or(0, |watchers| watchers.iter().filter(|tx| !tx.is_closed()).count())
    }

    /// Data of `path`, if it exists.
    pub fn data_of(&self, path: &str) -> Option<Vec<u8>> {
        self.tree().nodes.get(path).map(|node| node.data.clone())
    }
}

fn is_under(path: &str, prefix: &str) -> bool {
    prefix == "/"
        || path == prefix
        || (path.starts_with(prefix) && path[prefix.len()..].starts_with('/'))
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl Tree {
    fn check_open(&self) -> CoordinationResult<()> {
        if self.closed {
            return Err(CoordinationError::NotConnected("client closed".into()));
        }
        match self.state {
            ConnectionState::Suspended => Err(CoordinationError::Transport(
                "connection suspended".into(),
            )),
            ConnectionState::Lost => Err(CoordinationError::SessionExpired),
            _ => Ok(()),
        }
    }

    fn check_write(&self, path: &str) -> CoordinationResult<()> {
        if self.denied.iter().any(|prefix| is_under(path, prefix)) {
            return Err(CoordinationError::NoAuth(path.to_owned()));
        }
        Ok(())
    }

    fn fire(&mut self, path: &str, event_type: EventType) {
        if let Some(watchers) = self.watches.remove(path) {
            for tx in watchers {
                let _ = tx.send(WatchedEvent {
                    event_type,
                    path: path.to_owned(),
                });
            }
        }
    }

    fn parent_mut(&mut self, path: &str) -> Option<&mut Znode> {
        let parent = parent_path(path)?;
        self.nodes.get_mut(parent)
    }

    fn insert_node(&mut self, path: &str, data: &[u8], mode: CreateMode) {
        self.zxid += 1;
        let zxid = self.zxid;
        let now = now_millis();
        let stat = Stat {
            czxid: zxid,
            mzxid: zxid,
            ctime: now,
            mtime: now,
            ephemeral_owner: if mode.is_ephemeral() {
                self.session_id
            } else {
                0
            },
            data_length: data.len() as i32,
            pzxid: zxid,
            ..Stat::default()
        };
        self.nodes.insert(
            path.to_owned(),
            Znode {
                data: data.to_vec(),
                stat,
            },
        );
        if let Some(parent) = self.parent_mut(path) {
            parent.stat.cversion += 1;
            parent.stat.num_children += 1;
            parent.stat.pzxid = zxid;
        }
        self.fire(path, EventType::NodeCreated);
    }

    fn remove_node(&mut self, path: &str) {
        if self.nodes.remove(path).is_none() {
            return;
        }
        self.zxid += 1;
        let zxid = self.zxid;
        if let Some(parent) = self.parent_mut(path) {
            parent.stat.cversion += 1;
            parent.stat.num_children -= 1;
            parent.stat.pzxid = zxid;
        }
        self.fire(path, EventType::NodeDeleted);
    }

    fn descendants(&self, path: &str) -> Vec<String> {
        let prefix = format!("{path}/");
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn create(
        &mut self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
        create_parents: bool,
    ) -> CoordinationResult<String> {
        self.check_open()?;
        if let Some(err) = self.create_faults.pop_front() {
            return Err(err);
        }
        self.check_write(path)?;

        let parent = parent_path(path).unwrap_or("/");
        if !self.nodes.contains_key(parent) {
            if !create_parents {
                return Err(CoordinationError::NoNode(parent.to_owned()));
            }
            for ancestor in ancestors(path) {
                if self.nodes.contains_key(ancestor) {
                    continue;
                }
                if let Some(grandparent) = parent_path(ancestor)
                    && self.nodes[grandparent].stat.is_ephemeral()
                {
                    return Err(CoordinationError::NoChildrenForEphemerals(
                        grandparent.to_owned(),
                    ));
                }
                self.insert_node(ancestor, &[], CreateMode::Persistent);
            }
        }

        let parent_stat = self.nodes[parent].stat;
        if parent_stat.is_ephemeral() {
            return Err(CoordinationError::NoChildrenForEphemerals(
                parent.to_owned(),
            ));
        }
        let actual = if mode.is_sequential() {
            format!("{path}{:010}", parent_stat.cversion)
        } else {
            path.to_owned()
        };
        if self.nodes.contains_key(&actual) {
            return Err(CoordinationError::NodeExists(actual));
        }
        self.insert_node(&actual, data, mode);
        Ok(actual)
    }
}

#[async_trait]
impl CoordinationClient for MemoryCoordinator {
    async fn create(
        &self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
        create_parents: bool,
    ) -> CoordinationResult<String> {
        validate_path(path)?;
        if path == "/" {
            return Err(CoordinationError::NodeExists(path.to_owned()));
        }
        let delay = {
            let mut tree = self.tree();
            tree.counters.create += 1;
            tree.create_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.tree().create(path, data, mode, create_parents)
    }

    async fn set_data(
        &self,
        path: &str,
        data: &[u8],
        version: Option<i32>,
    ) -> CoordinationResult<Stat> {
        validate_path(path)?;
        let mut tree = self.tree();
        tree.counters.set_data += 1;
        tree.check_open()?;
        if !tree.nodes.contains_key(path) {
            return Err(CoordinationError::NoNode(path.to_owned()));
        }
        tree.check_write(path)?;

        tree.zxid += 1;
        let zxid = tree.zxid;
        let node = tree
            .nodes
            .get_mut(path)
            .ok_or_else(|| CoordinationError::NoNode(path.to_owned()))?;
        if let Some(expected) = version
            && expected != node.stat.version
        {
            return Err(CoordinationError::BadVersion {
                path: path.to_owned(),
                expected,
                actual: node.stat.version,
            });
        }
        node.data = data.to_vec();
        node.stat.version += 1;
        node.stat.mzxid = zxid;
        node.stat.mtime = now_millis();
        node.stat.data_length = data.len() as i32;
        let stat = node.stat;
        tree.fire(path, EventType::NodeDataChanged);
        Ok(stat)
    }

    async fn get_data(&self, path: &str) -> CoordinationResult<(Vec<u8>, Stat)> {
        validate_path(path)?;
        let tree = self.tree();
        tree.check_open()?;
        tree.nodes
            .get(path)
            .map(|node| (node.data.clone(), node.stat))
            .ok_or_else(|| CoordinationError::NoNode(path.to_owned()))
    }

    async fn check_exists(&self, path: &str) -> CoordinationResult<Option<Stat>> {
        validate_path(path)?;
        let mut tree = self.tree();
        tree.counters.check_exists += 1;
        tree.check_open()?;
        Ok(tree.nodes.get(path).map(|node| node.stat))
    }

    async fn check_exists_and_watch(
        &self,
        path: &str,
    ) -> CoordinationResult<(Option<Stat>, Watch)> {
        validate_path(path)?;
        let mut tree = self.tree();
        tree.counters.check_exists += 1;
        tree.check_open()?;
        let stat = tree.nodes.get(path).map(|node| node.stat);
        let (tx, watch) = Watch::channel(path);
        let watchers = tree.watches.entry(path.to_owned()).or_default();
        watchers.retain(|pending| !pending.is_closed());
        watchers.push(tx);
        Ok((stat, watch))
    }

    async fn get_children(&self, path: &str) -> CoordinationResult<Vec<String>> {
        validate_path(path)?;
        let tree = self.tree();
        tree.check_open()?;
        if !tree.nodes.contains_key(path) {
            return Err(CoordinationError::NoNode(path.to_owned()));
        }
        let prefix = if path == "/" {
            "/".to_owned()
        } else {
            format!("{path}/")
        };
        Ok(tree
            .nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, _)| {
                let rest = &key[prefix.len()..];
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_owned())
            })
            .collect())
    }

    async fn delete(&self, path: &str, delete_children: bool) -> CoordinationResult<()> {
        validate_path(path)?;
        if path == "/" {
            return Err(CoordinationError::InvalidPath("cannot delete the root".into()));
        }
        let mut tree = self.tree();
        tree.counters.delete += 1;
        tree.check_open()?;
        if !tree.nodes.contains_key(path) {
            return Err(CoordinationError::NoNode(path.to_owned()));
        }
        tree.check_write(path)?;
        let children = tree.descendants(path);
        if !children.is_empty() && !delete_children {
            return Err(CoordinationError::NotEmpty(path.to_owned()));
        }
        // deepest first, so every parent outlives its children
        for child in children.iter().rev() {
            tree.remove_node(child);
        }
        tree.remove_node(path);
        Ok(())
    }

    fn connection_events(&self) -> broadcast::Receiver<ConnectionState> {
        self.events.subscribe()
    }

    fn connection_state(&self) -> ConnectionState {
        self.tree().state
    }

    fn session_id(&self) -> i64 {
        self.tree().session_id
    }

    async fn close(&self) -> CoordinationResult<()> {
        {
            let mut tree = self.tree();
            if tree.closed {
                return Ok(());
            }
            let owner = tree.session_id;
            tree.watches.clear();
            let ephemerals: Vec<String> = tree
                .nodes
                .iter()
                .filter(|(_, node)| node.stat.ephemeral_owner == owner)
                .map(|(path, _)| path.clone())
                .collect();
            for path in ephemerals.iter().rev() {
                tree.remove_node(path);
            }
            tree.closed = true;
        }
        self.publish(ConnectionState::Lost);
        Ok(())
    }
}

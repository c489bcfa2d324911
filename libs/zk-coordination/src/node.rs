//! Self-healing node lifecycle.
//!
//! A [`PersistentNode`] creates one node on the coordination service and keeps
//! it there with the latest data until [`PersistentNode::close`] is called.
//! It recreates the node when a watch reports it deleted, when an existence
//! check finds it missing, and after every reconnection (a new session may
//! have dropped ephemeral nodes without any delete event reaching us).
//!
//! Every asynchronous operation runs on its own task. Its completion takes
//! the manager lock, looks at the lifecycle state and decides what happens
//! next through `follow_up`, a pure function of `(lifecycle, outcome)`.
//! Completions that arrive after `close` only ever delete what they created.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use crate::client::CoordinationClient;
use crate::error::{CoordinationError, CoordinationResult, NodeError};
use crate::models::{ConnectionState, CreateMode, EventType, WatchedEvent};
use crate::paths::validate_path;
use crate::retry::RetryPolicy;

/// Lifecycle of a [`PersistentNode`]. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Latent,
    Started,
    Closed,
}

/// Keeps a single node alive on the coordination service.
pub struct PersistentNode {
    inner: Arc<Inner>,
}

struct Inner {
    client: Arc<dyn CoordinationClient>,
    base_path: String,
    mode: CreateMode,
    use_protection: bool,
    retry: RetryPolicy,
    state: Mutex<NodeState>,
    initial_create: watch::Sender<bool>,
    shutdown: CancellationToken,
    span: Span,
}

struct NodeState {
    lifecycle: Lifecycle,
    actual_path: Option<String>,
    data: Vec<u8>,
    /// bumped on every `set_data`, tells stale writes apart from the latest
    data_version: u64,
    auth_failure: bool,
    /// consecutive transient create failures
    failures: u32,
    /// token of the watch task currently waiting, superseded on re-arm
    armed_watch: Option<CancellationToken>,
}

/// How a create completed, stripped of everything the state machine does
/// not care about.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CreateOutcome {
    Created(String),
    Exists(String),
    NoAuth,
    Failed,
}

impl CreateOutcome {
    fn classify(result: CoordinationResult<String>, target: &str) -> Self {
        match result {
            Ok(path) if !path.is_empty() => CreateOutcome::Created(path),
            Ok(_) => CreateOutcome::Failed,
            Err(CoordinationError::NodeExists(path)) if path.is_empty() => {
                CreateOutcome::Exists(target.to_owned())
            }
            Err(CoordinationError::NodeExists(path)) => CreateOutcome::Exists(path),
            Err(err) if err.is_no_auth() => CreateOutcome::NoAuth,
            Err(_) => CreateOutcome::Failed,
        }
    }
}

/// What to do after a create completed.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FollowUp {
    /// record the path, arm a watch, signal the initial create
    Watch(String),
    /// record the path, arm a watch, push our data over whatever is there
    Reconcile(String),
    /// stop healing
    HaltAuth,
    /// try again from the top
    Retry,
    /// the manager is closed, delete what the late create left behind
    Cleanup(String),
    Nothing,
}

fn follow_up(lifecycle: Lifecycle, outcome: CreateOutcome) -> FollowUp {
    match (lifecycle, outcome) {
        (Lifecycle::Started, CreateOutcome::Created(path)) => FollowUp::Watch(path),
        (Lifecycle::Started, CreateOutcome::Exists(path)) => FollowUp::Reconcile(path),
        (Lifecycle::Started, CreateOutcome::NoAuth) => FollowUp::HaltAuth,
        (Lifecycle::Started, CreateOutcome::Failed) => FollowUp::Retry,
        (_, CreateOutcome::Created(path) | CreateOutcome::Exists(path)) => FollowUp::Cleanup(path),
        _ => FollowUp::Nothing,
    }
}

/// Where and how the next create is issued.
///
/// A known path is reused unless protection is on. Once any path has been
/// assigned the sequential flag is dropped, so a retry never allocates a
/// second sibling.
fn create_target(
    base_path: &str,
    actual_path: Option<&str>,
    mode: CreateMode,
    use_protection: bool,
) -> (String, CreateMode) {
    match actual_path {
        Some(existing) if !use_protection => (existing.to_owned(), mode.non_sequential()),
        Some(_) => (base_path.to_owned(), mode.non_sequential()),
        None => (base_path.to_owned(), mode),
    }
}

impl PersistentNode {
    /// Create a latent node manager. Nothing is sent until [`start`].
    ///
    /// [`start`]: PersistentNode::start
    pub fn new(
        client: Arc<dyn CoordinationClient>,
        mode: CreateMode,
        use_protection: bool,
        base_path: impl Into<String>,
        data: &[u8],
    ) -> Result<Self, NodeError> {
        Self::with_retry_policy(
            client,
            mode,
            use_protection,
            base_path,
            data,
            RetryPolicy::default(),
        )
    }

    /// Like [`new`], with the backoff used between failed create attempts.
    ///
    /// [`new`]: PersistentNode::new
    pub fn with_retry_policy(
        client: Arc<dyn CoordinationClient>,
        mode: CreateMode,
        use_protection: bool,
        base_path: impl Into<String>,
        data: &[u8],
        retry: RetryPolicy,
    ) -> Result<Self, NodeError> {
        let base_path = base_path.into();
        validate_path(&base_path).map_err(|e| NodeError::InvalidPath(e.to_string()))?;
        if base_path == "/" {
            return Err(NodeError::InvalidPath("cannot manage the root node".into()));
        }
        let (initial_create, _) = watch::channel(false);
        let span = info_span!("persistent_node", base_path = %base_path, %mode);
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                base_path,
                mode,
                use_protection,
                retry,
                state: Mutex::new(NodeState {
                    lifecycle: Lifecycle::Latent,
                    actual_path: None,
                    data: data.to_vec(),
                    data_version: 0,
                    auth_failure: false,
                    failures: 0,
                    armed_watch: None,
                }),
                initial_create,
                shutdown: CancellationToken::new(),
                span,
            }),
        })
    }

    /// Start creating the node in the background.
    ///
    /// Returns as soon as the first create is issued; use
    /// [`wait_for_initial_create`] to block until it lands. Must be called
    /// from within a tokio runtime.
    ///
    /// [`wait_for_initial_create`]: PersistentNode::wait_for_initial_create
    pub fn start(&self) -> Result<(), NodeError> {
        {
            let mut state = self.inner.lock();
            match state.lifecycle {
                Lifecycle::Started => return Err(NodeError::AlreadyStarted),
                Lifecycle::Closed => return Err(NodeError::NotStartable),
                Lifecycle::Latent => state.lifecycle = Lifecycle::Started,
            }
        }
        let events = self.inner.client.connection_events();
        self.inner.spawn_connection_listener(events);
        self.inner.create_node();
        Ok(())
    }

    /// Stop healing and delete the node.
    ///
    /// The delete is awaited; a node that is already gone is not an error.
    /// Creates still in flight delete their own result when they complete.
    ///
    /// Any other delete error is returned with the manager already closed.
    /// Nothing retries the delete, so the node (a persistent one in
    /// particular) stays on the service until the caller removes it.
    pub async fn close(&self) -> Result<(), NodeError> {
        let path = {
            let mut state = self.inner.lock();
            if state.lifecycle != Lifecycle::Started {
                return Err(NodeError::NotStarted);
            }
            state.lifecycle = Lifecycle::Closed;
            state.armed_watch = None;
            state.actual_path.clone()
        };
        self.inner.shutdown.cancel();

        let Some(path) = path else {
            debug!(parent: &self.inner.span, "closed before the initial create completed");
            return Ok(());
        };
        match self.inner.client.delete(&path, true).await {
            Ok(()) => info!(parent: &self.inner.span, path = %path, "node deleted on close"),
            Err(err) if err.is_no_node() => {
                debug!(parent: &self.inner.span, path = %path, "node already gone on close")
            }
            Err(err) => return Err(err.into()),
        }
        self.inner.lock().actual_path = None;
        Ok(())
    }

    /// Path assigned by the service, `None` until the first create completes.
    pub fn actual_path(&self) -> Option<String> {
        self.inner.lock().actual_path.clone()
    }

    /// Replace the node's data.
    ///
    /// The local copy changes immediately and is what [`data`] returns; the
    /// remote write is fire-and-forget and only logged if it fails.
    ///
    /// [`data`]: PersistentNode::data
    pub fn set_data(&self, data: &[u8]) -> Result<(), NodeError> {
        if data.is_empty() {
            return Err(NodeError::EmptyData);
        }
        let (path, version, started) = {
            let mut state = self.inner.lock();
            let path = state.actual_path.clone().ok_or(NodeError::NotCreated)?;
            state.data = data.to_vec();
            state.data_version += 1;
            (path, state.data_version, state.lifecycle == Lifecycle::Started)
        };
        if started {
            self.inner.push_data(path, data.to_vec(), version, false);
        }
        Ok(())
    }

    /// Latest data handed to the manager, whether or not the service has it yet.
    pub fn data(&self) -> Vec<u8> {
        self.inner.lock().data.clone()
    }

    /// True once a create was refused for lack of authorisation.
    pub fn is_auth_failure(&self) -> bool {
        self.inner.lock().auth_failure
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.lock().lifecycle
    }

    pub fn base_path(&self) -> &str {
        &self.inner.base_path
    }

    pub fn mode(&self) -> CreateMode {
        self.inner.mode
    }

    /// Wait until the first create (or reconciliation of an existing node)
    /// succeeded. Returns false if `timeout` elapsed first.
    pub async fn wait_for_initial_create(&self, timeout: Duration) -> Result<bool, NodeError> {
        if self.lifecycle() == Lifecycle::Latent {
            return Err(NodeError::NotStarted);
        }
        let mut rx = self.inner.initial_create.subscribe();
        let created = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|created| *created)).await,
            Ok(Ok(_))
        );
        Ok(created)
    }
}

impl Drop for PersistentNode {
    fn drop(&mut self) {
        if self.inner.lock().lifecycle == Lifecycle::Started {
            warn!(parent: &self.inner.span, "dropped without close, node is left in place");
        }
        self.inner.shutdown.cancel();
    }
}

impl std::fmt::Debug for PersistentNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("PersistentNode")
            .field("base_path", &self.inner.base_path)
            .field("mode", &self.inner.mode)
            .field("use_protection", &self.inner.use_protection)
            .field("lifecycle", &state.lifecycle)
            .field("actual_path", &state.actual_path)
            .field("auth_failure", &state.auth_failure)
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().expect("persistent node lock poisoned")
    }

    fn spawn<F>(&self, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(fut.instrument(self.span.clone()));
    }

    fn create_node(self: &Arc<Self>) {
        let (target, mode, data, version) = {
            let state = self.lock();
            if state.lifecycle != Lifecycle::Started || state.auth_failure {
                return;
            }
            let (target, mode) = create_target(
                &self.base_path,
                state.actual_path.as_deref(),
                self.mode,
                self.use_protection,
            );
            (target, mode, state.data.clone(), state.data_version)
        };

        let inner = Arc::clone(self);
        self.spawn(async move {
            debug!(path = %target, %mode, "creating node");
            let result = inner.client.create(&target, &data, mode, true).await;
            inner.on_create_complete(result, &target, version).await;
        });
    }

    /// `version` is the data version the create carried.
    async fn on_create_complete(
        self: &Arc<Self>,
        result: CoordinationResult<String>,
        target: &str,
        version: u64,
    ) {
        if let Err(err) = &result {
            debug!(path = %target, error = %err, "create completed with error");
        }
        let outcome = CreateOutcome::classify(result, target);
        let (next, failures, data, current) = {
            let mut state = self.lock();
            let next = follow_up(state.lifecycle, outcome);
            match &next {
                FollowUp::Watch(path) | FollowUp::Reconcile(path) => {
                    state.actual_path = Some(path.clone());
                    state.auth_failure = false;
                    state.failures = 0;
                }
                FollowUp::HaltAuth => state.auth_failure = true,
                FollowUp::Retry => state.failures = state.failures.saturating_add(1),
                FollowUp::Cleanup(_) | FollowUp::Nothing => {}
            }
            (next, state.failures, state.data.clone(), state.data_version)
        };

        match next {
            FollowUp::Watch(path) => {
                info!(path = %path, "node created");
                self.watch_node();
                self.mark_initial_create();
                if current != version {
                    // set_data ran while the create was in flight
                    debug!(path = %path, "data changed during create, pushing latest");
                    self.push_data(path, data, current, false);
                }
            }
            FollowUp::Reconcile(path) => {
                debug!(path = %path, "node already exists, pushing local data");
                self.watch_node();
                self.push_data(path, data, current, true);
            }
            FollowUp::HaltAuth => {
                error!(path = %target, "client is not authorised to create the node, giving up");
            }
            FollowUp::Retry => self.schedule_retry(failures),
            FollowUp::Cleanup(path) => {
                match self.client.delete(&path, true).await {
                    Ok(()) => info!(path = %path, "deleted node created after close"),
                    Err(err) if err.is_no_node() => {}
                    Err(err) => warn!(path = %path, error = %err, "failed to delete node created after close"),
                }
            }
            FollowUp::Nothing => {}
        }
    }

    fn schedule_retry(self: &Arc<Self>, failures: u32) {
        let delay = self.retry.backoff(failures.saturating_sub(1));
        warn!(
            attempt = failures,
            retry_in_ms = delay.as_millis(),
            "create failed, retrying"
        );
        let inner = Arc::clone(self);
        self.spawn(async move {
            tokio::select! {
                _ = inner.shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => inner.create_node(),
            }
        });
    }

    fn mark_initial_create(&self) {
        let first = self
            .initial_create
            .send_if_modified(|created| !std::mem::replace(created, true));
        if first {
            debug!("initial create complete");
        }
    }

    /// Write `data` (local version `version`) to `path`.
    ///
    /// Writes can land out of order. A successful write that turns out to
    /// be older than the local data is followed by a write of the latest.
    /// A failed write is left to the next create, which compares versions
    /// the same way.
    fn push_data(self: &Arc<Self>, path: String, data: Vec<u8>, version: u64, reconcile: bool) {
        let inner = Arc::clone(self);
        self.spawn(async move {
            let result = inner.client.set_data(&path, &data, None).await;
            let latest = {
                let state = inner.lock();
                if state.lifecycle != Lifecycle::Started {
                    debug!(path = %path, "set data completed after close");
                    return;
                }
                (state.data_version != version).then(|| (state.data.clone(), state.data_version))
            };
            match result {
                Ok(_) => {
                    if reconcile {
                        inner.mark_initial_create();
                    }
                    match latest {
                        Some((data, current)) => {
                            debug!(path = %path, version, current, "stale write landed, pushing latest");
                            inner.push_data(path, data, current, false);
                        }
                        None => debug!(path = %path, version, "node data updated"),
                    }
                }
                Err(err) => warn!(path = %path, error = %err, "failed to set node data"),
            }
        });
    }

    fn watch_node(self: &Arc<Self>) {
        let (path, token) = {
            let mut state = self.lock();
            if state.lifecycle != Lifecycle::Started {
                return;
            }
            let Some(path) = state.actual_path.clone() else {
                return;
            };
            let token = self.shutdown.child_token();
            if let Some(previous) = state.armed_watch.replace(token.clone()) {
                previous.cancel();
            }
            (path, token)
        };

        let inner = Arc::clone(self);
        self.spawn(async move {
            let armed = tokio::select! {
                _ = token.cancelled() => return,
                armed = inner.client.check_exists_and_watch(&path) => armed,
            };
            match armed {
                Ok((None, _)) => {
                    info!(path = %path, "node missing while arming watch, recreating");
                    inner.create_node();
                }
                Ok((Some(stat), watch)) => {
                    if stat.is_ephemeral() != inner.mode.is_ephemeral() {
                        warn!(
                            path = %path,
                            "existing node ephemeral state doesn't match requested state, maybe the node was created outside of the manager"
                        );
                    }
                    let event = tokio::select! {
                        _ = token.cancelled() => return,
                        event = watch.fired() => event,
                    };
                    inner.on_watch_event(event);
                }
                Err(err) if err.is_no_node() => inner.create_node(),
                Err(err) if err.is_retryable() => {
                    let delay = inner.retry.backoff(0);
                    debug!(path = %path, error = %err, "failed to arm watch, retrying");
                    tokio::select! {
                        _ = token.cancelled() => {}
                        _ = tokio::time::sleep(delay) => inner.watch_node(),
                    }
                }
                Err(err) => warn!(path = %path, error = %err, "failed to arm watch"),
            }
        });
    }

    fn on_watch_event(self: &Arc<Self>, event: Option<WatchedEvent>) {
        match event {
            Some(WatchedEvent {
                event_type: EventType::NodeDeleted,
                path,
            }) => {
                info!(path = %path, "node deleted, recreating");
                self.create_node();
            }
            Some(WatchedEvent {
                event_type: EventType::NodeDataChanged,
                ..
            }) => self.watch_node(),
            Some(event) => debug!(?event, "ignoring watch event"),
            None => debug!("watch dropped by the service"),
        }
    }

    fn spawn_connection_listener(self: &Arc<Self>, mut events: broadcast::Receiver<ConnectionState>) {
        let inner = Arc::clone(self);
        self.spawn(async move {
            loop {
                tokio::select! {
                    _ = inner.shutdown.cancelled() => {
                        debug!("connection listener stopping");
                        return;
                    }
                    event = events.recv() => match event {
                        Ok(ConnectionState::Reconnected) => {
                            info!("reconnected, recreating node");
                            inner.create_node();
                        }
                        Ok(state) => debug!(?state, "connection state changed"),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "connection listener lagged, recreating node");
                            inner.create_node();
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                    },
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tracing_test::traced_test;

    use super::*;
    use crate::memory::MemoryCoordinator;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        }
    }

    async fn eventually<F: Fn() -> bool>(cond: F) -> bool {
        for _ in 0..200 {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cond()
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            CreateOutcome::classify(Ok("/a0000000001".into()), "/a"),
            CreateOutcome::Created("/a0000000001".into())
        );
        assert_eq!(
            CreateOutcome::classify(Ok(String::new()), "/a"),
            CreateOutcome::Failed
        );
        assert_eq!(
            CreateOutcome::classify(Err(CoordinationError::NodeExists("/a".into())), "/a"),
            CreateOutcome::Exists("/a".into())
        );
        assert_eq!(
            CreateOutcome::classify(Err(CoordinationError::NodeExists(String::new())), "/b"),
            CreateOutcome::Exists("/b".into())
        );
        assert_eq!(
            CreateOutcome::classify(Err(CoordinationError::NoAuth("/a".into())), "/a"),
            CreateOutcome::NoAuth
        );
        assert_eq!(
            CreateOutcome::classify(Err(CoordinationError::NoNode("/".into())), "/a"),
            CreateOutcome::Failed
        );
        assert_eq!(
            CreateOutcome::classify(Err(CoordinationError::Transport("reset".into())), "/a"),
            CreateOutcome::Failed
        );
    }

    #[test]
    fn test_follow_up_started() {
        let started = Lifecycle::Started;
        assert_eq!(
            follow_up(started, CreateOutcome::Created("/a".into())),
            FollowUp::Watch("/a".into())
        );
        assert_eq!(
            follow_up(started, CreateOutcome::Exists("/a".into())),
            FollowUp::Reconcile("/a".into())
        );
        assert_eq!(follow_up(started, CreateOutcome::NoAuth), FollowUp::HaltAuth);
        assert_eq!(follow_up(started, CreateOutcome::Failed), FollowUp::Retry);
    }

    #[test]
    fn test_follow_up_closed() {
        let closed = Lifecycle::Closed;
        assert_eq!(
            follow_up(closed, CreateOutcome::Created("/a".into())),
            FollowUp::Cleanup("/a".into())
        );
        assert_eq!(
            follow_up(closed, CreateOutcome::Exists("/a".into())),
            FollowUp::Cleanup("/a".into())
        );
        assert_eq!(follow_up(closed, CreateOutcome::NoAuth), FollowUp::Nothing);
        assert_eq!(follow_up(closed, CreateOutcome::Failed), FollowUp::Nothing);
    }

    #[test]
    fn test_create_target_first_attempt() {
        assert_eq!(
            create_target("/m/member-", None, CreateMode::EphemeralSequential, false),
            ("/m/member-".into(), CreateMode::EphemeralSequential)
        );
        assert_eq!(
            create_target("/m/member-", None, CreateMode::EphemeralSequential, true),
            ("/m/member-".into(), CreateMode::EphemeralSequential)
        );
    }

    #[test]
    fn test_create_target_retry_reuses_path() {
        let existing = Some("/m/member-0000000004");
        assert_eq!(
            create_target("/m/member-", existing, CreateMode::EphemeralSequential, false),
            ("/m/member-0000000004".into(), CreateMode::Ephemeral)
        );
        assert_eq!(
            create_target("/m/member-", existing, CreateMode::PersistentSequential, false),
            ("/m/member-0000000004".into(), CreateMode::Persistent)
        );
        assert_eq!(
            create_target("/w", Some("/w"), CreateMode::Ephemeral, false),
            ("/w".into(), CreateMode::Ephemeral)
        );
    }

    #[test]
    fn test_create_target_protection_uses_base_path() {
        let existing = Some("/m/member-0000000004");
        assert_eq!(
            create_target("/m/member-", existing, CreateMode::EphemeralSequential, true),
            ("/m/member-".into(), CreateMode::Ephemeral)
        );
        assert_eq!(
            create_target("/w", Some("/w"), CreateMode::Persistent, true),
            ("/w".into(), CreateMode::Persistent)
        );
    }

    #[test]
    fn test_new_rejects_bad_paths() {
        let zk: Arc<dyn CoordinationClient> = Arc::new(MemoryCoordinator::new());
        assert!(matches!(
            PersistentNode::new(Arc::clone(&zk), CreateMode::Ephemeral, false, "locks", b"x"),
            Err(NodeError::InvalidPath(_))
        ));
        assert!(matches!(
            PersistentNode::new(zk, CreateMode::Ephemeral, false, "/", b"x"),
            Err(NodeError::InvalidPath(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[traced_test]
    async fn test_warns_on_ephemeral_mismatch() {
        let zk = Arc::new(MemoryCoordinator::new());
        zk.create("/svc/a", b"stale", CreateMode::Persistent, true)
            .await
            .unwrap();

        let node = PersistentNode::with_retry_policy(
            zk.clone(),
            CreateMode::Ephemeral,
            false,
            "/svc/a",
            b"fresh",
            fast_retry(),
        )
        .unwrap();
        node.start().unwrap();

        assert!(node.wait_for_initial_create(Duration::from_secs(2)).await.unwrap());
        assert!(eventually(|| zk.data_of("/svc/a").as_deref() == Some(b"fresh".as_slice())).await);
        assert!(eventually(|| logs_contain("created outside of the manager")).await);
        node.close().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[traced_test]
    async fn test_logs_auth_failure() {
        let zk = Arc::new(MemoryCoordinator::new());
        zk.deny_writes_under("/secure");
        let node = PersistentNode::new(zk.clone(), CreateMode::Ephemeral, false, "/secure/a", b"x")
            .unwrap();
        node.start().unwrap();
        assert!(eventually(|| node.is_auth_failure()).await);
        assert!(logs_contain("not authorised"));
        assert!(matches!(node.close().await, Ok(())));
    }

    #[tokio::test]
    async fn test_drop_without_close_keeps_node() {
        let zk = Arc::new(MemoryCoordinator::new());
        let node = PersistentNode::new(zk.clone(), CreateMode::Persistent, false, "/kept", b"x")
            .unwrap();
        node.start().unwrap();
        assert!(node.wait_for_initial_create(Duration::from_secs(2)).await.unwrap());
        drop(node);
        assert_eq!(zk.data_of("/kept").unwrap(), b"x");
    }
}

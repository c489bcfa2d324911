//! Chaos soak run against an in-process coordinator.
//!
//! Every configured node gets its own [`PersistentNode`]. Each round injects
//! one fault picked from a seeded schedule, then waits until every node is
//! back at its path with the data its manager holds. After the last round
//! all managers are closed and none of the paths they ever held may remain.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{CoordinatorConfig, NodeData, NodeSpec};
use rand::{Rng, SeedableRng, rngs::StdRng};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zk_coordination::{MemoryCoordinator, NodeError, NodeStore, PersistentNode, RetryPolicy};

use crate::cli;
use crate::report::{ChaosTotals, Check, NodeResult, SoakReport};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct SoakConfig {
    pub coordinator: CoordinatorConfig,
    pub rounds: u32,
    pub seed: u64,
    pub interval: Duration,
    /// how long a round may take to heal, the configured session timeout
    pub settle_timeout: Duration,
}

impl SoakConfig {
    pub fn new(coordinator: CoordinatorConfig, cli: &cli::Config) -> Self {
        let settle_timeout = coordinator.session_timeout();
        Self {
            coordinator,
            rounds: cli.rounds,
            seed: cli.seed,
            interval: cli.interval(),
            settle_timeout,
        }
    }
}

/// A fault injected between two convergence checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chaos {
    /// delete the node behind the manager's back
    Delete(usize),
    /// hand the manager new data
    Update(usize),
    ExpireSession,
    Reconnect,
    /// drop the connection for one interval, then reconnect
    Suspend,
}

impl Chaos {
    pub fn pick(rng: &mut StdRng, nodes: usize) -> Self {
        let roll = rng.gen_range(0..10);
        if nodes == 0 {
            return if roll < 5 {
                Chaos::ExpireSession
            } else {
                Chaos::Reconnect
            };
        }
        match roll {
            0..=3 => Chaos::Delete(rng.gen_range(0..nodes)),
            4 | 5 => Chaos::Update(rng.gen_range(0..nodes)),
            6 => Chaos::ExpireSession,
            7 | 8 => Chaos::Reconnect,
            _ => Chaos::Suspend,
        }
    }
}

struct Managed {
    spec: NodeSpec,
    node: PersistentNode,
}

pub async fn run_soak(config: SoakConfig, token: CancellationToken) -> Result<SoakReport> {
    let started = Instant::now();
    let zk = Arc::new(MemoryCoordinator::new());
    let retry = RetryPolicy::from(config.coordinator.retry());
    let store = NodeStore::connect(zk.clone(), config.coordinator.root_path(), retry)
        .await
        .context("failed to bootstrap root path")?;

    let mut managed = Vec::with_capacity(config.coordinator.nodes().len());
    for spec in config.coordinator.nodes() {
        let data = spec.data.to_bytes()?;
        let node = PersistentNode::with_retry_policy(
            Arc::clone(store.client()),
            spec.mode.into(),
            spec.protection,
            &spec.path,
            &data,
            retry,
        )
        .with_context(|| format!("invalid node {}", spec.path))?;
        node.start()?;
        managed.push(Managed {
            spec: spec.clone(),
            node,
        });
    }
    info!(nodes = managed.len(), rounds = config.rounds, seed = config.seed, "soak started");

    let mut checks = Vec::new();
    let mut pending = 0;
    for m in &managed {
        if !m.node.wait_for_initial_create(config.settle_timeout).await? {
            warn!(path = %m.spec.path, "initial create did not complete");
            pending += 1;
        }
    }
    checks.push(Check::new(
        "initial_create",
        pending == 0,
        format!("{} of {} nodes created", managed.len() - pending, managed.len()),
    ));

    let mut seen = BTreeSet::new();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut chaos = ChaosTotals::default();
    let mut rounds_completed = 0;
    let mut unhealed = 0;
    let mut slowest = Duration::ZERO;
    for round in 0..config.rounds {
        if token.is_cancelled() {
            break;
        }
        let action = Chaos::pick(&mut rng, managed.len());
        debug!(round, ?action, "injecting fault");
        inject(&zk, &store, &managed, action, round, config.interval, &mut chaos).await?;

        match converge(&store, &managed, config.settle_timeout, &mut seen).await {
            Some(took) => slowest = slowest.max(took),
            None => {
                warn!(round, ?action, "nodes did not converge");
                unhealed += 1;
            }
        }
        rounds_completed += 1;

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(config.interval) => {}
        }
    }
    checks.push(Check::new(
        "convergence",
        unhealed == 0,
        format!(
            "{} of {} rounds converged within {:?}",
            rounds_completed - unhealed,
            rounds_completed,
            config.settle_timeout
        ),
    ));

    let nodes: Vec<NodeResult> = managed
        .iter()
        .map(|m| NodeResult {
            base_path: m.spec.path.clone(),
            mode: m.node.mode().to_string(),
            actual_path: m.node.actual_path(),
            auth_failure: m.node.is_auth_failure(),
        })
        .collect();
    seen.extend(nodes.iter().filter_map(|n| n.actual_path.clone()));

    let mut close_errors = 0;
    for m in &managed {
        if let Err(err) = m.node.close().await {
            warn!(path = %m.spec.path, ?err, "failed to close node");
            close_errors += 1;
        }
    }
    checks.push(Check::new(
        "close",
        close_errors == 0,
        format!("{close_errors} close errors"),
    ));

    let leftovers = wait_until_gone(&store, &seen, config.settle_timeout).await?;
    checks.push(Check::new(
        "no_leftovers",
        leftovers.is_empty(),
        if leftovers.is_empty() {
            format!("{} paths removed", seen.len())
        } else {
            format!("left behind: {}", leftovers.join(", "))
        },
    ));

    store.close().await.context("failed to close coordinator session")?;

    let passed = checks.iter().all(|c| c.passed);
    info!(passed, rounds_completed, "soak finished");
    Ok(SoakReport {
        passed,
        seed: config.seed,
        rounds_planned: config.rounds,
        rounds_completed,
        cancelled: token.is_cancelled(),
        duration_ms: started.elapsed().as_millis(),
        slowest_heal_ms: slowest.as_millis(),
        chaos,
        nodes,
        checks,
    })
}

async fn inject(
    zk: &MemoryCoordinator,
    store: &NodeStore,
    managed: &[Managed],
    action: Chaos,
    round: u32,
    interval: Duration,
    totals: &mut ChaosTotals,
) -> Result<()> {
    match action {
        Chaos::Delete(idx) => {
            if let Some(path) = managed[idx].node.actual_path() {
                store.delete(&path, true).await?;
                totals.deletes += 1;
            }
        }
        Chaos::Update(idx) => {
            let m = &managed[idx];
            match m.node.set_data(&revision(&m.spec.data, round)?) {
                Ok(()) => totals.updates += 1,
                Err(NodeError::NotCreated) => debug!(path = %m.spec.path, "not created yet"),
                Err(err) => return Err(err.into()),
            }
        }
        Chaos::ExpireSession => {
            zk.expire_session();
            totals.expirations += 1;
        }
        Chaos::Reconnect => {
            zk.reconnect();
            totals.reconnects += 1;
        }
        Chaos::Suspend => {
            zk.suspend();
            tokio::time::sleep(interval).await;
            zk.reconnect();
            totals.suspensions += 1;
        }
    }
    Ok(())
}

/// Payload for an update in `round`, derived from the configured data.
fn revision(data: &NodeData, round: u32) -> Result<Vec<u8>> {
    let bytes = match data {
        NodeData::Text(text) => format!("{text}@{round}").into_bytes(),
        NodeData::Json(serde_json::Value::Object(map)) => {
            let mut map = map.clone();
            map.insert("revision".into(), round.into());
            serde_json::to_vec(&map)?
        }
        NodeData::Json(other) => {
            serde_json::to_vec(&serde_json::json!({ "value": other, "revision": round }))?
        }
    };
    Ok(bytes)
}

/// Wait until every node is at its path with its manager's data. Returns how
/// long that took, `None` on timeout.
async fn converge(
    store: &NodeStore,
    managed: &[Managed],
    timeout: Duration,
    seen: &mut BTreeSet<String>,
) -> Option<Duration> {
    let started = Instant::now();
    loop {
        let mut converged = true;
        for m in managed {
            let Some(path) = m.node.actual_path() else {
                converged = false;
                continue;
            };
            seen.insert(path.clone());
            match store.get_data(&path).await {
                Ok(data) if data == m.node.data() => {}
                _ => converged = false,
            }
        }
        if converged {
            return Some(started.elapsed());
        }
        if started.elapsed() >= timeout {
            return None;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Paths from `paths` that still exist once `timeout` has elapsed.
async fn wait_until_gone(
    store: &NodeStore,
    paths: &BTreeSet<String>,
    timeout: Duration,
) -> Result<Vec<String>> {
    let started = Instant::now();
    loop {
        let mut remaining = Vec::new();
        for path in paths {
            if store.exists(path).await? {
                remaining.push(path.clone());
            }
        }
        if remaining.is_empty() || started.elapsed() >= timeout {
            return Ok(remaining);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

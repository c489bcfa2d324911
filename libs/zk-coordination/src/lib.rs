//! # zk-coordination
//!
//! Client-side helpers for keeping nodes alive on a ZooKeeper-style
//! coordination service: sessions, ephemeral and sequential nodes, one-shot
//! watches.
//!
//! This library provides:
//! - **Client contract** ([`CoordinationClient`]) the rest of the crate is
//!   written against, with single-use [`Watch`] tokens and a broadcast of
//!   connection state transitions.
//! - **Self-healing node manager** ([`PersistentNode`]) that creates a node,
//!   keeps it populated with the latest data, and recreates it after
//!   external deletion or session loss until it is closed.
//! - **Path utility layer** ([`NodeStore`]) for listing, reading, writing and
//!   deleting nodes, with JSON payloads.
//! - **In-memory coordinator** ([`MemoryCoordinator`]) with fault injection,
//!   used by tests and the soak tool.

pub mod client;
pub mod error;
pub mod memory;
pub mod models;
pub mod node;
pub mod paths;
pub mod retry;
pub mod store;

pub use client::{CoordinationClient, Watch};
pub use error::{CoordinationError, CoordinationResult, NodeError};
pub use memory::{CallCounters, MemoryCoordinator};
pub use models::{
    ConnectionState, CreateMode, EventType, LiveNodeInfo, NodeInfo, ServiceType, Stat,
    WatchedEvent,
};
pub use node::{Lifecycle, PersistentNode};
pub use retry::RetryPolicy;
pub use store::NodeStore;

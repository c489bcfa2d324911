//! Typed models and codecs for coordination payloads.
//!
//! Node metadata (`Stat`, `CreateMode`), watch events and connection states
//! follow the ZooKeeper data model. `LiveNodeInfo` and `NodeInfo` are the
//! registry documents services publish about themselves.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoordinationError, CoordinationResult};

// ---------------------------------------------------------------------------
// Create mode
// ---------------------------------------------------------------------------

/// Determines how a node is created on the coordination service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateMode {
    /// The node is not removed when the creating session ends.
    Persistent,
    /// The node is removed when the creating session ends.
    Ephemeral,
    /// Persistent, and the service appends a monotonically increasing
    /// ten-digit suffix to the name.
    PersistentSequential,
    /// Ephemeral, with a sequential suffix.
    EphemeralSequential,
}

impl CreateMode {
    pub fn is_ephemeral(self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    pub fn is_sequential(self) -> bool {
        matches!(
            self,
            CreateMode::PersistentSequential | CreateMode::EphemeralSequential
        )
    }

    /// The same mode without the sequential suffix.
    pub fn non_sequential(self) -> CreateMode {
        match self {
            CreateMode::EphemeralSequential => CreateMode::Ephemeral,
            CreateMode::PersistentSequential => CreateMode::Persistent,
            other => other,
        }
    }
}

impl std::fmt::Display for CreateMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CreateMode::Persistent => write!(f, "persistent"),
            CreateMode::Ephemeral => write!(f, "ephemeral"),
            CreateMode::PersistentSequential => write!(f, "persistent_sequential"),
            CreateMode::EphemeralSequential => write!(f, "ephemeral_sequential"),
        }
    }
}

impl From<config::NodeMode> for CreateMode {
    fn from(mode: config::NodeMode) -> Self {
        match mode {
            config::NodeMode::Persistent => CreateMode::Persistent,
            config::NodeMode::Ephemeral => CreateMode::Ephemeral,
            config::NodeMode::PersistentSequential => CreateMode::PersistentSequential,
            config::NodeMode::EphemeralSequential => CreateMode::EphemeralSequential,
        }
    }
}

// ---------------------------------------------------------------------------
// Stat
// ---------------------------------------------------------------------------

/// Statistics about a node, similar to the UNIX `stat` structure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    /// The transaction ID that created the node.
    pub czxid: i64,
    /// The last transaction that modified the node.
    pub mzxid: i64,
    /// Milliseconds since epoch when the node was created.
    pub ctime: i64,
    /// Milliseconds since epoch when the node was last modified.
    pub mtime: i64,
    /// The number of changes to the data of the node.
    pub version: i32,
    /// The number of changes to the children of the node.
    pub cversion: i32,
    /// The number of changes to the ACL of the node.
    pub aversion: i32,
    /// The session ID of the owner of this node, 0 unless ephemeral.
    pub ephemeral_owner: i64,
    /// The length of the data field of the node.
    pub data_length: i32,
    /// The number of children this node has.
    pub num_children: i32,
    /// The transaction ID that last modified the children of the node.
    pub pzxid: i64,
}

impl Stat {
    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral_owner != 0
    }
}

// ---------------------------------------------------------------------------
// Watches and connection state
// ---------------------------------------------------------------------------

/// The change a one-shot watch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    NodeCreated,
    NodeDeleted,
    NodeDataChanged,
    NodeChildrenChanged,
}

/// Event delivered exactly once to the watch that was armed on `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedEvent {
    pub event_type: EventType,
    pub path: String,
}

/// Connection state transitions published by a coordination client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// First successful connection.
    Connected,
    /// Connection dropped; the session may still be alive.
    Suspended,
    /// Connection re-established after `Suspended` or `Lost`. Ephemeral
    /// nodes may or may not have survived.
    Reconnected,
    /// The session is gone.
    Lost,
    /// Connected to a read-only server.
    ReadOnly,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::Reconnected | ConnectionState::ReadOnly
        )
    }
}

// ---------------------------------------------------------------------------
// Registry documents
// ---------------------------------------------------------------------------

/// Role a registered service plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceType {
    Core,
    Adapter,
    LiveAdapter,
}

/// Presence document for a running service instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveNodeInfo {
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub host: String,
    pub jmx_port: u16,
    pub status_url: String,
}

/// Persistent description of a service and its last run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub name: String,
    #[serde(default)]
    pub properties: HashMap<String, String>,
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    pub last_start_time: Option<DateTime<Utc>>,
    pub last_exit_time: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Codec helpers
// ---------------------------------------------------------------------------

/// Encode a typed model to JSON bytes for storage in a node.
pub fn encode<T: Serialize>(value: &T) -> CoordinationResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| CoordinationError::Codec(e.to_string()))
}

/// Decode JSON bytes read from a node into a typed model.
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> CoordinationResult<T> {
    serde_json::from_slice(data).map_err(|e| CoordinationError::Codec(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_mode_flags() {
        assert!(CreateMode::Ephemeral.is_ephemeral());
        assert!(CreateMode::EphemeralSequential.is_ephemeral());
        assert!(!CreateMode::Persistent.is_ephemeral());
        assert!(!CreateMode::PersistentSequential.is_ephemeral());

        assert!(CreateMode::PersistentSequential.is_sequential());
        assert!(CreateMode::EphemeralSequential.is_sequential());
        assert!(!CreateMode::Ephemeral.is_sequential());
    }

    #[test]
    fn test_non_sequential() {
        assert_eq!(
            CreateMode::EphemeralSequential.non_sequential(),
            CreateMode::Ephemeral
        );
        assert_eq!(
            CreateMode::PersistentSequential.non_sequential(),
            CreateMode::Persistent
        );
        assert_eq!(CreateMode::Ephemeral.non_sequential(), CreateMode::Ephemeral);
        assert_eq!(
            CreateMode::Persistent.non_sequential(),
            CreateMode::Persistent
        );
    }

    #[test]
    fn test_from_config_mode() {
        assert_eq!(
            CreateMode::from(config::NodeMode::EphemeralSequential),
            CreateMode::EphemeralSequential
        );
        assert_eq!(
            CreateMode::from(config::NodeMode::Persistent),
            CreateMode::Persistent
        );
    }

    #[test]
    fn test_connection_state_is_connected() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(ConnectionState::Reconnected.is_connected());
        assert!(!ConnectionState::Suspended.is_connected());
        assert!(!ConnectionState::Lost.is_connected());
    }

    #[test]
    fn test_live_node_info_json_field_names() {
        let info = LiveNodeInfo {
            name: "adapter-1".into(),
            start_time: Utc::now(),
            host: "host-a".into(),
            jmx_port: 9010,
            status_url: "http://host-a:8080/status".into(),
        };
        let json: serde_json::Value = serde_json::from_slice(&encode(&info).unwrap()).unwrap();
        assert_eq!(json["jmxPort"], 9010);
        assert_eq!(json["statusUrl"], "http://host-a:8080/status");
        assert!(json.get("startTime").is_some());
    }

    #[test]
    fn test_node_info_decode() {
        let json = r#"{
            "name": "adapter-1",
            "properties": {"region": "eu-west"},
            "type": "LIVE_ADAPTER",
            "lastStartTime": "2024-05-01T10:00:00Z",
            "lastExitTime": null
        }"#;
        let info: NodeInfo = decode(json.as_bytes()).unwrap();
        assert_eq!(info.service_type, ServiceType::LiveAdapter);
        assert_eq!(info.properties.get("region").unwrap(), "eu-west");
        assert!(info.last_start_time.is_some());
        assert!(info.last_exit_time.is_none());
    }

    #[test]
    fn test_decode_invalid_json() {
        let result: CoordinationResult<NodeInfo> = decode(b"not json at all");
        assert!(matches!(result.unwrap_err(), CoordinationError::Codec(_)));
    }
}

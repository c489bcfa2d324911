use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize, de};

/// default connect string used when none is configured
pub const DEFAULT_CONNECT_STRING: &str = "127.0.0.1:2181";
/// default root path bootstrapped on connect
pub const DEFAULT_ROOT_PATH: &str = "/";

/// top-level config type
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_connect_string")]
    pub connect_string: String,
    #[serde(
        default = "default_session_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub session_timeout: Duration,
    #[serde(default = "default_root_path")]
    pub root_path: String,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
}

/// retry policy for transient coordination errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_base_delay", deserialize_with = "deserialize_duration")]
    pub base_delay: Duration,
    #[serde(default = "default_max_delay", deserialize_with = "deserialize_duration")]
    pub max_delay: Duration,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            max_retries: default_max_retries(),
        }
    }
}

/// a node that should be kept alive for the lifetime of the process
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NodeSpec {
    pub path: String,
    #[serde(default)]
    pub mode: NodeMode,
    #[serde(default)]
    pub protection: bool,
    #[serde(default)]
    pub data: NodeData,
}

/// how the node is created on the coordination service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeMode {
    Persistent,
    #[default]
    Ephemeral,
    PersistentSequential,
    EphemeralSequential,
}

/// node payload, either a raw string or an arbitrary JSON document
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum NodeData {
    Text(String),
    Json(serde_json::Value),
}

impl Default for NodeData {
    fn default() -> Self {
        NodeData::Text(String::new())
    }
}

impl NodeData {
    /// bytes stored at the node
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            NodeData::Text(s) => Ok(s.as_bytes().to_vec()),
            NodeData::Json(v) => serde_json::to_vec(v).context("failed to encode node data"),
        }
    }
}

pub fn default_connect_string() -> String {
    DEFAULT_CONNECT_STRING.to_owned()
}

pub fn default_root_path() -> String {
    DEFAULT_ROOT_PATH.to_owned()
}

pub const fn default_session_timeout() -> Duration {
    Duration::from_secs(15)
}

pub const fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}

pub const fn default_max_delay() -> Duration {
    Duration::from_secs(15)
}

pub const fn default_max_retries() -> u32 {
    29
}

/// Parse a duration string with optional time units
/// Accepts: "500", "500ms", "3s", "1m", "1h"
/// If no unit is specified, assumes milliseconds
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(anyhow::Error::msg("empty duration string"));
    }

    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    // split units
    let (num, unit) = s.split_at(end);
    let num = num.parse::<u64>().context("invalid number")?;

    let millis = match unit.trim() {
        "" | "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        other => anyhow::bail!(
            "unknown time unit '{}', only 'h', 'm', 's' or 'ms' are supported",
            other
        ),
    };

    num.checked_mul(millis)
        .map(Duration::from_millis)
        .context("duration value overflow")
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireDuration {
    Millis(u64),
    String(String),
}

fn deserialize_duration<'de, D>(de: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match WireDuration::deserialize(de)? {
        WireDuration::Millis(ms) => Ok(Duration::from_millis(ms)),
        WireDuration::String(s) => parse_duration(&s).map_err(de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration(" 15s ").unwrap(), Duration::from_secs(15));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("60d").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("10mins").is_err());
    }

    #[test]
    fn test_defaults() {
        let cfg: Config = serde_yaml::from_str("nodes: []").unwrap();
        assert_eq!(cfg.connect_string, DEFAULT_CONNECT_STRING);
        assert_eq!(cfg.root_path, "/");
        assert_eq!(cfg.session_timeout, Duration::from_secs(15));
        assert_eq!(cfg.retry, RetryConfig::default());
        assert_eq!(cfg.retry.max_retries, 29);
    }

    #[test]
    fn test_node_spec() {
        let yaml = r#"
path: /locks/worker
mode: ephemeral_sequential
protection: true
data:
  host: host-a
  port: 8080
"#;
        let spec: NodeSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.mode, NodeMode::EphemeralSequential);
        assert!(spec.protection);
        let bytes = spec.data.to_bytes().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["host"], "host-a");
        assert_eq!(value["port"], 8080);
    }

    #[test]
    fn test_node_spec_text_defaults() {
        let spec: NodeSpec = serde_json::from_str(r#"{"path": "/a", "data": "host-a"}"#).unwrap();
        assert_eq!(spec.mode, NodeMode::Ephemeral);
        assert!(!spec.protection);
        assert_eq!(spec.data.to_bytes().unwrap(), b"host-a");
    }

    #[test]
    fn test_retry_durations() {
        let json = r#"{"base_delay": 100, "max_delay": "2s", "max_retries": 3}"#;
        let retry: RetryConfig = serde_json::from_str(json).unwrap();
        assert_eq!(retry.base_delay, Duration::from_millis(100));
        assert_eq!(retry.max_delay, Duration::from_secs(2));
        assert_eq!(retry.max_retries, 3);
    }
}

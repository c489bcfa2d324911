use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use tracing::debug;

pub mod wire;

pub use wire::{NodeData, NodeMode, NodeSpec, RetryConfig};

/// coordinator config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    inner: wire::Config,
    path: Option<PathBuf>,
}

impl CoordinatorConfig {
    /// attempts to decode the config first as JSON, then YAML, finally erroring if neither work
    pub fn parse<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to find config at {}", &path.display()))?;
        let mut config = Self::parse_str(s)?;
        config.path = Some(path.to_path_buf());
        Ok(config)
    }

    /// attempts to decode the config first as JSON, then YAML, finally erroring if neither work
    pub fn parse_str<S: AsRef<str>>(s: S) -> Result<Self> {
        let s = s.as_ref();
        let inner: wire::Config = match serde_json::from_str(s) {
            Ok(cfg) => cfg,
            Err(json_err) => serde_yaml::from_str(s).with_context(|| {
                format!("config is neither valid JSON ({json_err}) nor valid YAML")
            })?,
        };
        debug!(?inner);
        validate(&inner)?;

        Ok(Self { inner, path: None })
    }

    pub fn connect_string(&self) -> &str {
        &self.inner.connect_string
    }
    pub fn session_timeout(&self) -> Duration {
        self.inner.session_timeout
    }
    pub fn root_path(&self) -> &str {
        &self.inner.root_path
    }
    pub fn retry(&self) -> &RetryConfig {
        &self.inner.retry
    }
    pub fn nodes(&self) -> &[NodeSpec] {
        &self.inner.nodes
    }
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            inner: wire::Config {
                connect_string: wire::default_connect_string(),
                session_timeout: wire::default_session_timeout(),
                root_path: wire::default_root_path(),
                retry: RetryConfig::default(),
                nodes: Vec::new(),
            },
            path: None,
        }
    }
}

fn validate(cfg: &wire::Config) -> Result<()> {
    check_path(&cfg.root_path).context("invalid root_path")?;
    for node in &cfg.nodes {
        check_path(&node.path).with_context(|| format!("invalid node path {:?}", node.path))?;
        if node.path == "/" {
            bail!("node path cannot be the root");
        }
    }
    if cfg.retry.base_delay > cfg.retry.max_delay {
        bail!(
            "retry base_delay ({:?}) is larger than max_delay ({:?})",
            cfg.retry.base_delay,
            cfg.retry.max_delay
        );
    }
    Ok(())
}

fn check_path(path: &str) -> Result<()> {
    if !path.starts_with('/') {
        bail!("path must start with '/'");
    }
    if path.len() > 1 && path.ends_with('/') {
        bail!("path must not end with '/'");
    }
    if path.contains("//") {
        bail!("path must not contain empty segments");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    pub static EXAMPLE: &str = include_str!("../../../example.yaml");

    // test we can decode example file
    #[test]
    fn test_example() {
        let cfg = CoordinatorConfig::parse_str(EXAMPLE).unwrap();
        println!("{cfg:#?}");
        assert_eq!(cfg.root_path(), "/services");
        assert_eq!(cfg.nodes().len(), 3);
        assert_eq!(cfg.retry().base_delay, Duration::from_millis(200));
    }

    #[test]
    fn test_json_config() {
        let cfg = CoordinatorConfig::parse_str(
            r#"{"connect_string": "zk-1:2181,zk-2:2181", "nodes": [{"path": "/live/a"}]}"#,
        )
        .unwrap();
        assert_eq!(cfg.connect_string(), "zk-1:2181,zk-2:2181");
        assert_eq!(cfg.nodes()[0].mode, NodeMode::Ephemeral);
    }

    #[test]
    fn test_invalid_paths() {
        assert!(CoordinatorConfig::parse_str("root_path: services").is_err());
        assert!(CoordinatorConfig::parse_str("nodes: [{path: /a/}]").is_err());
        assert!(CoordinatorConfig::parse_str("nodes: [{path: /a//b}]").is_err());
        assert!(CoordinatorConfig::parse_str("nodes: [{path: /}]").is_err());
    }

    #[test]
    fn test_invalid_retry() {
        let err = CoordinatorConfig::parse_str("retry: {base_delay: 5s, max_delay: 1s}");
        assert!(err.is_err());
    }

    #[test]
    fn test_default() {
        let cfg = CoordinatorConfig::default();
        assert_eq!(cfg.root_path(), "/");
        assert!(cfg.nodes().is_empty());
        assert!(cfg.path().is_none());
    }
}

//! Parse from either cli or env var

use std::{path::PathBuf, time::Duration};

pub use clap::Parser;

/// the default path to config
pub static DEFAULT_CONFIG_PATH: &str = "/etc/znode/config.yaml";
/// default log level. Can use this argument or ZNODE_LOG env var
pub const DEFAULT_ZNODE_LOG: &str = "info";
/// log as "json", "pretty" or "standard" (unstructured)
pub static DEFAULT_LOG_FORMAT: &str = "standard";
/// tokio worker thread name
pub static DEFAULT_THREAD_NAME: &str = "znode-worker";
/// number of chaos rounds
pub const DEFAULT_ROUNDS: u32 = 50;
/// pause between rounds in milliseconds
pub const DEFAULT_INTERVAL_MS: u64 = 20;

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[clap(author, name = "znode-soak", bin_name = "znode-soak", about, long_about = None)]
/// keeps the configured nodes alive on an in-process coordinator while
/// injecting faults, and checks they always heal. `.env` is loaded as well
pub struct Config {
    /// path to the coordinator config
    #[clap(
        short,
        long,
        value_parser,
        env,
        default_value = DEFAULT_CONFIG_PATH
    )]
    pub config_path: PathBuf,
    /// set the log level. All valid RUST_LOG arguments are accepted
    #[clap(long, env, value_parser, default_value = DEFAULT_ZNODE_LOG)]
    pub znode_log: String,
    /// "standard", "json" or "pretty"
    #[clap(long, env, value_parser, default_value = DEFAULT_LOG_FORMAT)]
    pub log_format: String,
    /// Worker thread name
    #[clap(long, env, value_parser, default_value = DEFAULT_THREAD_NAME)]
    pub thread_name: String,
    /// number of worker threads, defaults to the number of cpus
    #[clap(long, env, value_parser)]
    pub threads: Option<usize>,
    /// chaos rounds to run
    #[clap(long, env, value_parser, default_value_t = DEFAULT_ROUNDS)]
    pub rounds: u32,
    /// seed for the chaos schedule
    #[clap(long, env, value_parser, default_value_t = 1)]
    pub seed: u64,
    /// pause between rounds in milliseconds
    #[clap(long, env, value_parser, default_value_t = DEFAULT_INTERVAL_MS)]
    pub interval_ms: u64,
    /// print the report as json
    #[clap(long)]
    pub json: bool,
}

impl Config {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#![allow(clippy::cognitive_complexity)]
use anyhow::{Context, Result, anyhow};
use config::CoordinatorConfig;
use tokio::{runtime::Builder, signal};
use tokio_util::sync::CancellationToken;
use tracing::*;

mod cli;
mod report;
mod soak;
mod trace;

use cli::Parser;
use soak::SoakConfig;

fn main() -> Result<()> {
    if let Err(err) = dotenv::dotenv() {
        eprintln!(".env file not loaded: {err}");
    }
    // parses from cli or environment var
    let config = cli::Config::parse();
    let trace_config = trace::Config::parse(&config.znode_log, &config.log_format)?;
    debug!(?config, ?trace_config);

    let mut builder = Builder::new_multi_thread();
    // configure thread name & enable IO/time
    builder.thread_name(&config.thread_name).enable_all();
    // default num threads will be num logical CPUs
    if let Some(num) = config.threads {
        builder.worker_threads(num);
    }
    let rt = builder.build()?;

    let code = rt.block_on(async move {
        match tokio::spawn(async move { start(config).await }).await {
            Err(err) => {
                error!(?err, "soak task failed");
                2
            }
            Ok(Err(err)) => {
                error!(?err, "exited with error");
                eprintln!("run failed: {err:#}");
                2
            }
            Ok(Ok(true)) => 0,
            Ok(Ok(false)) => 1,
        }
    });
    std::process::exit(code);
}

/// Run the soak and print its report. Returns whether it passed.
async fn start(config: cli::Config) -> Result<bool> {
    debug!("parsing coordinator config");
    let coordinator = CoordinatorConfig::parse(&config.config_path)?;
    info!(
        connect_string = coordinator.connect_string(),
        session_timeout = ?coordinator.session_timeout(),
        nodes = coordinator.nodes().len(),
        "running against an in-process coordinator"
    );

    let token = CancellationToken::new();
    tokio::spawn(shutdown_signal(token.clone()));

    let report = soak::run_soak(SoakConfig::new(coordinator, &config), token).await?;
    if config.json {
        let json = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
        println!("{json}");
    } else {
        println!("{}", report.human_summary());
    }
    Ok(report.passed)
}

async fn shutdown_signal(token: CancellationToken) -> Result<()> {
    let ret = signal::ctrl_c().await.map_err(|err| anyhow!(err));
    info!("interrupted, stopping after the current round");
    token.cancel();
    ret
}

//! tracing configuration
use anyhow::Result;
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::{
        self,
        format::{Format, PrettyFields},
    },
    prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

/// Installed subscriber settings
#[derive(Debug)]
pub struct Config {
    /// formatting applied to logs
    pub log_frmt: String,
}

impl Config {
    /// Install the global subscriber. Level comes from ZNODE_LOG, format
    /// from LOG_FORMAT.
    pub fn parse(znode_log: &str, log_frmt: &str) -> Result<Self> {
        let filter = EnvFilter::try_new(znode_log).or_else(|_| EnvFilter::try_new("info"))?;

        // the report goes to stdout, logs go to stderr
        match log_frmt {
            "json" => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json().with_writer(std::io::stderr))
                    .init();
            }
            "pretty" => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(
                        fmt::layer()
                            .event_format(Format::default().pretty().with_source_location(false))
                            .fmt_fields(PrettyFields::new())
                            .with_writer(std::io::stderr),
                    )
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().with_writer(std::io::stderr))
                    .init();
            }
        }

        Ok(Self {
            log_frmt: log_frmt.to_owned(),
        })
    }
}

//! Command line arguments. Every flag can also be set through the
//! environment, which is how container platforms configure the process.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line, for log ingestion.
    Json,
    /// Multi-line human-readable output.
    Pretty,
}

#[derive(Debug, Parser)]
#[command(
    name = "build-notifier",
    version,
    about = "Forwards Cloud Build events to a chat webhook"
)]
pub struct Args {
    /// Path to the notifier YAML document.
    #[arg(long, env = "CONFIG_PATH")]
    pub config: PathBuf,

    /// Port the Pub/Sub push receiver listens on.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Base directory for relative `file:` secret resources.
    #[arg(long, env = "SECRETS_DIR")]
    pub secrets_dir: Option<PathBuf>,

    /// Abandon a webhook POST after this many seconds. Unset means no limit.
    #[arg(long, env = "DELIVERY_TIMEOUT_SECS")]
    pub delivery_timeout_secs: Option<u64>,

    /// Configure the notifier (filter + secrets) and exit.
    #[arg(long, conflicts_with = "smoketest")]
    pub setup_check: bool,

    /// Configure the notifier, send one synthetic SUCCESS event, and exit.
    #[arg(long)]
    pub smoketest: bool,
}

impl Args {
    pub fn delivery_timeout(&self) -> Option<Duration> {
        self.delivery_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply() {
        let args = Args::try_parse_from(["build-notifier", "--config", "notifier.yaml"]).unwrap();

        assert_eq!(args.config, PathBuf::from("notifier.yaml"));
        assert!(!args.setup_check);
        assert!(!args.smoketest);
    }

    #[test]
    fn setup_check_and_smoketest_conflict() {
        let result = Args::try_parse_from([
            "build-notifier",
            "--config",
            "notifier.yaml",
            "--setup-check",
            "--smoketest",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn timeout_is_converted_to_duration() {
        let args = Args::try_parse_from([
            "build-notifier",
            "--config",
            "n.yaml",
            "--log-format",
            "pretty",
            "--delivery-timeout-secs",
            "5",
        ])
        .unwrap();

        assert_eq!(args.log_format, LogFormat::Pretty);
        assert_eq!(args.delivery_timeout(), Some(Duration::from_secs(5)));
    }
}

//! Loading the notifier YAML document.

use std::path::Path;

use anyhow::Context;
use notifier::NotifierConfig;
use tracing::{info, warn};

const API_VERSION: &str = "cloud-build-notifiers/v1";

/// Reads and parses the document at `path`.
pub async fn load(path: &Path) -> anyhow::Result<NotifierConfig> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config = parse(&raw).with_context(|| format!("failed to parse {}", path.display()))?;

    info!(
        name = %config.metadata.name,
        kind = %config.kind,
        path = %path.display(),
        "Loaded notifier config"
    );
    Ok(config)
}

pub fn parse(raw: &str) -> anyhow::Result<NotifierConfig> {
    let config: NotifierConfig = serde_yaml::from_str(raw)?;
    if config.api_version != API_VERSION {
        warn!(
            api_version = %config.api_version,
            expected = API_VERSION,
            "Unexpected config apiVersion"
        );
    }
    Ok(config)
}

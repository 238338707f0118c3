//! One-shot end-to-end check against the configured endpoints.

use anyhow::Context;
use notifier::{BuildEvent, BuildStatus, Notifier};
use tracing::info;

/// The event sent by `--smoketest`.
pub fn synthetic_event() -> BuildEvent {
    BuildEvent {
        id: "smoketest".to_string(),
        status: BuildStatus::Success,
        log_url: "https://console.cloud.google.com/cloud-build/builds".to_string(),
        ..Default::default()
    }
}

/// Sends [`synthetic_event`] through the full notify path.
pub async fn run(notifier: &Notifier) -> anyhow::Result<()> {
    let outcome = notifier
        .notify(&synthetic_event())
        .await
        .context("smoke test notification failed")?;
    info!(?outcome, "Smoke test finished");
    Ok(())
}

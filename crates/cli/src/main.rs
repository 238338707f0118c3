//! Build notifier entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse arguments** — flags with environment fallbacks (see [`args`]).
//! 2. **Wire observability** — `tracing-subscriber` with a JSON (default) or
//!    pretty layer. All `tracing` events emitted by every crate in the
//!    workspace flow through it.
//! 3. **Load configuration** — read the notifier YAML document.
//! 4. **Construct infrastructure** — the scheme-dispatching secret getter and
//!    the webhook client, injected into [`notifier::Notifier::configure`].
//! 5. **Select mode** — `--setup-check` exits after configuration,
//!    `--smoketest` sends one synthetic event, otherwise serve the Pub/Sub
//!    push receiver.

mod args;
mod document;
mod server;
mod smoke;
mod telemetry;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use discord::DiscordWebhookClient;
use notifier::Notifier;
use secrets::{FileSecretGetter, SchemeSecretGetter};
use tracing::info;

use crate::args::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    telemetry::init(args.log_format);

    let config = document::load(&args.config).await?;

    let mut secrets = SchemeSecretGetter::new();
    if let Some(dir) = &args.secrets_dir {
        secrets = secrets.with_file_getter(FileSecretGetter::with_base_dir(dir));
    }

    let sender = match args.delivery_timeout() {
        Some(timeout) => DiscordWebhookClient::with_timeout(timeout)?,
        None => DiscordWebhookClient::new(),
    };

    let notifier = Notifier::configure(&config, &secrets, Arc::new(sender))
        .await
        .context("failed to configure notifier")?;

    if args.setup_check {
        info!("Setup check passed");
        return Ok(());
    }
    if args.smoketest {
        return smoke::run(&notifier).await;
    }

    server::serve(Arc::new(notifier), args.port).await
}

//! blockboard binary.
//!
//! Usage:
//!   blockboard create --repository acme/status --git-token $TOKEN --blocks "$(cat blocks.json)"
//!   blockboard update --repository acme/status --git-token $TOKEN --branch $BRANCH \
//!       --channel-id C0123 --ts 1700000000.000100 --block-id deploy --status done
//!   blockboard remove --repository acme/status --git-token $TOKEN --branch $BRANCH
//!
//! Inside a GitHub Action the flags can be omitted; they are read from the
//! `INPUT_*` environment. Logs go to stderr, outputs to stdout.

use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt};

mod cli;
mod commands;
mod outputs;

use cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; stopping before the next attempt");
            on_signal.cancel();
        }
    });

    match commands::run(cli, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

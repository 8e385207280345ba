//! subwatch daemon: one long-running process, no subcommands.

use std::path::Path;

use subwatch::BotConfig;
use subwatch::channels::{RuntimeParts, serve};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BotConfig::load();
    let _log_guard = init_tracing(config.as_ref().ok().and_then(|c| c.log_dir.as_deref()));

    let config = match config {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("cannot start: {err}");
            return Err(err.into());
        }
    };
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        db = %config.db_path.display(),
        timezone = %config.timezone,
        "configuration loaded"
    );

    let parts = RuntimeParts::from_config(config)?;
    serve(parts, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!("ctrl-c handler unavailable: {err}");
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Stderr logging, plus a daily-rolling file when a log directory is set.
/// The returned guard flushes the file writer on drop.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("subwatch=info,reqwest=warn,hyper=warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "subwatch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    guard
}

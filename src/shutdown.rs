use anyhow::Context;
use tokio::select;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancels `shutdown` when the process receives SIGINT or SIGTERM
pub fn install_signal_handlers(shutdown: CancellationToken) -> anyhow::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())
        .context("error installing SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate())
        .context("error installing SIGTERM handler")?;

    tokio::spawn(async move {
        select! {
            _ = sigint.recv() => info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            _ = shutdown.cancelled() => return,
        }
        shutdown.cancel();
    });
    Ok(())
}

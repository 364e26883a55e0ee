//! Signal handling for the polling view.

use anyhow::Result;
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;

/// Wait until SIGINT or SIGTERM is received.
///
/// # Errors
/// Returns an error if the SIGTERM handler cannot be installed.
pub async fn shutdown_signal() -> Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Received SIGINT");
        }
        _ = terminate.recv() => info!("Received SIGTERM"),
    }

    Ok(())
}

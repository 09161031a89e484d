// Speed Guard Shutdown Signals
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Turns Ctrl-C / SIGTERM into a cancelled token. The guard loop observes the
// token, cancels all load workers and returns; the server drains and stops.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Spawn a background task that cancels `shutdown` on the first termination
/// signal.
pub fn install_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_signal() => {
                warn!("[SIGNAL] Termination signal received. Stopping Speed Guard...");
                shutdown.cancel();
            }
            _ = shutdown.cancelled() => {}
        }
        info!("[SIGNAL] Signal handler finished.");
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!("[SIGNAL] Failed to install SIGTERM handler: {}", e);
            ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("[SIGNAL] Failed to install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
}

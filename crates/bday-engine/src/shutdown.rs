// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Graceful shutdown coordination with signal handling.
//!
//! SIGTERM and SIGINT (Ctrl+C) cancel a [`CancellationToken`] that every
//! engine loop watches. Loops stop between ticks; a send already in flight
//! finishes or hits its timeout.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Spawn a task that cancels the returned token on SIGTERM or SIGINT.
///
/// Cancelling the token directly also stops the task.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let watcher = token.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = watcher.cancelled() => debug!("shutdown requested without a signal"),
            _ = wait_for_signal() => watcher.cancel(),
        }
    });

    token
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT (Ctrl+C), initiating shutdown"),
                    _ = sigterm.recv() => info!("received SIGTERM, initiating shutdown"),
                }
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler, listening for Ctrl+C only");
                let _ = ctrl_c.await;
                info!("received SIGINT (Ctrl+C), initiating shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!("received Ctrl+C, initiating shutdown");
    }
}

/// Wait for `task` to finish, giving up after `timeout`.
///
/// Returns `false` if the deadline passed first.
pub async fn drain<F: Future<Output = ()>>(task: F, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, task).await {
        Ok(()) => {
            info!("engine drained");
            true
        }
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs(), "drain timeout reached, exiting anyway");
            false
        }
    }
}

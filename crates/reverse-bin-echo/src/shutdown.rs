//! Process shutdown.
//!
//! Graceful shutdown waits for SIGINT or SIGTERM and lets the server drain
//! and clean up. Abrupt shutdown exits on the spot with a chosen code and
//! skips all cleanup, including removing the socket file.

use std::time::Duration;

use log::{info, warn};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;

/// Exit code used by `/crash`.
pub const CRASH_EXIT_CODE: i32 = 42;

/// Time given to in-flight responses before an abrupt exit.
pub const ABRUPT_EXIT_DELAY: Duration = Duration::from_millis(50);

/// Resolve once SIGINT or SIGTERM arrives.
pub async fn graceful_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}

/// Terminate the process immediately.
pub fn abrupt(code: i32) -> ! {
    warn!("Exiting abruptly with code {}", code);
    std::process::exit(code)
}

/// Wait for the first exit request and honour it.
pub async fn watch_abrupt(mut exit_rx: mpsc::UnboundedReceiver<i32>) {
    if let Some(code) = exit_rx.recv().await {
        tokio::time::sleep(ABRUPT_EXIT_DELAY).await;
        abrupt(code);
    }
}

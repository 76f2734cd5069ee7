//! echo-backend - Reference backend for reverse-bin.
//!
//! ## Usage
//!
//! ```bash
//! REVERSE_PROXY_TO=127.0.0.1:0 echo-backend
//! REVERSE_PROXY_TO=unix/app.sock echo-backend
//! ```
//!
//! Once listening, the bound endpoint is printed as the only stdout line
//! (with the real port for TCP), which the proxy reads as the readiness
//! signal.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use axum::Router;
use log::{debug, info, warn};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::mpsc;

use reverse_bin_discover::Endpoint;
use reverse_bin_discover::environment::REVERSE_PROXY_TO;
use reverse_bin_echo::{AppState, PeerAddr, create_router, shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let raw = std::env::var(REVERSE_PROXY_TO)
        .with_context(|| format!("{REVERSE_PROXY_TO} must be set"))?;
    let endpoint =
        Endpoint::parse(&raw).with_context(|| format!("parsing {REVERSE_PROXY_TO}"))?;

    let (exit_tx, exit_rx) = mpsc::unbounded_channel();
    tokio::spawn(shutdown::watch_abrupt(exit_rx));
    let app = create_router(AppState::new(exit_tx));

    match endpoint {
        Endpoint::Tcp { host, port } => serve_tcp(&host, port, app).await,
        Endpoint::Unix { path } => serve_unix(&path, app).await,
    }
}

/// Print the readiness line.
fn announce(endpoint: &Endpoint) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{endpoint}").context("writing endpoint to stdout")?;
    stdout.flush().context("flushing stdout")?;
    Ok(())
}

async fn serve_tcp(host: &str, port: u16, app: Router) -> Result<()> {
    let listener = TcpListener::bind((host, port))
        .await
        .with_context(|| format!("binding to {host}:{port}"))?;
    let local = listener.local_addr().context("reading bound address")?;

    announce(&Endpoint::Tcp {
        host: host.to_string(),
        port: local.port(),
    })?;
    info!("Listening on http://{}", local);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<PeerAddr>(),
    )
    .with_graceful_shutdown(shutdown::graceful_signal())
    .await
    .context("running server")?;

    info!("Shutdown complete");
    Ok(())
}

async fn serve_unix(path: &Path, app: Router) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed stale socket {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("removing stale socket {:?}", path));
        }
    }

    let listener =
        UnixListener::bind(path).with_context(|| format!("binding to {:?}", path))?;

    announce(&Endpoint::Unix {
        path: path.to_path_buf(),
    })?;
    info!("Listening on {:?}", path);

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<PeerAddr>(),
    )
    .with_graceful_shutdown(shutdown::graceful_signal())
    .await;

    if let Err(e) = std::fs::remove_file(path) {
        warn!("Failed to remove socket {:?}: {}", path, e);
    }
    served.context("running server")?;

    info!("Shutdown complete");
    Ok(())
}

//! Shared handler state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use log::warn;
use tokio::sync::mpsc;

/// Method of the most recent `/health` probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthMethod {
    Get,
    Head,
}

impl HealthMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
        }
    }
}

// 0 means no probe yet
const GET: u8 = 1;
const HEAD: u8 = 2;

/// Lock-free cell holding the last health probe method, if any.
#[derive(Debug, Default)]
pub struct LastHealth(AtomicU8);

impl LastHealth {
    pub fn record(&self, method: HealthMethod) {
        let bits = match method {
            HealthMethod::Get => GET,
            HealthMethod::Head => HEAD,
        };
        self.0.store(bits, Ordering::Relaxed);
    }

    pub fn get(&self) -> Option<HealthMethod> {
        match self.0.load(Ordering::Relaxed) {
            GET => Some(HealthMethod::Get),
            HEAD => Some(HealthMethod::Head),
            _ => None,
        }
    }
}

/// State handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub last_health: Arc<LastHealth>,
    exit_tx: mpsc::UnboundedSender<i32>,
}

impl AppState {
    /// Exit requests are delivered on `exit_tx`; the receiver decides when
    /// the process actually dies.
    pub fn new(exit_tx: mpsc::UnboundedSender<i32>) -> Self {
        Self {
            last_health: Arc::new(LastHealth::default()),
            exit_tx,
        }
    }

    /// Ask for an abrupt exit with `code`.
    pub fn request_exit(&self, code: i32) {
        if self.exit_tx.send(code).is_err() {
            warn!("Exit watcher is gone, ignoring exit request ({})", code);
        }
    }
}

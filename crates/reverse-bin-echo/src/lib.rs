//! Reference backend for reverse-bin.
//!
//! Listens on the endpoint named by `REVERSE_PROXY_TO`, announces the bound
//! endpoint on stdout and echoes requests back as JSON. Used to exercise the
//! proxy's readiness handshake, health probing and crash handling.

pub mod peer;
pub mod routes;
pub mod shutdown;
pub mod state;

pub use peer::PeerAddr;
pub use routes::{EchoPayload, create_router};
pub use state::{AppState, HealthMethod, LastHealth};

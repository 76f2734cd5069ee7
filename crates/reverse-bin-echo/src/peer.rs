//! Client address across transports.

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::extract::connect_info::Connected;
use axum::serve::IncomingStream;
use tokio::net::{TcpListener, UnixListener};

/// Address of the connected client.
///
/// Unix domain peers are usually unnamed, and even a named one renders as
/// `unix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerAddr {
    Tcp(SocketAddr),
    UnixDomain(Option<PathBuf>),
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "{addr}"),
            Self::UnixDomain(_) => f.write_str("unix"),
        }
    }
}

impl Connected<IncomingStream<'_, TcpListener>> for PeerAddr {
    fn connect_info(stream: IncomingStream<'_, TcpListener>) -> Self {
        Self::Tcp(*stream.remote_addr())
    }
}

impl Connected<IncomingStream<'_, UnixListener>> for PeerAddr {
    fn connect_info(stream: IncomingStream<'_, UnixListener>) -> Self {
        Self::UnixDomain(stream.remote_addr().as_pathname().map(Path::to_path_buf))
    }
}

//! Backend endpoint parsing and allocation.
//!
//! Endpoints use the `REVERSE_PROXY_TO` notation: `host:port` (or `:port`)
//! for TCP and `unix/<path>` for a Unix domain socket.
//!
//! An allocated port is advisory: the probe socket is released before the
//! child starts, so another process could take the port in between. The
//! backend closes that gap by printing the endpoint it actually bound
//! before it serves.

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, TcpListener};
use std::path::{Component, Path, PathBuf};

use log::{debug, warn};

use crate::error::{DiscoverError, DiscoverResult};

/// Prefix marking a Unix domain socket endpoint.
pub const UNIX_PREFIX: &str = "unix/";

/// Host used for allocated ports and for `:port` declarations.
pub const LOOPBACK_HOST: &str = "127.0.0.1";

/// Where a backend listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Unix { path: PathBuf },
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "{host}:{port}"),
            Self::Unix { path } => write!(f, "{UNIX_PREFIX}{}", path.display()),
        }
    }
}

impl Endpoint {
    /// Parse `REVERSE_PROXY_TO` notation.
    pub fn parse(value: &str) -> DiscoverResult<Self> {
        let invalid = |reason: &str| DiscoverError::InvalidEndpoint {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        if let Some(path) = value.strip_prefix(UNIX_PREFIX) {
            if path.is_empty() {
                return Err(invalid("empty socket path"));
            }
            return Ok(Self::Unix {
                path: PathBuf::from(path),
            });
        }

        let (host, port) = value
            .rsplit_once(':')
            .ok_or_else(|| invalid("expected host:port or unix/<path>"))?;
        let port = port
            .parse::<u16>()
            .map_err(|e| invalid(&format!("bad port: {e}")))?;
        let host = if host.is_empty() { LOOPBACK_HOST } else { host };

        Ok(Self::Tcp {
            host: host.to_string(),
            port,
        })
    }

    /// The TCP port, if this is a TCP endpoint.
    pub fn tcp_port(&self) -> Option<u16> {
        match self {
            Self::Tcp { port, .. } => Some(*port),
            Self::Unix { .. } => None,
        }
    }

    pub fn is_unix(&self) -> bool {
        matches!(self, Self::Unix { .. })
    }

    /// Anchor a relative socket path at `dir`. TCP endpoints are returned
    /// unchanged.
    pub fn resolve(&self, dir: &Path) -> Self {
        match self {
            Self::Unix { path } if path.is_relative() => Self::Unix {
                path: normalize(&dir.join(path)),
            },
            other => other.clone(),
        }
    }
}

/// Decide the backend endpoint.
///
/// A declared value is parsed and validated: socket paths must be relative
/// to the app directory and TCP ports must be non-zero. A declared TCP host
/// is replaced by `127.0.0.1`. Without a
/// declaration a loopback port is probed, retrying up to `attempts` times.
pub fn allocate(declared: Option<&str>, attempts: u32) -> DiscoverResult<Endpoint> {
    match declared {
        Some(value) => {
            let endpoint = match Endpoint::parse(value)? {
                Endpoint::Unix { path } if path.is_absolute() => {
                    return Err(DiscoverError::AbsoluteUnixSocket(path));
                }
                Endpoint::Tcp { port: 0, .. } => {
                    return Err(DiscoverError::InvalidEndpoint {
                        value: value.to_string(),
                        reason: "port must be non-zero".to_string(),
                    });
                }
                // The typed runtime always binds loopback, so the proxy must
                // dial the same address.
                Endpoint::Tcp { host, port } => {
                    if host != LOOPBACK_HOST {
                        warn!(
                            "Declared host '{}' replaced with {} for port {}",
                            host, LOOPBACK_HOST, port
                        );
                    }
                    Endpoint::Tcp {
                        host: LOOPBACK_HOST.to_string(),
                        port,
                    }
                }
                unix => unix,
            };
            debug!("Using declared endpoint {}", endpoint);
            Ok(endpoint)
        }
        None => {
            let port = probe_with_retries(attempts, probe_loopback_port)?;
            debug!("Allocated loopback port {}", port);
            Ok(Endpoint::Tcp {
                host: LOOPBACK_HOST.to_string(),
                port,
            })
        }
    }
}

/// Bind loopback port 0, read back the assigned port, release the socket.
fn probe_loopback_port() -> io::Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

fn probe_with_retries<F>(attempts: u32, mut probe: F) -> DiscoverResult<u16>
where
    F: FnMut() -> io::Result<u16>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match probe() {
            Ok(port) => return Ok(port),
            Err(e) if attempt < attempts => {
                warn!("Port probe {}/{} failed: {}", attempt, attempts, e);
                attempt += 1;
            }
            Err(source) => {
                return Err(DiscoverError::PortAllocation { attempts, source });
            }
        }
    }
}

/// Lexically drop `.` and fold `..` components.
///
/// No containment check: `unix/../x.sock` resolves outside the app
/// directory, and the confinement tool decides whether the app may create
/// it.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

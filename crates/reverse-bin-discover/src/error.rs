//! Discovery error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for discovery operations.
pub type DiscoverResult<T> = Result<T, DiscoverError>;

/// Errors that can abort a discovery run.
///
/// Every variant is fatal: no launch descriptor is emitted once one of these
/// is returned. Malformed declaration lines are not errors; they are logged
/// and skipped by [`crate::declarations`].
#[derive(Debug, Error)]
pub enum DiscoverError {
    /// The target working directory does not exist or is not a directory.
    #[error("directory {} does not exist", .0.display())]
    DirectoryNotFound(PathBuf),

    /// None of the supported entrypoint files were found.
    #[error(
        "no supported entrypoint ({typed_file}, executable main.py, or executable main.sh) found in {}",
        .dir.display()
    )]
    NoEntrypoint { dir: PathBuf, typed_file: String },

    /// A Unix socket endpoint was declared with an absolute path.
    #[error("unix socket path in REVERSE_PROXY_TO must be relative: {}", .0.display())]
    AbsoluteUnixSocket(PathBuf),

    /// A declared endpoint could not be parsed.
    #[error("invalid REVERSE_PROXY_TO endpoint '{value}': {reason}")]
    InvalidEndpoint { value: String, reason: String },

    /// The detected entrypoint cannot listen on the declared endpoint kind.
    #[error("{entrypoint} requires a TCP endpoint, got {endpoint}")]
    UnsupportedEndpoint { entrypoint: String, endpoint: String },

    /// Every ephemeral port probe failed.
    #[error("failed to allocate a loopback port after {attempts} attempt(s): {source}")]
    PortAllocation {
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// The discovery config file could not be read or parsed.
    #[error("invalid config {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },

    /// Generic IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiscoverError {
    /// Whether this error belongs to the configuration family (bad directory,
    /// missing entrypoint, or an invalid endpoint declaration).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::DirectoryNotFound(_)
                | Self::NoEntrypoint { .. }
                | Self::AbsoluteUnixSocket(_)
                | Self::InvalidEndpoint { .. }
                | Self::UnsupportedEndpoint { .. }
                | Self::Config { .. }
        )
    }
}

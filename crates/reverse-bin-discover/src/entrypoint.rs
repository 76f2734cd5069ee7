//! Entrypoint detection.
//!
//! Checks run in a fixed order and stop at the first match:
//!
//! 1. the typed-runtime source file (`main.ts` by default), served by the
//!    runtime on a loopback port
//! 2. `main.py`, then `main.sh`, if executable by the current user
//!
//! Scripts read their endpoint from `REVERSE_PROXY_TO`; the typed runtime
//! gets it through `--host`/`--port` flags filled in once the endpoint is
//! known.

use std::fmt;
use std::path::Path;

use log::debug;
use rustix::fs::Access;

use crate::config::TypedRuntimeConfig;
use crate::endpoint::Endpoint;
use crate::error::{DiscoverError, DiscoverResult};

/// Script entrypoints, in priority order.
pub const SCRIPT_CANDIDATES: &[&str] = &["main.py", "main.sh"];

/// How the app is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrypointKind {
    /// A source file run under a serving runtime with an explicit port.
    TypedRuntimeServe,
    /// An executable script run directly.
    ScriptRuntime,
}

/// The detected entrypoint and everything needed to build its invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrypointSpec {
    pub kind: EntrypointKind,
    /// Entrypoint file name, relative to the app directory.
    pub file: String,
    /// Runtime program and fixed arguments (empty for scripts).
    runtime: Vec<String>,
}

impl fmt::Display for EntrypointSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EntrypointKind::TypedRuntimeServe => write!(f, "typed runtime entrypoint {}", self.file),
            EntrypointKind::ScriptRuntime => write!(f, "script entrypoint {}", self.file),
        }
    }
}

impl EntrypointSpec {
    /// Build the base invocation for `endpoint`.
    ///
    /// Typed-runtime apps are bound by port flag, so they need a TCP
    /// endpoint.
    pub fn invocation(&self, endpoint: &Endpoint) -> DiscoverResult<Vec<String>> {
        match self.kind {
            EntrypointKind::ScriptRuntime => Ok(vec![format!("./{}", self.file)]),
            EntrypointKind::TypedRuntimeServe => {
                let Endpoint::Tcp { port, .. } = endpoint else {
                    return Err(DiscoverError::UnsupportedEndpoint {
                        entrypoint: self.to_string(),
                        endpoint: endpoint.to_string(),
                    });
                };
                let mut args = self.runtime.clone();
                args.extend([
                    "--host".to_string(),
                    "127.0.0.1".to_string(),
                    "--port".to_string(),
                    port.to_string(),
                    self.file.clone(),
                ]);
                Ok(args)
            }
        }
    }
}

/// Detect the entrypoint of the app in `dir`.
pub fn detect(dir: &Path, typed: &TypedRuntimeConfig) -> DiscoverResult<EntrypointSpec> {
    if dir.join(&typed.file).exists() {
        debug!("Detected typed runtime entrypoint {} in {:?}", typed.file, dir);
        let mut runtime = vec![typed.program.clone()];
        runtime.extend(typed.serve_args.iter().cloned());
        return Ok(EntrypointSpec {
            kind: EntrypointKind::TypedRuntimeServe,
            file: typed.file.clone(),
            runtime,
        });
    }

    for script in SCRIPT_CANDIDATES {
        let path = dir.join(script);
        if !path.is_file() {
            continue;
        }
        if is_executable(&path) {
            debug!("Detected script entrypoint {} in {:?}", script, dir);
            return Ok(EntrypointSpec {
                kind: EntrypointKind::ScriptRuntime,
                file: script.to_string(),
                runtime: Vec::new(),
            });
        }
        debug!("Skipping {:?}: not executable", path);
    }

    Err(DiscoverError::NoEntrypoint {
        dir: dir.to_path_buf(),
        typed_file: typed.file.clone(),
    })
}

/// Whether the current user may execute `path`.
fn is_executable(path: &Path) -> bool {
    rustix::fs::access(path, Access::EXEC_OK).is_ok()
}

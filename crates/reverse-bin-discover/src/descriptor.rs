//! Launch descriptor assembly.
//!
//! The descriptor is the only output of a successful run and is built after
//! every stage has succeeded, so a failing run never emits a partial one.

use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::DiscoverConfig;
use crate::declarations;
use crate::endpoint;
use crate::entrypoint;
use crate::environment::{self, ProcessEnv};
use crate::error::{DiscoverError, DiscoverResult};
use crate::sandbox;

/// What the orchestrator needs to start and reach an app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchDescriptor {
    /// Command tokens, confinement-wrapped unless sandboxing is disabled.
    pub executable: Vec<String>,
    /// `host:port` or `unix/<absolute-path>`.
    pub reverse_proxy_to: String,
    /// Absolute app directory.
    pub working_directory: String,
    /// `KEY=VALUE` strings.
    pub envs: Vec<String>,
}

impl LaunchDescriptor {
    /// Serialize for the orchestrator.
    pub fn to_json(&self, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}

/// Run every stage against the app in `dir` and assemble its descriptor.
pub fn discover(
    dir: &Path,
    config: &DiscoverConfig,
    process: &ProcessEnv,
) -> DiscoverResult<LaunchDescriptor> {
    if !dir.is_dir() {
        return Err(DiscoverError::DirectoryNotFound(dir.to_path_buf()));
    }
    let dir = dir.canonicalize()?;

    let entrypoint = entrypoint::detect(&dir, &config.typed_runtime)?;

    let declared = declarations::load(&dir.join(&config.declarations_file))?;
    let endpoint = endpoint::allocate(
        environment::declared_endpoint(&declared, process),
        config.probe_attempts(),
    )?;
    let command = entrypoint.invocation(&endpoint)?;

    let env = environment::resolve(&dir, &declared, &endpoint, process);
    let executable = sandbox::build(command, &dir, &endpoint, &env, &config.sandbox);

    let descriptor = LaunchDescriptor {
        executable,
        reverse_proxy_to: endpoint.resolve(&dir).to_string(),
        working_directory: dir.to_string_lossy().to_string(),
        envs: env.to_list(),
    };

    info!(
        "Discovered {} in {:?}, endpoint={}",
        entrypoint, dir, descriptor.reverse_proxy_to
    );
    Ok(descriptor)
}

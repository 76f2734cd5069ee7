//! Confinement policy for the launched app.
//!
//! The policy is rendered as an argument vector for an external
//! least-privilege launcher (landrun by default) placed in front of the
//! entrypoint. Nothing here enforces anything; the launcher does.
//!
//! ## Grants
//!
//! - read-execute on the app directory
//! - read-write on the app's `data/` directory, if present
//! - bind on the allocated TCP port (none for Unix sockets: write access to
//!   the directory is enough to create the socket file)
//! - with the standard environment: read-execute on `/bin`, `/usr`, `/lib`,
//!   `/lib64`, read-only on `/etc`, read-write on `/dev`
//! - with `PATH` passthrough: read-execute on every existing `PATH` entry
//!
//! ## Rendering
//!
//! Flags come out in a fixed order: `--env` per variable,
//! `--unrestricted-network`, then `--rw`, `--ro`, `--rox`, `--bind-tcp`,
//! `--connect-tcp`. Each grant list is one flag with a comma-joined value
//! and is omitted when empty.

use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use log::{debug, info, warn};

use crate::config::{
    STANDARD_READ_EXECUTE, STANDARD_READ_ONLY, STANDARD_READ_WRITE, SandboxSettings,
};
use crate::endpoint::Endpoint;
use crate::environment::{self, EnvironmentSet};

/// Filesystem and network grants for one app launch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxPolicy {
    pub read_execute: IndexSet<PathBuf>,
    pub read_only: IndexSet<PathBuf>,
    pub read_write: IndexSet<PathBuf>,
    pub bind_tcp: IndexSet<u16>,
    pub connect_tcp: IndexSet<u16>,
    /// Skip port-level network restriction entirely.
    pub unrestricted_network: bool,
    /// `KEY=VALUE` pairs passed into the sandbox.
    pub envs: Vec<String>,
}

impl SandboxPolicy {
    /// Derive the grants for an app in `dir` listening on `endpoint`.
    ///
    /// `dir` must already be absolute.
    pub fn build(
        dir: &Path,
        endpoint: &Endpoint,
        env: &EnvironmentSet,
        settings: &SandboxSettings,
    ) -> Self {
        let mut policy = Self {
            unrestricted_network: settings.unrestricted_network,
            ..Self::default()
        };

        policy.read_execute.insert(dir.to_path_buf());
        if let Some(data) = environment::data_dir(dir) {
            debug!("Allow-write: app data dir {:?}", data);
            policy.read_write.insert(data);
        }

        if let Some(port) = endpoint.tcp_port() {
            policy.bind_tcp.insert(port);
        }

        if settings.standard_environment {
            policy.read_execute.extend(existing(STANDARD_READ_EXECUTE));
            policy.read_only.extend(existing(STANDARD_READ_ONLY));
            policy.read_write.extend(existing(STANDARD_READ_WRITE));
            debug!("Added standard environment grants");
        }

        if settings.path_passthrough {
            if let Some(path) = env.get(environment::PATH) {
                let dirs: Vec<PathBuf> = std::env::split_paths(path)
                    .filter(|p| !p.as_os_str().is_empty() && p.is_dir())
                    .collect();
                debug!("Allow-execute: {} PATH directories", dirs.len());
                policy.read_execute.extend(dirs);
            } else {
                debug!("PATH passthrough enabled but PATH is unset");
            }
        }

        policy.read_execute.extend(settings.extra_read_execute_paths());
        policy.read_only.extend(settings.extra_read_only_paths());
        policy.read_write.extend(settings.extra_read_write_paths());
        policy.connect_tcp.extend(settings.connect_tcp.iter().copied());

        policy.envs = env.to_list();

        info!(
            "Sandbox policy for {:?}: rox={}, ro={}, rw={}, bind_tcp={:?}, connect_tcp={:?}, unrestricted_network={}",
            dir,
            policy.read_execute.len(),
            policy.read_only.len(),
            policy.read_write.len(),
            policy.bind_tcp,
            policy.connect_tcp,
            policy.unrestricted_network
        );
        policy
    }

    /// Render the confinement flags (without the tool name or command).
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        for env in &self.envs {
            args.push("--env".to_string());
            args.push(env.clone());
        }

        if self.unrestricted_network {
            args.push("--unrestricted-network".to_string());
        }

        push_paths(&mut args, "--rw", &self.read_write);
        push_paths(&mut args, "--ro", &self.read_only);
        push_paths(&mut args, "--rox", &self.read_execute);
        push_ports(&mut args, "--bind-tcp", &self.bind_tcp);
        push_ports(&mut args, "--connect-tcp", &self.connect_tcp);

        args
    }

    /// Prefix `command` with `tool` and the confinement flags.
    pub fn wrap(&self, tool: &str, command: Vec<String>) -> Vec<String> {
        let mut full = vec![tool.to_string()];
        full.extend(self.to_args());
        full.extend(command);
        debug!("Wrapped command: {:?}", full);
        full
    }
}

/// Produce the final executable vector for `command`.
///
/// With sandboxing disabled the command is returned untouched.
pub fn build(
    command: Vec<String>,
    dir: &Path,
    endpoint: &Endpoint,
    env: &EnvironmentSet,
    settings: &SandboxSettings,
) -> Vec<String> {
    if !settings.enabled {
        warn!("Sandbox disabled, emitting raw entrypoint for {:?}", dir);
        return command;
    }
    SandboxPolicy::build(dir, endpoint, env, settings).wrap(&settings.tool, command)
}

fn existing(paths: &[&str]) -> Vec<PathBuf> {
    paths
        .iter()
        .map(PathBuf::from)
        .filter(|p| p.exists())
        .collect()
}

fn push_paths(args: &mut Vec<String>, flag: &str, paths: &IndexSet<PathBuf>) {
    if paths.is_empty() {
        return;
    }
    let joined: Vec<String> = paths
        .iter()
        .map(|p| {
            let s = p.to_string_lossy().to_string();
            if s.contains(',') {
                warn!("Grant path {:?} contains ',' and will be split by the launcher", p);
            }
            s
        })
        .collect();
    args.push(flag.to_string());
    args.push(joined.join(","));
}

fn push_ports(args: &mut Vec<String>, flag: &str, ports: &IndexSet<u16>) {
    if ports.is_empty() {
        return;
    }
    let joined: Vec<String> = ports.iter().map(u16::to_string).collect();
    args.push(flag.to_string());
    args.push(joined.join(","));
}

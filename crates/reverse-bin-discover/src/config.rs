//! Discovery configuration.
//!
//! Every field has a built-in default, so an absent config file yields a
//! usable setup: `.env` declarations, a `landrun`-wrapped command with the
//! standard environment and `PATH` granted, and unrestricted outbound
//! network.
//!
//! ## Lookup
//!
//! 1. `--config <path>` (or `REVERSE_BIN_DISCOVER_CONFIG`); must exist
//! 2. `~/.config/reverse-bin/discover.toml` if present
//! 3. built-in defaults
//!
//! ## Example
//!
//! ```toml
//! declarations_file = ".env"
//! probe_attempts = 5
//!
//! [sandbox]
//! unrestricted_network = false
//! connect_tcp = [443]
//! extra_read_only = ["~/.config/git"]
//!
//! [typed_runtime]
//! program = "/usr/local/bin/deno"
//! ```

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{DiscoverError, DiscoverResult};

/// Directory under the user config dir holding `discover.toml`.
pub const CONFIG_DIR_NAME: &str = "reverse-bin";

/// File name of the user-level discovery config.
pub const CONFIG_FILE_NAME: &str = "discover.toml";

/// System paths granted read-execute by the standard environment.
pub const STANDARD_READ_EXECUTE: &[&str] = &["/bin", "/usr", "/lib", "/lib64"];

/// System paths granted read-only by the standard environment.
pub const STANDARD_READ_ONLY: &[&str] = &["/etc"];

/// System paths granted read-write by the standard environment.
pub const STANDARD_READ_WRITE: &[&str] = &["/dev"];

/// Top-level discovery configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverConfig {
    /// Name of the per-app declarations file, relative to the app directory.
    pub declarations_file: String,

    /// How many ephemeral port probes to try before giving up.
    pub probe_attempts: u32,

    /// Confinement settings.
    pub sandbox: SandboxSettings,

    /// How `main.ts`-style apps are served.
    pub typed_runtime: TypedRuntimeConfig,
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            declarations_file: ".env".to_string(),
            probe_attempts: 3,
            sandbox: SandboxSettings::default(),
            typed_runtime: TypedRuntimeConfig::default(),
        }
    }
}

/// Confinement settings used to build the sandbox policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    /// Wrap the entrypoint with the confinement tool.
    pub enabled: bool,

    /// Confinement tool executable.
    pub tool: String,

    /// Grant the system binary, library, config and device directories.
    pub standard_environment: bool,

    /// Grant every `PATH` directory and pass `PATH` through.
    pub path_passthrough: bool,

    /// Skip port-level network restriction entirely.
    pub unrestricted_network: bool,

    /// Additional read-execute paths (`~` and `$VAR` are expanded).
    pub extra_read_execute: Vec<String>,

    /// Additional read-only paths.
    pub extra_read_only: Vec<String>,

    /// Additional read-write paths.
    pub extra_read_write: Vec<String>,

    /// TCP ports the app may connect to when the network is restricted.
    pub connect_tcp: Vec<u16>,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            tool: "landrun".to_string(),
            standard_environment: true,
            path_passthrough: true,
            unrestricted_network: true,
            extra_read_execute: Vec::new(),
            extra_read_only: Vec::new(),
            extra_read_write: Vec::new(),
            connect_tcp: Vec::new(),
        }
    }
}

/// Serving runtime for typed-runtime entrypoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypedRuntimeConfig {
    /// Runtime executable.
    pub program: String,

    /// Arguments placed between the program and the host/port flags.
    pub serve_args: Vec<String>,

    /// Source file that marks an app as typed-runtime.
    pub file: String,
}

impl Default for TypedRuntimeConfig {
    fn default() -> Self {
        Self {
            program: "deno".to_string(),
            serve_args: vec!["serve".to_string(), "--allow-all".to_string()],
            file: "main.ts".to_string(),
        }
    }
}

impl DiscoverConfig {
    /// Load config from a TOML file.
    pub fn from_file(path: &Path) -> DiscoverResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DiscoverError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| DiscoverError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        info!("Loaded discovery config from {:?}", path);
        Ok(config)
    }

    /// Load the explicit config if given, else the user config if present,
    /// else the defaults.
    pub fn load(explicit: Option<&Path>) -> DiscoverResult<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        match Self::user_config_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            Some(path) => {
                debug!("No user discovery config at {:?}, using defaults", path);
                Ok(Self::default())
            }
            None => {
                debug!("Could not determine config directory, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Path of the user-level config file.
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Number of port probes, never less than one.
    pub fn probe_attempts(&self) -> u32 {
        self.probe_attempts.max(1)
    }
}

impl SandboxSettings {
    /// Extra read-execute grants with `~` and `$VAR` expanded.
    pub fn extra_read_execute_paths(&self) -> Vec<PathBuf> {
        expand_all(&self.extra_read_execute)
    }

    /// Extra read-only grants with `~` and `$VAR` expanded.
    pub fn extra_read_only_paths(&self) -> Vec<PathBuf> {
        expand_all(&self.extra_read_only)
    }

    /// Extra read-write grants with `~` and `$VAR` expanded.
    pub fn extra_read_write_paths(&self) -> Vec<PathBuf> {
        expand_all(&self.extra_read_write)
    }
}

fn expand_all(paths: &[String]) -> Vec<PathBuf> {
    paths.iter().map(|p| expand_path(p)).collect()
}

/// Expand `~` and environment variables in a configured path.
///
/// Unknown variables leave the path as written.
fn expand_path(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(e) => {
            warn!("Could not expand path '{}': {}, using as-is", path, e);
            PathBuf::from(path)
        }
    }
}

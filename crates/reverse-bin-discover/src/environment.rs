//! Child environment resolution.
//!
//! Sources in ascending precedence:
//!
//! 1. the app's declarations file
//! 2. the discoverer's own `PATH`
//! 3. computed values: `REVERSE_PROXY_TO` and, when the app has a `data/`
//!    directory, `HOME`

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::debug;

use crate::declarations::Declarations;
use crate::endpoint::Endpoint;

pub const REVERSE_PROXY_TO: &str = "REVERSE_PROXY_TO";
pub const PATH: &str = "PATH";
pub const HOME: &str = "HOME";

/// App subdirectory used as the writable home.
pub const DATA_DIR: &str = "data";

/// The slice of the discoverer's own environment that discovery reads.
///
/// Captured once by the binary and passed down, so the pipeline itself never
/// reads `std::env`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessEnv {
    pub path: Option<String>,
    pub reverse_proxy_to: Option<String>,
}

impl ProcessEnv {
    /// Snapshot the current process environment. Empty values count as unset.
    pub fn capture() -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        Self {
            path: var(PATH),
            reverse_proxy_to: var(REVERSE_PROXY_TO),
        }
    }
}

/// Ordered child environment. Keys are unique; a later insert replaces the
/// value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentSet {
    vars: IndexMap<String, String>,
}

impl EnvironmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render as `KEY=VALUE` strings in order.
    pub fn to_list(&self) -> Vec<String> {
        self.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }
}

/// The declared endpoint, if any: the declarations file wins over the
/// process environment. Empty values are ignored.
pub fn declared_endpoint<'a>(declared: &'a Declarations, process: &'a ProcessEnv) -> Option<&'a str> {
    declared
        .get(REVERSE_PROXY_TO)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .or(process.reverse_proxy_to.as_deref())
        .filter(|v| !v.is_empty())
}

/// The app's `data/` directory, fully resolved, if it exists.
pub fn data_dir(dir: &Path) -> Option<PathBuf> {
    let data = dir.join(DATA_DIR);
    if !data.is_dir() {
        return None;
    }
    Some(data.canonicalize().unwrap_or(data))
}

/// Build the child environment.
///
/// `REVERSE_PROXY_TO` carries the endpoint in its declared form, so a Unix
/// socket stays relative to the child's working directory. The raw declared
/// value is never copied.
pub fn resolve(
    dir: &Path,
    declared: &Declarations,
    endpoint: &Endpoint,
    process: &ProcessEnv,
) -> EnvironmentSet {
    let mut env = EnvironmentSet::new();
    env.insert(REVERSE_PROXY_TO, endpoint.to_string());

    for (key, value) in declared {
        if key != REVERSE_PROXY_TO {
            env.insert(key.as_str(), value.as_str());
        }
    }

    if let Some(path) = &process.path {
        env.insert(PATH, path.as_str());
    }

    if let Some(home) = data_dir(dir) {
        env.insert(HOME, home.to_string_lossy());
    }

    debug!("Resolved {} environment variable(s) for {:?}", env.len(), dir);
    env
}

//! Per-app declarations file (`KEY=VALUE` lines, usually `.env`).
//!
//! Blank lines and `#` comments are ignored. A line that fails to parse,
//! including a bare `KEY` with no value, is logged and skipped; the rest of
//! the file still applies.

use std::path::Path;

use indexmap::IndexMap;
use log::{debug, warn};

use crate::error::DiscoverResult;

/// Declared variables in file order. A repeated key keeps its first
/// position and its last value.
pub type Declarations = IndexMap<String, String>;

/// Read the declarations file at `path`.
///
/// A missing file yields an empty set.
pub fn load(path: &Path) -> DiscoverResult<Declarations> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) if e.not_found() => {
            debug!("No declarations file at {:?}", path);
            return Ok(Declarations::new());
        }
        Err(dotenvy::Error::Io(e)) => return Err(e.into()),
        Err(e) => {
            warn!("Ignoring declarations file {:?}: {}", path, e);
            return Ok(Declarations::new());
        }
    };

    let mut declared = Declarations::new();
    for item in iter {
        match item {
            Ok((key, value)) => {
                declared.insert(key, value);
            }
            Err(dotenvy::Error::Io(e)) => {
                warn!("Stopped reading declarations file {:?}: {}", path, e);
                break;
            }
            Err(e) => warn!("Skipping malformed line in {:?}: {}", path, e),
        }
    }

    debug!("Loaded {} declaration(s) from {:?}", declared.len(), path);
    Ok(declared)
}

//! reverse-bin app discovery.
//!
//! Given an app directory, work out how to start the app, where it will
//! listen, what environment it gets and what it may touch, and emit all of
//! that as one [`LaunchDescriptor`] for the reverse proxy that launches it.

pub mod config;
pub mod declarations;
pub mod descriptor;
pub mod endpoint;
pub mod entrypoint;
pub mod environment;
pub mod error;
pub mod sandbox;

pub use config::{DiscoverConfig, SandboxSettings, TypedRuntimeConfig};
pub use descriptor::{LaunchDescriptor, discover};
pub use endpoint::Endpoint;
pub use entrypoint::{EntrypointKind, EntrypointSpec};
pub use environment::{EnvironmentSet, ProcessEnv};
pub use error::{DiscoverError, DiscoverResult};
pub use sandbox::SandboxPolicy;

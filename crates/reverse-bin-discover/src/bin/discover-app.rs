//! discover-app - Launch descriptor builder for reverse-bin.
//!
//! Inspects an app directory and prints one JSON launch descriptor on stdout
//! for the reverse proxy's dynamic detector:
//!
//! ```json
//! {"executable":["landrun","--env","REVERSE_PROXY_TO=127.0.0.1:41231",...,"./main.py"],
//!  "reverse_proxy_to":"127.0.0.1:41231",
//!  "working_directory":"/srv/apps/echo",
//!  "envs":["REVERSE_PROXY_TO=127.0.0.1:41231","PATH=/usr/bin:/bin"]}
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Inspect the current directory
//! discover-app
//!
//! # Inspect an app without sandbox wrapping (local debugging only)
//! discover-app --no-sandbox /srv/apps/echo
//!
//! # Port-restricted network
//! discover-app --restrict-network /srv/apps/echo
//! ```
//!
//! On any error nothing is printed on stdout, the reason goes to stderr and
//! the exit code is 1.

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use std::path::PathBuf;

use reverse_bin_discover::{DiscoverConfig, ProcessEnv, discover};

#[derive(Parser, Debug)]
#[command(
    name = "discover-app",
    about = "Detect an app's entrypoint and emit a reverse-bin launch descriptor",
    version,
    after_help = "Examples:\n  \
        discover-app /srv/apps/echo\n  \
        discover-app --no-sandbox .\n  \
        discover-app --config ./discover.toml --pretty /srv/apps/echo"
)]
struct Args {
    /// App directory to inspect.
    #[arg(default_value = ".")]
    working_dir: PathBuf,

    /// Return the raw entrypoint command without confinement wrapping.
    #[arg(long)]
    no_sandbox: bool,

    /// Restrict network access to the bind/connect port grants.
    #[arg(long)]
    restrict_network: bool,

    /// Path to discovery config file (TOML).
    #[arg(short, long, env = "REVERSE_BIN_DISCOVER_CONFIG")]
    config: Option<PathBuf>,

    /// Pretty-print the descriptor.
    #[arg(long)]
    pretty: bool,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(args: &Args) -> Result<DiscoverConfig> {
    let mut config = DiscoverConfig::load(args.config.as_deref())
        .with_context(|| "loading discovery config")?;
    if args.no_sandbox {
        config.sandbox.enabled = false;
    }
    if args.restrict_network {
        config.sandbox.unrestricted_network = false;
    }
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries the descriptor only; logs go to stderr
    let log_level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = load_config(&args)?;
    let process = ProcessEnv::capture();
    debug!("Config: {:?}", config);
    debug!("Process env: {:?}", process);

    let descriptor = discover(&args.working_dir, &config, &process)
        .with_context(|| format!("discovering app in {:?}", args.working_dir))?;

    let json = descriptor
        .to_json(args.pretty)
        .context("serializing launch descriptor")?;
    println!("{json}");

    info!(
        "Emitted descriptor for {}: {}",
        descriptor.working_directory, descriptor.reverse_proxy_to
    );
    Ok(())
}

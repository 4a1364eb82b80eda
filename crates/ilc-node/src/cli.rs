//! `clap`-based CLI surface (§1 "CLI"): `run` boots the connector process;
//! `accounts`/`routes` are local, config-only introspection commands for
//! operators who want to sanity-check a config file before starting the
//! node (the live admin surface for a *running* node is `ilc-cli`, a
//! separate companion binary that talks to the explorer's HTTP API).

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ilc-node", version, about = "Interledger connector process")]
pub struct Cli {
    /// Path to a config file (TOML/JSON/YAML); falls back to defaults and
    /// `ILC__`-prefixed environment variables if omitted.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Boot the connector: BTP listener, outbound peer sessions, and any
    /// configured explorer/discovery background tasks.
    Run,
    /// Print the peer accounts configured in the loaded config.
    Accounts,
    /// Print the static routes configured in the loaded config.
    Routes,
}

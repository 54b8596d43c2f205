//! clap-based command line interface.
//!
//! Defines the [`Cli`] struct with subcommands [`Command`] (demo, status,
//! follow-ups) and global flags (--config, --verbose).

use clap::{Parser, Subcommand};

/// pursuit — application workflow orchestrator and status tracker.
#[derive(Debug, Parser)]
#[command(name = "pursuit", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the configuration file.
    #[arg(long, global = true, default_value = "pursuit.toml")]
    pub config: String,

    /// Enable verbose output.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the built-in end-to-end demonstration pipeline.
    Demo {
        /// Run fully automated, without approval pauses.
        #[arg(long, default_value_t = false)]
        auto: bool,
    },

    /// Show engine and tracker status.
    Status,

    /// List follow-up actions that are due.
    FollowUps {
        /// Restrict to one user.
        #[arg(long)]
        user: Option<String>,
    },
}

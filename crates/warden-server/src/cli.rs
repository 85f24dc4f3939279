//! Command-line interface for the `warden` binary

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// warden - key authority and token issuer
#[derive(Parser, Debug)]
#[command(
    name = "warden",
    version,
    about = "Key authority and token issuing services",
    long_about = "Publishes public signing keys for relying services, issues\n\
                  signed login and signup tokens, and checks them on the relying side."
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging (-v, -vv, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (.toml, .yaml, .yml or .json)
    #[arg(short, long, global = true, env = "WARDEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the key authority
    Secret {
        /// Listen address, overriding the configuration
        #[arg(short, long)]
        address: Option<String>,
    },

    /// Run the token issuer
    Token {
        /// Listen address, overriding the configuration
        #[arg(short, long)]
        address: Option<String>,
    },

    /// Run a relying service exposing only the token read routes
    Reader {
        /// Listen address, overriding the configuration
        #[arg(short, long)]
        address: Option<String>,
    },

    /// Print the effective configuration as JSON
    Config,

    /// Print build metadata
    Version,
}

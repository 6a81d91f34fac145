//! Command-line interface definitions for sluice.
//!
//! Uses clap's derive API for type-safe argument parsing.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

/// TLS-intercepting HTTP(S) proxy.
///
/// sluice terminates TLS for every CONNECT destination with a leaf
/// certificate forged on the fly and signed by its root CA. Clients must
/// trust that root; `sluice export-ca` prints it.
#[derive(Parser, Debug)]
#[command(name = "sluice")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to run (or omit to run the proxy).
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to additional config file.
    ///
    /// This config file is merged on top of system and user configs,
    /// giving it the highest priority (except for CLI flags).
    #[arg(short = 'c', long = "config", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Address to listen on, overriding the configuration.
    #[arg(short = 'l', long = "listen", value_name = "ADDR", global = true)]
    pub listen: Option<SocketAddr>,

    /// Forge a certificate for every connection instead of caching.
    #[arg(long = "no-cache", global = true)]
    pub no_cache: bool,

    /// Increase log verbosity.
    ///
    /// Can be specified multiple times:
    /// -v    = info level
    /// -vv   = debug level
    /// -vvv  = trace level
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

/// Subcommands for sluice.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the proxy (default).
    Run,

    /// Write the root CA certificate (PEM) for client trust stores.
    #[command(name = "export-ca")]
    ExportCa {
        /// Output file; stdout when omitted.
        #[arg(short = 'o', long = "out", value_name = "PATH")]
        out: Option<PathBuf>,
    },

    /// Print the effective merged configuration.
    #[command(name = "show-config")]
    ShowConfig,
}

impl Cli {
    /// The command to execute, defaulting to `run`.
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }

    /// Log filter directive implied by `-v` flags, if any.
    pub fn verbosity_filter(&self) -> Option<&'static str> {
        match self.verbose {
            0 => None,
            1 => Some("info"),
            2 => Some("debug"),
            _ => Some("trace"),
        }
    }
}

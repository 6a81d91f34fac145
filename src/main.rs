//! sluice: TLS-intercepting HTTP(S) proxy
//!
//! This is the main entry point for the sluice binary. It handles CLI argument
//! parsing, configuration loading and logging initialization, then either
//! runs the proxy under the lifecycle coordinator or executes a one-shot
//! subcommand.
//!
//! # Exit Codes
//!
//! - 0: clean shutdown after a single signal
//! - 1: startup failure, listener failure, or a second signal during shutdown

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sluice::{
    authority::CertificateAuthority,
    cli::{Cli, Commands},
    config::{Config, ConfigLoader},
    extension::ExtensionManager,
    lifecycle::{Coordinator, CoordinatorOptions},
    proxy::ProxyServer,
};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before any other initialization)
    let cli = Cli::parse();

    // Load configuration with hierarchy merging
    let config = ConfigLoader::new()
        .load(&cli)
        .context("Failed to load configuration")?;

    init_tracing(cli.verbosity_filter(), &config.general.log_level)?;

    debug!("Parsed CLI arguments: {:?}", cli);
    debug!("Loaded configuration: {:?}", config);

    match cli.command() {
        Commands::Run => run(config).await,
        Commands::ExportCa { out } => export_ca(&config, out.as_deref()),
        Commands::ShowConfig => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

/// Run the proxy until shutdown.
async fn run(config: Config) -> Result<()> {
    // A broken root is fatal before anything listens
    let anchor = config
        .certificates
        .load_anchor()
        .context("Failed to load root CA")?;
    info!("Signing leaf certificates with {}", anchor.subject());

    let authority = Arc::new(CertificateAuthority::new(
        Arc::new(anchor),
        config.certificates.build_cache(),
    ));
    let server = ProxyServer::new(config.proxy_config(), authority);

    let coordinator = Coordinator::new(
        ExtensionManager::new(),
        server,
        CoordinatorOptions::default(),
    );
    coordinator.run(None).await.context("Proxy terminated")?;

    Ok(())
}

/// Write the configured root certificate to `out`, or stdout.
fn export_ca(config: &Config, out: Option<&Path>) -> Result<()> {
    let anchor = config
        .certificates
        .load_anchor()
        .context("Failed to load root CA")?;

    match out {
        Some(path) => {
            fs::write(path, anchor.cert_pem())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Root CA written to {}", path.display());
        }
        None => print!("{}", anchor.cert_pem()),
    }

    Ok(())
}

/// Initialize the tracing subscriber.
///
/// Logs go to stderr so `export-ca` and `show-config` output stays clean.
///
/// # Precedence
/// - `-v` flags (info, debug, trace)
/// - `RUST_LOG`
/// - `general.log_level` from configuration
fn init_tracing(verbosity: Option<&str>, configured: &str) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = match verbosity {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured)),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}

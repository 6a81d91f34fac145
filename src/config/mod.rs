//! Configuration system for sluice.
//!
//! This module provides TOML configuration loading with hierarchy merging.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded from multiple sources and merged in order:
//!
//! 1. Embedded defaults (`config/default.toml`)
//! 2. System config: `/etc/sluice/config.toml`
//! 3. User config: `~/.config/sluice/config.toml`
//! 4. Additional config file (via `--config` flag)
//! 5. CLI flags (highest priority)
//!
//! # Example
//!
//! ```toml
//! [server]
//! listen_addr = "127.0.0.1:8080"
//! shutdown_grace_secs = 5
//!
//! [certificates]
//! cache = "bounded"
//! cache_capacity = 256
//! ```

mod error;
mod loader;
mod schema;

pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_CONFIG, SYSTEM_CONFIG_PATH};
pub use schema::{CacheKind, CertificatesConfig, Config, GeneralConfig, ServerConfig};

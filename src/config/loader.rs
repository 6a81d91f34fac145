//! Configuration loading with hierarchy merging.
//!
//! Configuration is loaded from multiple sources and merged in order:
//!
//! 1. Embedded defaults (compiled into binary)
//! 2. System config: `/etc/sluice/config.toml`
//! 3. User config: `~/.config/sluice/config.toml`
//! 4. Additional config file (via `--config` flag)
//! 5. CLI flags (highest priority)
//!
//! Scalars set in a later layer override earlier ones.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::ConfigError;
use super::schema::{CacheKind, Config};
use crate::cli::Cli;

/// Built-in defaults.
pub const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

/// System-wide configuration path.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/sluice/config.toml";

/// User configuration directory name.
pub const USER_CONFIG_DIR: &str = "sluice";

/// User configuration filename.
pub const USER_CONFIG_FILE: &str = "config.toml";

/// Configuration loader with support for hierarchy merging.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Path to system-wide configuration.
    system_path: PathBuf,
    /// Path to user configuration.
    user_path: PathBuf,
}

impl ConfigLoader {
    /// Create a new ConfigLoader with default paths.
    #[must_use]
    pub fn new() -> Self {
        let user_config_dir = dirs::config_dir()
            .map(|p| p.join(USER_CONFIG_DIR))
            .unwrap_or_else(|| PathBuf::from(".config").join(USER_CONFIG_DIR));

        Self {
            system_path: PathBuf::from(SYSTEM_CONFIG_PATH),
            user_path: user_config_dir.join(USER_CONFIG_FILE),
        }
    }

    /// Create a ConfigLoader with custom paths (for testing).
    #[must_use]
    pub fn with_paths(system_path: PathBuf, user_path: PathBuf) -> Self {
        Self {
            system_path,
            user_path,
        }
    }

    /// Load, merge and validate configuration from all sources.
    ///
    /// Missing system and user files are skipped. A missing `--config` file
    /// is an error. Invalid TOML is an error (fail fast with clear message).
    pub fn load(&self, cli: &Cli) -> Result<Config, ConfigError> {
        // Start with embedded defaults
        let mut config: Config =
            toml::from_str(DEFAULT_CONFIG).map_err(|e| ConfigError::ParseError {
                path: PathBuf::from("<embedded:default.toml>"),
                source: e,
            })?;
        debug!("Loaded embedded default configuration");

        for (layer, path) in [("system", &self.system_path), ("user", &self.user_path)] {
            match self.load_file(path)? {
                Some(file_config) => {
                    config.merge(file_config);
                    debug!("Loaded {} config from {:?}", layer, path);
                }
                None => debug!("No {} config found at {:?}", layer, path),
            }
        }

        // Load and merge additional config file from CLI
        if let Some(ref cli_config_path) = cli.config {
            match self.load_file(cli_config_path)? {
                Some(cli_config) => {
                    config.merge(cli_config);
                    debug!("Loaded additional config from {:?}", cli_config_path);
                }
                None => {
                    // Unlike system/user config, a missing CLI-specified config is an error
                    return Err(ConfigError::ReadError {
                        path: cli_config_path.clone(),
                        source: std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            "Specified config file not found",
                        ),
                    });
                }
            }
        }

        // Apply CLI flags (highest priority)
        if let Some(listen) = cli.listen {
            config.server.listen_addr = Some(listen);
            debug!("Listen address {} from CLI", listen);
        }
        if cli.no_cache {
            config.certificates.cache = Some(CacheKind::None);
            debug!("Certificate cache disabled from CLI");
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a config file, returning None if it doesn't exist.
    fn load_file(&self, path: &Path) -> Result<Option<Config>, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let config: Config =
                    toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
                        path: path.to_path_buf(),
                        source: e,
                    })?;
                Ok(Some(config))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ConfigError::ReadError {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::tempdir;

    fn isolated_loader(dir: &Path) -> ConfigLoader {
        ConfigLoader::with_paths(dir.join("system.toml"), dir.join("user.toml"))
    }

    #[test]
    fn test_missing_files_use_defaults() {
        let dir = tempdir().unwrap();
        let loader = isolated_loader(dir.path());

        let config = loader.load(&Cli::parse_from(["sluice"])).unwrap();

        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.server.shutdown_grace_secs, Some(5));
        assert_eq!(config.certificates.cache, Some(CacheKind::Memory));
    }

    #[test]
    fn test_user_config_overrides_system() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("system.toml"),
            "[general]\nlog_level = \"warn\"\n[server]\nread_timeout_secs = 10\n",
        )
        .unwrap();
        fs::write(dir.path().join("user.toml"), "[general]\nlog_level = \"debug\"\n").unwrap();

        let config = isolated_loader(dir.path())
            .load(&Cli::parse_from(["sluice"]))
            .unwrap();

        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.server.read_timeout_secs, Some(10));
    }

    #[test]
    fn test_cli_flags_win() {
        let dir = tempdir().unwrap();
        let extra = dir.path().join("extra.toml");
        fs::write(
            &extra,
            "[server]\nlisten_addr = \"127.0.0.1:7000\"\n[certificates]\ncache = \"bounded\"\n",
        )
        .unwrap();

        let cli = Cli::parse_from([
            "sluice",
            "--config",
            extra.to_str().unwrap(),
            "--listen",
            "127.0.0.1:7001",
            "--no-cache",
        ]);
        let config = isolated_loader(dir.path()).load(&cli).unwrap();

        assert_eq!(config.server.listen_addr.map(|a| a.port()), Some(7001));
        assert_eq!(config.certificates.cache, Some(CacheKind::None));
    }

    #[test]
    fn test_missing_cli_config_is_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let cli = Cli::parse_from(["sluice", "--config", missing.to_str().unwrap()]);

        let result = isolated_loader(dir.path()).load(&cli);
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("user.toml"), "[server\nlisten_addr = 1").unwrap();

        let result = isolated_loader(dir.path()).load(&Cli::parse_from(["sluice"]));
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn test_invalid_merged_value_is_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("user.toml"), "[server]\nshutdown_grace_secs = 0\n").unwrap();

        let result = isolated_loader(dir.path()).load(&Cli::parse_from(["sluice"]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}

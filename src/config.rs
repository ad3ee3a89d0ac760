//! Configuration management for HB Fetcher
//!
//! This module provides TOML configuration loading with a fixed lookup order,
//! validation, and conversion into the per-component runtime policies.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::{ChecksumPolicy, ClientConfig, PlannerConfig, PlatformSelection, TransferPolicy};
use crate::constants::{catalog, config as paths, http, limits, logging};
use crate::errors::{ConfigError, ConfigResult};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root directory of the local library
    pub download_location: PathBuf,
    /// Session cookie; overrides the environment when set
    pub session_cookie: Option<String>,
    /// Checksum cache settings
    pub checksum: ChecksumPolicy,
    /// Transfer retry and resume settings
    pub transfer: TransferPolicy,
    /// HTTP client settings
    pub client: ClientConfigToml,
    /// Enabled platforms
    pub platforms: PlatformSelection,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download_location: PathBuf::from("."),
            session_cookie: None,
            checksum: ChecksumPolicy::default(),
            transfer: TransferPolicy::default(),
            client: ClientConfigToml::default(),
            platforms: PlatformSelection::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// TOML-friendly client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfigToml {
    /// Connection establishment deadline
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Whole-request deadline for catalog calls
    #[serde(with = "humantime_serde")]
    pub catalog_timeout: Duration,
    /// Catalog request rate (requests per second)
    pub rate_limit_rps: u32,
    /// Catalog API origin
    pub catalog_base_url: String,
}

impl Default for ClientConfigToml {
    fn default() -> Self {
        Self {
            connect_timeout: http::CONNECT_TIMEOUT,
            catalog_timeout: catalog::REQUEST_TIMEOUT,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            catalog_base_url: catalog::BASE_URL.to_string(),
        }
    }
}

impl ClientConfigToml {
    /// Convert to runtime ClientConfig
    pub fn to_runtime_config(&self) -> ClientConfig {
        ClientConfig {
            connect_timeout: self.connect_timeout,
            catalog_timeout: self.catalog_timeout,
            rate_limit_rps: self.rate_limit_rps,
            catalog_base_url: self.catalog_base_url.clone(),
            ..ClientConfig::default()
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level for the application
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: logging::DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Runtime values derived from an [`AppConfig`]
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub checksum: ChecksumPolicy,
    pub transfer: TransferPolicy,
    pub client: ClientConfig,
    pub planner: PlannerConfig,
}

/// Command-line values that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub download_location: Option<PathBuf>,
    pub block_size: Option<usize>,
    pub session_cookie: Option<String>,
    /// Platforms to enable exclusively
    pub platforms: Option<Vec<String>>,
}

impl AppConfig {
    /// Load configuration from the first file found
    ///
    /// Lookup order: `config_file_override` (must exist), `./hb-fetcher.toml`,
    /// the user config directory, then built-in defaults.
    pub async fn load(config_file_override: Option<PathBuf>) -> ConfigResult<Self> {
        let config_path = match config_file_override {
            Some(path) if path.exists() => Some(path),
            Some(path) => return Err(ConfigError::NotFound { path }),
            None => Self::find_config_file(),
        };

        match config_path {
            Some(path) => Self::load_from_file(&path).await,
            None => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Find configuration file in standard locations
    pub fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from(paths::LOCAL_CONFIG_FILE)];
        if let Some(user_config) = Self::default_config_path() {
            search_paths.push(user_config);
        }

        search_paths.into_iter().find(|path| {
            let found = path.is_file();
            if found {
                debug!("Found config file: {}", path.display());
            }
            found
        })
    }

    /// Config file path in the user's config directory
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(paths::APP_CONFIG_DIR).join(paths::APP_CONFIG_FILE))
    }

    async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.to_path_buf(),
            })?;
        let config: AppConfig = toml::from_str(&content)?;
        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Serialize to TOML, e.g. to seed a config file
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply command-line overrides
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(location) = &overrides.download_location {
            self.download_location = location.clone();
        }
        if let Some(block_size) = overrides.block_size {
            self.checksum.block_size = block_size;
        }
        if let Some(cookie) = &overrides.session_cookie {
            self.session_cookie = Some(cookie.clone());
        }
        if let Some(platforms) = &overrides.platforms {
            self.platforms = self.platforms.only(platforms);
        }
    }

    /// Check every value a run depends on
    ///
    /// All problems are collected into one `ConfigError::ValidationFailed`.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        match std::fs::metadata(&self.download_location) {
            Ok(meta) if !meta.is_dir() => errors.push(format!(
                "download location {} is not a directory",
                self.download_location.display()
            )),
            Ok(meta) if meta.permissions().readonly() => errors.push(format!(
                "download location {} is not writable",
                self.download_location.display()
            )),
            Ok(_) => {}
            Err(e) => errors.push(format!(
                "download location {} is not accessible: {}",
                self.download_location.display(),
                e
            )),
        }

        if self.checksum.block_size == 0 {
            errors.push("checksum.block_size must be greater than zero".to_string());
        }
        if self.transfer.max_attempts == 0 {
            errors.push("transfer.max_attempts must be at least 1".to_string());
        }
        if self.client.rate_limit_rps == 0 {
            errors.push("client.rate_limit_rps must be at least 1".to_string());
        }
        if url::Url::parse(&self.client.catalog_base_url).is_err() {
            errors.push(format!(
                "client.catalog_base_url '{}' is not a valid URL",
                self.client.catalog_base_url
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationFailed { errors })
        }
    }

    /// Convert TOML-friendly configuration to runtime configuration
    pub fn to_runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            checksum: self.checksum,
            transfer: self.transfer,
            client: self.client.to_runtime_config(),
            planner: PlannerConfig {
                download_location: self.download_location.clone(),
                platforms: self.platforms.clone(),
                order_keys: None,
                dry_run: false,
            },
        }
    }
}

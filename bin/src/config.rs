//! Layered application configuration.
//!
//! A TOML or YAML file (from `--config` or `DATAGRAB_CONFIG`) overrides
//! the built-in defaults; `DATAGRAB_DATA_ROOT` and `--data-root` override
//! the storage root on top. Unknown keys are ignored everywhere except in
//! `filters`, which rejects extras to catch typos.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use datagrab_catalog::{CatalogConfig, FilterConfig};
use datagrab_download::DownloadConfig;
use datagrab_source::{AshareConfig, RateLimitConfig, YahooConfig};
use datagrab_types::Clock;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "DATAGRAB_CONFIG";
/// Environment variable overriding `storage.data_root`.
pub const DATA_ROOT_ENV: &str = "DATAGRAB_DATA_ROOT";

/// On-disk store settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the partitioned store.
    pub data_root: String,
    /// Whether incremental writes merge with the existing file.
    pub merge_on_incremental: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_root: "./data".to_string(),
            merge_on_incremental: true,
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Global request pacing.
    pub rate_limit: RateLimitConfig,
    /// Catalog fetch tuning.
    pub catalog: CatalogConfig,
    /// Base instrument filters; CLI filters extend these.
    pub filters: FilterConfig,
    /// Scheduler tuning.
    pub download: DownloadConfig,
    /// Store settings.
    pub storage: StorageConfig,
    /// Yahoo source settings.
    pub yahoo: YahooConfig,
    /// A-share source settings.
    pub ashare: AshareConfig,
    /// Operational timezone name.
    pub timezone: Timezone,
    /// Intervals used when a download names none.
    pub intervals_default: Vec<String>,
}

/// Validated timezone name wrapper.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct Timezone(pub String);

impl Default for Timezone {
    fn default() -> Self {
        Self("Asia/Shanghai".to_string())
    }
}

impl AppConfig {
    /// Loads configuration, applying the file named by `path_override` or
    /// `DATAGRAB_CONFIG` and the `DATAGRAB_DATA_ROOT` override.
    ///
    /// # Errors
    ///
    /// Fails on a missing or malformed file, an unsupported extension, or
    /// an invalid timezone. These are fatal before any work starts.
    pub fn load(path_override: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let path = path_override.map(Path::to_path_buf).or(env_path);

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        if let Ok(data_root) = std::env::var(DATA_ROOT_ENV) {
            if !data_root.is_empty() {
                config.storage.data_root = data_root;
            }
        }
        if config.intervals_default.is_empty() {
            config.intervals_default = vec!["1d".to_string()];
        }
        // Fail fast on an unknown timezone.
        config.clock()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("config not found: {}", path.display());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        let config = match extension.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&text)
                .with_context(|| format!("invalid YAML config {}", path.display()))?,
            "toml" => toml::from_str(&text)
                .with_context(|| format!("invalid TOML config {}", path.display()))?,
            _ => bail!("config must be YAML or TOML: {}", path.display()),
        };
        Ok(config)
    }

    /// Builds the operational clock from the configured timezone.
    ///
    /// # Errors
    ///
    /// Fails when the timezone name is unknown.
    pub fn clock(&self) -> Result<Clock> {
        let tz = chrono_tz::Tz::from_str(&self.timezone.0)
            .map_err(|_| anyhow::anyhow!("invalid timezone '{}'", self.timezone.0))?;
        Ok(Clock::new(tz))
    }

    /// Resolved absolute data root.
    #[must_use]
    pub fn data_root(&self) -> PathBuf {
        let path = PathBuf::from(&self.storage.data_root);
        if path.is_absolute() {
            path
        } else {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(path)
        }
    }
}

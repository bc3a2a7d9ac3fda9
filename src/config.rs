//! Configuration management for DVP
//!
//! TOML file at `~/.config/dvp/config.toml`. Every section defaults so a
//! missing file or a partial file both work; `load` never fails on absence.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scroll: ScrollConfig,
    #[serde(default)]
    pub compute: ComputeConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
}

/// Cache storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Where the file-backed cache store lives.
    #[serde(default = "default_cache_file")]
    pub cache_file: String,
    /// Byte budget for the store; writes beyond it trigger eviction.
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: u64,
}

pub fn default_cache_file() -> String {
    "~/.cache/dvp/results.json".to_string()
}

pub fn default_quota_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_file: default_cache_file(),
            quota_bytes: default_quota_bytes(),
        }
    }
}

/// List virtualization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrollConfig {
    /// Fixed row height in pixels.
    #[serde(default = "default_row_height")]
    pub row_height: f64,
    /// Extra rows rendered beyond each visible edge.
    #[serde(default = "default_buffer_rows")]
    pub buffer_rows: usize,
}

pub fn default_row_height() -> f64 {
    53.0
}

pub fn default_buffer_rows() -> usize {
    5
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            row_height: default_row_height(),
            buffer_rows: default_buffer_rows(),
        }
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeConfig {
    /// Number of background worker threads.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

pub fn default_workers() -> usize {
    4
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

/// Lazy widget loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Margin ahead of the viewport at which loading starts.
    #[serde(default = "default_lookahead_px")]
    pub lookahead_px: u32,
    /// How long a widget may wait for its shared dependency.
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
}

pub fn default_lookahead_px() -> u32 {
    50
}

pub fn default_ready_timeout_ms() -> u64 {
    5000
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            lookahead_px: default_lookahead_px(),
            ready_timeout_ms: default_ready_timeout_ms(),
        }
    }
}

impl Config {
    /// Get the config file path (~/.config/dvp/config.toml)
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Get the config directory path (~/.config/dvp)
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("dvp"))
    }

    /// Load configuration from file, or return defaults if not found
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let contents = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Expand ~ in the cache file path
    pub fn cache_file_path(&self) -> PathBuf {
        let file = &self.storage.cache_file;
        if let Some(stripped) = file.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        }
        PathBuf::from(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.storage.cache_file, "~/.cache/dvp/results.json");
        assert_eq!(config.storage.quota_bytes, 5 * 1024 * 1024);
        assert_eq!(config.scroll.row_height, 53.0);
        assert_eq!(config.scroll.buffer_rows, 5);
        assert_eq!(config.compute.workers, 4);
        assert_eq!(config.loader.lookahead_px, 50);
        assert_eq!(config.loader.ready_timeout_ms, 5000);
    }

    #[test]
    fn config_serialization_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.storage.cache_file, config.storage.cache_file);
        assert_eq!(parsed.scroll.row_height, config.scroll.row_height);
        assert_eq!(parsed.compute.workers, config.compute.workers);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let parsed: Config = toml::from_str("[scroll]\nrow_height = 40.0\n").unwrap();
        assert_eq!(parsed.scroll.row_height, 40.0);
        assert_eq!(parsed.scroll.buffer_rows, default_buffer_rows());
        assert_eq!(parsed.compute.workers, default_workers());
    }

    #[test]
    fn cache_file_path_expands_tilde() {
        let config = Config::default();
        let path = config.cache_file_path();
        assert!(!path.to_string_lossy().starts_with('~'));
        assert!(path.ends_with(".cache/dvp/results.json"));
    }
}

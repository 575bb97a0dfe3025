//! Application configuration, loaded from layered TOML files.
//!
//! Lookup order (later files override earlier ones, per key):
//! `/etc/ridge/config.toml` < user config dir < `./ridge.toml`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Client-side settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Output format (table, json)
    pub format: String,

    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            format: "table".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the computer store file; defaults to the user data dir
    pub path: Option<PathBuf>,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RidgeConfig {
    pub client: ClientConfig,
    pub store: StoreConfig,
}

/// The three config file locations, lowest priority first.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub system: PathBuf,
    pub user: Option<PathBuf>,
    pub local: PathBuf,
}

impl ConfigPaths {
    pub fn new() -> Self {
        Self {
            system: PathBuf::from("/etc/ridge/config.toml"),
            user: dirs::config_dir().map(|d| d.join("ridge").join("config.toml")),
            local: PathBuf::from("ridge.toml"),
        }
    }

    /// The paths that exist on disk, lowest priority first.
    pub fn existing_paths(&self) -> Vec<&PathBuf> {
        let mut paths = Vec::new();
        if self.system.exists() {
            paths.push(&self.system);
        }
        if let Some(user) = &self.user {
            if user.exists() {
                paths.push(user);
            }
        }
        if self.local.exists() {
            paths.push(&self.local);
        }
        paths
    }

    /// Directory holding the user config file, if one is defined.
    pub fn user_config_dir(&self) -> Option<&Path> {
        self.user.as_deref().and_then(Path::parent)
    }
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::new()
    }
}

impl RidgeConfig {
    /// Load from the standard locations.
    pub fn load() -> Result<Self> {
        Self::load_with_paths(&ConfigPaths::new())
    }

    pub fn load_with_paths(paths: &ConfigPaths) -> Result<Self> {
        let files: Vec<PathBuf> = paths.existing_paths().into_iter().cloned().collect();
        Self::load_from_files(&files)
    }

    /// Load and merge config files; later files override earlier ones per
    /// key. Missing files are skipped.
    pub fn load_from_files(files: &[PathBuf]) -> Result<Self> {
        let mut merged = toml::Table::new();
        for file in files {
            if !file.exists() {
                continue;
            }
            let content = fs::read_to_string(file)
                .with_context(|| format!("failed to read config file {}", file.display()))?;
            let table: toml::Table = content
                .parse()
                .with_context(|| format!("invalid TOML in {}", file.display()))?;
            merge_tables(&mut merged, table);
        }
        let config: RidgeConfig = toml::Value::Table(merged)
            .try_into()
            .context("invalid configuration")?;
        Ok(config)
    }

    /// Check all fields, collecting every error instead of stopping at the
    /// first.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !["table", "json"].contains(&self.client.format.as_str()) {
            errors.push(format!(
                "client.format must be 'table' or 'json', got '{}'",
                self.client.format
            ));
        }
        if !["error", "warn", "info", "debug", "trace"].contains(&self.client.log_level.as_str()) {
            errors.push(format!(
                "client.log_level must be one of error/warn/info/debug/trace, got '{}'",
                self.client.log_level
            ));
        }
        if let Some(path) = &self.store.path {
            if path.as_os_str().is_empty() {
                errors.push("store.path must not be empty".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serializing configuration")
    }

    /// Default config file content, suitable for `ridge config init`.
    pub fn generate_default_config() -> String {
        let config = RidgeConfig::default();
        config
            .to_toml()
            .expect("default configuration always serializes")
    }

    /// Resolve the store file path: `RIDGE_STORE_PATH` > config > user data
    /// dir.
    pub fn store_path(&self) -> PathBuf {
        if let Ok(path) = env::var("RIDGE_STORE_PATH") {
            return PathBuf::from(path);
        }
        if let Some(path) = &self.store.path {
            return path.clone();
        }
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ridge")
            .join("computers.json")
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(base_table)), toml::Value::Table(overlay_table)) => {
                merge_tables(base_table, overlay_table);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.format, "table");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_store_config_defaults() {
        let config = StoreConfig::default();
        assert!(config.path.is_none());
    }
}

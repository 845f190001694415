//! Configuration management for the rebinder CLI

use anyhow::{Context, Result};
use rebinder::RootTable;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Wait for Enter before exiting when any path failed
    pub pause_on_error: bool,
    /// Legacy roots tried before the built-in table
    pub extra_roots: Vec<String>,
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("rebinder");

        Ok(config_dir.join("config.toml"))
    }

    /// Load configuration from the default location, or defaults if absent
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, or defaults if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Root table with the configured extras in front of the built-in roots
    pub fn root_table(&self) -> RootTable {
        RootTable::fromsoftware().with_extra(self.extra_roots.iter().cloned())
    }
}

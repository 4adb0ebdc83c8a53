// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
}

/// Portal-vendor details. Ministra installs usually serve the API from
/// /portal.php, but some rebrands move it, so the path is configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default = "default_portal_path")]
    pub path: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum simultaneous in-flight stream-link resolutions.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Attempts per call before a transient failure becomes permanent.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Pause between retry attempts, in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Hard cap on pages fetched per category.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

fn default_portal_path() -> String {
    "/portal.php".to_string()
}

fn default_user_agent() -> String {
    // MAG set-top-box UA; some portals refuse anything else.
    "Mozilla/5.0 (QtEmbedded; U; Linux; C) AppleWebKit/533.3 (KHTML, like Gecko) \
     MAG200 stbapp ver: 2 rev: 250 Safari/533.3"
        .to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_concurrency() -> usize {
    12
}

fn default_retries() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_max_pages() -> u32 {
    500
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            path: default_portal_path(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
            retries: default_retries(),
            retry_backoff_ms: default_backoff_ms(),
            max_pages: default_max_pages(),
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("mac2m3u").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;

        Ok(config)
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Config {
        if path.as_ref().exists() {
            Self::load(&path).unwrap_or_else(|e| {
                eprintln!("Warning: could not load config file, using defaults: {e}");
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }
}

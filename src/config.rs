//! Runtime configuration: an optional JSON file overlaid with environment variables.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};

use crate::models::{Address, ObjectId};
use crate::plan::MoveTarget;

const APP_NAME: &str = "universe-builder";
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9000";
pub const DEFAULT_MODULE: &str = "universe";
pub const DEFAULT_PAGE_LIMIT: usize = 50;
pub const DEFAULT_MAX_PAGES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Node endpoint for reads and history queries (UNIVERSE_RPC_URL)
    pub rpc_url: String,
    /// Signing executor endpoint; falls back to `rpc_url` (UNIVERSE_EXECUTOR_URL)
    pub executor_url: Option<String>,
    /// Bearer token sent with every request (UNIVERSE_API_KEY)
    pub api_key: Option<String>,
    /// Package that hosts the universe module (UNIVERSE_PACKAGE_ID)
    pub package_id: Option<ObjectId>,
    /// Module name inside the package (UNIVERSE_MODULE)
    pub module: String,
    /// Account that submits batches (UNIVERSE_SENDER)
    pub sender: Option<Address>,
    /// History page size for ownership discovery (UNIVERSE_PAGE_LIMIT)
    pub page_limit: usize,
    /// Upper bound on history pages per address (UNIVERSE_MAX_PAGES)
    pub max_pages: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            executor_url: None,
            api_key: None,
            package_id: None,
            module: DEFAULT_MODULE.to_string(),
            sender: None,
            page_limit: DEFAULT_PAGE_LIMIT,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl Config {
    /// Load from the user's config directory, then apply environment overrides.
    /// A missing file means defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&default_config_path()?)
    }

    /// Load from an explicit file, then apply environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Defaults overlaid with environment variables only.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("UNIVERSE_RPC_URL") {
            self.rpc_url = url;
        }
        if let Some(url) = lookup("UNIVERSE_EXECUTOR_URL") {
            self.executor_url = Some(url);
        }
        if let Some(key) = lookup("UNIVERSE_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(id) = lookup("UNIVERSE_PACKAGE_ID") {
            self.package_id = Some(id.parse().context("UNIVERSE_PACKAGE_ID is not an object id")?);
        }
        if let Some(module) = lookup("UNIVERSE_MODULE") {
            self.module = module;
        }
        if let Some(sender) = lookup("UNIVERSE_SENDER") {
            self.sender = Some(sender.parse().context("UNIVERSE_SENDER is not an address")?);
        }
        if let Some(limit) = lookup("UNIVERSE_PAGE_LIMIT") {
            self.page_limit = limit.parse().context("UNIVERSE_PAGE_LIMIT is not a number")?;
        }
        if let Some(pages) = lookup("UNIVERSE_MAX_PAGES") {
            self.max_pages = pages.parse().context("UNIVERSE_MAX_PAGES is not a number")?;
        }
        Ok(())
    }

    pub fn executor_url(&self) -> String {
        self.executor_url
            .clone()
            .unwrap_or_else(|| self.rpc_url.clone())
    }

    /// The configured universe module. Fails when no package is set.
    pub fn target(&self) -> Result<MoveTarget> {
        let package = self
            .package_id
            .clone()
            .ok_or_else(|| anyhow::anyhow!("No package configured (set UNIVERSE_PACKAGE_ID)"))?;
        Ok(MoveTarget::new(package, self.module.clone()))
    }

    pub fn sender(&self) -> Result<Address> {
        self.sender
            .clone()
            .ok_or_else(|| anyhow::anyhow!("No sender configured (set UNIVERSE_SENDER)"))
    }

    /// Save to an explicit path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let mut path =
        config_dir().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    path.push(APP_NAME);
    path.push(CONFIG_FILE);
    Ok(path)
}

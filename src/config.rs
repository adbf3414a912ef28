use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default answer/suggestion service
pub const DEFAULT_BASE_URL: &str = "https://medi-search-server.vercel.app";

/// Environment variable overriding `base_url`
pub const BASE_URL_ENV: &str = "MEDASSIST_BASE_URL";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the answer/suggestion API
    pub base_url: String,

    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,

    /// Directory holding session state and logs
    pub data_dir: PathBuf,

    /// UI preferences
    pub ui: UiConfig,
}

/// UI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Quiet period before a suggestion fetch is issued
    pub debounce_ms: u64,
    /// Interval between reveal ticks
    pub tick_ms: u64,
    /// Palette assigned to user message bubbles
    pub user_colors: Vec<String>,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            tick_ms: 15,
            user_colors: vec![
                "cyan".to_string(),
                "magenta".to_string(),
                "yellow".to_string(),
                "green".to_string(),
                "blue".to_string(),
            ],
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));

        Config {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 30,
            data_dir: home.join(".medassist"),
            ui: UiConfig::default(),
        }
    }
}

impl Config {
    /// Load `~/.medassist/config.toml`, writing a default one when it is missing.
    pub fn load() -> Result<Self> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        let config_path = home.join(".medassist").join("config.toml");

        let mut config = Self::load_from(&config_path)?;
        if !config_path.exists() && config.data_dir == home.join(".medassist") {
            if let Err(err) = config.save() {
                tracing::warn!("Could not write default config: {:#}", err);
            }
        }
        config.apply_base_url_override(std::env::var(BASE_URL_ENV).ok());
        Ok(config)
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Save configuration to `<data_dir>/config.toml`
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir).context("Failed to create data directory")?;

        let config_path = self.data_dir.join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Replace the base URL when an override is present and non-empty.
    pub fn apply_base_url_override(&mut self, base_url: Option<String>) {
        if let Some(url) = base_url.filter(|url| !url.trim().is_empty()) {
            self.base_url = url.trim().trim_end_matches('/').to_string();
        }
    }

    pub fn session_dir(&self) -> PathBuf {
        self.data_dir.join("session")
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("medassist.log")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.ui.debounce_ms)
    }

    /// Reveal tick interval, kept within 5..=20 ms.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.ui.tick_ms.clamp(5, 20))
    }
}

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::aggregator::{DEFAULT_WINDOW_SECS, MAX_WINDOW_SECS};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_length_secs")]
    pub length_secs: u64,
    #[serde(default)]
    pub retention_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_length_secs() -> u64 {
    DEFAULT_WINDOW_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            length_secs: default_length_secs(),
            retention_secs: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind_address
            .trim()
            .parse()
            .with_context(|| format!("invalid server.bind_address '{}'", self.bind_address))
    }
}

fn config_path() -> PathBuf {
    std::env::var("WINDOW_STATS_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config/default.toml"))
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::load_from_path(&config_path())?;
        if let Ok(bind) = std::env::var("WINDOW_STATS_BIND") {
            config.override_bind_address(&bind);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&config_str)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Parse only; call `validate` once any overrides are applied.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("invalid config toml")
    }

    pub fn override_bind_address(&mut self, bind: &str) {
        let bind = bind.trim();
        if !bind.is_empty() {
            self.server.bind_address = bind.to_string();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.window.length_secs == 0 {
            bail!("window.length_secs must be > 0");
        }
        check_secs_in_range("window.length_secs", self.window.length_secs)?;
        if let Some(retention) = self.window.retention_secs {
            check_secs_in_range("window.retention_secs", retention)?;
            if retention < self.window.length_secs {
                bail!(
                    "window.retention_secs ({}) must be >= window.length_secs ({})",
                    retention,
                    self.window.length_secs
                );
            }
        }
        self.server
            .socket_addr()
            .context("server.bind_address is invalid")?;
        Ok(())
    }
}

/// Window arithmetic runs in signed milliseconds, so `secs * 1000` must fit i64.
fn check_secs_in_range(field: &str, secs: u64) -> Result<()> {
    secs.checked_mul(1000)
        .and_then(|ms| i64::try_from(ms).ok())
        .with_context(|| format!("{} ({}) must be <= {}", field, secs, MAX_WINDOW_SECS))?;
    Ok(())
}

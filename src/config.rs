use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::filters::FilterState;
use crate::map::{InitialView, MapSettings};
use crate::minima::MinimaThreshold;
use crate::weather::REFRESH_INTERVAL;

pub const CONFIG_ENV: &str = "NOTAMBOARD_CONFIG";
pub const API_URL_ENV: &str = "NOTAM_API_URL";
pub const DEFAULT_TOKEN_ENV: &str = "NOTAM_API_TOKEN";
const DEFAULT_CONFIG_FILE: &str = "notamboard.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// NOTAM REST backend; without one the CLI needs `--records`
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    /// Environment variable holding the bearer token
    pub token_env: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 30,
            token_env: DEFAULT_TOKEN_ENV.to_string(),
        }
    }
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub container: String,
    /// 0 turns clustering off
    pub cluster_threshold: usize,
    pub highlight_radius_m: f64,
    pub initial_zoom: u8,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            container: "notam-map".to_string(),
            cluster_threshold: 200,
            highlight_radius_m: 2_000.0,
            initial_zoom: InitialView::default().zoom,
        }
    }
}

impl MapConfig {
    pub fn settings(&self) -> MapSettings {
        MapSettings {
            cluster_threshold: (self.cluster_threshold > 0).then_some(self.cluster_threshold),
            highlight_radius_m: self.highlight_radius_m,
            initial_view: InitialView {
                zoom: self.initial_zoom,
                ..InitialView::default()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub base_url: Option<String>,
    pub refresh_secs: u64,
    pub monitored: Vec<String>,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            refresh_secs: REFRESH_INTERVAL.as_secs(),
            monitored: Vec::new(),
        }
    }
}

impl WeatherConfig {
    /// Polling period for `weather --watch`; zero falls back to the default
    pub fn refresh_interval(&self) -> Duration {
        match self.refresh_secs {
            0 => REFRESH_INTERVAL,
            secs => Duration::from_secs(secs),
        }
    }
}

/// Contents of `notamboard.toml`. Every section and key is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotamboardConfig {
    pub gateway: GatewayConfig,
    pub map: MapConfig,
    pub minima: MinimaThreshold,
    pub filters: FilterState,
    pub weather: WeatherConfig,
}

impl NotamboardConfig {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let config: NotamboardConfig =
            toml::from_str(&contents).with_context(|| format!("Failed to parse {:?}", path))?;
        Ok(config)
    }

    /// Load from the resolved path if there is one, otherwise defaults; then apply
    /// environment overrides
    pub fn resolve(cli_path: Option<&Path>) -> Result<Self> {
        let mut config = match config_path(cli_path) {
            Some(path) => {
                info!("Loading configuration from {:?}", path);
                Self::load(&path)?
            }
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Environment values win over the file
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(API_URL_ENV).filter(|u| !u.trim().is_empty()) {
            debug!("{} overrides gateway.base_url", API_URL_ENV);
            self.gateway.base_url = Some(url);
        }
    }
}

/// Resolve the config file path.
///
/// Priority:
/// 1. `--config` on the command line (must exist)
/// 2. `NOTAMBOARD_CONFIG` env var (must exist)
/// 3. `./notamboard.toml`, if present
pub fn config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    local.exists().then_some(local)
}

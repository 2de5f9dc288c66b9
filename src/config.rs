//! Server configuration.
//!
//! Read from an optional TOML file, then overridden by `VISITOR_HUB_*`
//! environment variables. Every section has defaults, so an empty file (or
//! no file at all) gives a working local setup.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0"
//! port = 8080
//!
//! [store]
//! backend = "remote"
//! remote_url = "https://project.example.co/rest/v1"
//!
//! [report]
//! utc_offset_minutes = -180
//! church = { name = "Igreja Central", lat = -23.55, lng = -46.63 }
//! ```

use crate::geo::ChurchLocation;
use chrono::{FixedOffset, Offset, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const CONFIG_PATH_VAR: &str = "VISITOR_HUB_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub lookup: LookupConfig,
    pub report: ReportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Directory served as the presentation layer
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "127.0.0.1".to_string(),
            port: 3000,
            static_dir: PathBuf::from("static"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    File,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// JSON files and form settings live here
    pub data_dir: PathBuf,
    pub remote_url: Option<String>,
    pub remote_key: Option<String>,
    pub table: String,
    pub cells_table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            backend: StoreBackend::File,
            data_dir: PathBuf::from("database"),
            remote_url: None,
            remote_key: None,
            table: "visitors".to_string(),
            cells_table: "cells".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    pub postal_code_url: String,
    pub cities_url: String,
    pub city_debounce_ms: u64,
    pub neighborhood_debounce_ms: u64,
    pub min_city_chars: usize,
    pub min_neighborhood_chars: usize,
    pub max_cities: usize,
    pub timeout_secs: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        LookupConfig {
            postal_code_url: "https://viacep.com.br/ws".to_string(),
            cities_url: "https://servicodados.ibge.gov.br/api/v1/localidades/municipios"
                .to_string(),
            city_debounce_ms: 500,
            neighborhood_debounce_ms: 300,
            min_city_chars: 3,
            min_neighborhood_chars: 2,
            max_cities: 10,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Offset of the local calendar, in minutes east of UTC
    pub utc_offset_minutes: i32,
    pub church: ChurchLocation,
    pub influence_radius_km: f64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            utc_offset_minutes: -180,
            church: ChurchLocation::default(),
            influence_radius_km: 5.0,
        }
    }
}

impl ReportConfig {
    /// The local calendar used for all date bucketing. Offsets outside
    /// ±24h fall back to UTC.
    pub fn local_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60)).unwrap_or_else(|| {
            warn!(
                "Invalid utc_offset_minutes {}, using UTC",
                self.utc_offset_minutes
            );
            Utc.fix()
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Loads the file at `path` (or `$VISITOR_HUB_CONFIG`) if any, then
    /// applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_VAR).map(PathBuf::from));

        let mut config = match path {
            Some(path) => {
                let content =
                    fs::read_to_string(&path).map_err(|e| ConfigError::Io(path.clone(), e))?;
                info!("Loaded config from {}", path.display());
                Self::from_toml(&content)?
            }
            None => Config::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overrides settings from `VISITOR_HUB_*` variables. Values that do not
    /// parse are logged and ignored.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(bind) = var("VISITOR_HUB_BIND") {
            self.server.bind = bind;
        }
        if let Some(port) = parsed(&var, "VISITOR_HUB_PORT") {
            self.server.port = port;
        }
        if let Some(dir) = var("VISITOR_HUB_DATA_DIR") {
            self.store.data_dir = PathBuf::from(dir);
        }
        if let Some(url) = var("VISITOR_HUB_REMOTE_URL") {
            self.store.remote_url = Some(url);
            self.store.backend = StoreBackend::Remote;
        }
        if let Some(key) = var("VISITOR_HUB_REMOTE_KEY") {
            self.store.remote_key = Some(key);
        }
    }
}

fn parsed<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    let raw = var(key)?;
    raw.trim()
        .parse()
        .map_err(|e| warn!("Invalid {key} value {raw:?}: {e}, keeping configured value"))
        .ok()
}

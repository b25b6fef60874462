//! Layered configuration for the base station diagnostic core (SPEC_FULL §13).
//!
//! `Config::default()` reproduces every default named in the spec, so tests
//! never need a config file on disk. `Config::from_file` layers a TOML file
//! over those defaults; `Config::from_env` is used by the gateway binary to
//! apply environment overrides on top of a loaded file.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub correlator: CorrelatorConfig,
    #[serde(default)]
    pub healing: HealingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub rolling_window_capacity: usize,
    pub retention_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub z_threshold: f64,
    pub min_data_points: usize,
    pub isolation_forest: IsolationForestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationForestConfig {
    pub sample_size: usize,
    pub contamination: f64,
    pub num_trees: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelatorConfig {
    pub dbscan_eps_seconds: f64,
    pub dbscan_min_points: usize,
    pub suppression_confidence_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealingConfig {
    pub max_concurrent_per_station: usize,
    pub tick_interval_ms: u64,
    pub default_action_timeout_seconds: u64,
    pub result_history_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub hmac_window_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub json_logs: bool,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind_addr: String,
    pub max_frame_len: usize,
    pub read_timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ingest: IngestConfig::default(),
            analytics: AnalyticsConfig::default(),
            correlator: CorrelatorConfig::default(),
            healing: HealingConfig::default(),
            security: SecurityConfig::default(),
            telemetry: TelemetryConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            rolling_window_capacity: 1000,
            retention_days: 7,
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            z_threshold: 3.0,
            min_data_points: 30,
            isolation_forest: IsolationForestConfig::default(),
        }
    }
}

impl Default for IsolationForestConfig {
    fn default() -> Self {
        Self {
            sample_size: 256,
            contamination: 0.05,
            num_trees: 100,
        }
    }
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            dbscan_eps_seconds: 60.0,
            dbscan_min_points: 2,
            suppression_confidence_threshold: 0.7,
        }
    }
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            max_concurrent_per_station: 5,
            tick_interval_ms: 1000,
            default_action_timeout_seconds: 300,
            result_history_capacity: 1000,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            hmac_window_seconds: 300,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            json_logs: false,
            log_level: "info".to_string(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:7700".to_string(),
            max_frame_len: 4096,
            read_timeout_seconds: 5,
        }
    }
}

impl Config {
    /// Load from a TOML file, falling back to `Config::default()` for any
    /// field or whole section the file omits. Every sub-config carries
    /// `#[serde(default)]` backed by its own `Default` impl, so a file that
    /// sets e.g. only `[analytics]` still deserializes, with `ingest`,
    /// `correlator`, etc. taking their default values.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CoreError::Configuration(format!("reading {}: {e}", path.as_ref().display()))
        })?;
        toml::from_str(&text)
            .map_err(|e| CoreError::Configuration(format!("parsing config: {e}")))
    }

    /// Load from `STATION_CONFIG` env var if set, else defaults.
    pub fn from_env() -> Result<Self> {
        match std::env::var("STATION_CONFIG") {
            Ok(path) => Self::from_file(path),
            Err(_) => Ok(Self::default()),
        }
    }
}

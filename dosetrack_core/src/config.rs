//! Configuration file support for dosetrack.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/dosetrack/config.toml`.

use crate::dose_time::{DoseTime, DoseTimeResolver, DoseTimeWindows};
use crate::daytime::TimeWindow;
use crate::ledger::RetentionHorizon;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub dose_times: DoseTimesConfig,

    #[serde(default)]
    pub history: HistoryConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Dose-time windows as `"HH:mm-HH:mm"`. Only night may wrap past midnight.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DoseTimesConfig {
    #[serde(default = "default_morning")]
    pub morning: TimeWindow,

    #[serde(default = "default_noon")]
    pub noon: TimeWindow,

    #[serde(default = "default_evening")]
    pub evening: TimeWindow,

    #[serde(default = "default_night")]
    pub night: TimeWindow,
}

impl Default for DoseTimesConfig {
    fn default() -> Self {
        Self {
            morning: default_morning(),
            noon: default_noon(),
            evening: default_evening(),
            night: default_night(),
        }
    }
}

/// History retention configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default)]
    pub retention: RetentionHorizon,

    /// How far ahead supply run-out is estimated.
    #[serde(default = "default_run_out_horizon_days")]
    pub run_out_horizon_days: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            retention: RetentionHorizon::default(),
            run_out_horizon_days: default_run_out_horizon_days(),
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dosetrack")
}

fn default_morning() -> TimeWindow {
    DoseTimeWindows::default().get(DoseTime::Morning)
}

fn default_noon() -> TimeWindow {
    DoseTimeWindows::default().get(DoseTime::Noon)
}

fn default_evening() -> TimeWindow {
    DoseTimeWindows::default().get(DoseTime::Evening)
}

fn default_night() -> TimeWindow {
    DoseTimeWindows::default().get(DoseTime::Night)
}

fn default_run_out_horizon_days() -> u32 {
    365
}

impl DoseTimesConfig {
    /// Validate the configured windows as one day cycle.
    pub fn windows(&self) -> Result<DoseTimeWindows> {
        DoseTimeWindows::new([self.morning, self.noon, self.evening, self.night])
    }
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.dose_times.windows().map_err(|e| {
            Error::Config(format!("Invalid dose times in {:?}: {}", path, e))
        })?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dosetrack")
            .join("config.toml")
    }

    pub fn dose_time_windows(&self) -> Result<DoseTimeWindows> {
        self.dose_times.windows()
    }

    /// Resolver over the configured windows.
    pub fn resolver(&self) -> Result<DoseTimeResolver> {
        Ok(DoseTimeResolver::new(self.dose_time_windows()?))
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::GraphbotError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub scheduling: SchedulingConfig,
    pub generation: GenerationConfig,
    pub delivery: DeliveryConfig,
    pub storage: StorageConfig,
}

/// When automatic updates run: every `update_days` days, optionally pinned
/// to a fixed clock time ("HH:MM") or interval-only ("XX:XX").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    pub update_days: u32,
    pub fixed_update_time: String,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            update_days: 7,
            fixed_update_time: "XX:XX".to_string(),
        }
    }
}

impl SchedulingConfig {
    /// Validate bounds and time format.
    pub fn validate(&self) -> std::result::Result<(), GraphbotError> {
        if !(1..=365).contains(&self.update_days) {
            return Err(GraphbotError::InvalidConfig(format!(
                "update_days must be between 1 and 365, got {}",
                self.update_days
            )));
        }
        crate::scheduler::schedule::FixedTime::parse(&self.fixed_update_time)?;
        Ok(())
    }

    /// True when scheduling is purely by elapsed days (no fixed clock time).
    pub fn is_interval_only(&self) -> bool {
        self.fixed_update_time == "XX:XX"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_retries: u32,
    pub timeout_seconds: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Maximum upload size accepted by the platform, in bytes.
    pub max_file_bytes: u64,
    /// Pause after this many deletions during channel cleanup.
    pub cleanup_batch_size: u32,
    /// Seconds to pause between cleanup batches.
    pub cleanup_pause_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * 1024 * 1024,
            cleanup_batch_size: 5,
            cleanup_pause_secs: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub state_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_file: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("graphbot")
                .join("scheduler_state.json"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            scheduling: SchedulingConfig::default(),
            generation: GenerationConfig::default(),
            delivery: DeliveryConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.scheduling.validate().context("Invalid scheduling config")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

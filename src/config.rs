//! Configuration management (TOML)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub sampling: SamplingConfig,
    pub persistence: PersistenceConfig,
    pub retention: RetentionConfig,
    pub recommendations: RecommendationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub flush_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    pub days: u32,
    /// Local hour of day (0-23) at which the daily retention sweep runs.
    pub cleanup_hour: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    pub high_bandwidth_threshold_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sampling: SamplingConfig {
                interval_seconds: 1,
            },
            persistence: PersistenceConfig {
                flush_interval_seconds: 5,
            },
            retention: RetentionConfig {
                days: 90,
                cleanup_hour: 2,
            },
            recommendations: RecommendationConfig {
                high_bandwidth_threshold_bytes: 5 * 1024 * 1024,
            },
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> std::path::PathBuf {
        directories::ProjectDirs::from("", "", "netmeter")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| std::path::PathBuf::from("config.toml"))
    }
}

//! # Configuration Management Module
//!
//! Growquest reads a single TOML file. Every section is optional and falls back
//! to the defaults below, which are the platform's published game rules.
//!
//! - [`StorageConfig`] - sled data directory and optional catalog file
//! - [`LoggingConfig`] - log level and optional log file
//! - [`PetConfig`] - pet care bonuses and run-away threshold
//! - [`ProgressionConfig`] - experience per level and grade thresholds
//! - [`RealtimeConfig`] - realtime session limits
//!
//! ## Usage
//!
//! ```rust,no_run
//! use growquest::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("Data dir: {}", config.storage.data_dir);
//!     Config::create_default("config.toml").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [storage]
//! data_dir = "./data"
//! catalog_file = "./data/seeds/catalog.json"
//!
//! [pet]
//! feed_bonus = 30
//! run_away_days = 14
//!
//! [progression]
//! xp_per_level = 1000
//! passing_grade = 60
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// JSON catalog; the built-in starter catalog is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_file: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            catalog_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some("growquest.log".to_string()),
        }
    }
}

/// Pet vitality rules. Stats live in `0..=max_stat`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PetConfig {
    pub feed_bonus: u32,
    pub water_bonus: u32,
    pub play_bonus: u32,
    pub max_stat: u32,
    pub initial_stat: u32,
    /// Days without any care action after which the pet runs away.
    pub run_away_days: i64,
}

impl Default for PetConfig {
    fn default() -> Self {
        Self {
            feed_bonus: 30,
            water_bonus: 30,
            play_bonus: 20,
            max_stat: 100,
            initial_stat: 100,
            run_away_days: 14,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProgressionConfig {
    pub xp_per_level: u64,
    /// Grades at or above this are accepted and award experience.
    pub passing_grade: u8,
    pub perfect_grade: u8,
    pub high_average: f64,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            xp_per_level: 1000,
            passing_grade: 60,
            perfect_grade: 90,
            high_average: 85.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Joined sessions kept per user room; the oldest is evicted past this.
    pub max_sessions_per_user: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            max_sessions_per_user: 8,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub pet: PetConfig,
    #[serde(default)]
    pub progression: ProgressionConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;
        let config = Self::from_toml(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;
        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.progression.xp_per_level == 0 {
            return Err(anyhow!("progression.xp_per_level must be positive"));
        }
        if self.progression.passing_grade > 100 || self.progression.perfect_grade > 100 {
            return Err(anyhow!("grade thresholds must be within 0..=100"));
        }
        if self.pet.initial_stat > self.pet.max_stat {
            return Err(anyhow!("pet.initial_stat exceeds pet.max_stat"));
        }
        if self.pet.run_away_days <= 0 {
            return Err(anyhow!("pet.run_away_days must be positive"));
        }
        Ok(())
    }
}

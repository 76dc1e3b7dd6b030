use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::block::MAX_DIFFICULTY;

/// Environment variable overriding the mining difficulty
pub const DIFFICULTY_VAR: &str = "LEDGER_DIFFICULTY";

/// Environment variable overriding the mining reward
pub const MINING_REWARD_VAR: &str = "LEDGER_MINING_REWARD";

/// Errors raised while building or checking a ledger configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Unparsable { key: String, value: String },

    #[error("Difficulty {0} exceeds the maximum of 64")]
    DifficultyTooHigh(usize),

    #[error("Mining reward must be finite and non-negative, got {0}")]
    InvalidReward(f64),
}

/// Parameters of a ledger instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Leading zero hex digits required of a mined block hash
    pub difficulty: usize,

    /// Amount paid to the miner of each block
    pub mining_reward: f64,

    /// Timestamp of the fixed genesis block
    pub genesis_timestamp: DateTime<Utc>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            difficulty: 2,
            mining_reward: 100.0,
            genesis_timestamp: default_genesis_timestamp(),
        }
    }
}

fn default_genesis_timestamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

impl LedgerConfig {
    pub fn with_difficulty(mut self, difficulty: usize) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_mining_reward(mut self, mining_reward: f64) -> Self {
        self.mining_reward = mining_reward;
        self
    }

    /// Builds a configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from `lookup`, falling back to defaults for
    /// missing keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = LedgerConfig::default();

        if let Some(value) = lookup(DIFFICULTY_VAR) {
            config.difficulty = value.trim().parse().map_err(|_| ConfigError::Unparsable {
                key: DIFFICULTY_VAR.to_string(),
                value: value.clone(),
            })?;
        }

        if let Some(value) = lookup(MINING_REWARD_VAR) {
            config.mining_reward = value.trim().parse().map_err(|_| ConfigError::Unparsable {
                key: MINING_REWARD_VAR.to_string(),
                value: value.clone(),
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(ConfigError::DifficultyTooHigh(self.difficulty));
        }

        if !self.mining_reward.is_finite() || self.mining_reward < 0.0 {
            return Err(ConfigError::InvalidReward(self.mining_reward));
        }

        Ok(())
    }
}

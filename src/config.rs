//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every section has defaults, so a partial file (or none at all) still
//! yields a playable game.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::engine::history::DEFAULT_HISTORY_CAPACITY;
use crate::engine::round::EngineConfig;
use crate::types::StakeRequest;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub autopilot: AutopilotConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GameConfig {
    pub name: String,
    pub initial_balance: Decimal,
    pub tick_interval_ms: u64,
    pub cooldown_secs: u64,
    pub history_capacity: usize,
    /// Stake used by slots that do not name their own amount.
    pub default_stake: Decimal,
    /// Seed for the crash-point generator. Unset draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            name: "HUMAN FLY".to_string(),
            initial_balance: dec!(1000.00),
            tick_interval_ms: 50,
            cooldown_secs: 3,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            default_stake: dec!(10),
            seed: None,
        }
    }
}

impl GameConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            tick_interval: Duration::from_millis(self.tick_interval_ms.max(1)),
            cooldown: Duration::from_secs(self.cooldown_secs),
            history_capacity: self.history_capacity,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 3000,
        }
    }
}

/// Unattended play: start a round with these stakes whenever idle.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AutopilotConfig {
    pub enabled: bool,
    /// Falls back to `[game] default_stake` when unset.
    pub stake_one: Option<Decimal>,
    pub auto_cash_out_one: Option<Decimal>,
    pub stake_two: Decimal,
    pub auto_cash_out_two: Option<Decimal>,
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            stake_one: None,
            auto_cash_out_one: Some(dec!(2.0)),
            stake_two: Decimal::ZERO,
            auto_cash_out_two: None,
        }
    }
}

impl AutopilotConfig {
    pub fn stakes(&self) -> (StakeRequest, StakeRequest) {
        (
            StakeRequest::new(self.stake_one.unwrap_or_default(), self.auto_cash_out_one),
            StakeRequest::new(self.stake_two, self.auto_cash_out_two),
        )
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            game: GameConfig::default(),
            dashboard: DashboardConfig::default(),
            autopilot: AutopilotConfig::default(),
        }
        .with_fallbacks()
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config.with_fallbacks())
    }

    /// Fill keys that default to another section's value.
    fn with_fallbacks(mut self) -> Self {
        self.autopilot.stake_one.get_or_insert(self.game.default_stake);
        self
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            warn!(path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }
}

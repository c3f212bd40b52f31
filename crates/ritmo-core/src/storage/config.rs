//! TOML-based engine configuration.
//!
//! Stores the tunable award and ledger parameters plus the local CLI
//! profile. Configuration is stored at `~/.config/ritmo/config.toml`.
//! The level-threshold curve is deliberately NOT configurable; it is a
//! cross-user contract fixed in the xp module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::ConfigError;
use crate::habit::UserId;

/// XP award configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XpConfig {
    #[serde(default = "default_base_xp")]
    pub base_xp: u32,
    #[serde(default = "default_streak_bonus_per_day")]
    pub streak_bonus_per_day: u32,
    #[serde(default = "default_streak_bonus_cap")]
    pub streak_bonus_cap: u32,
    #[serde(default = "default_first_completion_multiplier")]
    pub first_completion_multiplier: f64,
    #[serde(default = "default_perfect_day_multiplier")]
    pub perfect_day_multiplier: f64,
}

impl Default for XpConfig {
    fn default() -> Self {
        Self {
            base_xp: default_base_xp(),
            streak_bonus_per_day: default_streak_bonus_per_day(),
            streak_bonus_cap: default_streak_bonus_cap(),
            first_completion_multiplier: default_first_completion_multiplier(),
            perfect_day_multiplier: default_perfect_day_multiplier(),
        }
    }
}

/// Forgiveness ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgivenessConfig {
    /// Hard cap on a user's token balance.
    #[serde(default = "default_token_cap")]
    pub token_cap: u8,
    /// How many spends one user may perform per zoned day.
    #[serde(default = "default_daily_spend_cap")]
    pub daily_spend_cap: u32,
    /// How far back (in zoned days) a spend may target.
    #[serde(default = "default_window_days")]
    pub window_days: i64,
}

impl Default for ForgivenessConfig {
    fn default() -> Self {
        Self {
            token_cap: default_token_cap(),
            daily_spend_cap: default_daily_spend_cap(),
            window_days: default_window_days(),
        }
    }
}

/// Local CLI profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// User the CLI acts as.
    #[serde(default)]
    pub default_user: Option<UserId>,
    /// Fallback IANA zone for new users.
    #[serde(default)]
    pub default_timezone: Option<String>,
}

/// Engine configuration.
///
/// Serialized to/from TOML at `~/.config/ritmo/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub xp: XpConfig,
    #[serde(default)]
    pub forgiveness: ForgivenessConfig,
    #[serde(default)]
    pub profile: ProfileConfig,
}

impl EngineConfig {
    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load the configuration, falling back to defaults when the file
    /// does not exist yet.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::LoadFailed {
            path,
            message: e.to_string(),
        })
    }

    /// Persist the configuration.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let raw = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, raw).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }
}

fn default_base_xp() -> u32 {
    10
}

fn default_streak_bonus_per_day() -> u32 {
    2
}

fn default_streak_bonus_cap() -> u32 {
    50
}

fn default_first_completion_multiplier() -> f64 {
    1.5
}

fn default_perfect_day_multiplier() -> f64 {
    1.2
}

fn default_token_cap() -> u8 {
    3
}

fn default_daily_spend_cap() -> u32 {
    2
}

fn default_window_days() -> i64 {
    2
}

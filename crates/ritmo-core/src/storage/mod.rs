mod config;
pub mod database;

pub use config::{EngineConfig, ForgivenessConfig, ProfileConfig, XpConfig};
pub use database::SqliteRepository;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/ritmo[-dev]/` based on RITMO_ENV.
///
/// Set RITMO_ENV=dev to use a separate development data directory.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("RITMO_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("ritmo-dev")
    } else {
        base_dir.join("ritmo")
    };

    std::fs::create_dir_all(&dir).map_err(|_| ConfigError::NoDataDir)?;
    Ok(dir)
}

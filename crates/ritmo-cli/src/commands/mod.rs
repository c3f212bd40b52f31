pub mod forgive;
pub mod habit;
pub mod profile;
pub mod track;
pub mod user;

use std::sync::Arc;

use ritmo_core::{CompletionProcessor, EngineConfig, SqliteRepository, UserId};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Open the durable store and build a processor over it.
pub fn processor() -> Result<CompletionProcessor, Box<dyn std::error::Error>> {
    let repo = Arc::new(SqliteRepository::open()?);
    let config = EngineConfig::load()?;
    Ok(CompletionProcessor::new(repo, config))
}

/// The user the CLI acts as, from `ritmo user init`.
pub fn default_user() -> Result<UserId, Box<dyn std::error::Error>> {
    EngineConfig::load()?
        .profile
        .default_user
        .ok_or_else(|| "no local user; run `ritmo user init --timezone <zone>` first".into())
}

/// Print a value as pretty JSON.
pub fn emit<T: serde::Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

use clap::Subcommand;

use super::{default_user, emit, processor, CliResult};

#[derive(Subcommand)]
pub enum ProfileAction {
    /// Level, XP, and token overview
    Show,
}

pub fn run(action: ProfileAction) -> CliResult {
    match action {
        ProfileAction::Show => {
            let processor = processor()?;
            let (user, level) = processor.progress(default_user()?)?;
            emit(&serde_json::json!({
                "user": user,
                "level": level,
            }))
        }
    }
}

use clap::Subcommand;
use ritmo_core::EngineConfig;

use super::{emit, processor, CliResult};

#[derive(Subcommand)]
pub enum UserAction {
    /// Create the local user profile
    Init {
        /// IANA zone id, e.g. Europe/Oslo
        #[arg(long)]
        timezone: String,
    },
    /// Show the local user profile
    Show,
}

pub fn run(action: UserAction) -> CliResult {
    match action {
        UserAction::Init { timezone } => {
            let processor = processor()?;
            let user = processor.create_user(&timezone)?;
            let mut config = EngineConfig::load()?;
            config.profile.default_user = Some(user.id);
            config.profile.default_timezone = Some(timezone);
            config.save()?;
            emit(&user)
        }
        UserAction::Show => {
            let processor = processor()?;
            let (user, _) = processor.progress(super::default_user()?)?;
            emit(&user)
        }
    }
}

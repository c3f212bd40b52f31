use chrono::{NaiveDate, Utc};
use clap::Subcommand;
use ritmo_core::HabitId;

use super::{default_user, emit, processor, CliResult};

#[derive(Subcommand)]
pub enum ForgiveAction {
    /// Spend a token to mark a missed day completed
    Spend {
        id: HabitId,
        /// The missed date (YYYY-MM-DD), yesterday or the day before
        date: NaiveDate,
    },
    /// Current token balance
    Balance,
    /// Run the daily grant for every known user
    GrantRun,
}

pub fn run(action: ForgiveAction) -> CliResult {
    let processor = processor()?;
    match action {
        ForgiveAction::Spend { id, date } => {
            let outcome = processor.spend_forgiveness(default_user()?, id, date)?;
            emit(&outcome)
        }
        ForgiveAction::Balance => {
            let (user, _) = processor.progress(default_user()?)?;
            emit(&serde_json::json!({
                "forgiveness_tokens": user.forgiveness_tokens,
            }))
        }
        ForgiveAction::GrantRun => {
            let users = processor.known_users()?;
            let summary = processor.run_grant_job(&users, Utc::now());
            emit(&summary)
        }
    }
}

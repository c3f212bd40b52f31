use clap::Subcommand;
use ritmo_core::HabitId;

use super::{default_user, emit, processor, CliResult};

#[derive(Subcommand)]
pub enum TrackAction {
    /// Record a completion for a habit
    Complete {
        id: HabitId,
        /// IANA zone the device is in, if different from the profile
        #[arg(long)]
        zone: Option<String>,
    },
    /// Revert today's completion
    Uncomplete { id: HabitId },
    /// Current day state and eligibility for a habit
    Status { id: HabitId },
    /// Streak snapshot for a habit
    Streak { id: HabitId },
}

pub fn run(action: TrackAction) -> CliResult {
    let processor = processor()?;
    let user = default_user()?;
    match action {
        TrackAction::Complete { id, zone } => {
            let outcome = processor.complete_habit(user, id, zone.as_deref())?;
            emit(&outcome)
        }
        TrackAction::Uncomplete { id } => {
            let outcome = processor.uncomplete_habit(user, id)?;
            emit(&outcome)
        }
        TrackAction::Status { id } => {
            let state = processor.habit_day_state(user, id)?;
            let decision = processor.check_completion(user, id)?;
            emit(&serde_json::json!({
                "day_state": state,
                "eligibility": decision,
            }))
        }
        TrackAction::Streak { id } => {
            let streak = processor.habit_streak(user, id)?;
            emit(&streak)
        }
    }
}

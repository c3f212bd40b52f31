use std::collections::BTreeSet;

use clap::Subcommand;
use ritmo_core::{Frequency, HabitId};

use super::{default_user, emit, processor, CliResult};

#[derive(Subcommand)]
pub enum HabitAction {
    /// Add a habit
    Add {
        name: String,
        /// daily, weekly, or custom
        #[arg(long, default_value = "daily")]
        frequency: String,
        /// For custom: comma-separated weekdays (sun,mon,... or 0-6)
        #[arg(long)]
        days: Option<String>,
    },
    /// List all habits
    List,
    /// Deactivate a habit, keeping its history
    Deactivate { id: HabitId },
}

pub fn run(action: HabitAction) -> CliResult {
    let processor = processor()?;
    let user = default_user()?;
    match action {
        HabitAction::Add {
            name,
            frequency,
            days,
        } => {
            let frequency = parse_frequency(&frequency, days.as_deref())?;
            let habit = processor.create_habit(user, &name, frequency)?;
            emit(&habit)
        }
        HabitAction::List => {
            let habits = processor.habits(user)?;
            emit(&habits)
        }
        HabitAction::Deactivate { id } => {
            let habit = processor.deactivate_habit(user, id)?;
            emit(&habit)
        }
    }
}

fn parse_frequency(
    frequency: &str,
    days: Option<&str>,
) -> Result<Frequency, Box<dyn std::error::Error>> {
    match frequency {
        "daily" => Ok(Frequency::Daily),
        "weekly" => Ok(Frequency::Weekly),
        "custom" => {
            let raw = days.ok_or("custom frequency requires --days")?;
            let days: BTreeSet<u8> = raw
                .split(',')
                .map(parse_weekday)
                .collect::<Result<_, _>>()?;
            Ok(Frequency::Custom { days })
        }
        other => Err(format!("unknown frequency '{other}'").into()),
    }
}

fn parse_weekday(token: &str) -> Result<u8, Box<dyn std::error::Error>> {
    let token = token.trim().to_ascii_lowercase();
    let day = match token.as_str() {
        "sun" | "sunday" => 0,
        "mon" | "monday" => 1,
        "tue" | "tuesday" => 2,
        "wed" | "wednesday" => 3,
        "thu" | "thursday" => 4,
        "fri" | "friday" => 5,
        "sat" | "saturday" => 6,
        other => other
            .parse::<u8>()
            .map_err(|_| format!("unknown weekday '{other}'"))?,
    };
    Ok(day)
}

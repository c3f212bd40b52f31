use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "ritmo", version, about = "Ritmo habit tracker CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Local user profile
    User {
        #[command(subcommand)]
        action: commands::user::UserAction,
    },
    /// Habit management
    Habit {
        #[command(subcommand)]
        action: commands::habit::HabitAction,
    },
    /// Completion tracking
    Track {
        #[command(subcommand)]
        action: commands::track::TrackAction,
    },
    /// Forgiveness token ledger
    Forgive {
        #[command(subcommand)]
        action: commands::forgive::ForgiveAction,
    },
    /// Level and XP overview
    Profile {
        #[command(subcommand)]
        action: commands::profile::ProfileAction,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::User { action } => commands::user::run(action),
        Commands::Habit { action } => commands::habit::run(action),
        Commands::Track { action } => commands::track::run(action),
        Commands::Forgive { action } => commands::forgive::run(action),
        Commands::Profile { action } => commands::profile::run(action),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod session;

use commands::{BoardCommand, ColumnCommand, ConfigCommand, ProfileCommand, TaskCommand};
use config::Config;
use session::LocalSession;

#[derive(Parser)]
#[command(name = "kanban")]
#[command(version)]
#[command(about = "A personal kanban board in the terminal", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the board
    Board(BoardCommand),

    /// Manage columns
    Column(ColumnCommand),

    /// Manage tasks
    Task(TaskCommand),

    /// Show or update your profile
    Profile(ProfileCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kanban=warn,kanban_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_config_path);
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Config(cmd)) => {
            cmd.run(&config, &config_path)?;
        }
        Some(command) => {
            let session = LocalSession::open(&config)?;
            let result = execute_command(command, &session);
            // Persist whatever was written before a failure
            session.close()?;
            result?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}

fn execute_command(
    command: Commands,
    session: &LocalSession,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Board(cmd) => cmd.run(session),
        Commands::Column(cmd) => cmd.run(session),
        Commands::Task(cmd) => cmd.run(session),
        Commands::Profile(cmd) => cmd.run(session),
        Commands::Config(_) => Ok(()),
    }
}

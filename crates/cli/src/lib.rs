pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "signoff",
    about = "Signoff operator CLI",
    long_about = "Inspect Signoff configuration, run readiness checks, and list configured audit log destinations.",
    after_help = "Examples:\n  signoff doctor --json\n  signoff config show\n  signoff destinations list"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    #[command(
        about = "Run readiness checks for config, Slack tokens, the destination store, and the data directory"
    )]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Operate the per-workspace audit log destination mapping")]
    Destinations {
        #[command(subcommand)]
        action: DestinationsAction,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    #[command(about = "Print the effective configuration with per-field sources")]
    Show {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Validate the configuration and report the first problem found")]
    Validate,
}

#[derive(Debug, Subcommand)]
enum DestinationsAction {
    #[command(about = "List configured team-to-channel logging destinations")]
    List {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config { action: ConfigAction::Show { json } } => commands::config::show(json),
        Command::Config { action: ConfigAction::Validate } => commands::config::validate(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Destinations { action: DestinationsAction::List { json } } => {
            commands::destinations::list(json)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

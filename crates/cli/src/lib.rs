pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "jobwire",
    about = "Jobwire operator CLI",
    long_about = "Inspect jobwire configuration, check Slack readiness, and run the start workflow by hand.",
    after_help = "Examples:\n  jobwire doctor --json\n  jobwire config\n  jobwire start --channel C0123456"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Post the initial contents form and invite the team for one channel")]
    Start {
        #[arg(long, help = "Slack channel id to run the workflow for")]
        channel: String,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config and check the Slack bot token against auth.test")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Start { channel } => commands::start::run(&channel),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

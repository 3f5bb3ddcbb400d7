//! CLI entry point for MIA.
//!
//! This binary provides the `mia` command: an interactive session by
//! default, plus one-shot `run`, autonomous `plan`, catalog inspection with
//! `intents`, and `status`.

mod cli;
mod commands;
mod confirm;
mod helpers;
mod repl;
mod runtime;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use mia_agent::Settings;

use crate::cli::{Cli, Commands};
use crate::helpers::init_tracing;
use crate::runtime::{Runtime, apply_overrides};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("  Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    // A missing .env is fine; a broken one is not.
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(e) if e.not_found() => {}
        Err(e) => return Err(e).context("failed to load .env"),
    }

    let mut settings =
        Settings::load(cli.global.config.as_deref()).context("failed to load configuration")?;
    apply_overrides(&mut settings, &cli.global);

    let command = cli.command.unwrap_or(Commands::Chat);
    let default_level = match command {
        Commands::Status | Commands::Intents { .. } => "warn",
        _ => "info",
    };
    init_tracing(&settings, default_level)?;

    match command {
        Commands::Status => commands::cmd_status(&settings).await,
        Commands::Intents { check } => commands::cmd_intents(&settings, check).await,
        Commands::Chat => {
            let runtime = Runtime::build(settings).await?;
            repl::cmd_chat(&runtime).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run { utterance } => {
            let runtime = Runtime::build(settings).await?;
            commands::cmd_run(&runtime, &utterance).await
        }
        Commands::Plan {
            goal,
            allow,
            steps,
            confirm,
        } => {
            let runtime = Runtime::build(settings).await?;
            commands::cmd_plan(&runtime, &goal, &allow, steps, confirm).await
        }
    }
}

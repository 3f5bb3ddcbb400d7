//! CLI argument definitions for MIA.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use mia_agent::EngineChoice;

/// MIA -- turns plain-language requests into confirmed system actions.
#[derive(Parser, Debug)]
#[command(
    name = "mia",
    version,
    about = "MIA -- natural-language system action adapter",
    long_about = "Resolves what you type against a catalog of intents, shows the command \
                  it would run, and runs it only after you confirm."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Defaults to `chat`.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Flags accepted by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Config file (default: config/mia.toml when present).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Intent catalog directory or file.
    #[arg(long, global = true, value_name = "DIR")]
    pub intents: Option<PathBuf>,

    /// Language-model backend.
    #[arg(long, global = true, value_parser = parse_engine)]
    pub engine: Option<EngineChoice>,

    /// Approve every command without asking.
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Interactive session (the default).
    Chat,

    /// Handle one request, then exit with the command's status.
    Run {
        /// The request, e.g. `mia run create a folder called demo`.
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        utterance: Vec<String>,
    },

    /// Work toward a goal with the autonomous planner.
    Plan {
        /// What to achieve.
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        goal: Vec<String>,

        /// Intents the planner may use (default: the catalog's safe intents).
        #[arg(long, num_args = 1..)]
        allow: Vec<String>,

        /// Step budget.
        #[arg(long, default_value_t = mia_intent::DEFAULT_MAX_STEPS)]
        steps: usize,

        /// Ask before each action instead of acting on its own.
        #[arg(long)]
        confirm: bool,
    },

    /// List the intent catalog.
    Intents {
        /// Validate the catalog and its plugin references, then exit.
        #[arg(long)]
        check: bool,
    },

    /// Show configuration, backend availability, and adapter health.
    Status,
}

fn parse_engine(s: &str) -> Result<EngineChoice, String> {
    s.parse().map_err(|e: mia_agent::AgentError| e.to_string())
}

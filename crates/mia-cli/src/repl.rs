//! Subcommand: `mia chat` -- interactive session.
//!
//! One utterance is resolved, confirmed and executed to completion before
//! the next prompt.  Lines starting with `:` are session commands.

use std::io::{self, Write as _};

use anyhow::Result;
use mia_intent::Pipeline;
use tracing::info;

use crate::helpers::{format_turn, indent};
use crate::runtime::Runtime;

/// What the REPL does with one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplInput<'a> {
    Empty,
    Quit,
    Reload,
    Memory,
    Help,
    UnknownCommand(&'a str),
    Utterance(&'a str),
}

pub fn classify(line: &str) -> ReplInput<'_> {
    let trimmed = line.trim();
    match trimmed {
        "" => ReplInput::Empty,
        "quit" | "exit" | ":quit" | ":q" => ReplInput::Quit,
        ":reload" => ReplInput::Reload,
        ":memory" => ReplInput::Memory,
        ":help" | "help" => ReplInput::Help,
        other if other.starts_with(':') => ReplInput::UnknownCommand(other),
        other => ReplInput::Utterance(other),
    }
}

const HELP: &str = "\
  Type a request in plain English, e.g. `create a folder called demo`.
  Every command is shown before it runs.

  :reload   reload the intent catalog
  :memory   show what this session remembers
  :help     this text
  quit      leave";

/// Run the interactive REPL.
pub async fn cmd_chat(runtime: &Runtime) -> Result<()> {
    let mut pipeline = runtime.pipeline();

    println!();
    println!("  MIA v{}", env!("CARGO_PKG_VERSION"));
    println!("  Engine: {} ({})", runtime.settings.engine, runtime.backends.names().join(", "));
    println!(
        "  Intents: {} from {}",
        runtime.catalog.snapshot().len(),
        runtime.catalog.source().describe()
    );
    println!("  Confirmation: {:?}", runtime.settings.confirmation);
    println!("  Type your request, ':help' for help, or 'quit' to exit.");
    println!();

    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n  Interrupted. Goodbye!");
            std::process::exit(130);
        }
    });

    let stdin = io::stdin();
    let mut line_buf = String::new();

    loop {
        print!("mia> ");
        io::stdout().flush().ok();

        line_buf.clear();
        match stdin.read_line(&mut line_buf) {
            Ok(0) => {
                println!();
                info!("EOF received, exiting");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("  Error reading input: {e}");
                continue;
            }
        }

        match classify(&line_buf) {
            ReplInput::Empty => continue,
            ReplInput::Quit => {
                info!("user requested exit");
                break;
            }
            ReplInput::Help => println!("{HELP}"),
            ReplInput::Reload => match pipeline.reload() {
                Ok(count) => println!("  Reloaded {count} intents."),
                Err(e) => println!("  Reload failed, keeping the previous catalog: {e}"),
            },
            ReplInput::Memory => println!("{}", memory_view(&pipeline)),
            ReplInput::UnknownCommand(cmd) => {
                println!("  Unknown command `{cmd}`. Try :help.");
            }
            ReplInput::Utterance(text) => {
                let report = pipeline.handle(text).await;
                println!("{}", format_turn(&report));
                println!();
            }
        }
    }

    pipeline.end();
    info!("shutting down");
    Ok(())
}

fn memory_view(pipeline: &Pipeline) -> String {
    let memory = pipeline.memory();
    if memory.is_empty() && memory.summary().is_empty() {
        return "  Nothing yet.".to_owned();
    }
    indent(&memory.to_prompt(memory.len().max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_session_commands() {
        assert_eq!(classify("  \n"), ReplInput::Empty);
        assert_eq!(classify("quit\n"), ReplInput::Quit);
        assert_eq!(classify("exit"), ReplInput::Quit);
        assert_eq!(classify(":reload"), ReplInput::Reload);
        assert_eq!(classify(":memory\n"), ReplInput::Memory);
        assert_eq!(classify(":frobnicate"), ReplInput::UnknownCommand(":frobnicate"));
    }

    #[test]
    fn everything_else_is_an_utterance() {
        assert_eq!(
            classify("  create a folder called demo \n"),
            ReplInput::Utterance("create a folder called demo")
        );
        assert_eq!(classify("quit smoking"), ReplInput::Utterance("quit smoking"));
    }
}

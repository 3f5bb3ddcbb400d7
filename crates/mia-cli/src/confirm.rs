//! Interactive confirmation on the terminal.

use std::io::{self, BufRead, Write as _};

use async_trait::async_trait;
use mia_intent::{Confirmer, ResolvedCommand};
use tracing::warn;

/// Shows the rendered command and asks `Execute? [y/N]` on stdin.
///
/// Anything but `y` / `yes`, including end of input, declines.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinConfirmer;

/// Whether an answer to the prompt means yes.
pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Preview block shown above the prompt.
pub fn format_preview(command: &ResolvedCommand) -> String {
    let mut lines = vec![format!("  [{}]", command.intent())];
    for action in command.actions() {
        lines.push(format!("  $ {}", action.preview()));
    }
    lines.join("\n")
}

#[async_trait]
impl Confirmer for StdinConfirmer {
    async fn confirm(&self, command: &ResolvedCommand) -> bool {
        println!("{}", format_preview(command));
        print!("  Execute? [y/N] ");
        io::stdout().flush().ok();

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(0) => {
                println!();
                false
            }
            Ok(_) => is_yes(&answer),
            Err(e) => {
                warn!(error = %e, "failed to read confirmation");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_explicit_yes_confirms() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("n"));
        assert!(!is_yes("yeah"));
    }
}

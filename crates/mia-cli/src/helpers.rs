//! Shared helper functions used across CLI subcommands.
//!
//! Tracing initialization and terminal rendering of turn and plan results.

use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{Context, Result};
use mia_agent::{Settings, TurnOutcome};
use mia_intent::{PlanReport, TurnReport};
use tracing_subscriber::EnvFilter;

/// Output lines echoed to the terminal before the rest is elided.
const OUTPUT_PREVIEW_LINES: usize = 200;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Pick the filter directive: `RUST_LOG` wins, then the configured level,
/// then `fallback`.
pub fn log_directive(rust_log: Option<&str>, configured: Option<&str>, fallback: &str) -> String {
    rust_log
        .or(configured)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(fallback)
        .to_owned()
}

/// Initialize the tracing subscriber.
///
/// Logs go to `settings.log_file` (appended, no colours) when set so they
/// do not interleave with the REPL, otherwise to stderr.
pub fn init_tracing(settings: &Settings, default_level: &str) -> Result<()> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let directive = log_directive(
        rust_log.as_deref(),
        settings.log_level.as_deref(),
        default_level,
    );
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(default_level));

    match &settings.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .compact()
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact()
                .init();
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Indent every line by two spaces, eliding after [`OUTPUT_PREVIEW_LINES`].
pub fn indent(text: &str) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let mut out: Vec<String> = lines
        .iter()
        .take(OUTPUT_PREVIEW_LINES)
        .map(|l| format!("  {l}"))
        .collect();
    if lines.len() > OUTPUT_PREVIEW_LINES {
        out.push(format!(
            "  ... ({} more lines)",
            lines.len() - OUTPUT_PREVIEW_LINES
        ));
    }
    out.join("\n")
}

/// Human-readable result of one turn.
pub fn format_turn(report: &TurnReport) -> String {
    let mut parts = Vec::new();
    match &report.outcome {
        TurnOutcome::Executed {
            success,
            exit_code,
            output,
        } => {
            if !output.trim().is_empty() {
                parts.push(indent(output));
            }
            if *success {
                parts.push("  Done.".to_owned());
            } else {
                let code = exit_code.map_or_else(|| "?".to_owned(), |c| c.to_string());
                let reason = report
                    .result
                    .as_ref()
                    .and_then(|r| r.error())
                    .map(|e| format!(": {e}"))
                    .unwrap_or_default();
                parts.push(format!("  Failed (exit {code}){reason}"));
            }
        }
        TurnOutcome::Rejected => parts.push("  Cancelled.".to_owned()),
        TurnOutcome::NoMatch { reason } => {
            parts.push(format!("  I don't know how to do that yet ({reason})."));
        }
        TurnOutcome::Failed { error } => parts.push(format!("  Error: {error}")),
    }
    parts.join("\n")
}

/// Plan summary plus a status line.
pub fn format_plan(report: &PlanReport) -> String {
    let status = if report.success() {
        "Plan finished."
    } else {
        "Plan stopped early."
    };
    format!("{}\n  {status}", indent(&report.summary()))
}

#[cfg(test)]
mod tests {
    use mia_intent::StopReason;

    use super::*;

    fn report(outcome: TurnOutcome) -> TurnReport {
        TurnReport {
            utterance: "do it".into(),
            intent: Some("thing".into()),
            source: None,
            preview: Some("echo hi".into()),
            outcome,
            result: None,
        }
    }

    #[test]
    fn rust_log_wins_over_configured_level() {
        assert_eq!(log_directive(Some("debug"), Some("warn"), "info"), "debug");
        assert_eq!(log_directive(None, Some("warn"), "info"), "warn");
        assert_eq!(log_directive(None, None, "info"), "info");
        assert_eq!(log_directive(Some("  "), None, "warn"), "warn");
    }

    #[test]
    fn indent_elides_long_output() {
        let long: String = (0..250).map(|i| format!("{i}\n")).collect();
        let shown = indent(&long);
        assert_eq!(shown.lines().count(), OUTPUT_PREVIEW_LINES + 1);
        assert!(shown.ends_with("... (50 more lines)"));
        assert!(shown.starts_with("  0\n  1"));
    }

    #[test]
    fn executed_turn_shows_output() {
        let text = format_turn(&report(TurnOutcome::Executed {
            success: true,
            exit_code: Some(0),
            output: "hi\n".into(),
        }));
        assert_eq!(text, "  hi\n  Done.");
    }

    #[test]
    fn failed_command_shows_exit_code() {
        let text = format_turn(&report(TurnOutcome::Executed {
            success: false,
            exit_code: Some(2),
            output: String::new(),
        }));
        assert_eq!(text, "  Failed (exit 2)");
    }

    #[test]
    fn no_match_and_rejection() {
        let text = format_turn(&report(TurnOutcome::NoMatch {
            reason: "no intent".into(),
        }));
        assert!(text.contains("don't know how"));
        assert_eq!(format_turn(&report(TurnOutcome::Rejected)), "  Cancelled.");
    }

    #[test]
    fn plan_status_line() {
        let plan = PlanReport {
            goal: "look around".into(),
            allowed: vec!["list_dir".into()],
            steps: vec![],
            stop: StopReason::Finished,
            report: "nothing to do".into(),
        };
        let text = format_plan(&plan);
        assert!(text.contains("  Goal: look around"));
        assert!(text.ends_with("Plan finished."));
    }
}

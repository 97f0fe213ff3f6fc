//! Log command - replay the stored transcript

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use dpib_core::state::keys;
use dpib_core::{ranked_commands, Segment, StateStore};
use std::path::Path;

use super::{load_config, render_segment, Session};

/// Log command arguments
#[derive(Args, Debug)]
pub struct LogArgs {
    /// List only the commands, numbered
    #[arg(long)]
    pub commands: bool,

    /// With --commands, list only the ranked commands from the summary
    #[arg(long, requires = "commands")]
    pub ranked: bool,
}

/// Execute the log command
pub fn execute(args: LogArgs, config_path: Option<&Path>) -> Result<()> {
    let session = Session::open(load_config(config_path)?);
    let segments = session
        .transcript
        .replay()
        .with_context(|| format!("Failed to read {}", session.transcript.path().display()))?;

    if segments.is_empty() {
        println!("No benchmark transcript yet. Start one with `dpibench run`.");
        return Ok(());
    }

    if args.commands {
        let commands = if args.ranked {
            ranked_commands(&segments)
        } else {
            actionable_commands(&segments)
        };
        for (n, command) in commands.iter().enumerate() {
            println!("{:>3}. {}", n + 1, command.green());
        }
    } else {
        for segment in &segments {
            render_segment(segment);
        }
    }

    if session.store.get_bool(keys::RUNNING, false)? {
        eprintln!();
        eprintln!(
            "{}",
            "This benchmark did not finish cleanly. Run `dpibench reset` once reviewed.".yellow()
        );
    }

    Ok(())
}

/// Text of every actionable segment, in transcript order
fn actionable_commands(segments: &[Segment]) -> Vec<String> {
    segments
        .iter()
        .filter(|s| s.actionable)
        .map(|s| s.text.trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actionable_commands() {
        let segments = vec![
            Segment::plain("--- host ---\n\n"),
            Segment::actionable("-s1 -q1\n"),
            Segment::plain("1/1 (100%)\n\n"),
            Segment::actionable("-d1\n"),
        ];
        assert_eq!(actionable_commands(&segments), vec!["-s1 -q1", "-d1"]);
    }
}

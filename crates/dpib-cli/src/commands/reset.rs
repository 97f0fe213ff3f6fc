//! Reset command - acknowledge an unfinished benchmark

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::Path;
use tracing::info;

use super::{load_config, Session};

/// Reset command arguments
#[derive(Args, Debug)]
pub struct ResetArgs {
    /// Also clear the stored transcript
    #[arg(long)]
    pub clear_log: bool,
}

/// Execute the reset command
pub fn execute(args: ResetArgs, config_path: Option<&Path>) -> Result<()> {
    let session = Session::open(load_config(config_path)?);
    let orchestrator = session.orchestrator()?;

    if orchestrator
        .acknowledge_crash()
        .context("Failed to clear benchmark marker")?
    {
        println!("{}", "✓ Unfinished benchmark acknowledged, configuration restored".green());
    } else {
        println!("Nothing to reset");
    }

    if args.clear_log {
        session
            .transcript
            .clear()
            .context("Failed to clear transcript")?;
        info!(path = %session.transcript.path().display(), "Transcript cleared");
    }

    Ok(())
}

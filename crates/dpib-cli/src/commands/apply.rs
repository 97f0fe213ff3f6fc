//! Apply command - set the active proxy configuration

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use dpib_core::state::keys;
use dpib_core::{ranked_commands, ProxyControl, StateStore};
use std::path::Path;
use tracing::info;

use super::{load_config, Session};

/// Apply command arguments
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// ByeDPI arguments (prefix with `--` when they start with a dash)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, conflicts_with = "rank")]
    pub args: Vec<String>,

    /// Apply the N-th ranked command of the last benchmark
    #[arg(long, value_name = "N")]
    pub rank: Option<usize>,
}

/// Execute the apply command
pub fn execute(args: ApplyArgs, config_path: Option<&Path>) -> Result<()> {
    let session = Session::open(load_config(config_path)?);
    let proxy = session.proxy();

    if session.store.get_bool(keys::RUNNING, false)? {
        bail!("A benchmark is marked as running; finish it or run `dpibench reset` first");
    }

    let candidate = match args.rank {
        Some(rank) => {
            let ranked = ranked_commands(&session.transcript.replay()?);
            if rank == 0 || rank > ranked.len() {
                bail!("No ranked command #{rank} ({} available)", ranked.len());
            }
            ranked[rank - 1].clone()
        }
        None if args.args.is_empty() => {
            let current = proxy.configuration()?;
            if current.is_empty() {
                println!("No configuration applied");
            } else {
                println!("{current}");
            }
            return Ok(());
        }
        None => args.args.join(" "),
    };

    let launch = session.config.proxy.launch_args(&candidate);
    proxy
        .set_configuration(&launch)
        .context("Failed to store proxy configuration")?;

    info!(args = %launch, "Applied proxy configuration");
    println!("{} {}", "✓ Active configuration:".green(), launch);
    Ok(())
}

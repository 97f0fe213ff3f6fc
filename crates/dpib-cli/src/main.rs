//! dpibench CLI
//!
//! Command-line interface for benchmarking ByeDPI configurations.

mod args;
mod commands;
mod logging;

use anyhow::Result;
use clap::Parser;
use tracing::error;

use args::Args;

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging; the guard flushes the log file on exit
    let _log_guard = logging::init(&args)?;

    if !args.quiet && matches!(args.command, None | Some(commands::Command::Run(_))) {
        print_banner();
    }

    let result = run(args);

    if let Err(ref e) = result {
        error!("Fatal error: {:#}", e);
    }

    result
}

fn run(args: Args) -> Result<()> {
    let config = args.config.as_deref();

    match args.command {
        Some(commands::Command::Run(run_args)) => commands::run::execute(run_args, config),
        Some(commands::Command::Log(log_args)) => commands::log::execute(log_args, config),
        Some(commands::Command::Reset(reset_args)) => commands::reset::execute(reset_args, config),
        Some(commands::Command::Apply(apply_args)) => commands::apply::execute(apply_args, config),
        Some(commands::Command::Config(config_args)) => {
            commands::config::execute(config_args, config)
        }
        Some(commands::Command::Completions { shell }) => {
            commands::write_completions(shell, &mut std::io::stdout());
            Ok(())
        }
        None => commands::run::execute(commands::run::RunArgs::default(), config),
    }
}

fn print_banner() {
    use colored::Colorize;

    eprintln!();
    eprintln!("{}", "╔═══════════════════════════════════════════════════════╗".cyan());
    eprintln!("{}{}{}",
        "║  ".cyan(),
        format!("dpibench v{:<43}", env!("CARGO_PKG_VERSION")).green().bold(),
        "║".cyan()
    );
    eprintln!("{}{}{}",
        "║  ".cyan(),
        "ByeDPI configuration benchmark                       ".white(),
        "║".cyan()
    );
    eprintln!("{}", "╚═══════════════════════════════════════════════════════╝".cyan());
    eprintln!();
}

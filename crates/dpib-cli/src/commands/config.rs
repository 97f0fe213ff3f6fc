//! Config command - configuration management

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use dpib_core::config::{resolve_plan, Config};
use std::path::{Path, PathBuf};
use tracing::info;

use super::{config_search_paths, load_config, state_dir};

/// Config command arguments
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show {
        /// Config file to show (default: detect)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file with all defaults
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "dpibench.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Config file to validate
        file: PathBuf,
    },

    /// Show config and state locations
    Paths,
}

/// Execute config command
pub fn execute(args: ConfigArgs, config_path: Option<&Path>) -> Result<()> {
    match args.action {
        ConfigAction::Show { file } => show_config(file.as_deref().or(config_path)),
        ConfigAction::Generate { output } => generate_config(&output),
        ConfigAction::Validate { file } => validate_config(&file),
        ConfigAction::Paths => show_paths(config_path),
    }
}

fn show_config(file: Option<&Path>) -> Result<()> {
    let config = load_config(file)?;

    let toml_str = config.to_toml().context("Failed to serialize config")?;
    println!("{toml_str}");
    Ok(())
}

fn generate_config(output: &Path) -> Result<()> {
    let toml_str = Config::default()
        .to_toml()
        .context("Failed to serialize config")?;

    let content = format!(
        "# dpibench configuration\n\
         # Every key is optional; omitted keys keep the values shown here\n\n\
         {toml_str}"
    );

    std::fs::write(output, content)
        .with_context(|| format!("Failed to write config to {}", output.display()))?;

    info!(path = %output.display(), "Generated config file");
    println!("Configuration file generated: {}", output.display());

    Ok(())
}

fn validate_config(file: &Path) -> Result<()> {
    let config = Config::load(file)
        .with_context(|| format!("Failed to load config from {}", file.display()))?;

    config
        .validate()
        .context("Configuration validation failed")?;
    let plan = resolve_plan(&config).context("Failed to load target and candidate lists")?;

    println!("✓ Configuration is valid");
    println!("  Proxy: {}:{}", config.proxy.ip, config.proxy.port);
    println!("  Targets: {}", plan.targets.len());
    println!("  Candidates: {}", plan.candidates.len());
    println!("  Requests per target: {}", config.probe.requests_per_target);
    println!("  Generated target: {}", config.benchmark.generate_target);

    Ok(())
}

fn show_paths(config_path: Option<&Path>) -> Result<()> {
    println!("Configuration file search paths:");
    println!();

    for (n, path) in config_search_paths().iter().enumerate() {
        println!("  {}. {}", n + 1, path.display());
    }

    let config = load_config(config_path)?;
    let dir = state_dir(&config);

    println!();
    println!("State directory:");
    println!();
    println!("  {}", dir.display());

    Ok(())
}

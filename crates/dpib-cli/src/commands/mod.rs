//! CLI commands

pub mod apply;
pub mod config;
pub mod log;
pub mod reset;
pub mod run;

use anyhow::{Context, Result};
use clap::{CommandFactory, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use dpib_core::{Config, FileStateStore, Orchestrator, Segment, Transcript};
use dpib_platform::{ProcessProxy, DEFAULT_EXECUTABLE};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::args::Args;

/// File names inside the state directory
const STATE_FILE: &str = "state.json";
const TRANSCRIPT_FILE: &str = "proxy_test.log";

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Benchmark candidate configurations (default)
    Run(run::RunArgs),

    /// Replay the last benchmark transcript
    Log(log::LogArgs),

    /// Acknowledge a benchmark that did not finish cleanly
    Reset(reset::ResetArgs),

    /// Set the active proxy configuration
    Apply(apply::ApplyArgs),

    /// Configuration management
    Config(config::ConfigArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Write the completion script for `shell`
pub(crate) fn write_completions(shell: Shell, out: &mut dyn Write) {
    clap_complete::generate(shell, &mut Args::command(), "dpibench", out);
}

/// Project directories for config and state
pub(crate) fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "dpibench")
}

/// Config file candidates, in lookup order
pub(crate) fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("dpibench.toml")];
    if let Some(dirs) = project_dirs() {
        paths.push(dirs.config_dir().join("config.toml"));
    }
    paths
}

/// First existing config file
pub(crate) fn find_config_file() -> Option<PathBuf> {
    config_search_paths().into_iter().find(|path| path.exists())
}

/// Load `explicit`, else the first discovered file, else defaults
pub(crate) fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file(),
    };

    match path {
        Some(path) => {
            debug!(path = %path.display(), "Loading configuration");
            Config::load(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))
        }
        None => Ok(Config::default()),
    }
}

/// Directory holding the state file and the transcript
pub(crate) fn state_dir(config: &Config) -> PathBuf {
    config
        .storage
        .state_dir
        .clone()
        .or_else(|| project_dirs().map(|dirs| dirs.data_dir().to_path_buf()))
        .unwrap_or_else(|| PathBuf::from(".dpibench"))
}

/// Durable state, transcript and proxy control for one invocation
pub(crate) struct Session {
    pub config: Config,
    pub store: Arc<FileStateStore>,
    pub transcript: Arc<Transcript>,
}

impl Session {
    /// Open the session described by `config`
    pub fn open(config: Config) -> Self {
        let dir = state_dir(&config);
        debug!(dir = %dir.display(), "Using state directory");
        Self {
            store: Arc::new(FileStateStore::new(dir.join(STATE_FILE))),
            transcript: Arc::new(Transcript::new(dir.join(TRANSCRIPT_FILE))),
            config,
        }
    }

    /// Process-backed proxy control
    pub fn proxy(&self) -> Arc<ProcessProxy> {
        let executable = self
            .config
            .proxy
            .executable
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_EXECUTABLE));
        Arc::new(ProcessProxy::new(executable, self.store.clone()))
    }

    /// Orchestrator over this session's proxy, store and transcript
    pub fn orchestrator(&self) -> Result<Orchestrator> {
        Orchestrator::from_config(
            self.config.clone(),
            self.proxy(),
            self.store.clone(),
            Arc::clone(&self.transcript),
        )
        .context("Failed to set up benchmark")
    }
}

/// Print a transcript segment; actionable segments stand out
pub(crate) fn render_segment(segment: &Segment) {
    if segment.actionable {
        print!("{}", segment.text.green().bold());
    } else {
        print!("{}", segment.text);
    }
}

/// Flush live output. Returns false, after logging, when the stream is
/// gone.
pub(crate) fn flush_output(out: &mut dyn Write) -> bool {
    match out.flush() {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, "Failed to flush transcript output");
            false
        }
    }
}

//! Run command - benchmark candidate configurations

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use dpib_core::config::{resolve_plan, Config};
use dpib_core::{Orchestrator, Phase, RunOutcome, RunPlan, RunReport, RunState, Transcript};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{flush_output, load_config, render_segment, Session};

/// Run command arguments
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Target sites, one per line (replaces the built-in list)
    #[arg(long, value_name = "FILE")]
    pub targets: Option<PathBuf>,

    /// Candidate ByeDPI argument strings, one per line
    #[arg(long, value_name = "FILE")]
    pub candidates: Option<PathBuf>,

    /// Requests per target and candidate
    #[arg(short = 'n', long, value_name = "N")]
    pub requests: Option<u32>,

    /// Write a line per target to the transcript
    #[arg(long)]
    pub full_log: bool,

    /// Do not add the generated googlevideo target
    #[arg(long)]
    pub no_generate: bool,

    /// Pause between probing and stopping the proxy
    #[arg(long, value_name = "SECS")]
    pub delay: Option<u64>,

    /// Clear a stale run marker before starting
    #[arg(long)]
    pub acknowledge: bool,
}

impl RunArgs {
    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(ref path) = self.targets {
            config.targets.use_custom = true;
            config.targets.file = Some(path.clone());
        }

        if let Some(ref path) = self.candidates {
            config.candidates.use_custom = true;
            config.candidates.file = Some(path.clone());
        }

        if let Some(requests) = self.requests {
            config.probe.requests_per_target = requests;
        }

        if self.full_log {
            config.probe.full_log = true;
        }

        if self.no_generate {
            config.benchmark.generate_target = false;
        }

        if let Some(delay) = self.delay {
            config.benchmark.settle_delay_secs = delay;
        }
    }
}

/// Execute the run command
pub fn execute(args: RunArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = load_config(config_path)?;
    args.apply(&mut config);
    config
        .validate()
        .context("Configuration validation failed")?;

    let plan = resolve_plan(&config).context("Failed to load target and candidate lists")?;
    if plan.candidates.is_empty() {
        bail!("No candidate configurations to test");
    }
    info!(
        targets = plan.targets.len(),
        candidates = plan.candidates.len(),
        "Loaded benchmark plan"
    );

    let session = Session::open(config);
    let orchestrator = session.orchestrator()?;

    if args.acknowledge && orchestrator.acknowledge_crash()? {
        info!("Cleared marker of unfinished benchmark");
    }

    // Set up signal handler
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal, cancelling benchmark...");
        trigger.cancel();
    })
    .context("Failed to set signal handler")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let report = runtime.block_on(run_benchmark(
        &orchestrator,
        &session.transcript,
        plan,
        cancel,
    ))?;

    report_outcome(&report, &session.transcript)
}

async fn run_benchmark(
    orchestrator: &Orchestrator,
    transcript: &Arc<Transcript>,
    plan: RunPlan,
    cancel: CancellationToken,
) -> Result<RunReport> {
    let mut segments = transcript.subscribe();
    let renderer = tokio::spawn(async move {
        while let Some(segment) = segments.recv().await {
            render_segment(&segment);
            flush_output(&mut std::io::stdout());
        }
    });

    let mut states = orchestrator.subscribe();
    let progress = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            if let RunState::Running {
                index,
                total,
                phase: Phase::Configuring,
            } = state
            {
                eprintln!("{}", format!("[{}/{}]", index + 1, total).dimmed());
            }
        }
    });

    let report = orchestrator.run(plan, cancel).await;

    transcript.unsubscribe();
    if let Err(e) = renderer.await {
        warn!(error = %e, "Transcript renderer stopped unexpectedly");
    }
    progress.abort();

    report.context("Benchmark could not start")
}

fn report_outcome(report: &RunReport, transcript: &Transcript) -> Result<()> {
    match report.outcome {
        RunOutcome::Completed => {
            println!();
            match report.ranked.first() {
                Some(best) => {
                    println!(
                        "{} {} ({}%)",
                        "Best configuration:".green().bold(),
                        best.command,
                        best.percentage
                    );
                    println!("Make it active with: dpibench apply -- {}", best.command);
                }
                None => println!(
                    "{}",
                    "No configuration reached the success threshold".yellow()
                ),
            }
            Ok(())
        }
        RunOutcome::Cancelled => {
            println!();
            println!(
                "{}",
                "Benchmark cancelled, original configuration restored".yellow()
            );
            Ok(())
        }
        RunOutcome::Failed => bail!(
            "Benchmark failed: {}",
            report.error.as_deref().unwrap_or("unknown error")
        ),
        RunOutcome::CrashRecovered => {
            for segment in transcript.replay()? {
                render_segment(&segment);
            }
            println!();
            bail!(
                "The previous benchmark did not finish cleanly. Review the transcript above, \
                 then run `dpibench reset` (or `dpibench run --acknowledge`)"
            )
        }
    }
}

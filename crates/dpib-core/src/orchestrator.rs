//! Benchmark orchestration
//!
//! Drives one run over the candidate list: for each candidate the proxy
//! is reconfigured, started, probed and stopped, strictly one candidate
//! at a time since they all share the one proxy instance.
//!
//! ```text
//! Idle -> Running -> { Completed | Cancelled | Failed }
//!   \-> CrashRecovered   (running-flag already set on entry)
//!
//! Running, per candidate:
//!   Configuring -> AwaitingProxyUp -> Probing -> AwaitingProxyDown
//! ```
//!
//! Whatever way a run leaves `Running`, the configuration that was active
//! before the run is re-applied and the durable running-flag is cleared,
//! once, before [`Orchestrator::run`] returns.

use crate::cancel;
use crate::config::Config;
use crate::domain::{generation_budget, GoogleVideoGenerator, TargetGenerator};
use crate::error::{Error, Result};
use crate::probe::{HttpProber, ProbeEngine, Prober};
use crate::proxy::{LifecycleController, ProxyControl, ProxyStatus};
use crate::state::{keys, StateStore};
use crate::transcript::{Segment, Transcript};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Heading written before the ranked list
pub const SUMMARY_HEADING: &str = "Successful commands:";

/// Targets and candidates for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunPlan {
    /// Hostnames or URLs to probe
    pub targets: Vec<String>,
    /// Candidate argument strings, in evaluation order
    pub candidates: Vec<String>,
}

/// Per-candidate sub-state of a running benchmark
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Applying the candidate's launch string
    Configuring,
    /// Waiting for the proxy to report connected
    AwaitingProxyUp,
    /// Probing all targets
    Probing,
    /// Waiting for the proxy to report disconnected
    AwaitingProxyDown,
}

/// Observable orchestrator state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    /// No run yet, or a crash was acknowledged
    Idle,
    /// A run is in progress
    Running {
        /// Zero-based candidate index
        index: usize,
        /// Number of candidates
        total: usize,
        /// Sub-state for the current candidate
        phase: Phase,
    },
    /// Every candidate was evaluated
    Completed,
    /// Stopped on request
    Cancelled,
    /// Aborted by an unrecoverable error
    Failed(String),
    /// The previous run never finished; its transcript is shown as-is
    CrashRecovered,
}

impl RunState {
    /// Whether the state ends a run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Cancelled | RunState::Failed(_) | RunState::CrashRecovered
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Running { index, total, phase } => {
                write!(f, "running {}/{} ({:?})", index + 1, total, phase)
            }
            RunState::Completed => write!(f, "completed"),
            RunState::Cancelled => write!(f, "cancelled"),
            RunState::Failed(reason) => write!(f, "failed: {reason}"),
            RunState::CrashRecovered => write!(f, "previous run did not finish cleanly"),
        }
    }
}

/// Score of one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateResult {
    /// Candidate argument string
    pub command: String,
    /// Successful probes across all targets
    pub successes: u32,
    /// Probes planned across all targets
    pub attempts: u32,
    /// `floor(100 * successes / attempts)`, 0 when nothing was attempted
    pub percentage: u32,
}

impl CandidateResult {
    /// Score a candidate
    pub fn new(command: impl Into<String>, successes: u32, attempts: u32) -> Self {
        let percentage = if attempts == 0 {
            0
        } else {
            u32::try_from(u64::from(successes) * 100 / u64::from(attempts)).unwrap_or(u32::MAX)
        };
        Self {
            command: command.into(),
            successes,
            attempts,
            percentage,
        }
    }

    /// Whether the candidate reaches `threshold` percent
    pub fn is_successful(&self, threshold: u8) -> bool {
        self.percentage >= u32::from(threshold)
    }
}

/// Keep successful candidates, best first. Ties keep evaluation order.
pub fn rank(results: &[CandidateResult], threshold: u8) -> Vec<CandidateResult> {
    let mut ranked: Vec<CandidateResult> = results
        .iter()
        .filter(|r| r.is_successful(threshold))
        .cloned()
        .collect();
    ranked.sort_by(|a, b| b.percentage.cmp(&a.percentage));
    ranked
}

/// Commands listed in the summary of a replayed transcript, best first.
///
/// Empty when the transcript has no summary (run still going, cancelled,
/// failed or crashed).
pub fn ranked_commands(segments: &[Segment]) -> Vec<String> {
    let Some(start) = segments
        .iter()
        .position(|s| !s.actionable && s.text.contains(SUMMARY_HEADING))
    else {
        return Vec::new();
    };

    segments[start + 1..]
        .iter()
        .filter(|s| s.actionable)
        .map(|s| s.text.trim().to_string())
        .collect()
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every candidate was evaluated
    Completed,
    /// Stopped on request
    Cancelled,
    /// Aborted by an unrecoverable error
    Failed,
    /// Not started: the previous run never finished
    CrashRecovered,
}

/// Result of [`Orchestrator::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Terminal outcome
    pub outcome: RunOutcome,
    /// Successful candidates, best first (completed runs only)
    pub ranked: Vec<CandidateResult>,
    /// Every evaluated candidate in order (completed runs only)
    pub evaluated: Vec<CandidateResult>,
    /// Failure reason
    pub error: Option<String>,
}

impl RunReport {
    fn empty(outcome: RunOutcome) -> Self {
        Self {
            outcome,
            ranked: Vec::new(),
            evaluated: Vec::new(),
            error: None,
        }
    }
}

/// Sequential benchmark state machine
pub struct Orchestrator {
    config: Config,
    proxy: LifecycleController,
    probes: ProbeEngine,
    generator: Option<Arc<dyn TargetGenerator>>,
    store: Arc<dyn StateStore>,
    transcript: Arc<Transcript>,
    state: watch::Sender<RunState>,
    active: AtomicBool,
}

impl Orchestrator {
    /// Create an orchestrator without a target generator
    pub fn new(
        config: Config,
        proxy: Arc<dyn ProxyControl>,
        prober: Arc<dyn Prober>,
        store: Arc<dyn StateStore>,
        transcript: Arc<Transcript>,
    ) -> Self {
        let proxy = LifecycleController::new(proxy, config.proxy.poll_interval());
        let probes = ProbeEngine::new(
            prober,
            proxy.clone(),
            Arc::clone(&transcript),
            config.probe.clone(),
        );
        let (state, _) = watch::channel(RunState::Idle);

        Self {
            config,
            proxy,
            probes,
            generator: None,
            store,
            transcript,
            state,
            active: AtomicBool::new(false),
        }
    }

    /// Create an orchestrator with the HTTP prober and, when enabled,
    /// the googlevideo target generator
    pub fn from_config(
        config: Config,
        proxy: Arc<dyn ProxyControl>,
        store: Arc<dyn StateStore>,
        transcript: Arc<Transcript>,
    ) -> Result<Self> {
        let prober = Arc::new(HttpProber::new(&config.proxy, &config.probe)?);
        let generator = if config.benchmark.generate_target {
            Some(Arc::new(GoogleVideoGenerator::new(&config.generator)?))
        } else {
            None
        };

        let orchestrator = Self::new(config, proxy, prober, store, transcript);
        Ok(match generator {
            Some(generator) => orchestrator.with_generator(generator),
            None => orchestrator,
        })
    }

    /// Use `generator` for the adversarial target
    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn TargetGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Current state
    pub fn state(&self) -> RunState {
        self.state.borrow().clone()
    }

    /// Follow state changes
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Transcript this orchestrator writes to
    pub fn transcript(&self) -> &Arc<Transcript> {
        &self.transcript
    }

    /// Whether the durable running-flag is set
    pub fn previous_run_unfinished(&self) -> Result<bool> {
        self.store.get_bool(keys::RUNNING, false)
    }

    /// Clear a stale running-flag after a crash was reported.
    ///
    /// Re-applies the configuration saved by the unfinished run, if any.
    /// Returns whether there was anything to acknowledge.
    pub fn acknowledge_crash(&self) -> Result<bool> {
        if self.active.load(Ordering::SeqCst) {
            return Err(Error::RunInProgress);
        }
        if !self.previous_run_unfinished()? {
            return Ok(false);
        }

        if let Some(original) = self.store.get_string(keys::ORIGINAL_ARGS)? {
            self.proxy.apply_configuration(&original)?;
            info!(args = %original, "Restored configuration from unfinished run");
        }
        self.store.set_bool(keys::RUNNING, false)?;
        self.set_state(RunState::Idle);
        Ok(true)
    }

    /// Run a benchmark over `plan` until it completes, `cancel` fires, or
    /// an unrecoverable error occurs.
    ///
    /// Returns `Err` only when the run could not be started at all; in
    /// that case nothing was mutated.
    pub async fn run(&self, plan: RunPlan, cancel: CancellationToken) -> Result<RunReport> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(Error::RunInProgress);
        }
        let report = self.run_exclusive(plan, cancel).await;
        self.active.store(false, Ordering::SeqCst);
        report
    }

    async fn run_exclusive(&self, plan: RunPlan, cancel: CancellationToken) -> Result<RunReport> {
        if self.previous_run_unfinished()? {
            warn!("Previous benchmark did not finish cleanly");
            self.set_state(RunState::CrashRecovered);
            return Ok(RunReport::empty(RunOutcome::CrashRecovered));
        }

        let original = self.proxy.configuration()?;
        self.store.set_string(keys::ORIGINAL_ARGS, &original)?;
        self.transcript.clear()?;
        self.store.set_bool(keys::RUNNING, true)?;

        info!(
            candidates = plan.candidates.len(),
            targets = plan.targets.len(),
            "Benchmark started"
        );
        self.set_state(RunState::Running {
            index: 0,
            total: plan.candidates.len(),
            phase: Phase::Configuring,
        });

        let result = match self.execute(&plan, &cancel).await {
            Ok(evaluated) => self.complete(evaluated),
            Err(e) => Err(e),
        };

        let (state, report) = match result {
            Ok(report) => (RunState::Completed, report),
            Err(Error::Cancelled) => {
                info!("Benchmark cancelled");
                self.note("\nBenchmark cancelled\n");
                (RunState::Cancelled, RunReport::empty(RunOutcome::Cancelled))
            }
            Err(e) => {
                error!(error = %e, "Benchmark failed");
                self.note(&format!("\nBenchmark failed: {e}\n"));
                let mut report = RunReport::empty(RunOutcome::Failed);
                report.error = Some(e.to_string());
                (RunState::Failed(e.to_string()), report)
            }
        };

        self.finish(&original).await;
        self.set_state(state);
        Ok(report)
    }

    async fn execute(&self, plan: &RunPlan, cancel: &CancellationToken) -> Result<Vec<CandidateResult>> {
        let mut targets = plan.targets.clone();
        if let Some(host) = self.generate_target(cancel).await? {
            self.transcript.append(&format!("--- {host} ---\n\n"))?;
            targets.push(host);
        }

        let total = plan.candidates.len();
        let mut evaluated = Vec::with_capacity(total);
        for (index, candidate) in plan.candidates.iter().enumerate() {
            evaluated.push(self.evaluate(index, total, candidate, &targets, cancel).await?);
        }
        Ok(evaluated)
    }

    async fn generate_target(&self, cancel: &CancellationToken) -> Result<Option<String>> {
        if !self.config.benchmark.generate_target {
            return Ok(None);
        }
        let Some(generator) = self.generator.as_ref() else {
            return Ok(None);
        };

        let budget = generation_budget(&self.config.generator);
        match tokio::time::timeout(budget, cancel::guard(generator.generate(), cancel)).await {
            Ok(host) => {
                let host = host?;
                if host.is_none() {
                    warn!("No adversarial target available");
                }
                Ok(host)
            }
            Err(_) => {
                warn!(?budget, "Target generation timed out");
                Ok(None)
            }
        }
    }

    #[instrument(skip_all, fields(candidate = %candidate, index = index + 1, total = total))]
    async fn evaluate(
        &self,
        index: usize,
        total: usize,
        candidate: &str,
        targets: &[String],
        cancel: &CancellationToken,
    ) -> Result<CandidateResult> {
        let requests = self.config.probe.requests_per_target;
        let planned = u32::try_from(targets.len())
            .unwrap_or(u32::MAX)
            .saturating_mul(requests);

        self.set_phase(index, total, Phase::Configuring);
        self.proxy
            .apply_configuration(&self.config.proxy.launch_args(candidate))?;
        self.proxy.start().await?;

        self.set_phase(index, total, Phase::AwaitingProxyUp);
        let up = self
            .proxy
            .wait_for_status(ProxyStatus::Connected, self.config.proxy.start_timeout(), cancel)
            .await?;

        if self.config.benchmark.clickable_commands {
            self.transcript.append_actionable(&format!("{candidate}\n"))?;
        } else {
            self.transcript.append(&format!("{candidate}\n"))?;
        }

        let result = if up {
            self.set_phase(index, total, Phase::Probing);
            let probes = self
                .probes
                .probe_all(targets, requests, self.config.probe.full_log, cancel)
                .await?;
            let successes = probes.iter().map(|p| p.successes).sum();
            CandidateResult::new(candidate, successes, planned)
        } else {
            warn!("Proxy did not report connected in time");
            self.transcript.append("Proxy failed to start\n")?;
            CandidateResult::new(candidate, 0, planned)
        };

        info!(
            successes = result.successes,
            attempts = result.attempts,
            percentage = result.percentage,
            "Candidate scored"
        );
        self.transcript.append(&format!(
            "{}/{} ({}%)\n\n",
            result.successes, result.attempts, result.percentage
        ))?;

        cancel::sleep(self.config.benchmark.settle_delay(), cancel).await?;

        self.set_phase(index, total, Phase::AwaitingProxyDown);
        match cancel::guard(self.proxy.stop(), cancel).await? {
            Ok(_) => {
                let down = self
                    .proxy
                    .wait_for_status(ProxyStatus::Disconnected, self.config.proxy.stop_timeout(), cancel)
                    .await?;
                if !down {
                    warn!("Proxy did not report disconnected in time");
                    self.transcript.append("Proxy failed to stop\n\n")?;
                }
            }
            Err(e) => {
                warn!(error = %e, "Proxy stop request failed");
                self.transcript.append(&format!("Proxy failed to stop: {e}\n\n"))?;
            }
        }

        Ok(result)
    }

    fn complete(&self, evaluated: Vec<CandidateResult>) -> Result<RunReport> {
        let ranked = rank(&evaluated, self.config.benchmark.success_threshold);

        self.transcript.append(&format!("{SUMMARY_HEADING}\n\n"))?;
        for (position, result) in ranked.iter().enumerate() {
            self.transcript.append(&format!("{}. ", position + 1))?;
            self.transcript.append_actionable(&format!("{}\n", result.command))?;
            self.transcript.append(&format!("{}%\n\n", result.percentage))?;
        }
        self.transcript
            .append("Apply one of the commands above to make it the active configuration.\n")?;

        info!(successful = ranked.len(), evaluated = evaluated.len(), "Benchmark completed");
        Ok(RunReport {
            outcome: RunOutcome::Completed,
            ranked,
            evaluated,
            error: None,
        })
    }

    /// Terminal cleanup, run exactly once per started run.
    ///
    /// The stop also reaches a proxy that was asked to start but is not
    /// listening yet.
    async fn finish(&self, original: &str) {
        match self.proxy.stop().await {
            Ok(true) => {
                let uncancellable = CancellationToken::new();
                let stopped = self
                    .proxy
                    .wait_for_status(
                        ProxyStatus::Disconnected,
                        self.config.proxy.stop_timeout(),
                        &uncancellable,
                    )
                    .await;
                if !matches!(stopped, Ok(true)) {
                    warn!("Proxy still running after cleanup stop");
                }
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Cleanup stop request failed"),
        }

        match self.proxy.apply_configuration(original) {
            Ok(()) => info!("Original configuration restored"),
            Err(e) => error!(error = %e, "Failed to restore original configuration"),
        }

        if let Err(e) = self.store.set_bool(keys::RUNNING, false) {
            error!(error = %e, "Failed to clear running flag");
        }
    }

    /// Best-effort transcript note on the way out of a run
    fn note(&self, text: &str) {
        if let Err(e) = self.transcript.append(text) {
            warn!(error = %e, "Failed to write transcript");
        }
    }

    fn set_phase(&self, index: usize, total: usize, phase: Phase) {
        self.set_state(RunState::Running { index, total, phase });
    }

    fn set_state(&self, state: RunState) {
        self.state.send_replace(state);
    }
}

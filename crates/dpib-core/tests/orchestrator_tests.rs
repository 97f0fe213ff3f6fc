//! Integration tests for the benchmark orchestrator

use async_trait::async_trait;
use dpib_core::config::Config;
use dpib_core::state::keys;
use dpib_core::transcript::Segment;
use dpib_core::{
    Error, MemoryStateStore, Orchestrator, Prober, ProxyControl, ProxyStatus, Result, RunOutcome,
    RunPlan, RunState, StateStore, Transcript,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const ORIGINAL: &str = "-orig";

/// In-memory proxy that records every request
struct FakeProxy {
    config: Mutex<String>,
    status: Mutex<ProxyStatus>,
    events: Mutex<Vec<String>>,
    /// Status polls left before a requested start reports connected
    starting: Mutex<Option<usize>>,
    never_starts: bool,
    start_delay_polls: usize,
    reject_config: Option<&'static str>,
    reject_start: bool,
    reject_stop: bool,
    ignore_stop: bool,
}

impl FakeProxy {
    fn new() -> Self {
        Self {
            config: Mutex::new(ORIGINAL.to_string()),
            status: Mutex::new(ProxyStatus::Disconnected),
            events: Mutex::new(Vec::new()),
            starting: Mutex::new(None),
            never_starts: false,
            start_delay_polls: 0,
            reject_config: None,
            reject_start: false,
            reject_stop: false,
            ignore_stop: false,
        }
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn applied(&self, suffix: &str) -> bool {
        self.events()
            .iter()
            .any(|e| e.starts_with("set:") && e.ends_with(suffix))
    }
}

impl ProxyControl for FakeProxy {
    fn configuration(&self) -> Result<String> {
        Ok(self.config.lock().clone())
    }

    fn set_configuration(&self, args: &str) -> Result<()> {
        if let Some(rejected) = self.reject_config {
            if args.ends_with(rejected) {
                return Err(Error::proxy("configure", "rejected by proxy"));
            }
        }
        self.events.lock().push(format!("set:{args}"));
        *self.config.lock() = args.to_string();
        Ok(())
    }

    fn request_start(&self) -> Result<()> {
        if self.reject_start {
            return Err(Error::proxy("start", "executable not found"));
        }
        self.events.lock().push("start".to_string());
        if self.never_starts {
            return Ok(());
        }
        if self.start_delay_polls > 0 {
            *self.starting.lock() = Some(self.start_delay_polls);
        } else {
            *self.status.lock() = ProxyStatus::Connected;
        }
        Ok(())
    }

    fn request_stop(&self) -> Result<()> {
        if self.reject_stop {
            return Err(Error::proxy("stop", "permission denied"));
        }
        self.events.lock().push("stop".to_string());
        if !self.ignore_stop {
            *self.starting.lock() = None;
            *self.status.lock() = ProxyStatus::Disconnected;
        }
        Ok(())
    }

    fn status(&self) -> ProxyStatus {
        let mut starting = self.starting.lock();
        if let Some(left) = starting.as_mut() {
            if *left == 0 {
                *starting = None;
                *self.status.lock() = ProxyStatus::Connected;
            } else {
                *left -= 1;
            }
        }
        *self.status.lock()
    }
}

type Behavior = dyn Fn(&str, &str) -> Option<u16> + Send + Sync;

/// Answers according to the configuration currently applied to the proxy
struct FakeProber {
    proxy: Arc<FakeProxy>,
    behavior: Box<Behavior>,
    hang_on: Option<(&'static str, CancellationToken)>,
    observed_flags: Mutex<Vec<bool>>,
    store: Arc<MemoryStateStore>,
}

#[async_trait]
impl Prober for FakeProber {
    async fn fetch(&self, url: &str) -> Result<u16> {
        let config = self.proxy.configuration()?;
        self.observed_flags
            .lock()
            .push(self.store.get_bool(keys::RUNNING, false)?);

        if let Some((suffix, cancel)) = &self.hang_on {
            if config.ends_with(suffix) {
                cancel.cancel();
                std::future::pending::<()>().await;
            }
        }

        (self.behavior)(&config, url).ok_or_else(|| Error::Io(std::io::Error::other("connection reset")))
    }
}

struct Harness {
    _dir: TempDir,
    proxy: Arc<FakeProxy>,
    prober: Arc<FakeProber>,
    store: Arc<MemoryStateStore>,
    transcript: Arc<Transcript>,
    orchestrator: Orchestrator,
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.benchmark.generate_target = false;
    config
}

fn harness_with(
    proxy: FakeProxy,
    behavior: impl Fn(&str, &str) -> Option<u16> + Send + Sync + 'static,
    hang_on: Option<(&'static str, CancellationToken)>,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let proxy = Arc::new(proxy);
    let store = Arc::new(MemoryStateStore::new());
    let transcript = Arc::new(Transcript::new(dir.path().join("proxy_test.log")));
    let prober = Arc::new(FakeProber {
        proxy: Arc::clone(&proxy),
        behavior: Box::new(behavior),
        hang_on,
        observed_flags: Mutex::new(Vec::new()),
        store: Arc::clone(&store),
    });

    let orchestrator = Orchestrator::new(
        test_config(),
        proxy.clone(),
        prober.clone(),
        store.clone(),
        Arc::clone(&transcript),
    );

    Harness {
        _dir: dir,
        proxy,
        prober,
        store,
        transcript,
        orchestrator,
    }
}

fn plan(targets: &[&str], candidates: &[&str]) -> RunPlan {
    RunPlan {
        targets: targets.iter().map(|s| (*s).to_string()).collect(),
        candidates: candidates.iter().map(|s| (*s).to_string()).collect(),
    }
}

fn assert_restored(h: &Harness) {
    assert_eq!(h.proxy.configuration().unwrap(), ORIGINAL);
    assert!(!h.store.get_bool(keys::RUNNING, true).unwrap());
    let restores = h
        .proxy
        .events()
        .iter()
        .filter(|e| *e == &format!("set:{ORIGINAL}"))
        .count();
    assert_eq!(restores, 1, "original configuration restored exactly once");
}

#[tokio::test(start_paused = true)]
async fn test_end_to_end_ranking() {
    let h = harness_with(
        FakeProxy::new(),
        |config, _url| config.ends_with(" --opt-a").then_some(200),
        None,
    );

    let report = h
        .orchestrator
        .run(plan(&["t1", "t2"], &["--opt-a", "--opt-b"]), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.ranked.len(), 1);
    assert_eq!(report.ranked[0].command, "--opt-a");
    assert_eq!(report.ranked[0].percentage, 100);
    assert_eq!(report.evaluated[1].percentage, 0);
    assert_eq!(h.orchestrator.state(), RunState::Completed);

    let raw = h.transcript.read_raw().unwrap();
    let a = raw.find("--opt-a\n2/2 (100%)\n\n").expect("first candidate scored");
    let b = raw.find("--opt-b\n0/2 (0%)\n\n").expect("second candidate scored");
    assert!(a < b);
    assert!(raw.contains("Successful commands:\n\n1. {--opt-a\n}100%\n\n"));

    assert_restored(&h);
}

#[tokio::test(start_paused = true)]
async fn test_launch_string_carries_endpoint() {
    let h = harness_with(FakeProxy::new(), |_, _| Some(200), None);

    h.orchestrator
        .run(plan(&["t1"], &["-s1 -q1"]), CancellationToken::new())
        .await
        .unwrap();

    assert!(h
        .proxy
        .events()
        .contains(&"set:--ip 127.0.0.1 --port 1080 -s1 -q1".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_running_flag_set_during_probes() {
    let h = harness_with(FakeProxy::new(), |_, _| Some(200), None);

    h.orchestrator
        .run(plan(&["t1", "t2"], &["-a", "-b"]), CancellationToken::new())
        .await
        .unwrap();

    let flags = h.prober.observed_flags.lock().clone();
    assert_eq!(flags.len(), 4);
    assert!(flags.iter().all(|f| *f));
    assert_restored(&h);
}

#[tokio::test(start_paused = true)]
async fn test_percentage_floor_and_ranking_threshold() {
    let h = harness_with(
        FakeProxy::new(),
        |_, url| (!url.ends_with("t4")).then_some(200),
        None,
    );

    let report = h
        .orchestrator
        .run(plan(&["t1", "t2", "t3", "t4"], &["-a"]), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.ranked.len(), 1);
    assert_eq!(report.ranked[0].percentage, 75);
    assert!(h.transcript.read_raw().unwrap().contains("3/4 (75%)"));
}

#[tokio::test(start_paused = true)]
async fn test_ties_keep_evaluation_order() {
    let h = harness_with(FakeProxy::new(), |_, _| Some(200), None);

    let report = h
        .orchestrator
        .run(plan(&["t1"], &["-x", "-y", "-z"]), CancellationToken::new())
        .await
        .unwrap();

    let order: Vec<_> = report.ranked.iter().map(|r| r.command.as_str()).collect();
    assert_eq!(order, vec!["-x", "-y", "-z"]);
}

#[tokio::test(start_paused = true)]
async fn test_empty_target_list() {
    let h = harness_with(FakeProxy::new(), |_, _| Some(200), None);

    let report = h
        .orchestrator
        .run(plan(&[], &["-a"]), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.evaluated[0].attempts, 0);
    assert_eq!(report.evaluated[0].percentage, 0);
    assert!(report.ranked.is_empty());
    assert!(h.transcript.read_raw().unwrap().contains("-a\n0/0 (0%)\n\n"));
    assert_restored(&h);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_probe() {
    let cancel = CancellationToken::new();
    let h = harness_with(FakeProxy::new(), |_, _| Some(200), Some((" -b", cancel.clone())));

    let report = h
        .orchestrator
        .run(plan(&["t1"], &["-a", "-b", "-c"]), cancel)
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert!(report.ranked.is_empty());
    assert_eq!(h.orchestrator.state(), RunState::Cancelled);

    assert!(h.proxy.applied(" -b"));
    assert!(!h.proxy.applied(" -c"), "third candidate never configured");
    assert_eq!(h.proxy.status(), ProxyStatus::Disconnected);

    let events = h.proxy.events();
    let stop = events.iter().rposition(|e| e == "stop").unwrap();
    let restore = events.iter().rposition(|e| e == &format!("set:{ORIGINAL}")).unwrap();
    assert!(stop < restore, "proxy stopped before the original configuration is restored");

    let raw = h.transcript.read_raw().unwrap();
    assert!(!raw.contains("Successful commands"));
    assert_restored(&h);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_start() {
    let h = harness_with(FakeProxy::new(), |_, _| Some(200), None);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = h.orchestrator.run(plan(&["t1"], &["-a"]), cancel).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert_restored(&h);
}

#[tokio::test(start_paused = true)]
async fn test_start_timeout_scores_zero() {
    let mut proxy = FakeProxy::new();
    proxy.never_starts = true;
    let h = harness_with(proxy, |_, _| Some(200), None);

    let report = h
        .orchestrator
        .run(plan(&["t1", "t2"], &["-a"]), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.evaluated[0].successes, 0);
    assert_eq!(report.evaluated[0].attempts, 2);
    assert!(h.prober.observed_flags.lock().is_empty());

    let raw = h.transcript.read_raw().unwrap();
    assert!(raw.contains("-a\nProxy failed to start\n0/2 (0%)\n\n"));
    assert_restored(&h);
}

#[tokio::test(start_paused = true)]
async fn test_configuration_error_fails_run() {
    let mut proxy = FakeProxy::new();
    proxy.reject_config = Some(" --bad");
    let h = harness_with(proxy, |_, _| Some(200), None);

    let report = h
        .orchestrator
        .run(plan(&["t1"], &["-a", "--bad", "-c"]), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert!(report.error.is_some());
    assert!(matches!(h.orchestrator.state(), RunState::Failed(_)));
    assert!(!h.proxy.applied(" -c"));

    let raw = h.transcript.read_raw().unwrap();
    assert!(raw.contains("Benchmark failed: "));
    assert!(!raw.contains("Successful commands"));
    assert_restored(&h);
}

#[tokio::test(start_paused = true)]
async fn test_start_request_error_fails_run() {
    let mut proxy = FakeProxy::new();
    proxy.reject_start = true;
    let h = harness_with(proxy, |_, _| Some(200), None);

    let report = h
        .orchestrator
        .run(plan(&["t1"], &["-a", "-b"]), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert!(report.error.unwrap().contains("Proxy start failed"));
    assert!(matches!(h.orchestrator.state(), RunState::Failed(_)));
    assert!(!h.proxy.applied(" -b"), "second candidate never configured");
    assert!(h.prober.observed_flags.lock().is_empty());

    let raw = h.transcript.read_raw().unwrap();
    assert!(raw.contains("Benchmark failed: Proxy start failed"));
    assert!(!raw.contains("Successful commands"));
    assert_restored(&h);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_proxy_is_starting() {
    let mut proxy = FakeProxy::new();
    proxy.start_delay_polls = 5;
    let h = harness_with(proxy, |_, _| Some(200), None);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let report = h.orchestrator.run(plan(&["t1"], &["-a"]), cancel).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert!(h.prober.observed_flags.lock().is_empty(), "no probes before the proxy was up");

    let events = h.proxy.events();
    let stop = events
        .iter()
        .rposition(|e| e == "stop")
        .expect("starting proxy asked to stop");
    let restore = events.iter().rposition(|e| e == &format!("set:{ORIGINAL}")).unwrap();
    assert!(stop < restore);

    // Later polls must not bring it up on the candidate's arguments
    for _ in 0..10 {
        assert_eq!(h.proxy.status(), ProxyStatus::Disconnected);
    }
    assert_restored(&h);
}

#[tokio::test(start_paused = true)]
async fn test_stop_request_error_is_noted_and_run_continues() {
    let mut proxy = FakeProxy::new();
    proxy.reject_stop = true;
    let h = harness_with(proxy, |_, _| Some(200), None);

    let report = h
        .orchestrator
        .run(plan(&["t1"], &["-a", "-b"]), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.evaluated.len(), 2);
    assert!(h.proxy.applied(" -b"));

    let raw = h.transcript.read_raw().unwrap();
    assert!(raw.contains("Proxy failed to stop: Proxy stop failed: permission denied\n\n"));
    assert!(raw.contains("Successful commands"));
    assert_restored(&h);
}

#[tokio::test(start_paused = true)]
async fn test_stop_timeout_is_noted_and_run_continues() {
    let mut proxy = FakeProxy::new();
    proxy.ignore_stop = true;
    let h = harness_with(proxy, |_, _| Some(200), None);

    let report = h
        .orchestrator
        .run(plan(&["t1"], &["-a", "-b"]), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.evaluated.len(), 2);

    let raw = h.transcript.read_raw().unwrap();
    assert_eq!(raw.matches("Proxy failed to stop\n\n").count(), 2);
    assert_restored(&h);
}

#[tokio::test(start_paused = true)]
async fn test_crash_recovery() {
    let h = harness_with(FakeProxy::new(), |_, _| Some(200), None);
    h.store.set_bool(keys::RUNNING, true).unwrap();
    h.store.set_string(keys::ORIGINAL_ARGS, "-before-crash").unwrap();
    h.transcript.append("partial output\n").unwrap();

    let report = h
        .orchestrator
        .run(plan(&["t1"], &["-a"]), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::CrashRecovered);
    assert_eq!(h.orchestrator.state(), RunState::CrashRecovered);
    assert_eq!(h.transcript.read_raw().unwrap(), "partial output\n");
    assert!(h.proxy.events().is_empty());
    assert!(h.store.get_bool(keys::RUNNING, false).unwrap());

    assert!(h.orchestrator.acknowledge_crash().unwrap());
    assert_eq!(h.proxy.configuration().unwrap(), "-before-crash");
    assert!(!h.store.get_bool(keys::RUNNING, true).unwrap());
    assert_eq!(h.orchestrator.state(), RunState::Idle);
    assert!(!h.orchestrator.acknowledge_crash().unwrap());

    let report = h
        .orchestrator
        .run(plan(&["t1"], &["-a"]), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_run_rejected() {
    let h = harness_with(FakeProxy::new(), |_, _| Some(200), None);
    let p = plan(&["t1"], &["-a"]);

    let (first, second) = tokio::join!(
        h.orchestrator.run(p.clone(), CancellationToken::new()),
        h.orchestrator.run(p, CancellationToken::new()),
    );

    assert_eq!(first.unwrap().outcome, RunOutcome::Completed);
    assert!(matches!(second, Err(Error::RunInProgress)));
    assert_restored(&h);
}

#[tokio::test(start_paused = true)]
async fn test_live_segments_and_replay_agree() {
    let h = harness_with(FakeProxy::new(), |_, _| Some(200), None);
    let mut live = h.transcript.subscribe();

    h.orchestrator
        .run(plan(&["t1"], &["-a"]), CancellationToken::new())
        .await
        .unwrap();

    let mut received = Vec::new();
    while let Ok(segment) = live.try_recv() {
        received.push(segment);
    }
    assert!(received.contains(&Segment::actionable("-a\n")));

    let replayed = h.transcript.replay().unwrap();
    let actionable: Vec<_> = replayed.iter().filter(|s| s.actionable).collect();
    assert_eq!(actionable, vec![&Segment::actionable("-a\n")]);
}

#[tokio::test(start_paused = true)]
async fn test_state_transitions_observable() {
    let h = harness_with(FakeProxy::new(), |_, _| Some(200), None);
    let mut states = h.orchestrator.subscribe();
    assert_eq!(*states.borrow(), RunState::Idle);

    h.orchestrator
        .run(plan(&["t1"], &["-a"]), CancellationToken::new())
        .await
        .unwrap();

    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), RunState::Completed);
}

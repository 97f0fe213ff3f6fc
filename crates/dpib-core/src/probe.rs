//! Reachability probes through the running proxy
//!
//! All targets are probed concurrently; attempts against one target are
//! sequential with a short pause between them. A probe succeeds when the
//! far end answers with an accepted HTTP status. Redirects are not
//! followed, so the redirect response itself is the answer.

use crate::cancel;
use crate::config::{ProbeConfig, ProxyConfig};
use crate::error::{Error, Result};
use crate::proxy::LifecycleController;
use crate::transcript::Transcript;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One HTTP GET against a URL
#[async_trait]
pub trait Prober: Send + Sync {
    /// Issue the request and return the response status. Transport
    /// failures (refused, reset, TLS, timeout) are errors.
    async fn fetch(&self, url: &str) -> Result<u16>;
}

/// `reqwest` prober routed through the local SOCKS proxy
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    /// Build a client that sends every request through `proxy`
    pub fn new(proxy: &ProxyConfig, probe: &ProbeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .proxy(reqwest::Proxy::all(proxy.socks_url())?)
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(probe.connect_timeout())
            .timeout(probe.connect_timeout() + probe.read_timeout())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn fetch(&self, url: &str) -> Result<u16> {
        let response = self.client.get(url).send().await?;
        Ok(response.status().as_u16())
    }
}

/// Successes for one target under one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// Target as listed
    pub target: String,
    /// Attempts that got an accepted answer
    pub successes: u32,
    /// Attempts made (or skipped because the proxy was down)
    pub attempts: u32,
}

/// Prefix `https://` unless the target already carries a scheme
pub fn normalize_url(target: &str) -> String {
    if target.starts_with("http://") || target.starts_with("https://") {
        target.to_string()
    } else {
        format!("https://{target}")
    }
}

/// Concurrent prober for a batch of targets
pub struct ProbeEngine {
    prober: Arc<dyn Prober>,
    proxy: LifecycleController,
    transcript: Arc<Transcript>,
    settings: Arc<ProbeConfig>,
}

impl ProbeEngine {
    /// Create an engine. `proxy` is only used to read the status.
    pub fn new(
        prober: Arc<dyn Prober>,
        proxy: LifecycleController,
        transcript: Arc<Transcript>,
        settings: ProbeConfig,
    ) -> Self {
        Self {
            prober,
            proxy,
            transcript,
            settings: Arc::new(settings),
        }
    }

    /// Probe every target `attempts_per_target` times.
    ///
    /// Results come back in target order. With `full_log` each target
    /// also gets a `<target> - <ok>/<attempts>` transcript line as soon
    /// as it finishes. The proxy status is read once for the batch; when
    /// it is down every target scores zero without being contacted.
    pub async fn probe_all(
        &self,
        targets: &[String],
        attempts_per_target: u32,
        full_log: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProbeResult>> {
        let connected = cancel::guard(self.proxy.is_connected(), cancel).await??;
        if !connected {
            debug!(targets = targets.len(), "Proxy not connected, skipping probes");
        }

        let mut tasks = JoinSet::new();

        for (index, target) in targets.iter().enumerate() {
            let prober = Arc::clone(&self.prober);
            let transcript = Arc::clone(&self.transcript);
            let settings = Arc::clone(&self.settings);
            let cancel = cancel.clone();
            let target = target.clone();

            tasks.spawn(async move {
                let successes = if connected {
                    probe_target(
                        prober.as_ref(),
                        &settings,
                        &target,
                        attempts_per_target,
                        &cancel,
                    )
                    .await?
                } else {
                    0
                };

                if full_log {
                    let line = format!("{target} - {successes}/{attempts_per_target}\n");
                    if let Err(e) = transcript.append(&line) {
                        warn!(site = %target, error = %e, "Failed to write transcript");
                    }
                }

                Ok::<_, Error>((
                    index,
                    ProbeResult {
                        target,
                        successes,
                        attempts: attempts_per_target,
                    },
                ))
            });
        }

        let mut results: Vec<Option<ProbeResult>> = vec![None; targets.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok((index, result))) => results[index] = Some(result),
                Ok(Err(e)) => {
                    tasks.abort_all();
                    return Err(e);
                }
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => {
                    tasks.abort_all();
                    return Err(if cancel.is_cancelled() {
                        Error::Cancelled
                    } else {
                        Error::Io(std::io::Error::other(e.to_string()))
                    });
                }
            }
        }

        Ok(results.into_iter().flatten().collect())
    }
}

async fn probe_target(
    prober: &dyn Prober,
    settings: &ProbeConfig,
    target: &str,
    attempts: u32,
    cancel: &CancellationToken,
) -> Result<u32> {
    let url = normalize_url(target);
    let mut successes = 0;

    for attempt in 1..=attempts {
        debug!(site = target, attempt, attempts, "Probing");

        match cancel::guard(prober.fetch(&url), cancel).await? {
            Ok(status) if settings.accepts(status) => {
                successes += 1;
                debug!(site = target, status, "Reachable");
            }
            Ok(status) => debug!(site = target, status, "Unaccepted status"),
            Err(e) => debug!(site = target, error = %e, "Unreachable"),
        }

        cancel::sleep(settings.attempt_delay(), cancel).await?;
    }

    Ok(successes)
}

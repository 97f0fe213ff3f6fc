//! Proxy lifecycle control
//!
//! The proxy engine itself lives outside this crate. It is driven through
//! [`ProxyControl`]: a synchronous configuration/status surface with
//! fire-and-forget start and stop requests. [`LifecycleController`] adds
//! idempotent start/stop and bounded status polling on top, and keeps the
//! potentially blocking status and start/stop calls off the async workers.

use crate::cancel;
use crate::error::{Error, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Connection status reported by the proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyStatus {
    /// Listening and accepting connections
    Connected,
    /// Not running
    Disconnected,
}

impl fmt::Display for ProxyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyStatus::Connected => write!(f, "connected"),
            ProxyStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Control surface of an external proxy engine
///
/// Implemented by platform-specific launchers (child process, service
/// binding, ...). Calls may block briefly.
#[cfg_attr(test, mockall::automock)]
pub trait ProxyControl: Send + Sync {
    /// Argument string the proxy will use on its next start
    fn configuration(&self) -> Result<String>;

    /// Replace the argument string used on the next start
    fn set_configuration(&self, args: &str) -> Result<()>;

    /// Ask the proxy to start. May return before it is listening.
    fn request_start(&self) -> Result<()>;

    /// Ask the proxy to stop. May return before it has exited.
    fn request_stop(&self) -> Result<()>;

    /// Current status
    fn status(&self) -> ProxyStatus;
}

/// Idempotent start/stop and bounded status waits
///
/// Clones share the record of an outstanding start request.
#[derive(Clone)]
pub struct LifecycleController {
    proxy: Arc<dyn ProxyControl>,
    poll_interval: Duration,
    /// A start was issued and no stop has followed it yet
    start_pending: Arc<AtomicBool>,
}

impl LifecycleController {
    /// Wrap a proxy, polling its status every `poll_interval`
    pub fn new(proxy: Arc<dyn ProxyControl>, poll_interval: Duration) -> Self {
        Self {
            proxy,
            poll_interval,
            start_pending: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current proxy status
    pub async fn status(&self) -> Result<ProxyStatus> {
        self.blocking(|proxy| Ok(proxy.status())).await
    }

    /// Whether the proxy currently reports connected
    pub async fn is_connected(&self) -> Result<bool> {
        Ok(self.status().await? == ProxyStatus::Connected)
    }

    /// Whether a start was requested through this controller and not yet
    /// followed by a stop
    pub fn start_pending(&self) -> bool {
        self.start_pending.load(Ordering::SeqCst)
    }

    /// Currently applied configuration
    pub fn configuration(&self) -> Result<String> {
        self.proxy.configuration()
    }

    /// Replace the active configuration
    pub fn apply_configuration(&self, args: &str) -> Result<()> {
        debug!(args, "Applying proxy configuration");
        self.proxy.set_configuration(args)
    }

    /// Request a start unless the proxy is already connected.
    ///
    /// Returns whether a request was issued.
    pub async fn start(&self) -> Result<bool> {
        if self.is_connected().await? {
            debug!("Proxy already connected, start skipped");
            return Ok(false);
        }
        self.start_pending.store(true, Ordering::SeqCst);
        self.blocking(|proxy| proxy.request_start()).await?;
        Ok(true)
    }

    /// Request a stop unless the proxy is already disconnected with no
    /// start of ours still pending.
    ///
    /// A proxy that was asked to start but is not listening yet still
    /// gets the stop request. Returns whether a request was issued.
    pub async fn stop(&self) -> Result<bool> {
        if !self.start_pending() && !self.is_connected().await? {
            debug!("Proxy already disconnected, stop skipped");
            return Ok(false);
        }
        self.blocking(|proxy| proxy.request_stop()).await?;
        self.start_pending.store(false, Ordering::SeqCst);
        Ok(true)
    }

    /// Poll until the proxy reports `want` or `timeout` elapses.
    ///
    /// Returns `Ok(true)` once the status matched (after one more poll
    /// interval to let the proxy settle), `Ok(false)` on timeout, and
    /// `Err(Cancelled)` if `cancel` fires first.
    pub async fn wait_for_status(
        &self,
        want: ProxyStatus,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if cancel::guard(self.status(), cancel).await?? == want {
                info!(status = %want, "Proxy status reached");
                cancel::sleep(self.poll_interval, cancel).await?;
                return Ok(true);
            }

            if tokio::time::Instant::now() >= deadline {
                debug!(status = %want, ?timeout, "Proxy status wait timed out");
                return Ok(false);
            }

            cancel::sleep(self.poll_interval, cancel).await?;
        }
    }

    async fn blocking<T, F>(&self, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ProxyControl) -> Result<T> + Send + 'static,
    {
        let proxy = Arc::clone(&self.proxy);
        match tokio::task::spawn_blocking(move || call(proxy.as_ref())).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(Error::Io(std::io::Error::other(e.to_string()))),
        }
    }
}

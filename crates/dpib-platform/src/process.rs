//! ByeDPI as a child process
//!
//! The argument string lives in the state store so it survives restarts
//! of the benchmark tool. Status is "connected" only while the child is
//! alive and its listen endpoint accepts TCP connections.

use crate::endpoint::endpoint_from_args;
use crate::error::{PlatformError, Result};
use dpib_core::proxy::{ProxyControl, ProxyStatus};
use dpib_core::state::{keys, StateStore};
use parking_lot::Mutex;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Executable looked up on `PATH` when none is configured
pub const DEFAULT_EXECUTABLE: &str = "ciadpi";

/// How long a status check waits for the listen socket
const CONNECT_PROBE_TIMEOUT: Duration = Duration::from_millis(200);

/// A spawned proxy and the arguments it was started with
struct Running {
    child: Child,
    args: String,
}

/// Proxy control backed by a locally spawned ByeDPI process
pub struct ProcessProxy {
    executable: PathBuf,
    store: Arc<dyn StateStore>,
    child: Mutex<Option<Running>>,
}

impl ProcessProxy {
    /// Control `executable`, persisting its arguments in `store`
    pub fn new(executable: impl Into<PathBuf>, store: Arc<dyn StateStore>) -> Self {
        Self {
            executable: executable.into(),
            store,
            child: Mutex::new(None),
        }
    }

    /// Executable this proxy launches
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Process id of the running child, if any
    pub fn pid(&self) -> Option<u32> {
        self.child.lock().as_ref().map(|running| running.child.id())
    }

    fn spawn(&self, args: &str) -> Result<Child> {
        info!(executable = %self.executable.display(), args, "Starting proxy");
        Command::new(&self.executable)
            .args(args.split_whitespace())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    PlatformError::ExecutableNotFound(self.executable.display().to_string())
                }
                _ => PlatformError::SpawnFailed(e.to_string()),
            })
    }

    fn terminate(mut child: Child) -> Result<()> {
        let pid = child.id();
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(pid, %status, "Proxy already exited");
                return Ok(());
            }
            Ok(None) => {}
            Err(e) => return Err(PlatformError::ProcessError(e.to_string())),
        }

        child
            .kill()
            .map_err(|e| PlatformError::ProcessError(format!("kill {pid}: {e}")))?;
        let status = child
            .wait()
            .map_err(|e| PlatformError::ProcessError(format!("wait {pid}: {e}")))?;
        info!(pid, %status, "Proxy stopped");
        Ok(())
    }

    /// Whether the child is still running; reaps it if it exited
    fn child_alive(&self) -> bool {
        let mut guard = self.child.lock();
        let Some(running) = guard.as_mut() else {
            return false;
        };

        match running.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                warn!(pid = running.child.id(), %status, "Proxy exited on its own");
                *guard = None;
                false
            }
            Err(e) => {
                warn!(error = %e, "Failed to query proxy process");
                false
            }
        }
    }
}

impl ProxyControl for ProcessProxy {
    fn configuration(&self) -> dpib_core::Result<String> {
        Ok(self.store.get_string(keys::PROXY_ARGS)?.unwrap_or_default())
    }

    fn set_configuration(&self, args: &str) -> dpib_core::Result<()> {
        self.store.set_string(keys::PROXY_ARGS, args)
    }

    fn request_start(&self) -> dpib_core::Result<()> {
        let args = self.configuration()?;

        if self.child_alive() {
            let mut guard = self.child.lock();
            if guard.as_ref().is_some_and(|running| running.args == args) {
                debug!("Proxy process already running");
                return Ok(());
            }
            if let Some(stale) = guard.take() {
                drop(guard);
                info!(pid = stale.child.id(), "Arguments changed, restarting proxy");
                Self::terminate(stale.child).map_err(|e| e.into_proxy_error("start"))?;
            }
        }

        let child = self
            .spawn(&args)
            .map_err(|e| e.into_proxy_error("start"))?;
        debug!(pid = child.id(), "Proxy spawned");
        *self.child.lock() = Some(Running { child, args });
        Ok(())
    }

    fn request_stop(&self) -> dpib_core::Result<()> {
        let running = self.child.lock().take();
        match running {
            Some(running) => {
                Self::terminate(running.child).map_err(|e| e.into_proxy_error("stop"))
            }
            None => Ok(()),
        }
    }

    fn status(&self) -> ProxyStatus {
        if !self.child_alive() {
            return ProxyStatus::Disconnected;
        }

        let args = match self.configuration() {
            Ok(args) => args,
            Err(e) => {
                warn!(error = %e, "Failed to read proxy arguments");
                return ProxyStatus::Disconnected;
            }
        };

        let endpoint = endpoint_from_args(&args);
        match TcpStream::connect_timeout(&endpoint, CONNECT_PROBE_TIMEOUT) {
            Ok(_) => ProxyStatus::Connected,
            Err(_) => ProxyStatus::Disconnected,
        }
    }
}

impl Drop for ProcessProxy {
    fn drop(&mut self) {
        if let Some(running) = self.child.get_mut().take() {
            if let Err(e) = Self::terminate(running.child) {
                warn!(error = %e, "Failed to stop proxy on shutdown");
            }
        }
    }
}

//! # DPI Bench Core
//!
//! Platform-independent engine that benchmarks candidate configurations
//! of a local DPI-circumvention SOCKS proxy.
//!
//! ## Architecture
//!
//! This crate provides:
//! - **Orchestration** - Sequential per-candidate state machine with
//!   guaranteed restore of the original proxy configuration
//! - **Proxy lifecycle** - Idempotent start/stop with bounded status waits
//! - **Probing** - Concurrent HTTP reachability probes through the proxy
//! - **Target generation** - Adversarial `googlevideo.com` edge hostname
//! - **Transcript** - Append-only log with actionable command segments
//! - **Configuration** - TOML configuration and list sources
//!
//! ## Example
//!
//! ```rust,no_run
//! use dpib_core::{Config, FileStateStore, Orchestrator, Transcript};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(proxy: Arc<dyn dpib_core::ProxyControl>) -> dpib_core::Result<()> {
//! let config = Config::load("config.toml")?;
//! let plan = dpib_core::config::resolve_plan(&config)?;
//! let store = Arc::new(FileStateStore::new("state.json"));
//! let transcript = Arc::new(Transcript::new("proxy_test.log"));
//!
//! let orchestrator = Orchestrator::from_config(config, proxy, store, transcript)?;
//! let report = orchestrator.run(plan, CancellationToken::new()).await?;
//! for result in &report.ranked {
//!     println!("{} {}%", result.command, result.percentage);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cancel;
pub mod config;
pub mod domain;
pub mod error;
pub mod orchestrator;
pub mod probe;
pub mod proxy;
pub mod state;
pub mod transcript;

// Re-exports for convenience
pub use config::Config;
pub use domain::{GoogleVideoGenerator, TargetGenerator};
pub use error::{Error, Result};
pub use orchestrator::{
    ranked_commands, CandidateResult, Orchestrator, Phase, RunOutcome, RunPlan, RunReport,
    RunState,
};
pub use probe::{HttpProber, ProbeEngine, ProbeResult, Prober};
pub use proxy::{LifecycleController, ProxyControl, ProxyStatus};
pub use state::{FileStateStore, MemoryStateStore, StateStore};
pub use transcript::{Segment, Transcript};

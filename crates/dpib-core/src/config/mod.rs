//! Configuration management for the benchmark engine
//!
//! Provides a strongly-typed configuration system with TOML support.
//! Every section falls back to defaults, so a partial file is valid.

mod sources;

pub use sources::{parse_lines, resolve_plan, BUILTIN_CANDIDATES, BUILTIN_TARGETS};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Statuses that count as "the far end answered through the proxy".
///
/// Redirects are never followed, so a 3xx is a successful probe.
pub const DEFAULT_ACCEPTED_STATUSES: &[u16] = &[200, 201, 204, 301, 302, 303, 307, 308, 400, 404, 405];

/// Mapping service mirrors queried by the domain generator, in order
pub const DEFAULT_MAPPING_ENDPOINTS: &[&str] = &[
    "https://redirector.gvt1.com/report_mapping?di=no",
    "https://redirector.googlevideo.com/report_mapping?di=no",
];

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local proxy endpoint and lifecycle timing
    pub proxy: ProxyConfig,

    /// Reachability probe settings
    pub probe: ProbeConfig,

    /// Run-level settings
    pub benchmark: BenchmarkConfig,

    /// Where target sites come from
    pub targets: SourceConfig,

    /// Where candidate configurations come from
    pub candidates: SourceConfig,

    /// Adversarial target generation
    pub generator: GeneratorConfig,

    /// Durable state location
    pub storage: StorageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| Error::ConfigNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(Error::from)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.proxy.port == 0 {
            return Err(Error::config_value("proxy.port", "Must be between 1 and 65535"));
        }

        if self.proxy.poll_interval_ms == 0 {
            return Err(Error::config_value("proxy.poll_interval_ms", "Must be greater than 0"));
        }

        if self.proxy.start_timeout_ms < self.proxy.poll_interval_ms {
            return Err(Error::config_value(
                "proxy.start_timeout_ms",
                "Must be at least one poll interval",
            ));
        }

        if self.proxy.stop_timeout_ms < self.proxy.poll_interval_ms {
            return Err(Error::config_value(
                "proxy.stop_timeout_ms",
                "Must be at least one poll interval",
            ));
        }

        if self.probe.requests_per_target == 0 {
            return Err(Error::config_value(
                "probe.requests_per_target",
                "Must be greater than 0",
            ));
        }

        if self.probe.connect_timeout_ms == 0 || self.probe.read_timeout_ms == 0 {
            return Err(Error::config_value("probe", "Timeouts must be greater than 0"));
        }

        if !self.probe.accept_any_status {
            if self.probe.accepted_statuses.is_empty() {
                return Err(Error::config_value(
                    "probe.accepted_statuses",
                    "At least one status is required unless accept_any_status is set",
                ));
            }
            if let Some(bad) = self
                .probe
                .accepted_statuses
                .iter()
                .find(|s| !(100..=599).contains(*s))
            {
                return Err(Error::config_value(
                    "probe.accepted_statuses",
                    format!("{bad} is not an HTTP status code"),
                ));
            }
        }

        if self.benchmark.success_threshold > 100 {
            return Err(Error::config_value(
                "benchmark.success_threshold",
                "Must be between 0 and 100",
            ));
        }

        if self.benchmark.generate_target && self.generator.endpoints.is_empty() {
            return Err(Error::config_value(
                "generator.endpoints",
                "At least one endpoint is required when generate_target is enabled",
            ));
        }

        Ok(())
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Local SOCKS proxy endpoint and lifecycle timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Loopback address the proxy is told to listen on
    pub ip: IpAddr,
    /// Port the proxy is told to listen on
    pub port: u16,
    /// Proxy executable (used by the process-backed control surface)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,
    /// How long to wait for the proxy to report connected
    pub start_timeout_ms: u64,
    /// How long to wait for the proxy to report disconnected
    pub stop_timeout_ms: u64,
    /// Status polling interval
    pub poll_interval_ms: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 1080,
            executable: None,
            start_timeout_ms: 5000,
            stop_timeout_ms: 5000,
            poll_interval_ms: 100,
        }
    }
}

impl ProxyConfig {
    /// Effective launch string: the loopback endpoint goes ahead of the
    /// candidate's own arguments.
    pub fn launch_args(&self, candidate: &str) -> String {
        format!("--ip {} --port {} {}", self.ip, self.port, candidate)
    }

    /// SOCKS URL used by probes; hostnames are resolved by the proxy
    pub fn socks_url(&self) -> String {
        format!("socks5h://{}:{}", self.ip, self.port)
    }

    /// Start wait as a duration
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    /// Stop wait as a duration
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Reachability probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Sequential GET attempts per target
    pub requests_per_target: u32,
    /// Connect timeout per attempt
    pub connect_timeout_ms: u64,
    /// Read timeout per attempt
    pub read_timeout_ms: u64,
    /// Pause after every attempt
    pub attempt_delay_ms: u64,
    /// Write a per-target line to the transcript
    pub full_log: bool,
    /// Count any HTTP response as success
    pub accept_any_status: bool,
    /// Statuses counted as success when `accept_any_status` is off
    pub accepted_statuses: Vec<u16>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            requests_per_target: 1,
            connect_timeout_ms: 2000,
            read_timeout_ms: 2000,
            attempt_delay_ms: 100,
            full_log: false,
            accept_any_status: false,
            accepted_statuses: DEFAULT_ACCEPTED_STATUSES.to_vec(),
        }
    }
}

impl ProbeConfig {
    /// Whether an HTTP status counts as a successful probe
    pub fn accepts(&self, status: u16) -> bool {
        self.accept_any_status || self.accepted_statuses.contains(&status)
    }

    /// Connect timeout as a duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Read timeout as a duration
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Inter-attempt delay as a duration
    pub fn attempt_delay(&self) -> Duration {
        Duration::from_millis(self.attempt_delay_ms)
    }
}

/// Run-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Pause between probing and stopping the proxy (seconds)
    pub settle_delay_secs: u64,
    /// Append a generated adversarial target to the list
    pub generate_target: bool,
    /// Minimum percentage for a candidate to be ranked
    pub success_threshold: u8,
    /// Write candidate headings as actionable segments
    pub clickable_commands: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            settle_delay_secs: 1,
            generate_target: true,
            success_threshold: 50,
            clickable_commands: false,
        }
    }
}

impl BenchmarkConfig {
    /// Settle delay as a duration
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}

/// A list source: either the built-in list or a user supplied one
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Use the user supplied list instead of the built-in one
    pub use_custom: bool,
    /// Newline separated entries
    pub custom: String,
    /// File with newline separated entries (takes precedence over `custom`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// Adversarial target generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Mapping service mirrors, tried in order
    pub endpoints: Vec<String>,
    /// Per-endpoint timeout
    pub timeout_ms: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoints: DEFAULT_MAPPING_ENDPOINTS.iter().map(|s| (*s).to_string()).collect(),
            timeout_ms: 2000,
        }
    }
}

impl GeneratorConfig {
    /// Per-endpoint timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Durable state location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the state file and the transcript
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log file path (None = stderr only)
    pub file: Option<String>,
    /// Enable JSON format logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            json_format: false,
        }
    }
}

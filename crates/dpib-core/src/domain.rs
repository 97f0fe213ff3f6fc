//! Adversarial target generation
//!
//! Derives a `googlevideo.com` edge hostname for the local cluster. The
//! mapping service reports a cluster codename; a fixed substitution
//! cipher turns it into the cluster name used in edge hostnames. Such a
//! hostname is hard to block with a generic rule, which makes it a good
//! probe target.

use crate::config::GeneratorConfig;
use crate::error::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Codename alphabet, position-for-position with [`CLUSTER_ALPHABET`]
const CODENAME_ALPHABET: &[u8; 37] = b"uzpkfa50vqlgb61wrmhc72xsnid83ytoje94-";

/// Cluster name alphabet
const CLUSTER_ALPHABET: &[u8; 37] = b"0123456789abcdefghijklmnopqrstuvwxyz-";

static CODENAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"=>\s*(\S+)\s*(?:\(|:)").expect("codename pattern is valid")
});

/// Source of one extra probe target
#[async_trait]
pub trait TargetGenerator: Send + Sync {
    /// A hostname, or `None` when nothing could be generated
    async fn generate(&self) -> Option<String>;
}

/// Extract the cluster codename from a mapping report body.
///
/// Only the first `=> <token>(` or `=> <token>:` match is used.
pub fn extract_codename(body: &str) -> Option<String> {
    let captures = CODENAME_PATTERN.captures(body)?;
    let codename = captures.get(1)?.as_str().trim_end_matches([':', ' ']);
    if codename.is_empty() {
        None
    } else {
        Some(codename.to_string())
    }
}

/// Map a codename to a cluster name; unmapped characters are dropped
pub fn decode_cluster_name(codename: &str) -> String {
    codename
        .chars()
        .filter_map(|c| {
            let mapped = CODENAME_ALPHABET
                .iter()
                .position(|&b| char::from(b) == c)
                .map(|i| char::from(CLUSTER_ALPHABET[i]));
            if mapped.is_none() {
                warn!(character = %c, "Character not found in cluster mapping");
            }
            mapped
        })
        .collect()
}

/// Edge hostname for a cluster
pub fn edge_hostname(cluster_name: &str) -> String {
    format!("rr1---sn-{cluster_name}.googlevideo.com")
}

/// Generator backed by the googlevideo mapping service
pub struct GoogleVideoGenerator {
    client: reqwest::Client,
    endpoints: Vec<String>,
}

impl GoogleVideoGenerator {
    /// Build a direct (non-proxied) client with the per-endpoint timeout
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout())
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            endpoints: config.endpoints.clone(),
        })
    }

    /// Per-endpoint timeout is enforced by the client
    async fn fetch(&self, url: &str) -> Option<String> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url, error = %e, "Mapping request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(url, status = response.status().as_u16(), "Mapping request rejected");
            return None;
        }

        match response.text().await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!(url, error = %e, "Mapping response unreadable");
                None
            }
        }
    }

    async fn cluster_codename(&self) -> Option<String> {
        for url in &self.endpoints {
            let Some(body) = self.fetch(url).await else {
                continue;
            };
            if let Some(codename) = extract_codename(&body) {
                return Some(codename);
            }
            debug!(url = %url, "No cluster codename in mapping response");
        }
        None
    }
}

#[async_trait]
impl TargetGenerator for GoogleVideoGenerator {
    async fn generate(&self) -> Option<String> {
        let Some(codename) = self.cluster_codename().await else {
            warn!("Failed to obtain cluster codename");
            return None;
        };
        info!(codename = %codename, "Cluster codename");

        let cluster = decode_cluster_name(&codename);
        if cluster.is_empty() {
            warn!(codename = %codename, "Cluster codename has no mappable characters");
            return None;
        }

        let host = edge_hostname(&cluster);
        info!(host = %host, "Generated adversarial target");
        Some(host)
    }
}

/// Upper bound for a whole generation attempt: every endpoint timing out
pub fn generation_budget(config: &GeneratorConfig) -> Duration {
    config.timeout() * u32::try_from(config.endpoints.len()).unwrap_or(u32::MAX)
}

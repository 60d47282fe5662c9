//! Tier configuration types
//!
//! Static, startup-time description of each tier and of the routing rules.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::retry::RetryPolicy;

/// Latency/throughput profile of a tier, used for context-based ordering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierProfile {
    /// Fastest path, preferred for agent and realtime requests
    Realtime,
    /// Batch-oriented path, preferred for large record counts
    Bulk,
    #[default]
    Standard,
}

impl std::fmt::Display for TierProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TierProfile::Realtime => write!(f, "realtime"),
            TierProfile::Bulk => write!(f, "bulk"),
            TierProfile::Standard => write!(f, "standard"),
        }
    }
}

impl FromStr for TierProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "realtime" => Ok(TierProfile::Realtime),
            "bulk" => Ok(TierProfile::Bulk),
            "standard" => Ok(TierProfile::Standard),
            other => Err(format!("unknown tier profile: {}", other)),
        }
    }
}

impl TierProfile {
    /// Default per-call timeout for tiers of this profile
    pub fn default_timeout(&self) -> Duration {
        match self {
            TierProfile::Realtime => Duration::from_millis(500),
            TierProfile::Bulk => Duration::from_secs(5),
            TierProfile::Standard => Duration::from_secs(2),
        }
    }
}

/// Static configuration of one tier
#[derive(Debug, Clone, PartialEq)]
pub struct TierConfig {
    pub name: String,
    /// 1 is tried first by default
    pub priority: u32,
    pub profile: TierProfile,
    /// Timeout applied to every individual call
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl TierConfig {
    pub fn new(name: impl Into<String>, priority: u32, profile: TierProfile) -> Self {
        Self {
            name: name.into(),
            priority,
            profile,
            timeout: profile.default_timeout(),
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Rules used to order tiers for a request
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingRules {
    /// Tier tried first for plain requests; priority 1 when unset
    pub primary_tier: Option<String>,
    /// Record counts above this prefer the bulk tier
    pub bulk_threshold: usize,
}

impl Default for RoutingRules {
    fn default() -> Self {
        Self {
            primary_tier: None,
            bulk_threshold: 10,
        }
    }
}

//! Configuration management for Tiergate
//!
//! Configuration is loaded from environment variables.

use anyhow::{bail, Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::tiers::{
    CircuitBreakerConfig, HealthMonitorConfig, RetryPolicy, RoutingRules, TierConfig, TierProfile,
};

/// A configured tier and the URL of its backend
#[derive(Debug, Clone, PartialEq)]
pub struct TierEndpoint {
    pub config: TierConfig,
    pub url: String,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,

    /// Tiers in priority order
    pub tiers: Vec<TierEndpoint>,
    pub routing: RoutingRules,

    pub breaker: CircuitBreakerConfig,
    /// Outcomes kept per tier for success rate and latency
    pub metrics_window: usize,
    pub health: HealthMonitorConfig,

    /// Emit logs as JSON lines
    pub log_json: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let names: Vec<String> = lookup("TIERGATE_TIERS")
            .unwrap_or_else(|| "agent,bulk,rest".to_string())
            .split(',')
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        if names.is_empty() {
            bail!("TIERGATE_TIERS must name at least one tier");
        }

        let mut tiers: Vec<TierEndpoint> = Vec::with_capacity(names.len());
        for (position, name) in names.iter().enumerate() {
            if tiers.iter().any(|t| &t.config.name == name) {
                bail!("Tier {} listed twice in TIERGATE_TIERS", name);
            }
            tiers.push(tier_from_lookup(&lookup, name, position)?);
        }

        let primary_tier = lookup("TIERGATE_PRIMARY_TIER").filter(|s| !s.trim().is_empty());
        if let Some(primary) = &primary_tier {
            if !names.contains(primary) {
                bail!("TIERGATE_PRIMARY_TIER {} is not a configured tier", primary);
            }
        }

        Ok(Self {
            host: lookup("TIERGATE_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: var_or(&lookup, "TIERGATE_PORT", 8080)?,

            tiers,
            routing: RoutingRules {
                primary_tier,
                bulk_threshold: var_or(&lookup, "TIERGATE_BULK_THRESHOLD", 10)?,
            },

            breaker: CircuitBreakerConfig::new()
                .with_failure_threshold(var_or(&lookup, "TIERGATE_FAILURE_THRESHOLD", 5)?)
                .with_recovery_timeout(Duration::from_secs(var_or(
                    &lookup,
                    "TIERGATE_RECOVERY_TIMEOUT_SECS",
                    30,
                )?))
                .with_half_open_success_threshold(var_or(
                    &lookup,
                    "TIERGATE_HALF_OPEN_SUCCESS_THRESHOLD",
                    2,
                )?)
                .with_half_open_max_probes(var_or(&lookup, "TIERGATE_HALF_OPEN_MAX_PROBES", 1)?),
            metrics_window: var_or(&lookup, "TIERGATE_METRICS_WINDOW", 1_000)?,
            health: HealthMonitorConfig {
                interval: Duration::from_secs(nonzero_var(
                    &lookup,
                    "TIERGATE_HEALTH_INTERVAL_SECS",
                    30,
                )?),
                probe_timeout: Duration::from_millis(nonzero_var(
                    &lookup,
                    "TIERGATE_PROBE_TIMEOUT_MS",
                    1_000,
                )?),
            },

            log_json: lookup("TIERGATE_LOG_JSON")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        })
    }
}

/// Read the settings of one tier, `TIERGATE_TIER_<NAME>_*`
fn tier_from_lookup<F>(lookup: &F, name: &str, position: usize) -> Result<TierEndpoint>
where
    F: Fn(&str) -> Option<String>,
{
    let prefix = format!(
        "TIERGATE_TIER_{}",
        name.to_ascii_uppercase().replace('-', "_")
    );
    let key = |suffix: &str| format!("{}_{}", prefix, suffix);

    let url = lookup(&key("URL")).with_context(|| format!("{} must be set", key("URL")))?;

    let default_profile = match position {
        0 => TierProfile::Realtime,
        1 => TierProfile::Bulk,
        _ => TierProfile::Standard,
    };
    let profile = match lookup(&key("PROFILE")) {
        Some(value) => value
            .parse::<TierProfile>()
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("Invalid {}", key("PROFILE")))?,
        None => default_profile,
    };

    let timeout = Duration::from_millis(nonzero_var(
        lookup,
        &key("TIMEOUT_MS"),
        profile.default_timeout().as_millis() as u64,
    )?);
    let retry = RetryPolicy::new()
        .with_max_attempts(var_or(lookup, &key("MAX_ATTEMPTS"), 3)?)
        .with_base_delay(Duration::from_millis(var_or(
            lookup,
            &key("BASE_BACKOFF_MS"),
            100,
        )?))
        .with_max_delay(Duration::from_millis(var_or(
            lookup,
            &key("MAX_BACKOFF_MS"),
            2_000,
        )?));

    Ok(TierEndpoint {
        config: TierConfig::new(name, position as u32 + 1, profile)
            .with_timeout(timeout)
            .with_retry(retry),
        url,
    })
}

fn var_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", key)),
        None => Ok(default),
    }
}

/// Like [`var_or`], for durations where zero would stall or panic a timer
fn nonzero_var<F>(lookup: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let value = var_or(lookup, key, default)?;
    if value == 0 {
        bail!("{} must be greater than zero", key);
    }
    Ok(value)
}

//! Sliding-window tier metrics
//!
//! Keeps the most recent call outcomes of a tier in a fixed-capacity ring
//! buffer. Success rate and latency percentiles are computed on demand over
//! whatever the window currently holds.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::ErrorCategory;

/// Default number of outcomes kept per tier
pub const DEFAULT_WINDOW: usize = 1_000;

/// One recorded call outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallSample {
    pub timestamp: DateTime<Utc>,
    pub latency_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_category: Option<ErrorCategory>,
}

/// Aggregates over the current window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub samples: usize,
    pub successes: usize,
    pub failures: usize,
    pub transient_failures: usize,
    pub permanent_failures: usize,
    /// 1.0 when the window is empty
    pub success_rate: f64,
    pub p50_latency_ms: Option<u64>,
    pub p95_latency_ms: Option<u64>,
    pub p99_latency_ms: Option<u64>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

/// Ring buffer of recent outcomes for one tier
#[derive(Debug)]
pub struct TierMetrics {
    capacity: usize,
    window: Mutex<VecDeque<CallSample>>,
}

impl TierMetrics {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            window: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record_success(&self, latency: Duration) {
        self.push(CallSample {
            timestamp: Utc::now(),
            latency_ms: latency.as_millis() as u64,
            success: true,
            error_category: None,
        });
    }

    pub fn record_failure(&self, latency: Duration, category: ErrorCategory) {
        self.push(CallSample {
            timestamp: Utc::now(),
            latency_ms: latency.as_millis() as u64,
            success: false,
            error_category: Some(category),
        });
    }

    pub fn push(&self, sample: CallSample) {
        let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        if window.len() == self.capacity {
            window.pop_front();
        }
        window.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.window.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most recent samples, newest last
    pub fn recent(&self, limit: usize) -> Vec<CallSample> {
        let window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        let skip = window.len().saturating_sub(limit);
        window.iter().skip(skip).cloned().collect()
    }

    pub fn success_rate(&self) -> f64 {
        self.summary().success_rate
    }

    /// Compute aggregates over the current window
    ///
    /// Copies latencies out under the lock and sorts outside it, so writers
    /// are only blocked for the copy.
    pub fn summary(&self) -> MetricsSummary {
        let (mut latencies, successes, transient, permanent, last_failure_at) = {
            let window = self.window.lock().unwrap_or_else(|e| e.into_inner());
            let mut successes = 0;
            let mut transient = 0;
            let mut permanent = 0;
            let mut last_failure_at = None;
            let latencies: Vec<u64> = window
                .iter()
                .map(|sample| {
                    if sample.success {
                        successes += 1;
                    } else {
                        match sample.error_category {
                            Some(ErrorCategory::Permanent) => permanent += 1,
                            _ => transient += 1,
                        }
                        last_failure_at = Some(sample.timestamp);
                    }
                    sample.latency_ms
                })
                .collect();
            (latencies, successes, transient, permanent, last_failure_at)
        };

        latencies.sort_unstable();
        let samples = latencies.len();
        let success_rate = if samples == 0 {
            1.0
        } else {
            successes as f64 / samples as f64
        };

        MetricsSummary {
            samples,
            successes,
            failures: samples - successes,
            transient_failures: transient,
            permanent_failures: permanent,
            success_rate,
            p50_latency_ms: percentile(&latencies, 50.0),
            p95_latency_ms: percentile(&latencies, 95.0),
            p99_latency_ms: percentile(&latencies, 99.0),
            last_failure_at,
        }
    }
}

impl Default for TierMetrics {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

/// Nearest-rank percentile over sorted values
fn percentile(sorted: &[u64], pct: f64) -> Option<u64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    let index = rank.clamp(1, sorted.len()) - 1;
    Some(sorted[index])
}

//! Scripted tier client for tests
//!
//! Replays a queue of canned outcomes and counts calls, so router and health
//! monitor behaviour can be asserted without any network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::client::{BulkWriteSummary, Record, SearchCriteria, TierClient};
use super::error::TierError;

/// One scripted call outcome
#[derive(Debug, Clone)]
pub enum Step {
    Succeed,
    Fail(TierError),
    /// Sleep before succeeding; longer than the tier timeout means a timeout
    Delay(Duration),
}

/// Tier client that replays scripted outcomes
pub struct ScriptedTierClient {
    name: String,
    script: Mutex<VecDeque<Step>>,
    fallback: Mutex<Step>,
    calls: AtomicUsize,
    probes: AtomicUsize,
    healthy: AtomicBool,
}

impl ScriptedTierClient {
    /// Client that succeeds on every call
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Step::Succeed),
            calls: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            healthy: AtomicBool::new(true),
        }
    }

    /// Client that fails every call with `error`
    pub fn failing(name: impl Into<String>, error: TierError) -> Self {
        let client = Self::new(name);
        client.set_fallback(Step::Fail(error));
        client
    }

    /// Queue outcomes consumed before the fallback applies
    pub fn with_script(self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.script.lock().unwrap().extend(steps);
        self
    }

    /// Outcome used once the script is exhausted
    pub fn set_fallback(&self, step: Step) {
        *self.fallback.lock().unwrap() = step;
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Number of data calls received (probes excluded)
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    async fn next(&self) -> Result<(), TierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = {
            let mut script = self.script.lock().unwrap();
            match script.pop_front() {
                Some(step) => step,
                None => self.fallback.lock().unwrap().clone(),
            }
        };
        match step {
            Step::Succeed => Ok(()),
            Step::Fail(error) => Err(error),
            Step::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }

    fn record(&self, id: &str) -> Record {
        Record::new(id).with_field("served_by", self.name.clone())
    }
}

#[async_trait]
impl TierClient for ScriptedTierClient {
    async fn get(&self, id: &str) -> Result<Record, TierError> {
        self.next().await?;
        Ok(self.record(id))
    }

    async fn update(&self, id: &str, patch: &Map<String, Value>) -> Result<Record, TierError> {
        self.next().await?;
        let mut record = self.record(id);
        record
            .fields
            .extend(patch.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(record)
    }

    async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<Record>, TierError> {
        self.next().await?;
        let limit = criteria.limit.unwrap_or(1) as usize;
        Ok((0..limit)
            .map(|i| self.record(&format!("{}-{}", criteria.object, i)))
            .collect())
    }

    async fn bulk_read(&self, ids: &[String]) -> Result<Vec<Record>, TierError> {
        self.next().await?;
        Ok(ids.iter().map(|id| self.record(id)).collect())
    }

    async fn bulk_write(&self, records: &[Record]) -> Result<BulkWriteSummary, TierError> {
        self.next().await?;
        Ok(BulkWriteSummary {
            succeeded: records.len(),
            failed: 0,
            errors: Vec::new(),
        })
    }

    async fn health_probe(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.healthy.load(Ordering::SeqCst)
    }
}

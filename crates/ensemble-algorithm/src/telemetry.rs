//! Telemetry reported by a member's sidecar.
//!
//! The sidecar answers every status request with a JSON document like:
//!
//! ```json
//! {
//!   "nodes":   {"node_cores_free": 10, "node_cores_up": 10, "node_up_count": 1, "node_free_count": 1},
//!   "queue":   {"new": 0, "priority": 0, "sched": 0, "run": 1, "cleanup": 0, "inactive": 4},
//!   "counts":  {"inactive": 2, "waiting_periods": 6},
//!   "waiting": {"4": 2, "8": 1},
//!   "nextJobs": [4, 8, 4]
//! }
//! ```
//!
//! `counts` are check counters the sidecar accumulates across ticks.
//! `waiting` maps a required node count to the number of jobs queued at
//! that size.

use std::collections::BTreeMap;

use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use serde::{Deserialize, Serialize};

use crate::error::{AlgorithmError, AlgorithmResult};

/// Queue states that count as active work.
pub const ACTIVE_QUEUE_STATES: [&str; 5] = ["new", "priority", "sched", "run", "cleanup"];

/// Counter of consecutive checks in which the queue did not move.
pub const COUNTER_INACTIVE: &str = "inactive";

/// Counter of consecutive checks with jobs waiting for nodes.
pub const COUNTER_WAITING_PERIODS: &str = "waiting_periods";

/// Point-in-time queue and node state of one member.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TelemetryStatus {
    #[serde(default)]
    pub nodes: BTreeMap<String, i64>,
    #[serde(default)]
    pub queue: BTreeMap<String, i64>,
    #[serde(default)]
    pub counts: BTreeMap<String, i64>,
    #[serde(default)]
    pub waiting: BTreeMap<u32, u32>,
    #[serde(default, rename = "nextJobs")]
    pub next_jobs: Vec<u32>,
}

impl TelemetryStatus {
    /// Parse a sidecar status payload.
    pub fn from_payload(payload: &str) -> AlgorithmResult<Self> {
        serde_json::from_str(payload).map_err(|e| AlgorithmError::MalformedTelemetry(e.to_string()))
    }

    /// new + priority + sched + run + cleanup.
    pub fn active_jobs(&self) -> i64 {
        ACTIVE_QUEUE_STATES
            .iter()
            .map(|state| self.queue.get(*state).copied().unwrap_or(0))
            .sum()
    }

    pub fn counter(&self, name: &str) -> Option<i64> {
        self.counts.get(name).copied()
    }

    /// The smallest node count with waiting jobs.
    pub fn smallest_waiting_size(&self) -> Option<u32> {
        self.waiting.keys().next().copied()
    }

    /// The largest node count with waiting jobs.
    pub fn largest_waiting_size(&self) -> Option<u32> {
        self.waiting.keys().next_back().copied()
    }

    /// A waiting node count drawn with probability proportional to the
    /// number of jobs waiting at that size.
    pub fn random_waiting_size<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<u32> {
        let (sizes, weights): (Vec<u32>, Vec<u64>) = self
            .waiting
            .iter()
            .map(|(size, count)| (*size, u64::from(*count)))
            .unzip();
        let dist = WeightedIndex::new(&weights).ok()?;
        Some(sizes[dist.sample(rng)])
    }

    /// Size of the next job the queue would run.
    pub fn next_job_size(&self) -> Option<u32> {
        self.next_jobs.first().copied()
    }
}

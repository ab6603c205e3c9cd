//! The `workload-demand` algorithm: retroactively respond to workload needs.
//!
//! Submits every remaining job group as soon as it appears in the matrix,
//! retires the member once its queue has stayed idle for long enough, and
//! grows the member when jobs have been waiting for nodes across several
//! checks. Scaling down is not implemented.

use std::sync::{Mutex, PoisonError};

use ensemble_state::{AlgorithmOptions, Ensemble, Job, Member, MemberType};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::algorithm::Algorithm;
use crate::decision::Decision;
use crate::error::{AlgorithmError, AlgorithmResult};
use crate::matrix::take_pending;
use crate::options::{ScaleUpStrategy, WorkloadOptions};
use crate::telemetry::{TelemetryStatus, COUNTER_INACTIVE, COUNTER_WAITING_PERIODS};

pub const NAME: &str = "workload-demand";
pub const DESCRIPTION: &str = "retroactively respond to workload needs";

const SUPPORTS: &[MemberType] = &[MemberType::MiniCluster];

pub struct WorkloadDemand {
    rng: Mutex<StdRng>,
}

impl WorkloadDemand {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic shuffles and random draws, for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut *rng)
    }

    /// Terminate or complete once the queue has been inactive for more than
    /// `terminate_checks` checks with no active work.
    fn retire(&self, status: &TelemetryStatus, options: &WorkloadOptions) -> Option<Decision> {
        let Some(inactive) = status.counter(COUNTER_INACTIVE) else {
            debug!("no inactive count reported, cannot decide on termination");
            return None;
        };

        let active = status.active_jobs();
        if inactive > i64::from(options.terminate_checks) && active == 0 {
            if options.disable_termination {
                return Some(Decision::Complete);
            }
            return Some(Decision::Terminate);
        }

        debug!(
            inactive,
            active,
            threshold = options.terminate_checks,
            "termination criteria not met"
        );
        None
    }

    /// Number of nodes to add, or zero for no scaling.
    fn scale_up_by(&self, status: &TelemetryStatus, options: &WorkloadOptions) -> u32 {
        let waiting_periods = status.counter(COUNTER_WAITING_PERIODS).unwrap_or(0);
        if status.waiting.is_empty() || waiting_periods < i64::from(options.scale_checks) {
            debug!(
                waiting_sizes = status.waiting.len(),
                waiting_periods,
                threshold = options.scale_checks,
                "waiting jobs do not warrant scaling up"
            );
            return 0;
        }

        let size = match options.scale_up_strategy {
            ScaleUpStrategy::SmallestJob => status.smallest_waiting_size(),
            ScaleUpStrategy::LargestJob => status.largest_waiting_size(),
            ScaleUpStrategy::RandomJob => self.with_rng(|rng| status.random_waiting_size(rng)),
            ScaleUpStrategy::NextJob => status.next_job_size(),
        };
        debug!(
            strategy = options.scale_up_strategy.as_str(),
            scale_up_by = ?size,
            "scaling event"
        );
        size.unwrap_or(0)
    }
}

impl Default for WorkloadDemand {
    fn default() -> Self {
        Self::new()
    }
}

impl Algorithm for WorkloadDemand {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn supports(&self) -> &[MemberType] {
        SUPPORTS
    }

    fn validate(&self, options: &AlgorithmOptions) -> AlgorithmResult<()> {
        WorkloadOptions::validate(options).map_err(|reason| AlgorithmError::InvalidOptions {
            algorithm: NAME.to_string(),
            reason,
        })
    }

    fn make_decision(
        &self,
        ensemble: &Ensemble,
        member: &Member,
        payload: &str,
        jobs: &[Job],
    ) -> AlgorithmResult<Decision> {
        let options = WorkloadOptions::resolve(&ensemble.algorithm_for(member).options);

        // Submission takes precedence over everything the telemetry says.
        let pending = self.with_rng(|rng| take_pending(jobs, options.randomize, rng));
        if pending.has_update {
            let payload = pending.request.to_payload()?;
            info!(
                ensemble = %ensemble.id(),
                groups = pending.request.jobs.len(),
                order = ?pending.request.order,
                "submitting pending job groups"
            );
            return Ok(Decision::Submit {
                payload,
                jobs: pending.jobs,
            });
        }

        let status = TelemetryStatus::from_payload(payload)?;

        if let Some(decision) = self.retire(&status, &options) {
            info!(ensemble = %ensemble.id(), %decision, "member is idle");
            return Ok(decision);
        }

        let scale = self.scale_up_by(&status, &options);
        if scale > 0 {
            let delta = i32::try_from(scale).unwrap_or(i32::MAX);
            return Ok(Decision::Scale(delta));
        }

        Ok(Decision::None)
    }
}

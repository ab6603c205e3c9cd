//! Job matrix bookkeeping for submissions.
//!
//! [`take_pending`] turns a member's job groups into a submission request
//! and the matrix slice to persist once the sidecar accepts it. It never
//! mutates its input, so a failed submission is re-derived unchanged on the
//! next tick.

use ensemble_state::Job;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::{AlgorithmError, AlgorithmResult};

/// One flattened job group in a submission payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmitJob {
    pub name: String,
    pub command: String,
    pub nodes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
    #[serde(default)]
    pub duration: u32,
    pub count: u32,
}

impl From<&Job> for SubmitJob {
    fn from(job: &Job) -> Self {
        Self {
            name: job.name.clone(),
            command: job.command.clone(),
            nodes: job.nodes,
            tasks: job.tasks,
            workdir: job.workdir.clone(),
            duration: job.duration,
            count: job.count,
        }
    }
}

/// Order in which the sidecar receives the groups.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubmitOrder {
    Randomized,
    Declared,
}

/// The JSON body of a `submit` action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmitRequest {
    pub jobs: Vec<SubmitJob>,
    pub order: SubmitOrder,
}

impl SubmitRequest {
    pub fn to_payload(&self) -> AlgorithmResult<String> {
        serde_json::to_string(self).map_err(|e| AlgorithmError::Encode(e.to_string()))
    }
}

/// Result of scanning a member's job list for unsubmitted groups.
#[derive(Debug, Clone, PartialEq)]
pub struct Pending {
    pub request: SubmitRequest,
    /// The member's job list with every submitted group's count zeroed,
    /// in declared order.
    pub jobs: Vec<Job>,
    /// False when no group had a positive count.
    pub has_update: bool,
}

/// Collect every group with `count > 0` into a submission request and
/// return the job list with those counts zeroed.
///
/// With `randomize`, the groups (not the expanded job instances) are
/// shuffled with a uniform permutation before packaging.
pub fn take_pending<R: Rng + ?Sized>(jobs: &[Job], randomize: bool, rng: &mut R) -> Pending {
    let mut submit: Vec<SubmitJob> = Vec::new();
    let mut updated = jobs.to_vec();
    for job in updated.iter_mut().filter(|job| job.count > 0) {
        submit.push(SubmitJob::from(&*job));
        job.count = 0;
    }

    if randomize {
        submit.shuffle(rng);
    }

    let has_update = !submit.is_empty();
    Pending {
        request: SubmitRequest {
            jobs: submit,
            order: if randomize {
                SubmitOrder::Randomized
            } else {
                SubmitOrder::Declared
            },
        },
        jobs: updated,
        has_update,
    }
}

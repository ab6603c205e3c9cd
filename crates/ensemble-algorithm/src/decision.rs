//! The outcome of one algorithm evaluation.

use ensemble_state::Job;

/// Sidecar action that queues a submission payload.
pub const ACTION_SUBMIT: &str = "submit";

/// Sidecar action that resets named check counters.
pub const ACTION_RESET_COUNTER: &str = "resetCounter";

/// Sidecar action that returns the member's job records.
pub const ACTION_JOB_INFO: &str = "jobinfo";

/// One decision per member per tick. Exactly one action is carried.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Nothing to do; re-check next tick.
    None,
    /// Forward `payload` to the sidecar; persist `jobs` once it is accepted.
    Submit { payload: String, jobs: Vec<Job> },
    /// Grow (or, for a negative delta, shrink) the member by this many nodes.
    Scale(i32),
    /// Delete the ensemble.
    Terminate,
    /// Stop reconciling the ensemble without deleting it.
    Complete,
}

impl Decision {
    pub fn action(&self) -> &'static str {
        match self {
            Decision::None => "none",
            Decision::Submit { .. } => "submit",
            Decision::Scale(_) => "scale",
            Decision::Terminate => "terminate",
            Decision::Complete => "complete",
        }
    }

    /// Whether applying this decision mutates the job matrix.
    pub fn updates_matrix(&self) -> bool {
        matches!(self, Decision::Submit { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Decision::Terminate | Decision::Complete)
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Scale(delta) => write!(f, "scale({delta:+})"),
            Decision::Submit { jobs, .. } => write!(f, "submit({} groups)", jobs.len()),
            other => f.write_str(other.action()),
        }
    }
}

//! ensemble-algorithm — the decision engine behind ensemble reconciliation.
//!
//! Each reconciliation tick hands every member's telemetry payload and its
//! slice of the job matrix to the member's algorithm, which answers with one
//! [`Decision`]. Algorithms are looked up by name in an explicit
//! [`AlgorithmRegistry`] built at start-up.
//!
//! # workload-demand
//!
//! ```text
//! pending = TakePending(jobs)
//! if pending.has_update:
//!     Submit(pending.payload, pending.jobs)
//!
//! if counts.inactive > terminateChecks and active_jobs == 0:
//!     disableTermination ? Complete : Terminate
//!
//! if counts.waiting_periods >= scaleChecks and waiting is not empty:
//!     Scale(strategy(waiting, nextJobs))
//!
//! None
//! ```

pub mod algorithm;
pub mod decision;
pub mod error;
pub mod matrix;
pub mod options;
pub mod registry;
pub mod telemetry;
pub mod workload;

pub use algorithm::Algorithm;
pub use decision::{Decision, ACTION_JOB_INFO, ACTION_RESET_COUNTER, ACTION_SUBMIT};
pub use error::{AlgorithmError, AlgorithmResult};
pub use matrix::{take_pending, Pending, SubmitJob, SubmitOrder, SubmitRequest};
pub use options::{ScaleUpStrategy, WorkloadOptions};
pub use registry::{AlgorithmInfo, AlgorithmRegistry};
pub use telemetry::TelemetryStatus;
pub use workload::WorkloadDemand;

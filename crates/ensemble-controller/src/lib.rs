//! ensemble-controller — the reconciliation control loop.
//!
//! The [`Reconciler`] runs one tick for one ensemble: validate, initialize
//! the job matrix, make sure every member's cluster exists, then ask each
//! member's algorithm for a decision and apply it. The [`Controller`] runs
//! ticks for many ensembles at once, one worker per ensemble, and decides
//! when each ensemble is ticked next.
//!
//! The cluster platform is reached through [`ClusterBackend`]; member
//! sidecars through [`ensemble_client::Connector`].

pub mod backend;
pub mod controller;
pub mod error;
pub mod reconciler;

pub use backend::{ClusterBackend, MemberSize, StoreBackend};
pub use controller::{Controller, ControllerConfig, ControllerHandle};
pub use error::{ControllerError, ControllerResult};
pub use reconciler::{Outcome, Reconciler};

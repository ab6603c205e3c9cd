//! ensembled — the ensemble daemon.
//!
//! Assembles the state store, the algorithm registry, the reconciliation
//! controller, and the REST API into one process. The binary in
//! `main.rs` adds the command line, config file, and logging on top.

pub mod config;
pub mod daemon;

pub use config::DaemonConfig;
pub use daemon::Daemon;

//! ensemble-state — data model and embedded state store for ensembles.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for ensemble specs, their status subresource (the job matrix),
//! and the live records of each member's compute cluster.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{namespace}/{name}`, `{ensemble_id}:{ordinal}`) enable
//! prefix scans for an ensemble's member clusters.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;
pub mod validation;

pub use error::{StateError, StateResult, ValidationError};
pub use store::StateStore;
pub use types::*;

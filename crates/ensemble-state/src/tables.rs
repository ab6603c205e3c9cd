//! redb table definitions for the ensemble state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).
//! Ensembles are keyed by `{namespace}/{name}`; member clusters by
//! `{ensemble_id}:{ordinal}` so an ensemble's clusters share a prefix.

use redb::TableDefinition;

/// Ensemble specs and metadata keyed by `{namespace}/{name}`.
pub const ENSEMBLES: TableDefinition<&str, &[u8]> = TableDefinition::new("ensembles");

/// Status subresource (the job matrix) keyed by ensemble id.
pub const ENSEMBLE_STATUS: TableDefinition<&str, &[u8]> = TableDefinition::new("ensemble_status");

/// Live member cluster records keyed by `{ensemble_id}:{ordinal}`.
pub const CLUSTERS: TableDefinition<&str, &[u8]> = TableDefinition::new("clusters");

//! StateStore — redb-backed persistence for ensembles.
//!
//! Provides typed CRUD operations over ensembles, their status subresource,
//! and member cluster records. All values are JSON-serialized into redb's
//! `&[u8]` value columns. The store supports both on-disk and in-memory
//! backends (the latter for testing).
//!
//! Status writes go through [`StateStore::commit_status`], which applies the
//! status-subresource write and the ensemble metadata patch in a single
//! write transaction: either both land or neither does.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(ENSEMBLES).map_err(map_err!(Table))?;
        txn.open_table(ENSEMBLE_STATUS).map_err(map_err!(Table))?;
        txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Ensembles ──────────────────────────────────────────────────

    /// Insert a new ensemble. Fails with `AlreadyExists` if the id is taken.
    pub fn create_ensemble(&self, ensemble: &Ensemble) -> StateResult<Ensemble> {
        let key = ensemble.id();
        let now = epoch_secs();
        let mut stored = ensemble.clone();
        stored.created_at = now;
        stored.updated_at = now;
        stored.status_generation = 0;
        let value = serde_json::to_vec(&stored).map_err(map_err!(Serialize))?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ENSEMBLES).map_err(map_err!(Table))?;
            if table.get(key.as_str()).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::AlreadyExists(key));
            }
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "ensemble created");
        Ok(stored)
    }

    /// Insert or replace an ensemble spec, keeping its creation time and
    /// status generation if it already exists.
    pub fn put_ensemble(&self, ensemble: &Ensemble) -> StateResult<()> {
        let key = ensemble.id();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ENSEMBLES).map_err(map_err!(Table))?;
            let existing: Option<Ensemble> = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };

            let now = epoch_secs();
            let mut stored = ensemble.clone();
            stored.updated_at = now;
            match existing {
                Some(prev) => {
                    stored.created_at = prev.created_at;
                    stored.status_generation = prev.status_generation;
                }
                None => stored.created_at = now,
            }

            let value = serde_json::to_vec(&stored).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "ensemble stored");
        Ok(())
    }

    /// Get an ensemble by `{namespace}/{name}` key.
    pub fn get_ensemble(&self, key: &str) -> StateResult<Option<Ensemble>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ENSEMBLES).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let ensemble: Ensemble =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(ensemble))
            }
            None => Ok(None),
        }
    }

    /// List all ensembles.
    pub fn list_ensembles(&self) -> StateResult<Vec<Ensemble>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ENSEMBLES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let ensemble: Ensemble =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(ensemble);
        }
        Ok(results)
    }

    /// Delete an ensemble together with its status and member clusters.
    /// Returns true if the ensemble existed.
    pub fn delete_ensemble(&self, key: &str) -> StateResult<bool> {
        let prefix = format!("{key}:");
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        let mut clusters_removed = 0;
        {
            let mut table = txn.open_table(ENSEMBLES).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();

            let mut status = txn.open_table(ENSEMBLE_STATUS).map_err(map_err!(Table))?;
            status.remove(key).map_err(map_err!(Write))?;

            let mut clusters = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
            let keys: Vec<String> = clusters
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| {
                    let (k, _) = entry.ok()?;
                    let k = k.value().to_string();
                    k.starts_with(&prefix).then_some(k)
                })
                .collect();
            for k in &keys {
                clusters.remove(k.as_str()).map_err(map_err!(Write))?;
                clusters_removed += 1;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, clusters_removed, "ensemble deleted");
        Ok(existed)
    }

    // ── Status subresource ─────────────────────────────────────────

    /// Get the status of an ensemble. A missing status is the empty status.
    pub fn get_status(&self, key: &str) -> StateResult<EnsembleStatus> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ENSEMBLE_STATUS).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))
            }
            None => Ok(EnsembleStatus::default()),
        }
    }

    /// Commit a new status for an ensemble.
    ///
    /// Writes the status subresource and patches the ensemble's metadata
    /// (`updated_at`, `status_generation`) in one transaction. Returns the
    /// committed status with its new generation.
    pub fn commit_status(&self, key: &str, status: &EnsembleStatus) -> StateResult<EnsembleStatus> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let committed;
        {
            let mut ensembles = txn.open_table(ENSEMBLES).map_err(map_err!(Table))?;
            let mut ensemble: Ensemble = match ensembles.get(key).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(key.to_string())),
            };

            let mut status_table = txn.open_table(ENSEMBLE_STATUS).map_err(map_err!(Table))?;
            let previous = match status_table.get(key).map_err(map_err!(Read))? {
                Some(guard) => {
                    let prev: EnsembleStatus =
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                    prev.generation
                }
                None => 0,
            };

            let mut next = status.clone();
            next.generation = previous + 1;
            let value = serde_json::to_vec(&next).map_err(map_err!(Serialize))?;
            status_table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;

            ensemble.updated_at = epoch_secs();
            ensemble.status_generation = next.generation;
            let value = serde_json::to_vec(&ensemble).map_err(map_err!(Serialize))?;
            ensembles
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;

            committed = next;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, generation = committed.generation, "status committed");
        Ok(committed)
    }

    // ── Member clusters ────────────────────────────────────────────

    /// Insert or update a member cluster record.
    pub fn put_cluster(&self, cluster: &MemberCluster) -> StateResult<()> {
        let key = cluster.table_key();
        let value = serde_json::to_vec(cluster).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, size = cluster.size, "member cluster stored");
        Ok(())
    }

    /// Insert a member cluster record for a stored ensemble. Returns false
    /// if the record already exists; fails with `NotFound` if the owning
    /// ensemble does not.
    pub fn create_cluster(&self, cluster: &MemberCluster) -> StateResult<bool> {
        let key = cluster.table_key();
        let value = serde_json::to_vec(cluster).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let ensembles = txn.open_table(ENSEMBLES).map_err(map_err!(Table))?;
            if ensembles
                .get(cluster.ensemble_id.as_str())
                .map_err(map_err!(Read))?
                .is_none()
            {
                return Err(StateError::NotFound(cluster.ensemble_id.clone()));
            }

            let mut table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
            if table.get(key.as_str()).map_err(map_err!(Read))?.is_some() {
                return Ok(false);
            }
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, size = cluster.size, "member cluster created");
        Ok(true)
    }

    /// Get a member cluster by its composite key.
    pub fn get_cluster(&self, key: &str) -> StateResult<Option<MemberCluster>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let cluster: MemberCluster =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(cluster))
            }
            None => Ok(None),
        }
    }

    /// List all member clusters.
    pub fn list_clusters(&self) -> StateResult<Vec<MemberCluster>> {
        self.scan_clusters(|_| true)
    }

    /// List the member clusters owned by an ensemble.
    pub fn list_clusters_for_ensemble(&self, ensemble_id: &str) -> StateResult<Vec<MemberCluster>> {
        let prefix = format!("{ensemble_id}:");
        self.scan_clusters(|key| key.starts_with(&prefix))
    }

    fn scan_clusters(&self, keep: impl Fn(&str) -> bool) -> StateResult<Vec<MemberCluster>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if keep(key.value()) {
                let cluster: MemberCluster =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(cluster);
            }
        }
        results.sort_by(|a, b| {
            a.ensemble_id
                .cmp(&b.ensemble_id)
                .then(a.ordinal.cmp(&b.ordinal))
        });
        Ok(results)
    }

    /// Apply `update` to an existing cluster record in one transaction.
    /// Fails with `NotFound` if the record does not exist.
    pub fn update_cluster(
        &self,
        key: &str,
        update: impl FnOnce(&mut MemberCluster),
    ) -> StateResult<MemberCluster> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let cluster;
        {
            let mut table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
            let mut current: MemberCluster = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(key.to_string())),
            };
            update(&mut current);
            current.updated_at = epoch_secs();
            let value = serde_json::to_vec(&current).map_err(map_err!(Serialize))?;
            table.insert(key, value.as_slice()).map_err(map_err!(Write))?;
            cluster = current;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, size = cluster.size, endpoint = ?cluster.endpoint, "member cluster updated");
        Ok(cluster)
    }
}

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

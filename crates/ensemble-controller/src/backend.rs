//! The resource boundary: member cluster provisioning, lookup, resize,
//! and ensemble deletion.
//!
//! [`StoreBackend`] keeps one [`MemberCluster`] record per member in the
//! state store. The external provisioner that actually runs the cluster
//! registers the lead broker's address on that record once it is up.

use async_trait::async_trait;
use ensemble_state::{cluster_key, Ensemble, MemberCluster, StateError, StateStore};
use tracing::{debug, info};

use crate::error::{ControllerError, ControllerResult};

/// Live sizing of a member's cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberSize {
    pub size: u32,
    pub min_size: u32,
    pub max_size: u32,
}

/// Operations the reconciler needs from the cluster platform.
#[async_trait]
pub trait ClusterBackend: Send + Sync {
    /// Create the member's cluster if it does not exist yet.
    /// Returns true if it was created by this call.
    async fn ensure_member(&self, ensemble: &Ensemble, ordinal: usize) -> ControllerResult<bool>;

    /// Host or ip of the member's lead broker.
    async fn member_endpoint(&self, ensemble: &Ensemble, ordinal: usize) -> ControllerResult<String>;

    /// Current sizing, read fresh from the live resource.
    async fn member_size(&self, ensemble: &Ensemble, ordinal: usize) -> ControllerResult<MemberSize>;

    async fn resize_member(
        &self,
        ensemble: &Ensemble,
        ordinal: usize,
        size: u32,
    ) -> ControllerResult<()>;

    /// Delete the ensemble and everything it owns.
    async fn delete_ensemble(&self, ensemble: &Ensemble) -> ControllerResult<()>;
}

/// [`ClusterBackend`] over the state store's member cluster records.
#[derive(Clone)]
pub struct StoreBackend {
    store: StateStore,
}

impl StoreBackend {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    fn cluster(&self, ensemble: &Ensemble, ordinal: usize) -> ControllerResult<MemberCluster> {
        let key = cluster_key(&ensemble.id(), ordinal);
        self.store
            .get_cluster(&key)?
            .ok_or(ControllerError::ClusterNotFound(key))
    }
}

#[async_trait]
impl ClusterBackend for StoreBackend {
    async fn ensure_member(&self, ensemble: &Ensemble, ordinal: usize) -> ControllerResult<bool> {
        let id = ensemble.id();
        let spec = ensemble
            .members
            .get(ordinal)
            .and_then(|member| member.minicluster.as_ref())
            .ok_or_else(|| ControllerError::Apply {
                action: "create member".to_string(),
                reason: format!("member {ordinal} of {id} has no cluster descriptor"),
            })?;

        let now = ensemble_state::store::epoch_secs();
        let cluster = MemberCluster {
            ensemble_id: id.clone(),
            ordinal,
            name: ensemble.member_name(ordinal),
            size: spec.size,
            min_size: spec.min_size,
            max_size: spec.effective_max_size(),
            endpoint: None,
            created_at: now,
            updated_at: now,
        };
        if !self.store.create_cluster(&cluster)? {
            return Ok(false);
        }
        info!(ensemble = %id, member = ordinal, name = %cluster.name, size = cluster.size, "member cluster created");
        Ok(true)
    }

    async fn member_endpoint(&self, ensemble: &Ensemble, ordinal: usize) -> ControllerResult<String> {
        let cluster = self.cluster(ensemble, ordinal)?;
        match cluster.endpoint {
            Some(endpoint) if !endpoint.is_empty() => Ok(endpoint),
            _ => Err(ControllerError::EndpointPending(cluster.name)),
        }
    }

    async fn member_size(&self, ensemble: &Ensemble, ordinal: usize) -> ControllerResult<MemberSize> {
        let cluster = self.cluster(ensemble, ordinal)?;
        Ok(MemberSize {
            size: cluster.size,
            min_size: cluster.min_size,
            max_size: cluster.max_size,
        })
    }

    async fn resize_member(
        &self,
        ensemble: &Ensemble,
        ordinal: usize,
        size: u32,
    ) -> ControllerResult<()> {
        let key = cluster_key(&ensemble.id(), ordinal);
        match self.store.update_cluster(&key, |cluster| cluster.size = size) {
            Ok(cluster) => {
                debug!(%key, size = cluster.size, "member cluster resized");
                Ok(())
            }
            Err(StateError::NotFound(key)) => Err(ControllerError::ClusterNotFound(key)),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_ensemble(&self, ensemble: &Ensemble) -> ControllerResult<()> {
        let id = ensemble.id();
        let existed = self.store.delete_ensemble(&id)?;
        info!(ensemble = %id, existed, "ensemble deleted");
        Ok(())
    }
}

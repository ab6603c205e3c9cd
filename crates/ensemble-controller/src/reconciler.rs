//! One reconciliation tick for one ensemble.
//!
//! ```text
//! load ─▶ validate ─▶ matrix empty? ──yes──▶ init matrix, commit ─▶ Requeue
//!                          │no
//!                          ▼
//!              ensure member clusters ──created──▶ Requeue
//!                          │
//!                          ▼
//!     for each member (sequential):
//!         endpoint ─▶ check algorithm ─▶ status ─▶ decide ─▶ apply
//!                          │
//!                          ▼
//!   Terminate ─▶ Done   Complete ─▶ Done   otherwise ─▶ RequeueAfter(check_seconds)
//! ```

use std::sync::Arc;
use std::time::Duration;

use ensemble_algorithm::{
    AlgorithmRegistry, Decision, ACTION_JOB_INFO, ACTION_RESET_COUNTER, ACTION_SUBMIT,
};
use ensemble_client::{Connector, MemberClient};
use ensemble_state::{
    Ensemble, EnsembleStatus, JobMatrix, Member, MemberType, StateStore,
};
use tracing::{debug, info, warn};

use crate::backend::ClusterBackend;
use crate::error::{ControllerError, ControllerResult};

/// Counters the sidecar restarts after the member was resized.
const RESET_AFTER_SCALE: &[&str] = &["waiting_periods"];

/// What the worker should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Run the next tick right away.
    Requeue,
    /// Run the next tick after the ensemble's check interval.
    RequeueAfter(Duration),
    /// Stop until something triggers the ensemble again.
    Done,
}

/// Result of processing one member within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberOutcome {
    Continue,
    Terminated,
    Completed,
}

/// Drives ensembles toward their desired state, one tick at a time.
pub struct Reconciler {
    store: StateStore,
    registry: Arc<AlgorithmRegistry>,
    backend: Arc<dyn ClusterBackend>,
    connector: Arc<dyn Connector>,
}

impl Reconciler {
    pub fn new(
        store: StateStore,
        registry: Arc<AlgorithmRegistry>,
        backend: Arc<dyn ClusterBackend>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            store,
            registry,
            backend,
            connector,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Run one tick for the ensemble with the given `{namespace}/{name}` id.
    pub async fn reconcile(&self, id: &str) -> ControllerResult<Outcome> {
        let Some(ensemble) = self.store.get_ensemble(id)? else {
            debug!(ensemble = %id, "ensemble not found, it must have been deleted");
            return Ok(Outcome::Done);
        };

        ensemble
            .validate()
            .map_err(|source| ControllerError::Validation {
                ensemble: id.to_string(),
                source,
            })?;

        let status = self.store.get_status(id)?;
        if status.jobs.is_empty() {
            let initial = EnsembleStatus {
                jobs: JobMatrix::from_members(&ensemble.members),
                generation: 0,
            };
            let committed = self.store.commit_status(id, &initial)?;
            info!(
                ensemble = %id,
                members = ensemble.members.len(),
                generation = committed.generation,
                "job matrix initialized"
            );
            return Ok(Outcome::Requeue);
        }

        let mut created = 0;
        for (ordinal, member) in ensemble.members.iter().enumerate() {
            if member.member_type() == MemberType::Unknown {
                continue;
            }
            if self.backend.ensure_member(&ensemble, ordinal).await? {
                created += 1;
            }
        }
        if created > 0 {
            info!(ensemble = %id, created, "member clusters created");
            return Ok(Outcome::Requeue);
        }

        let mut matrix = status.jobs;
        let mut completed = false;
        for (ordinal, member) in ensemble.members.iter().enumerate() {
            if member.member_type() == MemberType::Unknown {
                debug!(ensemble = %id, member = ordinal, "skipping member of unknown type");
                continue;
            }
            match self
                .reconcile_member(&ensemble, ordinal, member, &mut matrix)
                .await?
            {
                MemberOutcome::Continue => {}
                MemberOutcome::Terminated => return Ok(Outcome::Done),
                MemberOutcome::Completed => completed = true,
            }
        }

        if completed {
            info!(ensemble = %id, "ensemble completed, no further checks scheduled");
            return Ok(Outcome::Done);
        }

        let interval = Duration::from_secs(u64::from(ensemble.check_seconds));
        debug!(ensemble = %id, ?interval, "tick finished");
        Ok(Outcome::RequeueAfter(interval))
    }

    async fn reconcile_member(
        &self,
        ensemble: &Ensemble,
        ordinal: usize,
        member: &Member,
        matrix: &mut JobMatrix,
    ) -> ControllerResult<MemberOutcome> {
        let id = ensemble.id();
        let host = self.backend.member_endpoint(ensemble, ordinal).await?;

        let algorithm_ref = ensemble.algorithm_for(member);
        let algorithm = self.registry.check(&algorithm_ref, member)?;

        let member_type = member.member_type();
        let client = self.connector.connect(&host, member.sidecar.port).await?;
        let reply = client
            .request_status(member_type.as_str(), algorithm.name())
            .await?;

        let decision =
            algorithm.make_decision(ensemble, member, &reply.payload, matrix.jobs(ordinal))?;
        info!(
            ensemble = %id,
            member = ordinal,
            algorithm = algorithm.name(),
            %decision,
            "algorithm decision"
        );

        let sidecar = Sidecar {
            client: client.as_ref(),
            member_type: member_type.as_str(),
            algorithm: algorithm.name(),
        };

        match decision {
            Decision::None => Ok(MemberOutcome::Continue),
            Decision::Submit { payload, jobs } => {
                sidecar.action(ACTION_SUBMIT, &payload).await?;
                matrix.set_jobs(ordinal, jobs);
                let committed = self.store.commit_status(
                    &id,
                    &EnsembleStatus {
                        jobs: matrix.clone(),
                        generation: 0,
                    },
                )?;
                info!(
                    ensemble = %id,
                    member = ordinal,
                    generation = committed.generation,
                    "submitted job groups recorded"
                );
                Ok(MemberOutcome::Continue)
            }
            Decision::Scale(delta) => {
                if self.scale(ensemble, ordinal, delta).await? {
                    sidecar.reset_counters(RESET_AFTER_SCALE).await;
                }
                Ok(MemberOutcome::Continue)
            }
            Decision::Terminate => {
                sidecar.log_job_info(&id, ordinal).await;
                self.backend.delete_ensemble(ensemble).await?;
                info!(ensemble = %id, member = ordinal, "ensemble terminated");
                Ok(MemberOutcome::Terminated)
            }
            Decision::Complete => {
                sidecar.log_job_info(&id, ordinal).await;
                info!(ensemble = %id, member = ordinal, "member completed");
                Ok(MemberOutcome::Completed)
            }
        }
    }

    /// Apply a scale decision against the member's live size. Returns true
    /// if a resize was made. Sizes below one node or above the maximum are
    /// dropped, never clamped.
    async fn scale(&self, ensemble: &Ensemble, ordinal: usize, delta: i32) -> ControllerResult<bool> {
        let current = self.backend.member_size(ensemble, ordinal).await?;
        let new_size = i64::from(current.size) + i64::from(delta);

        if new_size < 1 {
            debug!(ensemble = %ensemble.id(), member = ordinal, size = current.size, delta, "ignoring scale below one node");
            return Ok(false);
        }
        if new_size > i64::from(current.max_size) {
            debug!(
                ensemble = %ensemble.id(),
                member = ordinal,
                size = current.size,
                max_size = current.max_size,
                delta,
                "ignoring scale beyond max size"
            );
            return Ok(false);
        }

        let new_size = u32::try_from(new_size).map_err(|e| ControllerError::Apply {
            action: "scale".to_string(),
            reason: e.to_string(),
        })?;
        self.backend.resize_member(ensemble, ordinal, new_size).await?;
        info!(
            ensemble = %ensemble.id(),
            member = ordinal,
            from = current.size,
            to = new_size,
            "member resized"
        );
        Ok(true)
    }
}

/// A connected sidecar plus the identity sent with every action.
struct Sidecar<'a> {
    client: &'a dyn MemberClient,
    member_type: &'a str,
    algorithm: &'a str,
}

impl Sidecar<'_> {
    async fn action(&self, action: &str, payload: &str) -> ControllerResult<String> {
        let reply = self
            .client
            .request_action(self.member_type, self.algorithm, action, payload)
            .await?;
        Ok(reply.payload)
    }

    async fn reset_counters(&self, counters: &[&str]) {
        let payload = match serde_json::to_string(counters) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to encode counter reset");
                return;
            }
        };
        if let Err(e) = self.action(ACTION_RESET_COUNTER, &payload).await {
            warn!(error = %e, ?counters, "failed to reset sidecar counters");
        }
    }

    async fn log_job_info(&self, ensemble: &str, ordinal: usize) {
        match self.action(ACTION_JOB_INFO, "").await {
            Ok(info) if !info.is_empty() => {
                info!(%ensemble, member = ordinal, jobs = %info, "final job info");
            }
            Ok(_) => {}
            Err(e) => warn!(%ensemble, member = ordinal, error = %e, "failed to fetch job info"),
        }
    }
}

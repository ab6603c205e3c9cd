//! Shared fixtures for controller tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ensemble_algorithm::{Algorithm, AlgorithmRegistry, AlgorithmResult, Decision};
use ensemble_client::{ClientError, ClientResult, Connector, MemberClient, Reply};
use ensemble_controller::{
    ClusterBackend, ControllerResult, MemberSize, Reconciler, StoreBackend,
};
use ensemble_state::{
    cluster_key, AlgorithmOptions, AlgorithmRef, ClusterSpec, Ensemble, Job, Member, MemberType,
    Sidecar, StateStore,
};

pub const IDLE: &str = r#"{"counts": {"inactive": 11}, "queue": {"new": 0, "priority": 0, "sched": 0, "run": 0, "cleanup": 0}}"#;
pub const BUSY: &str = r#"{"counts": {"inactive": 0}, "queue": {"run": 2}}"#;

// ── Sidecar ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct SidecarState {
    /// Status payload by host, falling back to `status`.
    pub status_by_host: HashMap<String, String>,
    pub status: String,
    pub fail_status: bool,
    pub fail_actions: Vec<String>,
    /// (host, action, payload) for every accepted action.
    pub actions: Vec<(String, String, String)>,
    pub connects: Vec<String>,
}

/// In-memory sidecar reachable through [`Connector`].
#[derive(Clone, Default)]
pub struct FakeSidecar {
    pub state: Arc<Mutex<SidecarState>>,
}

impl FakeSidecar {
    pub fn with_status(payload: &str) -> Self {
        let sidecar = Self::default();
        sidecar.set_status(payload);
        sidecar
    }

    pub fn set_status(&self, payload: &str) {
        self.state.lock().unwrap().status = payload.to_string();
    }

    pub fn set_status_for(&self, host: &str, payload: &str) {
        self.state
            .lock()
            .unwrap()
            .status_by_host
            .insert(host.to_string(), payload.to_string());
    }

    pub fn fail_action(&self, action: &str) {
        self.state.lock().unwrap().fail_actions.push(action.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_actions.clear();
        state.fail_status = false;
    }

    pub fn actions(&self) -> Vec<(String, String, String)> {
        self.state.lock().unwrap().actions.clone()
    }

    pub fn actions_named(&self, action: &str) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter(|(_, a, _)| a == action)
            .map(|(_, _, payload)| payload)
            .collect()
    }

    pub fn connects(&self) -> Vec<String> {
        self.state.lock().unwrap().connects.clone()
    }
}

struct FakeClient {
    host: String,
    state: Arc<Mutex<SidecarState>>,
}

#[async_trait]
impl MemberClient for FakeClient {
    async fn request_status(&self, _member_type: &str, _algorithm: &str) -> ClientResult<Reply> {
        let state = self.state.lock().unwrap();
        if state.fail_status {
            return Err(ClientError::Timeout {
                endpoint: self.host.clone(),
            });
        }
        let payload = state
            .status_by_host
            .get(&self.host)
            .unwrap_or(&state.status)
            .clone();
        Ok(Reply { payload })
    }

    async fn request_action(
        &self,
        _member_type: &str,
        _algorithm: &str,
        action: &str,
        payload: &str,
    ) -> ClientResult<Reply> {
        let mut state = self.state.lock().unwrap();
        if state.fail_actions.iter().any(|a| a == action) {
            return Err(ClientError::Rejected {
                endpoint: self.host.clone(),
                request: action.to_string(),
            });
        }
        state
            .actions
            .push((self.host.clone(), action.to_string(), payload.to_string()));
        let payload = match action {
            "jobinfo" => r#"[{"id": "f1", "state": "INACTIVE"}]"#.to_string(),
            _ => String::new(),
        };
        Ok(Reply { payload })
    }
}

#[async_trait]
impl Connector for FakeSidecar {
    async fn connect(&self, host: &str, _port: u16) -> ClientResult<Box<dyn MemberClient>> {
        self.state.lock().unwrap().connects.push(host.to_string());
        Ok(Box::new(FakeClient {
            host: host.to_string(),
            state: self.state.clone(),
        }))
    }
}

// ── Backend ────────────────────────────────────────────────────────

/// [`StoreBackend`] that records resize and delete calls.
#[derive(Clone)]
pub struct RecordingBackend {
    inner: StoreBackend,
    pub resizes: Arc<Mutex<Vec<(usize, u32)>>>,
    pub deletes: Arc<Mutex<Vec<String>>>,
}

impl RecordingBackend {
    pub fn new(store: StateStore) -> Self {
        Self {
            inner: StoreBackend::new(store),
            resizes: Arc::default(),
            deletes: Arc::default(),
        }
    }

    pub fn resizes(&self) -> Vec<(usize, u32)> {
        self.resizes.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterBackend for RecordingBackend {
    async fn ensure_member(&self, ensemble: &Ensemble, ordinal: usize) -> ControllerResult<bool> {
        self.inner.ensure_member(ensemble, ordinal).await
    }

    async fn member_endpoint(&self, ensemble: &Ensemble, ordinal: usize) -> ControllerResult<String> {
        self.inner.member_endpoint(ensemble, ordinal).await
    }

    async fn member_size(&self, ensemble: &Ensemble, ordinal: usize) -> ControllerResult<MemberSize> {
        self.inner.member_size(ensemble, ordinal).await
    }

    async fn resize_member(
        &self,
        ensemble: &Ensemble,
        ordinal: usize,
        size: u32,
    ) -> ControllerResult<()> {
        self.resizes.lock().unwrap().push((ordinal, size));
        self.inner.resize_member(ensemble, ordinal, size).await
    }

    async fn delete_ensemble(&self, ensemble: &Ensemble) -> ControllerResult<()> {
        self.deletes.lock().unwrap().push(ensemble.id());
        self.inner.delete_ensemble(ensemble).await
    }
}

// ── Algorithms ─────────────────────────────────────────────────────

/// Always returns the same decision.
pub struct FixedDecision(pub Decision);

impl Algorithm for FixedDecision {
    fn name(&self) -> &str {
        "fixed"
    }

    fn description(&self) -> &str {
        "returns a fixed decision"
    }

    fn supports(&self) -> &[MemberType] {
        &[MemberType::MiniCluster]
    }

    fn validate(&self, _options: &AlgorithmOptions) -> AlgorithmResult<()> {
        Ok(())
    }

    fn make_decision(
        &self,
        _ensemble: &Ensemble,
        _member: &Member,
        _payload: &str,
        _jobs: &[Job],
    ) -> AlgorithmResult<Decision> {
        Ok(self.0.clone())
    }
}

// ── Fixtures ───────────────────────────────────────────────────────

pub fn member(jobs: Vec<Job>, size: u32, max_size: u32, options: AlgorithmOptions) -> Member {
    Member {
        minicluster: Some(ClusterSpec {
            size,
            min_size: 1,
            max_size,
            image: None,
        }),
        sidecar: Sidecar::default(),
        jobs,
        algorithm: Some(AlgorithmRef {
            name: "workload-demand".to_string(),
            options: options.with("randomize", false),
        }),
    }
}

pub fn ensemble(name: &str, members: Vec<Member>) -> Ensemble {
    Ensemble {
        namespace: "default".to_string(),
        name: name.to_string(),
        members,
        check_seconds: 10,
        algorithm: None,
        created_at: 0,
        updated_at: 0,
        status_generation: 0,
    }
}

pub struct Fixture {
    pub store: StateStore,
    pub backend: RecordingBackend,
    pub sidecar: FakeSidecar,
    pub reconciler: Reconciler,
}

pub fn fixture(sidecar: FakeSidecar) -> Fixture {
    fixture_with(sidecar, AlgorithmRegistry::with_defaults())
}

pub fn fixture_with(sidecar: FakeSidecar, registry: AlgorithmRegistry) -> Fixture {
    let store = StateStore::open_in_memory().unwrap();
    let backend = RecordingBackend::new(store.clone());
    let reconciler = Reconciler::new(
        store.clone(),
        Arc::new(registry),
        Arc::new(backend.clone()),
        Arc::new(sidecar.clone()),
    );
    Fixture {
        store,
        backend,
        sidecar,
        reconciler,
    }
}

/// Register the lead broker address for a member, as the provisioner would.
pub fn register_endpoint(store: &StateStore, ensemble_id: &str, ordinal: usize, host: &str) {
    store
        .update_cluster(&cluster_key(ensemble_id, ordinal), |cluster| {
            cluster.endpoint = Some(host.to_string())
        })
        .unwrap();
}

/// Create the ensemble and run it through matrix init and member creation,
/// registering `10.0.0.{ordinal}` as each member's endpoint.
pub async fn ready(fx: &Fixture, ensemble: &Ensemble) -> String {
    let id = ensemble.id();
    fx.store.create_ensemble(ensemble).unwrap();
    assert_eq!(
        fx.reconciler.reconcile(&id).await.unwrap(),
        ensemble_controller::Outcome::Requeue
    );
    assert_eq!(
        fx.reconciler.reconcile(&id).await.unwrap(),
        ensemble_controller::Outcome::Requeue
    );
    for ordinal in 0..ensemble.members.len() {
        register_endpoint(&fx.store, &id, ordinal, &format!("10.0.0.{ordinal}"));
    }
    id
}

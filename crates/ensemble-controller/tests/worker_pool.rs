//! The controller's worker pool driving ensembles end to end.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::*;
use ensemble_algorithm::{Algorithm, AlgorithmRegistry, AlgorithmResult, Decision};
use ensemble_controller::{Controller, ControllerConfig};
use ensemble_state::{
    AlgorithmOptions, Ensemble, Job, Member, MemberCluster, MemberType, StateStore,
};
use tokio::sync::watch;

fn fast() -> ControllerConfig {
    ControllerConfig {
        workers: 2,
        retry_base: Duration::from_millis(10),
        retry_max: Duration::from_millis(50),
    }
}

/// Store the member cluster with a registered endpoint up front.
fn provisioned(store: &StateStore, ensemble: &Ensemble, ordinal: usize) {
    let spec = ensemble.members[ordinal].minicluster.clone().unwrap();
    store
        .put_cluster(&MemberCluster {
            ensemble_id: ensemble.id(),
            ordinal,
            name: ensemble.member_name(ordinal),
            size: spec.size,
            min_size: spec.min_size,
            max_size: spec.effective_max_size(),
            endpoint: Some(format!("10.0.0.{ordinal}")),
            created_at: 0,
            updated_at: 0,
        })
        .unwrap();
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn trigger_wakes_a_sleeping_ensemble() {
    let Fixture {
        store,
        backend,
        sidecar,
        reconciler,
    } = fixture(FakeSidecar::with_status(BUSY));

    let mut e = ensemble("hpc", vec![member(vec![Job::new("a", "echo a", 2, 1)], 1, 4, AlgorithmOptions::new())]);
    e.check_seconds = 3600;
    store.create_ensemble(&e).unwrap();
    provisioned(&store, &e, 0);

    let controller = Controller::new(reconciler, fast());
    let handle = controller.handle();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(controller.run(shutdown_rx));

    eventually("the submit", || sidecar.actions_named("submit").len() == 1).await;

    // The worker now sleeps for an hour; only a trigger moves it on.
    sidecar.set_status(IDLE);
    handle.trigger("default/hpc");
    eventually("the ensemble to be deleted", || {
        store.get_ensemble("default/hpc").unwrap().is_none()
    })
    .await;
    assert_eq!(backend.deletes(), vec!["default/hpc".to_string()]);

    shutdown_tx.send(true).unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn fixed_declaration_is_picked_up_on_trigger() {
    let Fixture {
        store,
        sidecar,
        reconciler,
        ..
    } = fixture(FakeSidecar::with_status(BUSY));

    let mut e = ensemble("hpc", vec![member(vec![], 1, 4, AlgorithmOptions::new())]);
    store.create_ensemble(&e).unwrap();

    let controller = Controller::new(reconciler, fast());
    let handle = controller.handle();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(controller.run(shutdown_rx));

    // Invalid declarations are not retried on their own.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(store.get_status("default/hpc").unwrap().jobs.is_empty());

    e.members[0].jobs = vec![Job::new("a", "echo a", 1, 1)];
    store.put_ensemble(&e).unwrap();
    provisioned(&store, &e, 0);
    handle.trigger("default/hpc");

    eventually("the submit", || sidecar.actions_named("submit").len() == 1).await;

    shutdown_tx.send(true).unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_stops_idle_controller() {
    let Fixture { reconciler, .. } = fixture(FakeSidecar::default());
    let controller = Controller::new(reconciler, fast());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(controller.run(shutdown_rx));

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

/// Panics on its first decision, then decides nothing.
struct PanicsOnce {
    calls: Arc<AtomicUsize>,
}

impl Algorithm for PanicsOnce {
    fn name(&self) -> &str {
        "panics-once"
    }

    fn description(&self) -> &str {
        "panics on the first decision"
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
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("decision blew up");
        }
        Ok(Decision::None)
    }
}

#[tokio::test]
async fn panicking_tick_does_not_orphan_the_ensemble() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = AlgorithmRegistry::with_defaults();
    registry.register(PanicsOnce {
        calls: calls.clone(),
    });
    let Fixture {
        store, reconciler, ..
    } = fixture_with(FakeSidecar::with_status(BUSY), registry);

    let mut m = member(vec![Job::new("a", "echo a", 0, 1)], 1, 4, AlgorithmOptions::new());
    if let Some(algorithm) = m.algorithm.as_mut() {
        algorithm.name = "panics-once".to_string();
    }
    let mut e = ensemble("hpc", vec![m]);
    e.check_seconds = 3600;
    store.create_ensemble(&e).unwrap();
    provisioned(&store, &e, 0);

    let controller = Controller::new(reconciler, fast());
    let handle = controller.handle();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(controller.run(shutdown_rx));

    eventually("the panicking tick", || calls.load(Ordering::SeqCst) == 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    handle.trigger("default/hpc");
    eventually("a tick after the panic", || calls.load(Ordering::SeqCst) == 2).await;

    shutdown_tx.send(true).unwrap();
    task.await.unwrap().unwrap();
}

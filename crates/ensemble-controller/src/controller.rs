//! Controller — the per-ensemble worker pool.
//!
//! Every ensemble gets its own task slot, so at most one tick per ensemble
//! is in flight. A semaphore bounds how many ensembles reconcile at once.
//! Triggers arrive through a [`ControllerHandle`]; a trigger for an
//! ensemble whose tick is running wakes it again right after that tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex, Notify, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::ControllerResult;
use crate::reconciler::{Outcome, Reconciler};

/// Worker pool settings.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Ensembles reconciled concurrently.
    pub workers: usize,
    /// First retry delay after a failed tick.
    pub retry_base: Duration,
    /// Ceiling for the retry delay.
    pub retry_max: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            retry_base: Duration::from_millis(100),
            retry_max: Duration::from_secs(30),
        }
    }
}

impl ControllerConfig {
    /// Exponential backoff for the given number of consecutive failures.
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.retry_base
            .saturating_mul(1u32 << exponent)
            .min(self.retry_max)
    }
}

/// Cheap, cloneable handle for triggering reconciles.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<String>,
}

impl ControllerHandle {
    /// A handle and the receiving end a [`Controller`] consumes.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Ask for a tick of the given ensemble.
    pub fn trigger(&self, id: &str) {
        if self.tx.send(id.to_string()).is_err() {
            warn!(ensemble = %id, "controller is not running, trigger dropped");
        }
    }
}

/// Wake-up signal per ensemble with a live worker task.
type Slots = Arc<Mutex<HashMap<String, Arc<Notify>>>>;

pub struct Controller {
    reconciler: Arc<Reconciler>,
    config: ControllerConfig,
    semaphore: Arc<Semaphore>,
    slots: Slots,
    handle: ControllerHandle,
    triggers: mpsc::UnboundedReceiver<String>,
}

impl Controller {
    pub fn new(reconciler: Reconciler, config: ControllerConfig) -> Self {
        let (handle, triggers) = ControllerHandle::channel();
        let semaphore = Arc::new(Semaphore::new(config.workers.max(1)));
        Self {
            reconciler: Arc::new(reconciler),
            config,
            semaphore,
            slots: Arc::new(Mutex::new(HashMap::new())),
            handle,
            triggers,
        }
    }

    pub fn handle(&self) -> ControllerHandle {
        self.handle.clone()
    }

    /// Enqueue every stored ensemble, then dispatch triggers until shutdown.
    /// Waits for in-flight ticks to finish before returning.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> ControllerResult<()> {
        let mut workers = JoinSet::new();

        let ensembles = self.reconciler.store().list_ensembles()?;
        info!(
            ensembles = ensembles.len(),
            workers = self.config.workers,
            "controller started"
        );
        for ensemble in &ensembles {
            self.dispatch(&ensemble.id(), &mut workers, &shutdown).await;
        }

        loop {
            tokio::select! {
                Some(id) = self.triggers.recv() => {
                    self.dispatch(&id, &mut workers, &shutdown).await;
                }
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "worker task failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("controller shutting down");
                    break;
                }
            }
        }

        while workers.join_next().await.is_some() {}
        info!("controller stopped");
        Ok(())
    }

    /// Wake the ensemble's worker, or start one if it has none.
    async fn dispatch(
        &self,
        id: &str,
        workers: &mut JoinSet<()>,
        shutdown: &watch::Receiver<bool>,
    ) {
        let mut slots = self.slots.lock().await;
        if let Some(notify) = slots.get(id) {
            debug!(ensemble = %id, "worker running, waking it");
            notify.notify_one();
            return;
        }

        let notify = Arc::new(Notify::new());
        slots.insert(id.to_string(), notify.clone());
        workers.spawn(run_worker(
            id.to_string(),
            notify,
            self.reconciler.clone(),
            self.config.clone(),
            self.semaphore.clone(),
            self.slots.clone(),
            shutdown.clone(),
        ));
        debug!(ensemble = %id, "worker started");
    }
}

/// Tick one ensemble until it is done and nothing asked for it again.
async fn run_worker(
    id: String,
    notify: Arc<Notify>,
    reconciler: Arc<Reconciler>,
    config: ControllerConfig,
    semaphore: Arc<Semaphore>,
    slots: Slots,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut failures: u32 = 0;

    loop {
        let result = {
            let Ok(_permit) = semaphore.acquire().await else {
                break;
            };
            let reconciler = reconciler.clone();
            let tick_id = id.clone();
            tokio::spawn(async move { reconciler.reconcile(&tick_id).await }).await
        };

        let wait = match result {
            Ok(Ok(Outcome::Requeue)) => {
                failures = 0;
                Some(Duration::ZERO)
            }
            Ok(Ok(Outcome::RequeueAfter(delay))) => {
                failures = 0;
                Some(delay)
            }
            Ok(Ok(Outcome::Done)) => None,
            Ok(Err(e)) if e.requeue() => {
                failures = failures.saturating_add(1);
                let delay = config.backoff(failures);
                if e.is_transient() {
                    debug!(ensemble = %id, error = %e, failures, ?delay, "tick deferred");
                } else {
                    warn!(ensemble = %id, error = %e, failures, ?delay, "tick failed, retrying");
                }
                Some(delay)
            }
            Ok(Err(e)) => {
                error!(ensemble = %id, error = %e, "tick failed, waiting for a change");
                None
            }
            // Panicked tick.
            Err(e) => {
                error!(ensemble = %id, error = %e, "tick panicked, waiting for a trigger");
                None
            }
        };

        match wait {
            Some(delay) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = notify.notified() => {
                        debug!(ensemble = %id, "woken early");
                    }
                    _ = shutdown.changed() => break,
                }
            }
            None => {
                // Dispatch notifies under this lock.
                let mut guard = slots.lock().await;
                let pending = tokio::select! {
                    biased;
                    _ = notify.notified() => true,
                    _ = std::future::ready(()) => false,
                };
                if !pending {
                    guard.remove(&id);
                    debug!(ensemble = %id, "worker finished");
                    return;
                }
                failures = 0;
            }
        }

        if *shutdown.borrow() {
            break;
        }
    }

    slots.lock().await.remove(&id);
}

//! Wiring of the controller and the API server.

use std::sync::Arc;

use axum::Router;
use ensemble_algorithm::AlgorithmRegistry;
use ensemble_api::{ApiState, build_router};
use ensemble_client::Connector;
use ensemble_controller::{ClusterBackend, Controller, ControllerConfig, Reconciler};
use ensemble_state::StateStore;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// A controller plus the router that feeds it.
pub struct Daemon {
    controller: Controller,
    router: Router,
}

impl Daemon {
    pub fn new(
        store: StateStore,
        backend: Arc<dyn ClusterBackend>,
        connector: Arc<dyn Connector>,
        config: ControllerConfig,
    ) -> Self {
        let registry = Arc::new(AlgorithmRegistry::with_defaults());
        let algorithms: Vec<String> = registry.list().into_iter().map(|a| a.name).collect();
        info!(?algorithms, "algorithm registry ready");

        let reconciler = Reconciler::new(store.clone(), registry.clone(), backend, connector);
        let controller = Controller::new(reconciler, config);
        let router = build_router(ApiState {
            store,
            registry,
            controller: controller.handle(),
        });

        Self { controller, router }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the controller and serve the API until `shutdown` flips to true.
    pub async fn serve(self, listener: TcpListener, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let controller_handle = tokio::spawn(self.controller.run(shutdown.clone()));

        let addr = listener.local_addr()?;
        info!(%addr, "API server starting");

        let mut server_shutdown = shutdown;
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                while !*server_shutdown.borrow_and_update() {
                    if server_shutdown.changed().await.is_err() {
                        break;
                    }
                }
                info!("API server shutting down");
            })
            .await?;

        match controller_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "controller stopped with an error"),
            Err(e) => error!(error = %e, "controller task failed"),
        }
        Ok(())
    }
}

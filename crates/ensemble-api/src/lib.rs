//! ensemble-api — REST API for ensembles.
//!
//! Ensembles are created, inspected, and deleted here. The external
//! provisioner registers each member's sidecar address through the
//! endpoint route. Every change that affects reconciliation triggers a
//! tick through the controller handle.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/ensembles` | List all ensembles |
//! | POST | `/api/v1/ensembles` | Create an ensemble |
//! | GET | `/api/v1/ensembles/{namespace}/{name}` | Get ensemble details |
//! | DELETE | `/api/v1/ensembles/{namespace}/{name}` | Delete an ensemble |
//! | GET | `/api/v1/ensembles/{namespace}/{name}/jobs` | Job matrix |
//! | POST | `/api/v1/ensembles/{namespace}/{name}/reconcile` | Trigger a tick |
//! | GET | `/api/v1/ensembles/{namespace}/{name}/members` | Member clusters |
//! | PUT | `/api/v1/ensembles/{namespace}/{name}/members/{ordinal}/endpoint` | Register a sidecar address |
//! | GET | `/api/v1/algorithms` | List algorithms |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use ensemble_algorithm::AlgorithmRegistry;
use ensemble_controller::ControllerHandle;
use ensemble_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub registry: Arc<AlgorithmRegistry>,
    pub controller: ControllerHandle,
}

/// Build the API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/ensembles", get(handlers::list_ensembles).post(handlers::create_ensemble))
        .route(
            "/ensembles/{namespace}/{name}",
            get(handlers::get_ensemble).delete(handlers::delete_ensemble),
        )
        .route("/ensembles/{namespace}/{name}/jobs", get(handlers::get_jobs))
        .route("/ensembles/{namespace}/{name}/reconcile", post(handlers::trigger_reconcile))
        .route("/ensembles/{namespace}/{name}/members", get(handlers::list_members))
        .route(
            "/ensembles/{namespace}/{name}/members/{ordinal}/endpoint",
            put(handlers::register_endpoint),
        )
        .route("/algorithms", get(handlers::list_algorithms))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}

//! REST API handlers.
//!
//! Each handler reads/writes via `StateStore` and returns JSON responses.
//! Handlers that change what the controller acts on trigger a tick.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::{info, warn};

use ensemble_state::*;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn ensemble_id(namespace: &str, name: &str) -> EnsembleId {
    format!("{namespace}/{name}")
}

// ── Ensembles ──────────────────────────────────────────────────

/// GET /api/v1/ensembles
pub async fn list_ensembles(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_ensembles() {
        Ok(ensembles) => ApiResponse::ok(ensembles).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/ensembles/{namespace}/{name}
pub async fn get_ensemble(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.get_ensemble(&ensemble_id(&namespace, &name)) {
        Ok(Some(ensemble)) => ApiResponse::ok(ensemble).into_response(),
        Ok(None) => error_response("ensemble not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// POST /api/v1/ensembles
pub async fn create_ensemble(
    State(state): State<ApiState>,
    Json(ensemble): Json<Ensemble>,
) -> impl IntoResponse {
    if let Err(e) = ensemble.validate() {
        return error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response();
    }
    for member in &ensemble.members {
        if member.member_type() == MemberType::Unknown {
            continue;
        }
        let algorithm = ensemble.algorithm_for(member);
        if let Err(e) = state.registry.check(&algorithm, member) {
            return error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response();
        }
    }

    match state.store.create_ensemble(&ensemble) {
        Ok(created) => {
            info!(ensemble = %created.id(), members = created.members.len(), "ensemble created");
            state.controller.trigger(&created.id());
            (StatusCode::CREATED, ApiResponse::ok(created)).into_response()
        }
        Err(StateError::AlreadyExists(id)) => {
            error_response(&format!("ensemble {id} already exists"), StatusCode::CONFLICT)
                .into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// DELETE /api/v1/ensembles/{namespace}/{name}
pub async fn delete_ensemble(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    let id = ensemble_id(&namespace, &name);
    match state.store.delete_ensemble(&id) {
        Ok(true) => {
            info!(ensemble = %id, "ensemble deleted");
            // Lets a sleeping worker notice the deletion and exit.
            state.controller.trigger(&id);
            ApiResponse::ok("deleted").into_response()
        }
        Ok(false) => error_response("ensemble not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Status ─────────────────────────────────────────────────────

/// GET /api/v1/ensembles/{namespace}/{name}/jobs
pub async fn get_jobs(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    let id = ensemble_id(&namespace, &name);
    match state.store.get_ensemble(&id) {
        Ok(Some(_)) => {}
        Ok(None) => return error_response("ensemble not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response();
        }
    }
    match state.store.get_status(&id) {
        Ok(status) => ApiResponse::ok(status).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// POST /api/v1/ensembles/{namespace}/{name}/reconcile
pub async fn trigger_reconcile(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    let id = ensemble_id(&namespace, &name);
    match state.store.get_ensemble(&id) {
        Ok(Some(_)) => {
            state.controller.trigger(&id);
            (
                StatusCode::ACCEPTED,
                ApiResponse::ok(serde_json::json!({
                    "ensemble": id,
                    "status": "triggered"
                })),
            )
                .into_response()
        }
        Ok(None) => error_response("ensemble not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Members ────────────────────────────────────────────────────

/// GET /api/v1/ensembles/{namespace}/{name}/members
pub async fn list_members(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.list_clusters_for_ensemble(&ensemble_id(&namespace, &name)) {
        Ok(clusters) => ApiResponse::ok(clusters).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// Endpoint registration body.
#[derive(serde::Deserialize)]
pub struct EndpointRequest {
    pub endpoint: String,
}

/// PUT /api/v1/ensembles/{namespace}/{name}/members/{ordinal}/endpoint
pub async fn register_endpoint(
    State(state): State<ApiState>,
    Path((namespace, name, ordinal)): Path<(String, String, usize)>,
    Json(req): Json<EndpointRequest>,
) -> impl IntoResponse {
    let endpoint = req.endpoint.trim().to_string();
    if endpoint.is_empty() {
        return error_response("endpoint must not be empty", StatusCode::BAD_REQUEST).into_response();
    }

    let id = ensemble_id(&namespace, &name);
    let result = state.store.update_cluster(&cluster_key(&id, ordinal), |cluster| {
        cluster.endpoint = Some(endpoint.clone());
    });
    match result {
        Ok(cluster) => {
            info!(ensemble = %id, member = ordinal, %endpoint, "member endpoint registered");
            state.controller.trigger(&id);
            ApiResponse::ok(cluster).into_response()
        }
        Err(StateError::NotFound(key)) => {
            warn!(ensemble = %id, member = ordinal, "endpoint for unknown member cluster");
            error_response(&format!("member cluster {key} not found"), StatusCode::NOT_FOUND)
                .into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Algorithms ─────────────────────────────────────────────────

/// GET /api/v1/algorithms
pub async fn list_algorithms(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.registry.list())
}

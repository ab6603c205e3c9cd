//! Controller error types.
//!
//! Errors fall into four groups that decide what the worker does next:
//!
//! | Group | Variants | Worker |
//! |---|---|---|
//! | validation | `Validation` | stop until the ensemble changes |
//! | transient | `EndpointPending`, `ClusterNotFound`, `Transport` | retry with backoff |
//! | decision | `Algorithm` | retry with backoff |
//! | apply | `Apply`, `State` | retry with backoff |

use ensemble_algorithm::AlgorithmError;
use ensemble_client::ClientError;
use ensemble_state::{StateError, ValidationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("ensemble {ensemble} did not validate: {source}")]
    Validation {
        ensemble: String,
        #[source]
        source: ValidationError,
    },

    #[error("member cluster {0} has no endpoint yet")]
    EndpointPending(String),

    #[error("member cluster not found: {0}")]
    ClusterNotFound(String),

    #[error("transport error: {0}")]
    Transport(#[from] ClientError),

    #[error("algorithm error: {0}")]
    Algorithm(#[from] AlgorithmError),

    #[error("failed to apply {action}: {reason}")]
    Apply { action: String, reason: String },

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

impl ControllerError {
    /// Whether the worker should retry the ensemble after this error.
    pub fn requeue(&self) -> bool {
        !matches!(self, ControllerError::Validation { .. })
    }

    /// Transient conditions expected while a member is coming up.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ControllerError::EndpointPending(_)
                | ControllerError::ClusterNotFound(_)
                | ControllerError::Transport(_)
        )
    }
}

pub type ControllerResult<T> = Result<T, ControllerError>;

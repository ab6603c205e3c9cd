//! Algorithm error types.

use ensemble_state::MemberType;
use thiserror::Error;

/// Errors raised while resolving, checking, or running an algorithm.
#[derive(Debug, Error)]
pub enum AlgorithmError {
    #[error("did not find algorithm named {0}")]
    NotFound(String),

    #[error("algorithm {algorithm} is not supported for member type {member_type}")]
    UnsupportedMemberType {
        algorithm: String,
        member_type: MemberType,
    },

    #[error("algorithm {algorithm} options are not valid: {reason}")]
    InvalidOptions { algorithm: String, reason: String },

    #[error("malformed telemetry payload: {0}")]
    MalformedTelemetry(String),

    #[error("failed to encode submission payload: {0}")]
    Encode(String),
}

pub type AlgorithmResult<T> = Result<T, AlgorithmError>;

//! Transport error types.

use thiserror::Error;

/// Errors talking to a member sidecar. All of them are transient from the
/// controller's point of view: the tick is retried.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("unable to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("request to {endpoint} failed ({code:?}): {message}")]
    Rpc {
        endpoint: String,
        code: tonic::Code,
        message: String,
    },

    #[error("sidecar at {endpoint} reported an error for {request}")]
    Rejected { endpoint: String, request: String },
}

impl ClientError {
    pub(crate) fn from_status(endpoint: &str, status: tonic::Status) -> Self {
        let timed_out = status.code() == tonic::Code::DeadlineExceeded
            || (status.code() == tonic::Code::Cancelled && status.message().contains("Timeout"));
        if timed_out {
            return ClientError::Timeout {
                endpoint: endpoint.to_string(),
            };
        }
        ClientError::Rpc {
            endpoint: endpoint.to_string(),
            code: status.code(),
            message: status.message().to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout { .. })
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

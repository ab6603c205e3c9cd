//! Member sidecar client.

use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::proto;
use crate::proto::ensemble_operator_client::EnsembleOperatorClient;
use crate::proto::response::ResultType;

/// Default deadline for a single sidecar request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// A successful sidecar response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub payload: String,
}

/// The two calls a member sidecar serves.
#[async_trait]
pub trait MemberClient: Send + Sync {
    /// Fetch the member's telemetry as a JSON payload.
    async fn request_status(&self, member_type: &str, algorithm: &str) -> ClientResult<Reply>;

    /// Ask the member to perform `action` with `payload`.
    async fn request_action(
        &self,
        member_type: &str,
        algorithm: &str,
        action: &str,
        payload: &str,
    ) -> ClientResult<Reply>;
}

/// Opens a [`MemberClient`] to a member's sidecar.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> ClientResult<Box<dyn MemberClient>>;
}

/// gRPC client for one member sidecar.
#[derive(Debug, Clone)]
pub struct GrpcMemberClient {
    endpoint: String,
    inner: EnsembleOperatorClient<Channel>,
}

impl GrpcMemberClient {
    /// Connect to `host:port`. Both the connection attempt and every
    /// subsequent request are bounded by `timeout`.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> ClientResult<Self> {
        if host.is_empty() {
            return Err(ClientError::InvalidEndpoint {
                endpoint: format!(":{port}"),
                reason: "host is required".to_string(),
            });
        }
        let endpoint = format!("{host}:{port}");
        let channel = Endpoint::from_shared(format!("http://{endpoint}"))
            .map_err(|e| ClientError::InvalidEndpoint {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?
            .connect_timeout(timeout)
            .timeout(timeout)
            .connect()
            .await
            .map_err(|e| ClientError::Connect {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;

        debug!(%endpoint, ?timeout, "connected to member sidecar");
        Ok(Self {
            endpoint,
            inner: EnsembleOperatorClient::new(channel),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn check_response(&self, request: &str, response: proto::Response) -> ClientResult<Reply> {
        if response.status() == ResultType::Error {
            return Err(ClientError::Rejected {
                endpoint: self.endpoint.clone(),
                request: request.to_string(),
            });
        }
        Ok(Reply {
            payload: response.payload,
        })
    }
}

#[async_trait]
impl MemberClient for GrpcMemberClient {
    async fn request_status(&self, member_type: &str, algorithm: &str) -> ClientResult<Reply> {
        let mut client = self.inner.clone();
        let response = client
            .request_status(proto::StatusRequest {
                member: member_type.to_string(),
                algorithm: algorithm.to_string(),
            })
            .await
            .map_err(|status| ClientError::from_status(&self.endpoint, status))?
            .into_inner();

        debug!(endpoint = %self.endpoint, status = ?response.status(), "status response");
        self.check_response("status", response)
    }

    async fn request_action(
        &self,
        member_type: &str,
        algorithm: &str,
        action: &str,
        payload: &str,
    ) -> ClientResult<Reply> {
        let mut client = self.inner.clone();
        let response = client
            .request_action(proto::ActionRequest {
                member: member_type.to_string(),
                algorithm: algorithm.to_string(),
                payload: payload.to_string(),
                action: action.to_string(),
            })
            .await
            .map_err(|status| ClientError::from_status(&self.endpoint, status))?
            .into_inner();

        debug!(endpoint = %self.endpoint, %action, status = ?response.status(), "action response");
        self.check_response(action, response)
    }
}

/// Opens [`GrpcMemberClient`]s with a fixed per-request timeout.
#[derive(Debug, Clone)]
pub struct GrpcConnector {
    timeout: Duration,
}

impl GrpcConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for GrpcConnector {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

#[async_trait]
impl Connector for GrpcConnector {
    async fn connect(&self, host: &str, port: u16) -> ClientResult<Box<dyn MemberClient>> {
        let client = GrpcMemberClient::connect(host, port, self.timeout).await?;
        Ok(Box::new(client))
    }
}

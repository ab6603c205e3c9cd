//! ensemble-client — the transport between the controller and a member's
//! sidecar.
//!
//! The sidecar serves two calls over gRPC:
//!
//! ```text
//! RequestStatus(member, algorithm)                   → {status, payload = telemetry JSON}
//! RequestAction(member, algorithm, action, payload)  → {status, payload}
//! ```
//!
//! Every request carries a short deadline. The controller talks to members
//! only through the [`MemberClient`] and [`Connector`] traits so it can be
//! exercised without a network.

pub mod client;
pub mod error;

/// Generated protobuf types and gRPC service stubs.
pub mod proto {
    tonic::include_proto!("convergedcomputing.org.grpc.v1");
}

pub use client::{Connector, GrpcConnector, GrpcMemberClient, MemberClient, Reply};
pub use error::{ClientError, ClientResult};

//! Error types for the ensemble state store and declaration validation.

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),
}

/// Structural violations of an ensemble declaration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid {field} {value:?}: must be a DNS-1123 label (lowercase alphanumerics and '-', at most 63 characters)")]
    InvalidName { field: &'static str, value: String },

    #[error("ensemble must have at least one member")]
    NoMembers,

    #[error("ensemble member in index {0} must have at least one job definition")]
    NoJobs(usize),

    #[error("member {member} job {job}: node count {nodes} cannot be greater than task count {tasks}")]
    NodesExceedTasks {
        member: usize,
        job: String,
        nodes: u32,
        tasks: u32,
    },

    #[error("member {member} job {job}: node requirement {nodes} exceeds max size {max_size}")]
    NodesExceedMaxSize {
        member: usize,
        job: String,
        nodes: u32,
        max_size: u32,
    },

    #[error("member {0}: cluster must have a size and max size of at least 1, and a min size of at least 1")]
    InvalidSize(usize),

    #[error("member {0}: min size must not be larger than max size")]
    MinExceedsMax(usize),

    #[error("member {0}: desired size must be between min and max size")]
    SizeOutOfBounds(usize),

    #[error("member {member}: unsupported sidecar image {image}")]
    UnsupportedSidecar { member: usize, image: String },

    #[error("check interval must be at least one second")]
    InvalidCheckInterval,

    #[error("no members of the ensemble are of a known type")]
    NoKnownMembers,
}

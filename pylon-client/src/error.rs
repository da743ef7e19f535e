//! Error types for the pool client

use thiserror::Error;
use tonic::{Code, Status};

use crate::tls::TlsError;

/// Result type alias for client setup operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// A remote call that finished with a non-OK status
///
/// This is the only error a remote procedure reports to its caller; the
/// transport's status model is collapsed into a code and a detail string.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("rpc failed with status {code:?}: {detail}")]
pub struct RpcFailure {
    /// gRPC status code
    pub code: Code,
    /// Human-readable detail from the server or transport
    pub detail: String,
}

impl RpcFailure {
    pub fn new(code: Code, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }

    /// Check if the pool was unreachable rather than refusing the call
    pub fn is_unavailable(&self) -> bool {
        matches!(self.code, Code::Unavailable | Code::DeadlineExceeded)
    }
}

impl From<Status> for RpcFailure {
    fn from(status: Status) -> Self {
        Self::new(status.code(), status.message())
    }
}

/// Errors raised while building a connection to the pool
#[derive(Debug, Error)]
pub enum ClientError {
    /// Endpoint or channel could not be built
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// TLS material could not be read
    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),
}

//! Pylon Pool Client
//!
//! A gRPC client for the pool's `PoolConnector` service.
//!
//! Every call is routed through [`unwrap_rpc`], so callers see either the
//! response or an [`RpcFailure`]. The worker node programs against the
//! [`PoolConnector`] trait, which [`PoolClient`] implements.
//!
//! # Example
//!
//! ```no_run
//! use pylon_client::{PoolClient, PoolConnector, PoolOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = PoolClient::connect_lazy(&PoolOptions::new("127.0.0.1", 5000), None)?;
//!     let jobs = client.pending_jobs("openagents/transformersjs").await?;
//!     println!("{} pending job(s)", jobs.len());
//!     Ok(())
//! }
//! ```

mod announcements;
mod connector;
pub mod error;
mod jobs;
pub mod proto;
pub mod tls;
mod unwrap;

// Re-export commonly used types
pub use connector::PoolConnector;
pub use error::{ClientError, Result, RpcFailure};
pub use tls::{TlsMaterial, TlsPaths};
pub use tonic::Code;
pub use unwrap::unwrap_rpc;

use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tracing::info;

use crate::proto::pool_connector_client::PoolConnectorClient;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the pool listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    pub host: String,
    pub port: u16,
}

impl PoolOptions {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Endpoint URL for the given transport security
    pub fn to_url_string(&self, secure: bool) -> String {
        let scheme = if secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

/// gRPC client for the pool
///
/// Wraps the generated `PoolConnectorClient`. Cloning is cheap: clones share
/// the underlying channel.
#[derive(Debug, Clone)]
pub struct PoolClient {
    inner: PoolConnectorClient<Channel>,
    endpoint: String,
}

impl PoolClient {
    /// Create a client whose connection is established on first use
    ///
    /// With `tls` set the channel uses mutual TLS, otherwise plaintext.
    /// Must be called from within a tokio runtime.
    pub fn connect_lazy(options: &PoolOptions, tls: Option<&TlsMaterial>) -> Result<Self> {
        let url = options.to_url_string(tls.is_some());
        let mut endpoint = Endpoint::from_shared(url.clone())?.connect_timeout(CONNECT_TIMEOUT);

        if let Some(tls) = tls {
            endpoint = endpoint.tls_config(tls.client_tls_config(&options.host))?;
        }

        info!("Pool client targeting {}", url);
        Ok(Self::with_channel(url, endpoint.connect_lazy()))
    }

    /// Create a client over an existing channel
    pub fn with_channel(endpoint: impl Into<String>, channel: Channel) -> Self {
        Self {
            inner: PoolConnectorClient::new(channel),
            endpoint: endpoint.into(),
        }
    }

    /// Get the URL of the pool
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Handle for issuing one call
    ///
    /// Generated methods take `&mut self`, so each call works on its own
    /// clone of the channel handle.
    fn rpc(&self) -> PoolConnectorClient<Channel> {
        self.inner.clone()
    }
}

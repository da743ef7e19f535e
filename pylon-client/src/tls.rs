//! TLS material for the pool connection
//!
//! The node talks to the pool over mutual TLS when a CA certificate, a client
//! certificate and a client key are all available. If any of the three is
//! missing the connection falls back to plaintext.

use std::path::{Path, PathBuf};

use tokio::fs;
use tonic::transport::{Certificate, ClientTlsConfig, Identity};
use tracing::warn;

/// Error type for TLS material that exists but cannot be used
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Paths to the PEM files used for mutual TLS
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsPaths {
    /// CA certificate used to verify the pool
    pub ca_cert: Option<PathBuf>,
    /// Certificate presented to the pool
    pub client_cert: Option<PathBuf>,
    /// Private key matching `client_cert`
    pub client_key: Option<PathBuf>,
}

impl TlsPaths {
    /// Names of the files that are unset or do not exist
    pub fn missing(&self) -> Vec<&'static str> {
        let usable = |path: &Option<PathBuf>| path.as_deref().is_some_and(Path::exists);

        let mut missing = Vec::new();
        if !usable(&self.ca_cert) {
            missing.push("CA certificate");
        }
        if !usable(&self.client_cert) {
            missing.push("client certificate");
        }
        if !usable(&self.client_key) {
            missing.push("client key");
        }
        missing
    }
}

/// Loaded TLS materials ready for use with tonic
#[derive(Clone)]
pub struct TlsMaterial {
    identity: Identity,
    ca_cert: Certificate,
}

impl TlsMaterial {
    /// Loads the CA certificate and client identity.
    ///
    /// Returns `Ok(None)` when any of the three files is unset or absent,
    /// meaning the connection must be insecure.
    ///
    /// # Errors
    ///
    /// Returns an error if a file exists but cannot be read.
    pub async fn load(paths: &TlsPaths) -> Result<Option<Self>, TlsError> {
        let (Some(ca_path), Some(cert_path), Some(key_path)) =
            (&paths.ca_cert, &paths.client_cert, &paths.client_key)
        else {
            warn!("TLS material not configured, using an insecure connection");
            return Ok(None);
        };

        let missing = paths.missing();
        if !missing.is_empty() {
            warn!(
                "TLS material missing ({}), using an insecure connection",
                missing.join(", ")
            );
            return Ok(None);
        }

        let ca_pem = read(ca_path).await?;
        let cert_pem = read(cert_path).await?;
        let key_pem = read(key_path).await?;

        Ok(Some(Self {
            identity: Identity::from_pem(cert_pem, key_pem),
            ca_cert: Certificate::from_pem(ca_pem),
        }))
    }

    /// Client TLS config presenting this node's identity
    ///
    /// The pool certificate is verified against the CA and `domain`.
    pub fn client_tls_config(&self, domain: &str) -> ClientTlsConfig {
        ClientTlsConfig::new()
            .domain_name(domain)
            .ca_certificate(self.ca_cert.clone())
            .identity(self.identity.clone())
    }
}

async fn read(path: &Path) -> Result<Vec<u8>, TlsError> {
    fs::read(path).await.map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })
}

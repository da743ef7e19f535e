//! Node configuration
//!
//! Every setting comes from an environment variable with a default, so a
//! node started with an empty environment talks plaintext to a pool on
//! `127.0.0.1:5000` and accepts any pipeline and model.

use anyhow::{Context, Result, bail};
use pylon_client::{PoolOptions, TlsPaths};
use pylon_core::domain::announcement::NodeAnnouncement;
use pylon_core::domain::capability::{AllowList, CapabilityAllowList};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::LoadOptions;

/// Node configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Identifier used to correlate this node's logs
    pub node_id: String,

    /// Where the pool listens
    pub pool: PoolOptions,

    /// PEM files for mutual TLS with the pool
    pub tls: TlsPaths,

    /// Filter sent with every poll
    pub run_on: String,

    /// Pipelines this node accepts
    pub supported_pipelines: AllowList,

    /// Models this node accepts
    pub supported_models: AllowList,

    /// How long an unused pipeline instance stays loaded
    pub instance_keep_alive: Duration,

    /// Longest wait between two lease checks
    pub announce_timeout: Duration,

    /// Load quantized weights
    pub quantize: bool,

    /// Identity announced to the pool
    pub announcement: NodeAnnouncement,

    /// How often to poll the pool for pending jobs
    pub poll_interval: Duration,

    /// How often to look for idle pipeline instances
    pub eviction_interval: Duration,

    /// Max jobs running at once
    pub max_parallel_jobs: usize,

    /// Command line of the pipeline runtime process
    pub pipeline_runtime: String,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Recognised variables (all optional):
    /// - NODE_ID (default: random UUID)
    /// - POOL_ADDRESS, POOL_PORT (default: 127.0.0.1, 5000)
    /// - POOL_CA_CRT, POOL_CLIENT_CRT, POOL_CLIENT_KEY
    /// - RUN_ON (default: openagents/transformersjs)
    /// - SUPPORTED_PIPELINES, SUPPORTED_MODELS (comma-separated, default: *)
    /// - INSTANCE_KEEP_ALIVE_TIMEOUT (ms, default: 600000)
    /// - ANNOUNCE_TIMEOUT (ms, default: 300000)
    /// - QUANTIZE (default: true)
    /// - ICON_URL, NAME, DESCRIPTION
    /// - POLL_INTERVAL (ms, default: 10)
    /// - EVICTION_INTERVAL (ms, default: 1000)
    /// - MAX_PARALLEL_JOBS (default: 16)
    /// - PIPELINE_RUNTIME (default: pylon-runtime)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from an arbitrary variable source
    ///
    /// Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.is_empty());
        let millis = |key: &str, default: u64| -> Result<Duration> {
            parsed(var(key), key, default).map(Duration::from_millis)
        };
        let path = |key: &str| var(key).map(PathBuf::from);

        let defaults = Self::default();

        Ok(Self {
            node_id: var("NODE_ID").unwrap_or(defaults.node_id),
            pool: PoolOptions::new(
                var("POOL_ADDRESS").unwrap_or(defaults.pool.host),
                parsed(var("POOL_PORT"), "POOL_PORT", defaults.pool.port)?,
            ),
            tls: TlsPaths {
                ca_cert: path("POOL_CA_CRT"),
                client_cert: path("POOL_CLIENT_CRT"),
                client_key: path("POOL_CLIENT_KEY"),
            },
            run_on: var("RUN_ON").unwrap_or(defaults.run_on),
            supported_pipelines: var("SUPPORTED_PIPELINES")
                .map(|raw| AllowList::parse(&raw))
                .unwrap_or_default(),
            supported_models: var("SUPPORTED_MODELS")
                .map(|raw| AllowList::parse(&raw))
                .unwrap_or_default(),
            instance_keep_alive: millis("INSTANCE_KEEP_ALIVE_TIMEOUT", 600_000)?,
            announce_timeout: millis("ANNOUNCE_TIMEOUT", 300_000)?,
            quantize: var("QUANTIZE").is_none_or(|value| value == "true"),
            announcement: NodeAnnouncement {
                icon_url: var("ICON_URL").unwrap_or(defaults.announcement.icon_url),
                name: var("NAME").unwrap_or(defaults.announcement.name),
                description: var("DESCRIPTION").unwrap_or(defaults.announcement.description),
            },
            poll_interval: millis("POLL_INTERVAL", 10)?,
            eviction_interval: millis("EVICTION_INTERVAL", 1_000)?,
            max_parallel_jobs: parsed(
                var("MAX_PARALLEL_JOBS"),
                "MAX_PARALLEL_JOBS",
                defaults.max_parallel_jobs,
            )?,
            pipeline_runtime: var("PIPELINE_RUNTIME").unwrap_or(defaults.pipeline_runtime),
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.pool.host.is_empty() {
            bail!("pool address cannot be empty");
        }

        if self.pool.port == 0 {
            bail!("pool port must be greater than 0");
        }

        if self.run_on.is_empty() {
            bail!("run_on cannot be empty");
        }

        if self.poll_interval.is_zero() {
            bail!("poll_interval must be greater than 0");
        }

        if self.eviction_interval.is_zero() {
            bail!("eviction_interval must be greater than 0");
        }

        if self.announce_timeout.is_zero() {
            bail!("announce_timeout must be greater than 0");
        }

        if self.max_parallel_jobs == 0 {
            bail!("max_parallel_jobs must be greater than 0");
        }

        if self.pipeline_runtime.trim().is_empty() {
            bail!("pipeline_runtime cannot be empty");
        }

        Ok(())
    }

    /// Pairs this node accepts
    pub fn allow_list(&self) -> CapabilityAllowList {
        CapabilityAllowList::new(
            self.supported_pipelines.clone(),
            self.supported_models.clone(),
        )
    }

    /// Options forwarded to every instance load
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            quantized: self.quantize,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: uuid::Uuid::new_v4().to_string(),
            pool: PoolOptions::new("127.0.0.1", 5000),
            tls: TlsPaths::default(),
            run_on: "openagents/transformersjs".to_string(),
            supported_pipelines: AllowList::Any,
            supported_models: AllowList::Any,
            instance_keep_alive: Duration::from_millis(600_000),
            announce_timeout: Duration::from_millis(300_000),
            quantize: true,
            announcement: NodeAnnouncement {
                icon_url: String::new(),
                name: "Pylon Node".to_string(),
                description: "A node that runs machine learning pipelines".to_string(),
            },
            poll_interval: Duration::from_millis(10),
            eviction_interval: Duration::from_millis(1_000),
            max_parallel_jobs: 16,
            pipeline_runtime: "pylon-runtime".to_string(),
        }
    }
}

fn parsed<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", key, raw)),
        None => Ok(default),
    }
}

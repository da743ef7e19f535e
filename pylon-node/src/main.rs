//! Pylon Node
//!
//! A worker that runs machine learning pipelines for a compute pool.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Engine: Runtime processes hosting one pipeline instance each
//! - Cache: Loaded instances shared by jobs, keyed by capability pair
//! - Services: Business logic (execution, progress reporting)
//! - Scheduler: Job dispatch, lease renewal and instance eviction loops
//!
//! The node polls the pool for pending jobs, runs each one against a cached
//! pipeline instance, and keeps its announcements to the pool alive.

mod cache;
mod config;
mod engine;
mod error;
mod scheduler;
mod service;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use pylon_client::{PoolClient, PoolConnector, TlsMaterial};
use pylon_core::domain::announcement::EventTemplate;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cache::InstanceCache;
use crate::config::Config;
use crate::engine::{PipelineLoader, ProcessLoader};
use crate::scheduler::{EvictionSweeper, JobDispatcher, LeaseScheduler};
use crate::service::{ExecutionService, StandardExecutionService};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pylon_node=info,pylon_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().context("Failed to read configuration")?;
    config.validate()?;

    info!("Starting Pylon Node");
    info!(
        "Loaded configuration: node_id={}, pool={}:{}, run_on={}, pipelines={}, models={}",
        config.node_id,
        config.pool.host,
        config.pool.port,
        config.run_on,
        config.supported_pipelines,
        config.supported_models
    );

    // Initialize pool client
    let tls = TlsMaterial::load(&config.tls)
        .await
        .context("Failed to load TLS material")?;
    let client = PoolClient::connect_lazy(&config.pool, tls.as_ref())
        .context("Failed to create pool client")?;
    info!("Pool client initialized ({})", client.endpoint());
    let pool: Arc<dyn PoolConnector> = Arc::new(client);

    // Initialize services
    let loader: Arc<dyn PipelineLoader> = Arc::new(
        ProcessLoader::from_command_line(&config.pipeline_runtime)
            .context("Invalid PIPELINE_RUNTIME")?,
    );
    let cache = Arc::new(InstanceCache::new());
    let execution: Arc<dyn ExecutionService> = Arc::new(StandardExecutionService::new(
        config.allow_list(),
        Arc::clone(&cache),
        loader,
        config.load_options(),
    ));

    info!("Services initialized");

    // Create loops
    let template = EventTemplate::pipeline_action(&config.run_on)
        .to_json()
        .context("Failed to serialize event template")?;
    let leases = LeaseScheduler::new(
        Arc::clone(&pool),
        config.announcement.clone(),
        vec![template],
        config.announce_timeout,
    );
    let dispatcher = JobDispatcher::new(
        pool,
        execution,
        config.run_on.clone(),
        config.poll_interval,
        config.max_parallel_jobs,
    );
    let sweeper = EvictionSweeper::new(
        cache,
        config.instance_keep_alive,
        config.eviction_interval,
    );

    info!("Node initialized successfully");

    tokio::select! {
        _ = dispatcher.run() => {}
        _ = leases.run() => {}
        _ = sweeper.run() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received, abandoning in-flight jobs");
        }
    }

    Ok(())
}

//! The pool as seen by the worker node
//!
//! The node's loops depend on this trait rather than on [`PoolClient`], so
//! they can run against an in-memory pool in tests.

use async_trait::async_trait;
use pylon_core::domain::announcement::NodeAnnouncement;
use pylon_core::domain::job::JobDescriptor;
use std::time::Duration;

use crate::PoolClient;
use crate::error::RpcFailure;

/// Remote procedures offered by the pool
#[async_trait]
pub trait PoolConnector: Send + Sync {
    /// Jobs pending for nodes that run `run_on`
    async fn pending_jobs(&self, run_on: &str) -> Result<Vec<JobDescriptor>, RpcFailure>;

    /// Claim a job
    async fn accept_job(&self, job_id: &str) -> Result<(), RpcFailure>;

    /// Append a progress line to a job's log
    async fn log_for_job(&self, job_id: &str, log: &str) -> Result<(), RpcFailure>;

    /// Finish a job with its output
    async fn complete_job(&self, job_id: &str, output: &str) -> Result<(), RpcFailure>;

    /// Abandon a job with a reason
    async fn cancel_job(&self, job_id: &str, reason: &str) -> Result<(), RpcFailure>;

    /// Advertise the node, returning the refresh interval
    async fn announce_node(&self, node: &NodeAnnouncement) -> Result<Duration, RpcFailure>;

    /// Advertise a job template, returning the refresh interval
    async fn announce_event_template(&self, event_template: &str)
    -> Result<Duration, RpcFailure>;
}

#[async_trait]
impl PoolConnector for PoolClient {
    async fn pending_jobs(&self, run_on: &str) -> Result<Vec<JobDescriptor>, RpcFailure> {
        self.get_pending_jobs(run_on).await
    }

    async fn accept_job(&self, job_id: &str) -> Result<(), RpcFailure> {
        PoolClient::accept_job(self, job_id).await
    }

    async fn log_for_job(&self, job_id: &str, log: &str) -> Result<(), RpcFailure> {
        PoolClient::log_for_job(self, job_id, log).await
    }

    async fn complete_job(&self, job_id: &str, output: &str) -> Result<(), RpcFailure> {
        PoolClient::complete_job(self, job_id, output).await
    }

    async fn cancel_job(&self, job_id: &str, reason: &str) -> Result<(), RpcFailure> {
        PoolClient::cancel_job(self, job_id, reason).await
    }

    async fn announce_node(&self, node: &NodeAnnouncement) -> Result<Duration, RpcFailure> {
        PoolClient::announce_node(self, node).await
    }

    async fn announce_event_template(
        &self,
        event_template: &str,
    ) -> Result<Duration, RpcFailure> {
        PoolClient::announce_event_template(self, event_template).await
    }
}

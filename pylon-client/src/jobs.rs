//! Job-related remote procedures

use pylon_core::domain::job::JobDescriptor;

use crate::PoolClient;
use crate::error::RpcFailure;
use crate::proto::{
    Ack, PendingJobs, RpcAcceptJob, RpcCancelJob, RpcGetPendingJobs, RpcJobLog, RpcJobOutput,
};
use crate::unwrap::unwrap_rpc;

impl PoolClient {
    // =============================================================================
    // Job Discovery
    // =============================================================================

    /// List jobs waiting for a node that runs `run_on`
    pub async fn get_pending_jobs(&self, run_on: &str) -> Result<Vec<JobDescriptor>, RpcFailure> {
        let request = RpcGetPendingJobs {
            filter_by_run_on: run_on.to_string(),
        };
        let pending: PendingJobs =
            unwrap_rpc(self.rpc().get_pending_jobs(request)).await?;

        Ok(pending.jobs.into_iter().map(JobDescriptor::from).collect())
    }

    // =============================================================================
    // Job Lifecycle
    // =============================================================================

    /// Claim a job for this node
    pub async fn accept_job(&self, job_id: &str) -> Result<(), RpcFailure> {
        let request = RpcAcceptJob {
            job_id: job_id.to_string(),
        };
        let _: Ack = unwrap_rpc(self.rpc().accept_job(request)).await?;
        Ok(())
    }

    /// Append a progress line to a job's log
    pub async fn log_for_job(&self, job_id: &str, log: &str) -> Result<(), RpcFailure> {
        let request = RpcJobLog {
            job_id: job_id.to_string(),
            log: log.to_string(),
        };
        let _: Ack = unwrap_rpc(self.rpc().log_for_job(request)).await?;
        Ok(())
    }

    /// Finish a job with its serialized output
    pub async fn complete_job(&self, job_id: &str, output: &str) -> Result<(), RpcFailure> {
        let request = RpcJobOutput {
            job_id: job_id.to_string(),
            output: output.to_string(),
        };
        let _: Ack = unwrap_rpc(self.rpc().complete_job(request)).await?;
        Ok(())
    }

    /// Give a job back to the pool with the reason it failed
    pub async fn cancel_job(&self, job_id: &str, reason: &str) -> Result<(), RpcFailure> {
        let request = RpcCancelJob {
            job_id: job_id.to_string(),
            reason: reason.to_string(),
        };
        let _: Ack = unwrap_rpc(self.rpc().cancel_job(request)).await?;
        Ok(())
    }
}

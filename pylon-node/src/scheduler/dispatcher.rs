//! Job dispatcher
//!
//! Polls the pool for pending jobs and runs each one in its own task. The
//! poll loop never waits for a job: a slow load or invocation only holds its
//! own task and a slot of the concurrency ceiling.

use chrono::Utc;
use pylon_client::{PoolConnector, RpcFailure};
use pylon_core::domain::job::JobDescriptor;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::service::{
    Acceptance, ExecutionRequest, ExecutionService, PoolProgressSink, ProgressSink,
};

/// Job ids currently running on this node
type InFlight = Arc<Mutex<HashSet<String>>>;

/// Polls for jobs and drives their lifecycle
pub struct JobDispatcher {
    pool: Arc<dyn PoolConnector>,
    execution: Arc<dyn ExecutionService>,
    run_on: String,
    poll_interval: Duration,
    semaphore: Arc<Semaphore>,
    in_flight: InFlight,
}

impl JobDispatcher {
    /// Creates a new dispatcher
    ///
    /// # Arguments
    /// * `pool` - Pool to poll and report to
    /// * `execution` - Service running each job
    /// * `run_on` - Filter sent with every poll
    /// * `poll_interval` - Delay between polls
    /// * `max_parallel_jobs` - Ceiling on jobs running at once
    pub fn new(
        pool: Arc<dyn PoolConnector>,
        execution: Arc<dyn ExecutionService>,
        run_on: impl Into<String>,
        poll_interval: Duration,
        max_parallel_jobs: usize,
    ) -> Self {
        Self {
            pool,
            execution,
            run_on: run_on.into(),
            poll_interval,
            semaphore: Arc::new(Semaphore::new(max_parallel_jobs)),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Starts the polling loop
    pub async fn run(&self) {
        info!(
            "Starting job dispatcher (run_on: {}, interval: {:?})",
            self.run_on, self.poll_interval
        );

        let mut interval = time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            match self.poll_once().await {
                Ok(dispatched) => {
                    if dispatched > 0 {
                        debug!("Dispatched {} job(s) this cycle", dispatched);
                    }
                }
                Err(e) if e.is_unavailable() => {
                    warn!("Pool unavailable during poll cycle: {}", e);
                }
                Err(e) => {
                    error!("Error during poll cycle: {}", e);
                }
            }
        }
    }

    /// Performs a single poll cycle
    ///
    /// # Returns
    /// The number of jobs started. Jobs beyond the ceiling, or already
    /// running here, are left for a later poll.
    pub async fn poll_once(&self) -> Result<usize, RpcFailure> {
        let jobs = self.pool.pending_jobs(&self.run_on).await?;

        if jobs.is_empty() {
            return Ok(0);
        }

        debug!("Found {} pending job(s)", jobs.len());

        let mut dispatched = 0;
        for job in jobs {
            if !self.track(&job.id) {
                debug!("Job {} is already running, skipping", job.id);
                continue;
            }

            // Try to acquire a permit, skip if at max capacity
            let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
                debug!("Max parallel jobs reached, skipping job {} for now", job.id);
                self.untrack(&job.id);
                continue;
            };

            self.spawn_job_task(job, permit);
            dispatched += 1;
        }

        Ok(dispatched)
    }

    /// Marks `job_id` as running; false if it already was
    fn track(&self, job_id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id.to_string())
    }

    fn untrack(&self, job_id: &str) {
        release(&self.in_flight, job_id);
    }

    /// Spawns a task running a single job
    fn spawn_job_task(
        &self,
        job: JobDescriptor,
        permit: OwnedSemaphorePermit,
    ) {
        let pool = Arc::clone(&self.pool);
        let execution = Arc::clone(&self.execution);
        let in_flight = Arc::clone(&self.in_flight);

        tokio::spawn(async move {
            let job_id = job.id.clone();
            Self::dispatch(pool, execution, job).await;
            release(&in_flight, &job_id);
            drop(permit);
        });
    }

    /// Runs one job and reports exactly one outcome to the pool
    async fn dispatch(
        pool: Arc<dyn PoolConnector>,
        execution: Arc<dyn ExecutionService>,
        job: JobDescriptor,
    ) {
        let pair = job.capability();
        let deadline = job
            .deadline(Utc::now())
            .map_or_else(|| "none".to_string(), |deadline| deadline.to_rfc3339());
        info!(job_id = %job.id, "Dispatching job for {} (deadline {})", pair, deadline);

        let acceptance: Acceptance = {
            let pool = Arc::clone(&pool);
            let job_id = job.id.clone();
            Box::pin(async move { pool.accept_job(&job_id).await })
        };
        let (sink, forwarder) = PoolProgressSink::start(job.id.clone(), Arc::clone(&pool));
        let sink = Arc::new(sink);
        let request = ExecutionRequest {
            pair,
            input: job.input_data().map(str::to_string),
        };

        let progress: Arc<dyn ProgressSink> = sink.clone();
        let result = execution.execute(request, progress, acceptance).await;

        // Every progress line reaches the pool before the outcome does
        sink.close();
        if let Err(e) = forwarder.await {
            warn!(job_id = %job.id, "Progress forwarder failed: {}", e);
        }

        match result {
            Ok(output) => {
                info!(job_id = %job.id, "Job completed");
                if let Err(e) = pool.complete_job(&job.id, &output).await {
                    warn!(job_id = %job.id, "Failed to complete job: {}", e);
                }
            }
            Err(err) => {
                if err.is_rejection() {
                    warn!(job_id = %job.id, "Job rejected: {}", err);
                } else {
                    error!(job_id = %job.id, "Job failed: {}", err);
                }
                if let Err(e) = pool.cancel_job(&job.id, &err.to_string()).await {
                    warn!(job_id = %job.id, "Failed to cancel job: {}", e);
                }
            }
        }
    }
}

fn release(in_flight: &InFlight, job_id: &str) {
    in_flight
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(job_id);
}

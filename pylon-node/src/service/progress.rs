//! Job progress sinks
//!
//! The execution service reports milestones one line at a time. Sinks are
//! one-way: a line that fails to reach its destination is logged locally
//! and never affects the job.

use pylon_client::PoolConnector;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Receives progress lines for one job
pub trait ProgressSink: Send + Sync {
    /// Emit a progress line
    fn emit(&self, message: &str);
}

/// Forwards progress lines to the pool's job log
///
/// Lines are queued and sent one at a time by a single forwarder task, so
/// the pool receives them in emission order and `emit` never waits.
pub struct PoolProgressSink {
    job_id: String,
    sender: Mutex<Option<UnboundedSender<String>>>,
}

impl PoolProgressSink {
    /// Creates a sink for `job_id` and spawns the task forwarding its lines
    ///
    /// # Returns
    /// The sink and the forwarder's handle. The forwarder finishes once the
    /// sink is closed and every queued line has been sent.
    pub fn start(
        job_id: impl Into<String>,
        pool: Arc<dyn PoolConnector>,
    ) -> (Self, JoinHandle<()>) {
        let job_id = job_id.into();
        let (sender, receiver) = mpsc::unbounded_channel();
        let forwarder = spawn_log_sender(job_id.clone(), receiver, pool);

        let sink = Self {
            job_id,
            sender: Mutex::new(Some(sender)),
        };
        (sink, forwarder)
    }

    /// Stops queueing lines; later lines are only logged locally
    pub fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl ProgressSink for PoolProgressSink {
    fn emit(&self, message: &str) {
        info!(job_id = %self.job_id, "{}", message);

        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let queued = sender
            .as_ref()
            .is_some_and(|sender| sender.send(message.to_string()).is_ok());
        if !queued {
            debug!(job_id = %self.job_id, "Progress sink closed, line not sent to pool");
        }
    }
}

/// Sends queued lines to the pool in order until the queue is closed
fn spawn_log_sender(
    job_id: String,
    mut lines: UnboundedReceiver<String>,
    pool: Arc<dyn PoolConnector>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(line) = lines.recv().await {
            if let Err(e) = pool.log_for_job(&job_id, &line).await {
                warn!(job_id = %job_id, "Failed to send job log: {}", e);
            }
        }
    })
}

//! Lease renewal scheduler
//!
//! The node and each of its event templates hold a lease with the pool.
//! A lease starts out due; after a successful announcement it is due again
//! once the interval returned by the pool has passed. A failed announcement
//! leaves the lease due so it is retried on the next wake-up.

use pylon_client::{PoolConnector, RpcFailure};
use pylon_core::domain::announcement::NodeAnnouncement;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What a lease advertises
#[derive(Debug, Clone)]
enum Advertisement {
    Node(NodeAnnouncement),
    Template(String),
}

impl Advertisement {
    fn label(&self) -> &'static str {
        match self {
            Self::Node(_) => "node",
            Self::Template(_) => "event template",
        }
    }
}

struct Lease {
    advertisement: Advertisement,
    /// `None` until the first successful announcement
    next_announce: Option<Instant>,
}

impl Lease {
    fn is_due(&self, now: Instant) -> bool {
        self.next_announce.is_none_or(|next| next <= now)
    }
}

/// Keeps the node's announcements alive
pub struct LeaseScheduler {
    pool: Arc<dyn PoolConnector>,
    leases: Mutex<Vec<Lease>>,
    max_sleep: Duration,
}

impl LeaseScheduler {
    /// Creates a scheduler with every lease due immediately
    ///
    /// # Arguments
    /// * `pool` - Pool to announce to
    /// * `node` - Node identity
    /// * `templates` - Serialized event templates
    /// * `max_sleep` - Longest wait between two wake-ups
    pub fn new(
        pool: Arc<dyn PoolConnector>,
        node: NodeAnnouncement,
        templates: Vec<String>,
        max_sleep: Duration,
    ) -> Self {
        let leases = std::iter::once(Advertisement::Node(node))
            .chain(templates.into_iter().map(Advertisement::Template))
            .map(|advertisement| Lease {
                advertisement,
                next_announce: None,
            })
            .collect();

        Self {
            pool,
            leases: Mutex::new(leases),
            max_sleep,
        }
    }

    fn leases(&self) -> MutexGuard<'_, Vec<Lease>> {
        self.leases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the renewal loop
    pub async fn run(&self) {
        info!("Starting lease scheduler (max sleep: {:?})", self.max_sleep);

        loop {
            let sleep = self.renew_due().await;
            debug!("Next lease check in {:?}", sleep);
            tokio::time::sleep(sleep).await;
        }
    }

    /// Announces every due lease
    ///
    /// # Returns
    /// How long to sleep before the next check: until the earliest future
    /// renewal, never longer than the configured maximum.
    pub async fn renew_due(&self) -> Duration {
        let now = Instant::now();
        let due: Vec<(usize, Advertisement)> = self
            .leases()
            .iter()
            .enumerate()
            .filter(|(_, lease)| lease.is_due(now))
            .map(|(index, lease)| (index, lease.advertisement.clone()))
            .collect();

        for (index, advertisement) in due {
            match self.announce(&advertisement).await {
                Ok(refresh) => {
                    debug!(
                        "Announced {}, next in {:?}",
                        advertisement.label(),
                        refresh
                    );
                    if let Some(lease) = self.leases().get_mut(index) {
                        lease.next_announce = Some(Instant::now() + refresh);
                    }
                }
                Err(e) => {
                    warn!("Failed to announce {}: {}", advertisement.label(), e);
                }
            }
        }

        self.next_sleep(Instant::now())
    }

    async fn announce(&self, advertisement: &Advertisement) -> Result<Duration, RpcFailure> {
        match advertisement {
            Advertisement::Node(node) => self.pool.announce_node(node).await,
            Advertisement::Template(template) => {
                self.pool.announce_event_template(template).await
            }
        }
    }

    fn next_sleep(&self, now: Instant) -> Duration {
        self.leases()
            .iter()
            .filter_map(|lease| lease.next_announce)
            .filter(|next| *next > now)
            .map(|next| next - now)
            .min()
            .map_or(self.max_sleep, |sleep| sleep.min(self.max_sleep))
    }
}

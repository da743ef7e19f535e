//! Eviction sweeper
//!
//! Periodically drops pipeline instances that no job has used for longer
//! than the keep-alive timeout. An evicted instance is released once the
//! last running job holding it finishes.

use std::sync::Arc;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::cache::InstanceCache;

pub struct EvictionSweeper {
    cache: Arc<InstanceCache>,
    keep_alive: Duration,
    interval: Duration,
}

impl EvictionSweeper {
    pub fn new(cache: Arc<InstanceCache>, keep_alive: Duration, interval: Duration) -> Self {
        Self {
            cache,
            keep_alive,
            interval,
        }
    }

    /// Starts the sweeping loop
    pub async fn run(&self) {
        info!(
            "Starting eviction sweeper (keep-alive: {:?}, interval: {:?})",
            self.keep_alive, self.interval
        );

        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            self.sweep_once(Instant::now());
        }
    }

    /// Evicts idle instances as of `now`, returning how many were dropped
    pub fn sweep_once(&self, now: Instant) -> usize {
        let evicted = self.cache.evict_idle(now, self.keep_alive);
        for key in &evicted {
            info!("Evicted idle instance {}", key);
        }
        if !evicted.is_empty() {
            debug!("{} instance(s) still cached", self.cache.len());
        }
        evicted.len()
    }
}

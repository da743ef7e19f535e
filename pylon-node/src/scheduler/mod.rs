//! Scheduler layer for the node
//!
//! Three independent timed loops run for the lifetime of the process:
//! - Dispatch: polls the pool and drives each job from accept to complete/cancel
//! - Lease renewal: re-announces the node and its templates when due
//! - Eviction: drops pipeline instances that have been idle too long

pub mod announcer;
pub mod dispatcher;
pub mod sweeper;

pub use announcer::LeaseScheduler;
pub use dispatcher::JobDispatcher;
pub use sweeper::EvictionSweeper;

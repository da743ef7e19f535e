//! Service layer
//!
//! Services contain the node's business logic: running a job against a
//! cached pipeline instance and reporting its progress.
//!
//! Services are trait-based so the scheduler can be tested against fakes.

mod execution;
mod progress;

// Re-export traits
pub use execution::ExecutionService;
pub use progress::ProgressSink;

// Re-export implementations and request types
pub use execution::{Acceptance, ExecutionRequest, StandardExecutionService};
pub use progress::PoolProgressSink;

//! Job execution errors
//!
//! Every variant ends up as the reason of a `cancelJob` call, so the
//! messages are written for whoever submitted the job.

use pylon_client::RpcFailure;
use pylon_core::domain::capability::{CapabilityPair, CapabilityRejection};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The pair is not in the node's allow-list
    #[error("Unsupported capability: {0}")]
    UnsupportedCapability(CapabilityRejection),

    /// The job carries no input payload
    #[error("No input provided")]
    MissingInput,

    /// The payload is not a JSON array of arguments
    #[error("Invalid input: {0}")]
    InputDeserializationFailure(String),

    /// The pool refused or failed the accept call
    #[error("Job acceptance rejected: {0}")]
    AcceptanceRejected(#[source] RpcFailure),

    /// The engine could not create the instance
    #[error("Failed to load {pair}: {reason}")]
    InstanceLoadFailure { pair: CapabilityPair, reason: String },

    /// The instance failed while running the job
    #[error("Failed to run {pair}: {reason}")]
    InvocationFailure { pair: CapabilityPair, reason: String },
}

impl ExecutionError {
    /// True when the job failed before the node claimed it
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedCapability(_)
                | Self::MissingInput
                | Self::InputDeserializationFailure(_)
                | Self::AcceptanceRejected(_)
        )
    }
}

//! Computation engine seam
//!
//! The node never looks inside a pipeline: it asks a [`PipelineLoader`] for
//! a ready [`Pipeline`] once per capability pair and then invokes it with the
//! job's positional arguments.

pub mod process;

pub use process::ProcessLoader;

use anyhow::Result;
use async_trait::async_trait;
use pylon_core::domain::capability::CapabilityPair;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Options forwarded to every instance creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Load quantized weights
    pub quantized: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { quantized: true }
    }
}

/// A loaded, invokable computation
///
/// One instance is shared by every job with the same capability pair, so
/// `run` may be called concurrently.
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Runs the computation with positional arguments
    async fn run(&self, args: Vec<JsonValue>) -> Result<JsonValue>;

    /// False once the instance can no longer serve calls
    ///
    /// A dead instance is dropped from the cache and loaded again on the
    /// next request for its pair.
    fn is_alive(&self) -> bool {
        true
    }
}

/// Creates pipeline instances
///
/// Loading may take seconds to minutes (model download and initialisation).
#[async_trait]
pub trait PipelineLoader: Send + Sync {
    async fn load(
        &self,
        pair: &CapabilityPair,
        options: LoadOptions,
    ) -> Result<Arc<dyn Pipeline>>;
}

//! Execution service
//!
//! Runs one job against the pipeline instance for its capability pair:
//! - Validating the pair against the allow-list
//! - Checking and parsing the input payload
//! - Waiting for the pool to confirm the job is ours
//! - Resolving the instance through the cache, loading it if needed
//! - Invoking it and serializing the result
//!
//! Nothing is claimed before validation passes, and nothing is loaded
//! before the claim succeeds.

use async_trait::async_trait;
use pylon_client::RpcFailure;
use pylon_core::domain::capability::{CapabilityAllowList, CapabilityPair};
use serde_json::Value as JsonValue;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::cache::InstanceCache;
use crate::engine::{LoadOptions, Pipeline, PipelineLoader};
use crate::error::ExecutionError;
use crate::service::progress::ProgressSink;

/// Gate that must resolve successfully before any loading starts
///
/// Nothing is sent to the pool until the future is first polled.
pub type Acceptance = Pin<Box<dyn Future<Output = Result<(), RpcFailure>> + Send>>;

/// What a job asks the node to run
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    pub pair: CapabilityPair,
    /// Payload of the job's first input, a JSON array of arguments
    pub input: Option<String>,
}

/// Service trait for executing jobs
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Executes a job
    ///
    /// # Arguments
    /// * `request` - Capability pair and input payload
    /// * `progress` - Sink for progress lines
    /// * `acceptance` - Confirmation that the job is ours to run
    ///
    /// # Returns
    /// The pipeline output as pretty-printed JSON
    async fn execute(
        &self,
        request: ExecutionRequest,
        progress: Arc<dyn ProgressSink>,
        acceptance: Acceptance,
    ) -> Result<String, ExecutionError>;
}

/// Standard implementation of ExecutionService
pub struct StandardExecutionService {
    allow_list: CapabilityAllowList,
    cache: Arc<InstanceCache>,
    loader: Arc<dyn PipelineLoader>,
    options: LoadOptions,
}

impl StandardExecutionService {
    /// Creates a new execution service
    ///
    /// # Arguments
    /// * `allow_list` - Pairs this node accepts
    /// * `cache` - Instance cache shared with the eviction sweeper
    /// * `loader` - Engine that creates missing instances
    /// * `options` - Forwarded to every load
    pub fn new(
        allow_list: CapabilityAllowList,
        cache: Arc<InstanceCache>,
        loader: Arc<dyn PipelineLoader>,
        options: LoadOptions,
    ) -> Self {
        Self {
            allow_list,
            cache,
            loader,
            options,
        }
    }

    /// Parses the payload into positional arguments
    fn parse_arguments(input: Option<&str>) -> Result<Vec<JsonValue>, ExecutionError> {
        let input = match input {
            Some(input) if !input.is_empty() => input,
            _ => return Err(ExecutionError::MissingInput),
        };

        match serde_json::from_str(input) {
            Ok(JsonValue::Array(args)) => Ok(args),
            Ok(other) => Err(ExecutionError::InputDeserializationFailure(format!(
                "expected a JSON array of arguments, got {}",
                json_kind(&other)
            ))),
            Err(e) => Err(ExecutionError::InputDeserializationFailure(e.to_string())),
        }
    }

    /// Returns the cached instance for `pair`, loading it if absent
    async fn resolve_instance(
        &self,
        pair: &CapabilityPair,
        progress: &dyn ProgressSink,
    ) -> Result<Arc<dyn Pipeline>, ExecutionError> {
        let key = pair.cache_key();

        if let Some(pipeline) = self.cache.checkout(&key, Instant::now()) {
            debug!("Reusing cached instance {}", key);
            return Ok(pipeline);
        }

        progress.emit(&format!("Loading {}", pair));
        let started = Instant::now();

        let pipeline = self
            .loader
            .load(pair, self.options)
            .await
            .map_err(|e| ExecutionError::InstanceLoadFailure {
                pair: pair.clone(),
                reason: format!("{:#}", e),
            })?;

        let elapsed = started.elapsed();
        info!("Loaded instance {} in {:?}", key, elapsed);
        progress.emit(&format!("Loaded {} in {}ms", pair, elapsed.as_millis()));

        self.cache.insert(key, Arc::clone(&pipeline), Instant::now());
        Ok(pipeline)
    }
}

#[async_trait]
impl ExecutionService for StandardExecutionService {
    async fn execute(
        &self,
        request: ExecutionRequest,
        progress: Arc<dyn ProgressSink>,
        acceptance: Acceptance,
    ) -> Result<String, ExecutionError> {
        let ExecutionRequest { pair, input } = request;

        self.allow_list
            .check(&pair)
            .map_err(ExecutionError::UnsupportedCapability)?;
        let args = Self::parse_arguments(input.as_deref())?;

        acceptance.await.map_err(ExecutionError::AcceptanceRejected)?;

        let pipeline = self.resolve_instance(&pair, progress.as_ref()).await?;

        progress.emit(&format!("Running {}", pair));
        let started = Instant::now();

        let output = pipeline
            .run(args)
            .await
            .map_err(|e| ExecutionError::InvocationFailure {
                pair: pair.clone(),
                reason: format!("{:#}", e),
            })?;

        progress.emit(&format!(
            "Executed {} in {}ms",
            pair,
            started.elapsed().as_millis()
        ));

        serde_json::to_string_pretty(&output).map_err(|e| ExecutionError::InvocationFailure {
            pair,
            reason: format!("output is not serializable: {}", e),
        })
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockLoader, RecordingSink, tracked_acceptance};
    use pylon_client::Code;
    use pylon_core::domain::capability::AllowList;
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        service: StandardExecutionService,
        cache: Arc<InstanceCache>,
        loader: Arc<MockLoader>,
    }

    fn fixture(allow_list: CapabilityAllowList, loader: MockLoader) -> Fixture {
        let cache = Arc::new(InstanceCache::new());
        let loader = Arc::new(loader);
        let service = StandardExecutionService::new(
            allow_list,
            cache.clone(),
            loader.clone(),
            LoadOptions::default(),
        );
        Fixture {
            service,
            cache,
            loader,
        }
    }

    fn request(pipeline: &str, model: &str, input: Option<&str>) -> ExecutionRequest {
        ExecutionRequest {
            pair: CapabilityPair::new(pipeline, model),
            input: input.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_runs_and_reuses_instance() {
        let fx = fixture(CapabilityAllowList::default(), MockLoader::new());
        let sink = Arc::new(RecordingSink::default());

        let (acceptance, accepted) = tracked_acceptance(Ok(()));
        let output = fx
            .service
            .execute(
                request("text-classification", "distilbert", Some(r#"[["hello world"]]"#)),
                sink.clone(),
                acceptance,
            )
            .await
            .unwrap();

        assert!(accepted.load(std::sync::atomic::Ordering::SeqCst));
        let value: JsonValue = serde_json::from_str(&output).unwrap();
        assert_eq!(value, json!({ "echo": [["hello world"]] }));
        assert!(output.contains('\n'));
        assert_eq!(fx.loader.load_count(), 1);
        assert!(fx.cache.contains("text-classification_distilbert"));

        let lines = sink.lines();
        assert!(lines[0].starts_with("Loading text-classification distilbert"));
        assert!(lines[1].starts_with("Loaded text-classification distilbert in"));
        assert!(lines[2].starts_with("Running"));
        assert!(lines[3].starts_with("Executed"));

        // Second job with the same pair hits the cache
        let second_sink = Arc::new(RecordingSink::default());
        let (acceptance, _) = tracked_acceptance(Ok(()));
        fx.service
            .execute(
                request("text-classification", "distilbert", Some(r#"[["again"]]"#)),
                second_sink.clone(),
                acceptance,
            )
            .await
            .unwrap();

        assert_eq!(fx.loader.load_count(), 1);
        assert!(
            second_sink
                .lines()
                .iter()
                .all(|line| !line.starts_with("Loading"))
        );
    }

    #[tokio::test]
    async fn test_unsupported_model_fails_before_acceptance() {
        let allow = CapabilityAllowList::new(AllowList::Any, AllowList::parse("distilbert"));
        let fx = fixture(allow, MockLoader::new());

        let (acceptance, accepted) = tracked_acceptance(Ok(()));
        let err = fx
            .service
            .execute(
                request("text-generation", "gpt2", Some("[]")),
                Arc::new(RecordingSink::default()),
                acceptance,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::UnsupportedCapability(_)));
        assert!(err.to_string().contains("model 'gpt2' is not supported"));
        assert!(!accepted.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(fx.loader.load_count(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_pipeline() {
        let allow = CapabilityAllowList::new(AllowList::parse("translation"), AllowList::Any);
        let fx = fixture(allow, MockLoader::new());

        let (acceptance, _) = tracked_acceptance(Ok(()));
        let err = fx
            .service
            .execute(
                request("text-classification", "distilbert", Some("[]")),
                Arc::new(RecordingSink::default()),
                acceptance,
            )
            .await
            .unwrap_err();

        assert!(err.to_string().contains("pipeline 'text-classification'"));
    }

    #[tokio::test]
    async fn test_missing_input() {
        let fx = fixture(CapabilityAllowList::default(), MockLoader::new());

        for input in [None, Some("")] {
            let (acceptance, accepted) = tracked_acceptance(Ok(()));
            let err = fx
                .service
                .execute(
                    request("text-classification", "distilbert", input),
                    Arc::new(RecordingSink::default()),
                    acceptance,
                )
                .await
                .unwrap_err();

            assert!(matches!(err, ExecutionError::MissingInput));
            assert!(!accepted.load(std::sync::atomic::Ordering::SeqCst));
        }
    }

    #[tokio::test]
    async fn test_input_must_be_json_array() {
        let fx = fixture(CapabilityAllowList::default(), MockLoader::new());

        for input in ["not json", r#"{"text": "hi"}"#] {
            let (acceptance, accepted) = tracked_acceptance(Ok(()));
            let err = fx
                .service
                .execute(
                    request("text-classification", "distilbert", Some(input)),
                    Arc::new(RecordingSink::default()),
                    acceptance,
                )
                .await
                .unwrap_err();

            assert!(matches!(err, ExecutionError::InputDeserializationFailure(_)));
            assert!(!accepted.load(std::sync::atomic::Ordering::SeqCst));
        }
    }

    #[tokio::test]
    async fn test_rejected_acceptance_skips_load() {
        let fx = fixture(CapabilityAllowList::default(), MockLoader::new());

        let (acceptance, _) =
            tracked_acceptance(Err(RpcFailure::new(Code::FailedPrecondition, "taken")));
        let err = fx
            .service
            .execute(
                request("text-classification", "distilbert", Some("[]")),
                Arc::new(RecordingSink::default()),
                acceptance,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::AcceptanceRejected(_)));
        assert!(err.to_string().contains("rpc failed with status FailedPrecondition"));
        assert_eq!(fx.loader.load_count(), 0);
        assert_eq!(fx.cache.len(), 0);
    }

    #[tokio::test]
    async fn test_load_failure_is_not_cached() {
        let fx = fixture(
            CapabilityAllowList::default(),
            MockLoader::failing("weights not found"),
        );

        let (acceptance, _) = tracked_acceptance(Ok(()));
        let err = fx
            .service
            .execute(
                request("text-classification", "distilbert", Some("[]")),
                Arc::new(RecordingSink::default()),
                acceptance,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::InstanceLoadFailure { .. }));
        assert!(err.to_string().contains("weights not found"));
        assert!(!fx.cache.contains("text-classification_distilbert"));
    }

    #[tokio::test]
    async fn test_invocation_failure() {
        let fx = fixture(
            CapabilityAllowList::default(),
            MockLoader::with_failing_pipelines("out of memory"),
        );

        let (acceptance, _) = tracked_acceptance(Ok(()));
        let err = fx
            .service
            .execute(
                request("text-classification", "distilbert", Some("[1]")),
                Arc::new(RecordingSink::default()),
                acceptance,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::InvocationFailure { .. }));
        assert!(err.to_string().contains("out of memory"));
    }

    #[tokio::test]
    async fn test_reloads_after_eviction() {
        let fx = fixture(CapabilityAllowList::default(), MockLoader::new());

        let (acceptance, _) = tracked_acceptance(Ok(()));
        fx.service
            .execute(
                request("text-classification", "distilbert", Some("[]")),
                Arc::new(RecordingSink::default()),
                acceptance,
            )
            .await
            .unwrap();

        let later = Instant::now() + Duration::from_secs(3600);
        fx.cache.evict_idle(later, Duration::from_secs(600));
        assert_eq!(fx.cache.len(), 0);

        let (acceptance, _) = tracked_acceptance(Ok(()));
        fx.service
            .execute(
                request("text-classification", "distilbert", Some("[]")),
                Arc::new(RecordingSink::default()),
                acceptance,
            )
            .await
            .unwrap();

        assert_eq!(fx.loader.load_count(), 2);
    }
}

//! In-memory fakes for the pool and the computation engine

use anyhow::{Result, bail};
use async_trait::async_trait;
use pylon_client::{PoolConnector, RpcFailure};
use pylon_core::domain::announcement::NodeAnnouncement;
use pylon_core::domain::capability::CapabilityPair;
use pylon_core::domain::job::{JobDescriptor, JobInput, JobParam};
use serde_json::{Value as JsonValue, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::engine::{LoadOptions, Pipeline, PipelineLoader};
use crate::service::{Acceptance, ProgressSink};

/// Pipeline answering `{"echo": args}`
pub struct EchoPipeline {
    alive: AtomicBool,
    failure: Option<String>,
}

impl Default for EchoPipeline {
    fn default() -> Self {
        Self {
            alive: AtomicBool::new(true),
            failure: None,
        }
    }
}

impl EchoPipeline {
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Pipeline for EchoPipeline {
    async fn run(&self, args: Vec<JsonValue>) -> Result<JsonValue> {
        if let Some(failure) = &self.failure {
            bail!("{}", failure);
        }
        Ok(json!({ "echo": args }))
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// Loader counting how many instances it created
#[derive(Default)]
pub struct MockLoader {
    loads: AtomicUsize,
    load_failure: Option<String>,
    run_failure: Option<String>,
    delay: Duration,
}

impl MockLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            load_failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn with_failing_pipelines(message: &str) -> Self {
        Self {
            run_failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PipelineLoader for MockLoader {
    async fn load(
        &self,
        _pair: &CapabilityPair,
        _options: LoadOptions,
    ) -> Result<Arc<dyn Pipeline>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(failure) = &self.load_failure {
            bail!("{}", failure);
        }
        Ok(Arc::new(EchoPipeline {
            alive: AtomicBool::new(true),
            failure: self.run_failure.clone(),
        }))
    }
}

/// Sink keeping every progress line
#[derive(Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_string());
    }
}

/// Acceptance resolving to `result`, plus a flag set once it is polled
pub fn tracked_acceptance(result: Result<(), RpcFailure>) -> (Acceptance, Arc<AtomicBool>) {
    let polled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&polled);
    let acceptance: Acceptance = Box::pin(async move {
        flag.store(true, Ordering::SeqCst);
        result
    });
    (acceptance, polled)
}

/// Job for `pipeline`/`model` with a single input item
pub fn job(id: &str, pipeline: &str, model: &str, input: Option<&str>) -> JobDescriptor {
    let param = |key: &str, value: &str| JobParam {
        key: key.to_string(),
        values: vec![value.to_string()],
    };

    JobDescriptor {
        id: id.to_string(),
        run_on: "openagents/transformersjs".to_string(),
        inputs: input
            .map(|data| JobInput {
                data: data.to_string(),
                kind: "text".to_string(),
                marker: String::new(),
            })
            .into_iter()
            .collect(),
        params: vec![param("pipeline", pipeline), param("model", model)],
        max_execution_time: Duration::from_secs(60),
        expiration: None,
    }
}

/// A call received by [`MockPool`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolCall {
    PendingJobs { run_on: String },
    Accept { job_id: String },
    Log { job_id: String, log: String },
    Complete { job_id: String, output: String },
    Cancel { job_id: String, reason: String },
    AnnounceNode { name: String },
    AnnounceTemplate { template: String },
}

impl PoolCall {
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::Accept { job_id }
            | Self::Log { job_id, .. }
            | Self::Complete { job_id, .. }
            | Self::Cancel { job_id, .. } => Some(job_id),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Cancel { .. })
    }
}

struct MockPoolState {
    calls: Vec<PoolCall>,
    polls: VecDeque<Result<Vec<JobDescriptor>, RpcFailure>>,
    accept_failure: Option<RpcFailure>,
    log_failure: Option<RpcFailure>,
    node_refresh: Result<Duration, RpcFailure>,
    template_refresh: Result<Duration, RpcFailure>,
}

/// In-memory pool recording every call
pub struct MockPool {
    state: Mutex<MockPoolState>,
}

impl MockPool {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockPoolState {
                calls: Vec::new(),
                polls: VecDeque::new(),
                accept_failure: None,
                log_failure: None,
                node_refresh: Ok(Duration::from_secs(60)),
                template_refresh: Ok(Duration::from_secs(60)),
            }),
        }
    }

    /// Queue the answer of the next poll; an empty queue answers no jobs
    pub fn push_poll(&self, result: Result<Vec<JobDescriptor>, RpcFailure>) {
        self.state.lock().unwrap().polls.push_back(result);
    }

    pub fn fail_accept(&self, failure: RpcFailure) {
        self.state.lock().unwrap().accept_failure = Some(failure);
    }

    pub fn fail_logs(&self, failure: RpcFailure) {
        self.state.lock().unwrap().log_failure = Some(failure);
    }

    pub fn set_node_refresh(&self, refresh: Result<Duration, RpcFailure>) {
        self.state.lock().unwrap().node_refresh = refresh;
    }

    pub fn set_template_refresh(&self, refresh: Result<Duration, RpcFailure>) {
        self.state.lock().unwrap().template_refresh = refresh;
    }

    pub fn calls(&self) -> Vec<PoolCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls about `job_id`, excluding progress logs
    pub fn lifecycle(&self, job_id: &str) -> Vec<PoolCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.job_id() == Some(job_id))
            .filter(|call| !matches!(call, PoolCall::Log { .. }))
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&PoolCall) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }

    /// Waits until `predicate` holds for the recorded calls
    pub async fn wait_for(&self, predicate: impl Fn(&[PoolCall]) -> bool, timeout: Duration) {
        let waited = tokio::time::timeout(timeout, async {
            while !predicate(&self.calls()) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;

        assert!(waited.is_ok(), "timed out; calls so far: {:?}", self.calls());
    }

    fn record(&self, call: PoolCall) -> MutexGuardState<'_> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        state
    }
}

type MutexGuardState<'a> = std::sync::MutexGuard<'a, MockPoolState>;

#[async_trait]
impl PoolConnector for MockPool {
    async fn pending_jobs(&self, run_on: &str) -> Result<Vec<JobDescriptor>, RpcFailure> {
        let mut state = self.record(PoolCall::PendingJobs {
            run_on: run_on.to_string(),
        });
        state.polls.pop_front().unwrap_or(Ok(Vec::new()))
    }

    async fn accept_job(&self, job_id: &str) -> Result<(), RpcFailure> {
        let state = self.record(PoolCall::Accept {
            job_id: job_id.to_string(),
        });
        match &state.accept_failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(()),
        }
    }

    async fn log_for_job(&self, job_id: &str, log: &str) -> Result<(), RpcFailure> {
        let state = self.record(PoolCall::Log {
            job_id: job_id.to_string(),
            log: log.to_string(),
        });
        match &state.log_failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(()),
        }
    }

    async fn complete_job(&self, job_id: &str, output: &str) -> Result<(), RpcFailure> {
        self.record(PoolCall::Complete {
            job_id: job_id.to_string(),
            output: output.to_string(),
        });
        Ok(())
    }

    async fn cancel_job(&self, job_id: &str, reason: &str) -> Result<(), RpcFailure> {
        self.record(PoolCall::Cancel {
            job_id: job_id.to_string(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    async fn announce_node(&self, node: &NodeAnnouncement) -> Result<Duration, RpcFailure> {
        let state = self.record(PoolCall::AnnounceNode {
            name: node.name.clone(),
        });
        state.node_refresh.clone()
    }

    async fn announce_event_template(
        &self,
        event_template: &str,
    ) -> Result<Duration, RpcFailure> {
        let state = self.record(PoolCall::AnnounceTemplate {
            template: event_template.to_string(),
        });
        state.template_refresh.clone()
    }
}

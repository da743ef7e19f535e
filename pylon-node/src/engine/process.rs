//! Runtime process adapter
//!
//! Each pipeline instance is a long-lived child process started as
//! `<program> <args…> <pipeline> <model> [--quantized]`. The child speaks
//! line-delimited JSON on stdin/stdout:
//! - once loaded it prints `"ready"` (or `{"error": "..."}` and exits)
//! - for each `{"args": [...]}` line it answers `{"ok": <value>}` or
//!   `{"error": "..."}`
//!
//! Calls to one process are serialized; stderr is inherited so the runtime's
//! own diagnostics land in the node's output.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use pylon_core::domain::capability::CapabilityPair;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::engine::{LoadOptions, Pipeline, PipelineLoader};

/// Line written to the runtime for each invocation
#[derive(Debug, Serialize)]
struct Invocation<'a> {
    args: &'a [JsonValue],
}

/// Line read back from the runtime
#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Reply {
    Ready,
    Ok(JsonValue),
    Error(String),
}

/// Spawns one runtime process per pipeline instance
#[derive(Debug, Clone)]
pub struct ProcessLoader {
    program: String,
    args: Vec<String>,
}

impl ProcessLoader {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Builds a loader from a whitespace-separated command line
    pub fn from_command_line(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next().context("runtime command is empty")?;
        Ok(Self::new(program, parts.collect()))
    }

    fn command(&self, pair: &CapabilityPair, options: LoadOptions) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(&pair.pipeline).arg(&pair.model);
        if options.quantized {
            command.arg("--quantized");
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl PipelineLoader for ProcessLoader {
    async fn load(
        &self,
        pair: &CapabilityPair,
        options: LoadOptions,
    ) -> Result<Arc<dyn Pipeline>> {
        info!("Spawning runtime '{}' for {}", self.program, pair);

        let mut child = self
            .command(pair, options)
            .spawn()
            .with_context(|| format!("Failed to spawn runtime '{}'", self.program))?;

        let stdin = child.stdin.take().context("runtime stdin was not captured")?;
        let stdout = child
            .stdout
            .take()
            .context("runtime stdout was not captured")?;

        let mut process = RuntimeProcess {
            _child: child,
            stdin,
            lines: BufReader::new(stdout).lines(),
        };

        match process.read_reply().await? {
            Reply::Ready => debug!("Runtime for {} is ready", pair),
            Reply::Error(message) => bail!("runtime could not load {}: {}", pair, message),
            Reply::Ok(_) => bail!("runtime answered before reporting ready"),
        }

        Ok(Arc::new(ProcessPipeline {
            process: Mutex::new(process),
            alive: AtomicBool::new(true),
        }))
    }
}

struct RuntimeProcess {
    /// Held so the child is killed when the instance is dropped
    _child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
}

impl RuntimeProcess {
    async fn read_reply(&mut self) -> Result<Reply> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .context("Failed to read from runtime")?
                .context("runtime exited")?;

            if line.trim().is_empty() {
                continue;
            }

            return serde_json::from_str(&line)
                .with_context(|| format!("Malformed runtime reply: {}", line));
        }
    }

    async fn invoke(&mut self, args: &[JsonValue]) -> Result<Reply> {
        let mut line = serde_json::to_vec(&Invocation { args })?;
        line.push(b'\n');

        self.stdin
            .write_all(&line)
            .await
            .context("Failed to write to runtime")?;
        self.stdin.flush().await.context("Failed to flush runtime")?;

        self.read_reply().await
    }
}

/// A pipeline served by a runtime process
struct ProcessPipeline {
    process: Mutex<RuntimeProcess>,
    alive: AtomicBool,
}

#[async_trait]
impl Pipeline for ProcessPipeline {
    async fn run(&self, args: Vec<JsonValue>) -> Result<JsonValue> {
        let mut process = self.process.lock().await;

        let reply = match process.invoke(&args).await {
            Ok(reply) => reply,
            Err(e) => {
                self.alive.store(false, Ordering::Release);
                return Err(e);
            }
        };

        match reply {
            Reply::Ok(value) => Ok(value),
            Reply::Error(message) => bail!(message),
            Reply::Ready => bail!("runtime answered 'ready' to an invocation"),
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

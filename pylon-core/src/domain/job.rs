//! Job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::capability::CapabilityPair;

/// Param key naming the pipeline to run
pub const PIPELINE_PARAM: &str = "pipeline";
/// Param key naming the model to load into the pipeline
pub const MODEL_PARAM: &str = "model";

/// One unit of work offered by the pool
///
/// Created by the pool and observed here through polling. The `id` is the
/// token used for every accept/log/complete/cancel call about this job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub id: String,
    pub run_on: String,
    pub inputs: Vec<JobInput>,
    pub params: Vec<JobParam>,
    /// Execution budget granted by the pool
    pub max_execution_time: Duration,
    /// Absolute deadline set by the pool, if any
    pub expiration: Option<DateTime<Utc>>,
}

/// A single input item attached to a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInput {
    pub data: String,
    pub kind: String,
    pub marker: String,
}

/// A named, multi-valued job parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParam {
    pub key: String,
    pub values: Vec<String>,
}

impl JobDescriptor {
    /// Returns the first value of the param named `key`
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|param| param.key == key)
            .and_then(|param| param.values.first())
            .map(String::as_str)
    }

    /// Capability pair requested by this job
    ///
    /// Missing params become empty names, which no allow-list accepts.
    pub fn capability(&self) -> CapabilityPair {
        CapabilityPair::new(
            self.param(PIPELINE_PARAM).unwrap_or_default(),
            self.param(MODEL_PARAM).unwrap_or_default(),
        )
    }

    /// Payload of the first input item
    pub fn input_data(&self) -> Option<&str> {
        self.inputs.first().map(|input| input.data.as_str())
    }

    /// Earliest of `now + max_execution_time` and the pool's expiration
    ///
    /// Informational only: the node does not cut jobs off at this deadline.
    pub fn deadline(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let budget = chrono::Duration::from_std(self.max_execution_time)
            .ok()
            .and_then(|budget| now.checked_add_signed(budget));

        match (budget, self.expiration) {
            (Some(budget), Some(expiration)) => Some(budget.min(expiration)),
            (budget, expiration) => budget.or(expiration),
        }
    }
}

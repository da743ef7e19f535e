//! Capability domain types
//!
//! A capability is the `(pipeline, model)` pair a job asks for. The node
//! only accepts jobs whose pair passes its configured allow-list.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Wildcard entry that allows every name
pub const WILDCARD: &str = "*";

/// The `(pipeline, model)` pair selecting which computation to run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapabilityPair {
    pub pipeline: String,
    pub model: String,
}

impl CapabilityPair {
    pub fn new(pipeline: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            model: model.into(),
        }
    }

    /// Key under which the loaded instance for this pair is cached
    pub fn cache_key(&self) -> String {
        format!("{}_{}", self.pipeline, self.model)
    }
}

impl fmt::Display for CapabilityPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.pipeline, self.model)
    }
}

/// A set of allowed names, or everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AllowList {
    #[default]
    Any,
    Only(BTreeSet<String>),
}

impl AllowList {
    /// Parses a comma-separated list. Any `*` entry allows everything.
    ///
    /// Blank entries are ignored, so an empty string allows nothing.
    pub fn parse(raw: &str) -> Self {
        let names: BTreeSet<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();

        if names.contains(WILDCARD) {
            Self::Any
        } else {
            Self::Only(names)
        }
    }

    /// Returns true if `name` is non-empty and allowed
    pub fn allows(&self, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        match self {
            Self::Any => true,
            Self::Only(names) => names.contains(name),
        }
    }
}

impl fmt::Display for AllowList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str(WILDCARD),
            Self::Only(names) => {
                let joined: Vec<&str> = names.iter().map(String::as_str).collect();
                f.write_str(&joined.join(","))
            }
        }
    }
}

/// Why a capability pair was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityRejection {
    Pipeline(String),
    Model(String),
}

impl fmt::Display for CapabilityRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pipeline(name) => write!(f, "pipeline '{}' is not supported", name),
            Self::Model(name) => write!(f, "model '{}' is not supported", name),
        }
    }
}

/// Allowed pipelines and models for this node
///
/// Immutable once the node is configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityAllowList {
    pub pipelines: AllowList,
    pub models: AllowList,
}

impl CapabilityAllowList {
    pub fn new(pipelines: AllowList, models: AllowList) -> Self {
        Self { pipelines, models }
    }

    /// Checks the pipeline first, then the model
    pub fn check(&self, pair: &CapabilityPair) -> Result<(), CapabilityRejection> {
        if !self.pipelines.allows(&pair.pipeline) {
            return Err(CapabilityRejection::Pipeline(pair.pipeline.clone()));
        }
        if !self.models.allows(&pair.model) {
            return Err(CapabilityRejection::Model(pair.model.clone()));
        }
        Ok(())
    }
}

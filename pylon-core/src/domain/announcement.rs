//! Announcement payloads
//!
//! The node advertises itself and the kinds of work it accepts. The pool
//! answers each announcement with the interval after which it must be
//! repeated.

use serde::{Deserialize, Serialize};

/// Event kind of a job request in the marketplace
pub const JOB_REQUEST_KIND: u32 = 5003;

/// Identity the node announces to the pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAnnouncement {
    pub icon_url: String,
    pub name: String,
    pub description: String,
}

/// Description of a job this node can perform
///
/// Serialized as JSON and announced verbatim; clients fill the `%…%`
/// placeholders when they build a job request from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTemplate {
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
}

impl EventTemplate {
    /// Template for running a pipeline/model pair on the given `run_on` target
    pub fn pipeline_action(run_on: &str) -> Self {
        let tag = |parts: &[&str]| -> Vec<String> {
            parts.iter().map(|part| part.to_string()).collect()
        };

        Self {
            kind: JOB_REQUEST_KIND,
            tags: vec![
                tag(&["name", "Pipeline Action"]),
                tag(&["param", "run-on", run_on]),
                tag(&["param", "pipeline", "%INPUT_PIPELINE_NAME%"]),
                tag(&["param", "model", "%INPUT_MODEL_NAME%"]),
                tag(&["about", "An action that runs a machine learning pipeline"]),
                tag(&["i", "%INPUT%_DATA"]),
                tag(&["tos", ""]),
                tag(&["privacy", ""]),
                tag(&["author", ""]),
                tag(&["web", ""]),
                tag(&["picture", ""]),
            ],
        }
    }

    /// Pretty-printed JSON form sent to the pool
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

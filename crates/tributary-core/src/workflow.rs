//! Workflow definition and building.
//!
//! Workflows are serializable pipeline trees. Leaves name transformers in a
//! [`Registry`]; inner nodes compose them:
//!
//! ```yaml
//! name: numbers
//! pipeline:
//!   chain:
//!     - inc
//!     - parallel: [double, square]
//!     - log_errors: sqrt
//! ```

use crate::chain::try_chain;
use crate::handler::log_errors;
use crate::parallel::try_in_parallel;
use crate::registry::Registry;
use crate::transformer::{CompositionError, Transformer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Human-readable description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// The pipeline to build.
    pub pipeline: Node,
}

/// One node of a pipeline tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    /// A registered transformer, by name.
    Step(String),
    /// Stages applied in sequence.
    Chain { chain: Vec<Node> },
    /// Members applied concurrently to the same input.
    Parallel { parallel: Vec<Node> },
    /// A node whose errors are logged and dropped.
    LogErrors { log_errors: Box<Node> },
}

impl Node {
    pub fn step(name: impl Into<String>) -> Self {
        Node::Step(name.into())
    }

    pub fn chain(nodes: Vec<Node>) -> Self {
        Node::Chain { chain: nodes }
    }

    pub fn parallel(nodes: Vec<Node>) -> Self {
        Node::Parallel { parallel: nodes }
    }

    pub fn log_errors(node: Node) -> Self {
        Node::LogErrors {
            log_errors: Box::new(node),
        }
    }

    /// Names of every step in this tree, depth-first.
    pub fn step_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_step_names(&mut names);
        names
    }

    fn collect_step_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Node::Step(name) => names.push(name),
            Node::Chain { chain: nodes } | Node::Parallel { parallel: nodes } => {
                for node in nodes {
                    node.collect_step_names(names);
                }
            }
            Node::LogErrors { log_errors } => log_errors.collect_step_names(names),
        }
    }

    /// Resolve names against `registry` and compose the tree.
    pub fn build(&self, registry: &Registry) -> Result<Arc<dyn Transformer>, WorkflowError> {
        match self {
            Node::Step(name) => registry
                .get(name)
                .ok_or_else(|| WorkflowError::UnknownTransformer(name.clone())),
            Node::Chain { chain } => {
                let stages = build_all(chain, registry)?;
                Ok(try_chain(stages)?)
            }
            Node::Parallel { parallel } => {
                let members = build_all(parallel, registry)?;
                Ok(try_in_parallel(members)?)
            }
            Node::LogErrors { log_errors: inner } => Ok(log_errors(inner.build(registry)?)),
        }
    }
}

fn build_all(
    nodes: &[Node],
    registry: &Registry,
) -> Result<Vec<Arc<dyn Transformer>>, WorkflowError> {
    nodes.iter().map(|node| node.build(registry)).collect()
}

impl Workflow {
    /// Create a workflow around `pipeline`.
    pub fn new(pipeline: Node) -> Self {
        Self {
            name: None,
            description: String::new(),
            pipeline,
        }
    }

    /// Set the name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the description.
    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Build the pipeline against `registry`.
    pub fn build(&self, registry: &Registry) -> Result<Arc<dyn Transformer>, WorkflowError> {
        let transformer = self.pipeline.build(registry)?;
        tracing::debug!(
            workflow = self.name.as_deref().unwrap_or("<unnamed>"),
            input = %transformer.input_type(),
            output = %transformer.output_type(),
            "workflow built"
        );
        Ok(transformer)
    }

    /// Parse workflow from bytes, auto-detecting format.
    pub fn from_bytes(data: &[u8], path: Option<&str>) -> Result<Self, WorkflowError> {
        let format = path
            .and_then(detect_format)
            .unwrap_or_else(|| "yaml".to_string());

        Self::from_bytes_format(data, &format)
    }

    /// Parse workflow from bytes with explicit format.
    pub fn from_bytes_format(data: &[u8], format: &str) -> Result<Self, WorkflowError> {
        match format {
            "json" => serde_json::from_slice(data).map_err(|e| WorkflowError::Parse(e.to_string())),
            "yaml" | "yml" => {
                serde_yaml::from_slice(data).map_err(|e| WorkflowError::Parse(e.to_string()))
            }
            "toml" => {
                let s = std::str::from_utf8(data)
                    .map_err(|e| WorkflowError::Parse(format!("Invalid UTF-8: {}", e)))?;
                toml::from_str(s).map_err(|e| WorkflowError::Parse(e.to_string()))
            }
            _ => Err(WorkflowError::Parse(format!(
                "Unsupported workflow format: {}",
                format
            ))),
        }
    }

    /// Serialize workflow to bytes.
    pub fn to_bytes(&self, format: &str) -> Result<Vec<u8>, WorkflowError> {
        match format {
            "json" => {
                serde_json::to_vec_pretty(self).map_err(|e| WorkflowError::Parse(e.to_string()))
            }
            "yaml" | "yml" => serde_yaml::to_string(self)
                .map(|s| s.into_bytes())
                .map_err(|e| WorkflowError::Parse(e.to_string())),
            "toml" => toml::to_string_pretty(self)
                .map(|s| s.into_bytes())
                .map_err(|e| WorkflowError::Parse(e.to_string())),
            _ => Err(WorkflowError::Parse(format!(
                "Unsupported workflow format: {}",
                format
            ))),
        }
    }
}

/// Errors related to workflow parsing and building.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("failed to parse workflow: {0}")]
    Parse(String),

    #[error("unknown transformer: {0}")]
    UnknownTransformer(String),

    #[error("invalid pipeline: {0}")]
    Composition(#[from] CompositionError),
}

/// Detect workflow format from file path extension.
pub fn detect_format(path: &str) -> Option<String> {
    let ext = path.rsplit('.').next()?;
    match ext.to_lowercase().as_str() {
        "json" => Some("json".into()),
        "yaml" | "yml" => Some("yaml".into()),
        "toml" => Some("toml".into()),
        _ => None,
    }
}

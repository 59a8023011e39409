//! Error types for graph construction and execution
//!
//! Every runtime variant of [`GraphError`] names the lineage it happened in and
//! the last checkpoint that was successfully committed (`checkpoint_id`), so a
//! caller can always resume or fork from a known-good point. A failed
//! superstep never commits anything: the checkpoint named in the error is the
//! one the superstep started from.
//!
//! Errors found while folding writes or routing are first raised as
//! [`CommitError`] by the pure superstep helpers and promoted to a
//! [`GraphError`] by the scheduler, which knows the lineage context.

use crate::graph::NodeId;
use crate::state::StateError;
use chronograph_checkpoint::{CheckpointError, CheckpointId, Write};
use std::collections::BTreeMap;
use thiserror::Error;

/// Convenience result type using [`GraphError`]
pub type Result<T> = std::result::Result<T, GraphError>;

/// One node that failed inside a superstep
#[derive(Debug, Clone, PartialEq)]
pub struct NodeFailure {
    /// Name of the node that failed
    pub node: NodeId,
    /// Error message from the last attempt
    pub error: String,
    /// Attempts made, including retries
    pub attempts: usize,
}

fn describe_failures(failures: &[NodeFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("'{}': {}", f.node, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

fn at(checkpoint_id: &Option<CheckpointId>) -> &str {
    checkpoint_id.as_deref().unwrap_or("<none>")
}

/// Error type for all graph operations
#[derive(Error, Debug)]
pub enum GraphError {
    /// Graph structure validation failed at compile time
    #[error("Graph validation failed: {0}")]
    Validation(String),

    /// Engine configuration is invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A write (from a node, input or manual update) targeted an undeclared channel
    #[error("node '{node}' wrote undeclared channel '{channel}' (lineage {lineage_id}, last checkpoint {})", at(.checkpoint_id))]
    UnknownChannel {
        channel: String,
        node: NodeId,
        lineage_id: String,
        checkpoint_id: Option<CheckpointId>,
    },

    /// A channel reducer rejected a write
    #[error("reducer for channel '{channel}' rejected write from '{node}': {error} (lineage {lineage_id}, last checkpoint {})", at(.checkpoint_id))]
    Reducer {
        channel: String,
        node: NodeId,
        error: String,
        lineage_id: String,
        checkpoint_id: Option<CheckpointId>,
    },

    /// One or more nodes failed; nothing from the superstep was committed
    #[error("superstep failed in lineage {lineage_id} (last checkpoint {}): {}", at(.checkpoint_id), describe_failures(.failures))]
    NodeExecution {
        lineage_id: String,
        checkpoint_id: Option<CheckpointId>,
        /// Every node that failed, in node name order
        failures: Vec<NodeFailure>,
        /// Writes produced by the nodes of the same superstep that succeeded
        partial_writes: BTreeMap<NodeId, Vec<Write>>,
    },

    /// A router returned a label that resolves to no node
    #[error("router of node '{node}' returned unknown label '{label}' (lineage {lineage_id}, last checkpoint {})", at(.checkpoint_id))]
    Routing {
        node: NodeId,
        label: String,
        lineage_id: String,
        checkpoint_id: Option<CheckpointId>,
    },

    /// The addressed checkpoint does not exist; `None` means the lineage is empty
    #[error("checkpoint {} not found in lineage {lineage_id}", at(.checkpoint_id))]
    CheckpointNotFound {
        lineage_id: String,
        checkpoint_id: Option<CheckpointId>,
    },

    /// Another invocation is already advancing this lineage
    #[error("lineage {lineage_id} is already being advanced by another invocation")]
    ConcurrentLineage { lineage_id: String },

    /// The invocation ran more supersteps than allowed
    #[error("recursion limit of {limit} supersteps reached in lineage {lineage_id} (last checkpoint {})", at(.checkpoint_id))]
    RecursionLimit {
        limit: usize,
        lineage_id: String,
        checkpoint_id: Option<CheckpointId>,
    },

    /// The invocation was cancelled between supersteps
    #[error("execution of lineage {lineage_id} cancelled (last checkpoint {})", at(.checkpoint_id))]
    Cancelled {
        lineage_id: String,
        checkpoint_id: Option<CheckpointId>,
    },

    /// Checkpoint persistence error
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl GraphError {
    /// Lineage the error happened in, for runtime errors
    pub fn lineage_id(&self) -> Option<&str> {
        match self {
            GraphError::UnknownChannel { lineage_id, .. }
            | GraphError::Reducer { lineage_id, .. }
            | GraphError::NodeExecution { lineage_id, .. }
            | GraphError::Routing { lineage_id, .. }
            | GraphError::CheckpointNotFound { lineage_id, .. }
            | GraphError::ConcurrentLineage { lineage_id }
            | GraphError::RecursionLimit { lineage_id, .. }
            | GraphError::Cancelled { lineage_id, .. } => Some(lineage_id),
            _ => None,
        }
    }

    /// Last committed checkpoint before the error; the safe point to resume or fork from
    pub fn last_checkpoint_id(&self) -> Option<&str> {
        match self {
            GraphError::UnknownChannel { checkpoint_id, .. }
            | GraphError::Reducer { checkpoint_id, .. }
            | GraphError::NodeExecution { checkpoint_id, .. }
            | GraphError::Routing { checkpoint_id, .. }
            | GraphError::RecursionLimit { checkpoint_id, .. }
            | GraphError::Cancelled { checkpoint_id, .. } => checkpoint_id.as_deref(),
            _ => None,
        }
    }

    pub fn checkpoint_not_found(
        lineage_id: impl Into<String>,
        checkpoint_id: Option<CheckpointId>,
    ) -> Self {
        Self::CheckpointNotFound {
            lineage_id: lineage_id.into(),
            checkpoint_id,
        }
    }
}

/// Failure inside a pure commit or routing step, before lineage context is known
#[derive(Error, Debug)]
pub enum CommitError {
    #[error("node '{node}' wrote undeclared channel '{channel}'")]
    UnknownChannel { node: NodeId, channel: String },

    #[error("reducer for channel '{channel}' rejected write from '{node}': {source}")]
    Reducer {
        node: NodeId,
        channel: String,
        source: StateError,
    },

    #[error("router of node '{node}' returned unknown label '{label}'")]
    Routing { node: NodeId, label: String },
}

impl CommitError {
    /// Attach lineage context
    pub fn at(self, lineage_id: &str, checkpoint_id: Option<&str>) -> GraphError {
        let lineage_id = lineage_id.to_string();
        let checkpoint_id = checkpoint_id.map(str::to_string);
        match self {
            CommitError::UnknownChannel { node, channel } => GraphError::UnknownChannel {
                channel,
                node,
                lineage_id,
                checkpoint_id,
            },
            CommitError::Reducer {
                node,
                channel,
                source,
            } => GraphError::Reducer {
                channel,
                node,
                error: source.to_string(),
                lineage_id,
                checkpoint_id,
            },
            CommitError::Routing { node, label } => GraphError::Routing {
                node,
                label,
                lineage_id,
                checkpoint_id,
            },
        }
    }
}

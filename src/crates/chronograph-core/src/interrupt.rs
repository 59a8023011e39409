//! Interrupt controller
//!
//! Interrupts pause a run at a superstep boundary so a human (or another
//! system) can inspect and edit state before the run continues.
//!
//! - **before** a node: checked against the frontier before a superstep runs.
//!   Nothing runs and no checkpoint is written; the loaded checkpoint is the
//!   resumable point.
//! - **after** a node: checked against the nodes that just ran, once their
//!   superstep has been committed and persisted.
//!
//! Both checks are pure predicates over [`InterruptConfig`]. The
//! interrupt-before check runs first at every boundary, ahead of cancellation
//! and the recursion limit, so a stored checkpoint whose frontier hits an
//! interrupt is always one the run paused on. [`InterruptConfig::paused_at`]
//! recognises those checkpoints, and a run resumed from one does not re-check
//! the frontier it was paused on. Manual updates carry the
//! [`RESUMES_INTERRUPT`] marker when they edit such a checkpoint. When a run
//! pauses on an unmarked manual update, it stores a marked copy of it as the
//! pause point.

use crate::error::{GraphError, Result};
use crate::graph::{Graph, NodeId};
use chronograph_checkpoint::{CheckpointId, CheckpointSource, CheckpointTuple};
use serde::{Deserialize, Serialize};

/// Metadata key set on manual updates of a paused checkpoint
pub const RESUMES_INTERRUPT: &str = "resumes_interrupt";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterruptConfig {
    pub interrupt_before: Vec<NodeId>,

    pub interrupt_after: Vec<NodeId>,

    pub interrupt_before_all: bool,

    pub interrupt_after_all: bool,
}

impl InterruptConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interrupt_before(mut self, nodes: Vec<impl Into<NodeId>>) -> Self {
        self.interrupt_before = nodes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_interrupt_after(mut self, nodes: Vec<impl Into<NodeId>>) -> Self {
        self.interrupt_after = nodes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_interrupt_before_all(mut self) -> Self {
        self.interrupt_before_all = true;
        self
    }

    pub fn with_interrupt_after_all(mut self) -> Self {
        self.interrupt_after_all = true;
        self
    }

    pub fn should_interrupt_before(&self, node: &str) -> bool {
        self.interrupt_before_all || self.interrupt_before.iter().any(|n| n == node)
    }

    pub fn should_interrupt_after(&self, node: &str) -> bool {
        self.interrupt_after_all || self.interrupt_after.iter().any(|n| n == node)
    }

    /// Frontier nodes that trigger a pause before the superstep, in frontier order
    pub fn before_hits(&self, frontier: &[NodeId]) -> Vec<NodeId> {
        frontier
            .iter()
            .filter(|n| self.should_interrupt_before(n))
            .cloned()
            .collect()
    }

    /// Just-ran nodes that trigger a pause after the superstep
    pub fn after_hits(&self, ran: &[NodeId]) -> Vec<NodeId> {
        ran.iter()
            .filter(|n| self.should_interrupt_after(n))
            .cloned()
            .collect()
    }

    /// Whether a run under this config paused on `tuple`.
    ///
    /// Loop and input checkpoints paused when their frontier hits an
    /// interrupt-before, or when an interrupt-after fired on the nodes that
    /// produced them and work remained. Manual updates count as paused only
    /// when they carry [`RESUMES_INTERRUPT`].
    pub fn paused_at(&self, tuple: &CheckpointTuple) -> bool {
        let metadata = &tuple.metadata;
        let next = &tuple.checkpoint.next;
        match metadata.source {
            CheckpointSource::Update => metadata
                .extra
                .get(RESUMES_INTERRUPT)
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false),
            CheckpointSource::Loop => {
                !next.is_empty()
                    && (!self.before_hits(next).is_empty()
                        || !self.after_hits(&metadata.ran).is_empty())
            }
            _ => !self.before_hits(next).is_empty(),
        }
    }

    /// Reject interrupts on nodes that `graph` does not have
    pub fn validate_nodes(&self, graph: &Graph) -> Result<()> {
        for node in self.interrupt_before.iter().chain(&self.interrupt_after) {
            if !graph.nodes.contains_key(node) {
                return Err(GraphError::Validation(format!(
                    "interrupt configured for unknown node '{node}'"
                )));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        !self.interrupt_before_all
            && !self.interrupt_after_all
            && self.interrupt_before.is_empty()
            && self.interrupt_after.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterruptWhen {
    Before,
    After,
}

/// Why and where a run paused
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptState {
    pub lineage_id: String,

    /// Nodes that triggered the pause
    pub nodes: Vec<NodeId>,

    pub when: InterruptWhen,

    /// Step of the resumable checkpoint
    pub step: i64,

    /// Resumable checkpoint
    pub checkpoint_id: CheckpointId,

    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl InterruptState {
    pub fn new(
        lineage_id: impl Into<String>,
        nodes: Vec<NodeId>,
        when: InterruptWhen,
        step: i64,
        checkpoint_id: CheckpointId,
    ) -> Self {
        Self {
            lineage_id: lineage_id.into(),
            nodes,
            when,
            step,
            checkpoint_id,
            timestamp: chrono::Utc::now(),
        }
    }
}

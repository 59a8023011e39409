//! Type definitions for compiled graph execution

use crate::error::Result;
use crate::interrupt::InterruptState;
use crate::stream::StreamEvent;
use chronograph_checkpoint::{
    ChannelValues, CheckpointConfig, CheckpointId, CheckpointMetadata, CheckpointTuple,
};
use chrono::{DateTime, Utc};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// Addresses one invocation: which lineage to advance and from where.
///
/// Without a `checkpoint_id` the invocation starts from the latest checkpoint
/// of the lineage. With one it starts from that checkpoint, and everything it
/// commits becomes a new branch parented there.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub lineage_id: String,
    pub checkpoint_id: Option<CheckpointId>,
    /// Checked between supersteps; nodes see it through their context
    pub cancel: CancellationToken,
}

impl RunConfig {
    pub fn new(lineage_id: impl Into<String>) -> Self {
        Self {
            lineage_id: lineage_id.into(),
            checkpoint_id: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_checkpoint_id(mut self, checkpoint_id: impl Into<CheckpointId>) -> Self {
        self.checkpoint_id = Some(checkpoint_id.into());
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub(crate) fn checkpoint_config(&self) -> CheckpointConfig {
        let config = CheckpointConfig::for_lineage(self.lineage_id.clone());
        match &self.checkpoint_id {
            Some(id) => config.with_checkpoint_id(id.clone()),
            None => config,
        }
    }
}

/// Point-in-time view of one checkpoint.
///
/// `next` empty means the lineage completed at this checkpoint. When the
/// snapshot is the result of a paused invocation, `interrupt` says which
/// nodes paused it and whether before or after they ran; resuming the
/// snapshot's `config` continues the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Complete channel map at the checkpoint
    pub values: ChannelValues,

    /// Nodes the next superstep will run
    pub next: Vec<String>,

    /// Addresses this checkpoint
    pub config: CheckpointConfig,

    pub metadata: CheckpointMetadata,

    pub created_at: DateTime<Utc>,

    /// Addresses the parent checkpoint, `None` for the root of a lineage
    pub parent_config: Option<CheckpointConfig>,

    pub interrupt: Option<InterruptState>,
}

impl StateSnapshot {
    pub fn checkpoint_id(&self) -> Option<&str> {
        self.config.checkpoint_id.as_deref()
    }

    pub fn parent_checkpoint_id(&self) -> Option<&str> {
        self.parent_config
            .as_ref()
            .and_then(|c| c.checkpoint_id.as_deref())
    }

    pub fn step(&self) -> i64 {
        self.metadata.step
    }

    pub fn is_complete(&self) -> bool {
        self.next.is_empty()
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_some()
    }

    pub(crate) fn with_interrupt(mut self, interrupt: Option<InterruptState>) -> Self {
        self.interrupt = interrupt;
        self
    }
}

impl From<CheckpointTuple> for StateSnapshot {
    fn from(tuple: CheckpointTuple) -> Self {
        Self {
            values: tuple.checkpoint.channel_values,
            next: tuple.checkpoint.next,
            config: tuple.config,
            metadata: tuple.metadata,
            created_at: tuple.checkpoint.ts,
            parent_config: tuple.parent_config,
            interrupt: None,
        }
    }
}

/// Stream of execution events
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Stream of state snapshots for history traversal
pub type StateSnapshotStream = Pin<Box<dyn Stream<Item = Result<StateSnapshot>> + Send>>;

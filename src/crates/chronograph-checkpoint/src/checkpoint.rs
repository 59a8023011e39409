//! Core checkpoint data structures
//!
//! This module defines the types that describe one persisted round of graph
//! execution: **[`Checkpoint`]** (the channel map, versions and frontier),
//! **[`CheckpointMetadata`]** (how the checkpoint was produced),
//! **[`CheckpointConfig`]** (lineage id plus optional checkpoint id) and
//! **[`CheckpointTuple`]** (everything a store returns for one checkpoint).
//!
//! # Structure
//!
//! ```text
//! CheckpointTuple
//! ├── config         lineage_id="user-1", checkpoint_id="0006..-..."
//! ├── parent_config  lineage_id="user-1", checkpoint_id="0006..-..." | None
//! ├── checkpoint
//! │   ├── channel_values    {"messages": [...], "route": "action"}
//! │   ├── channel_versions  {"messages": 3, "route": 1}
//! │   └── next              ["action"]
//! └── metadata
//!     ├── source  input | loop | update
//!     ├── step    2
//!     ├── ran     ["agent"]
//!     └── writes  {"agent": [{"channel": "messages", "value": ...}]}
//! ```
//!
//! The channel map of every checkpoint equals its parent's map folded with
//! `metadata.writes`: node keys in ascending order, each node's writes in the
//! order the node emitted them. That is what makes a lineage replayable.
//!
//! # Checkpoint Sources
//!
//! | Source | When Created |
//! |--------|--------------|
//! | `Input` | External input was committed before the first superstep |
//! | `Loop` | After each superstep |
//! | `Update` | Manual state edit (`update_state` / fork) |

use crate::id::{new_checkpoint_id, CheckpointId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Mapping from channel name to current value
pub type ChannelValues = BTreeMap<String, Value>;

/// Mapping from channel name to version; a version increments on every
/// commit that writes the channel
pub type ChannelVersions = BTreeMap<String, u64>;

/// A single pending update to a channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Write {
    pub channel: String,
    pub value: Value,
}

impl Write {
    pub fn new(channel: impl Into<String>, value: Value) -> Self {
        Self {
            channel: channel.into(),
            value,
        }
    }
}

/// Metadata source type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Checkpoint created from external input to invoke/stream
    #[default]
    Input,
    /// Checkpoint created from inside the superstep loop
    Loop,
    /// Checkpoint created from a manual state update
    Update,
}

/// Metadata associated with a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CheckpointMetadata {
    /// The source of the checkpoint
    pub source: CheckpointSource,

    /// The superstep index. 0 for the first input checkpoint of a lineage,
    /// parent step + 1 afterwards.
    pub step: i64,

    /// Writes applied to the parent's channel map to produce this checkpoint,
    /// keyed by the node (or pseudo-node) that emitted them
    #[serde(default)]
    pub writes: BTreeMap<String, Vec<Write>>,

    /// Nodes whose completion produced this checkpoint. Routing out of these
    /// nodes yields the checkpoint's `next` frontier.
    #[serde(default)]
    pub ran: Vec<String>,

    /// Additional custom metadata
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl CheckpointMetadata {
    /// Create a new checkpoint metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the source
    pub fn with_source(mut self, source: CheckpointSource) -> Self {
        self.source = source;
        self
    }

    /// Set the step number
    pub fn with_step(mut self, step: i64) -> Self {
        self.step = step;
        self
    }

    /// Record the writes of one node
    pub fn with_writes(mut self, node: impl Into<String>, writes: Vec<Write>) -> Self {
        self.writes.insert(node.into(), writes);
        self
    }

    /// Set the nodes that ran
    pub fn with_ran(mut self, ran: Vec<String>) -> Self {
        self.ran = ran;
        self
    }

    /// Add custom metadata
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Flat iterator over every recorded write in fold order
    pub fn ordered_writes(&self) -> impl Iterator<Item = (&str, &Write)> {
        self.writes
            .iter()
            .flat_map(|(node, writes)| writes.iter().map(move |w| (node.as_str(), w)))
    }
}

/// State snapshot at a given point in time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// The version of the checkpoint format (currently 1)
    pub v: i32,

    /// The ID of the checkpoint (unique and monotonically increasing)
    pub id: CheckpointId,

    /// The timestamp of the checkpoint
    pub ts: DateTime<Utc>,

    /// The values of the channels at the time of the checkpoint
    pub channel_values: ChannelValues,

    /// The versions of the channels at the time of the checkpoint
    pub channel_versions: ChannelVersions,

    /// Nodes scheduled to run in the next superstep; empty once the run
    /// has completed
    pub next: Vec<String>,
}

impl Checkpoint {
    /// Current checkpoint format version
    pub const CURRENT_VERSION: i32 = 1;

    /// Create a new checkpoint with a fresh id
    pub fn new(
        channel_values: ChannelValues,
        channel_versions: ChannelVersions,
        next: Vec<String>,
    ) -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            id: new_checkpoint_id(),
            ts: Utc::now(),
            channel_values,
            channel_versions,
            next,
        }
    }

    /// Create an empty checkpoint
    pub fn empty() -> Self {
        Self::new(ChannelValues::new(), ChannelVersions::new(), Vec::new())
    }

    /// Whether the run that produced this checkpoint has finished
    pub fn is_complete(&self) -> bool {
        self.next.is_empty()
    }
}

/// Configuration for checkpoint operations
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CheckpointConfig {
    /// Lineage the checkpoint belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lineage_id: Option<String>,

    /// Specific checkpoint ID; `None` addresses the latest checkpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<CheckpointId>,

    /// Additional configuration
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl CheckpointConfig {
    /// Create a new checkpoint configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a config addressing the latest checkpoint of a lineage
    pub fn for_lineage(lineage_id: impl Into<String>) -> Self {
        Self::new().with_lineage_id(lineage_id)
    }

    /// Set the lineage ID
    pub fn with_lineage_id(mut self, lineage_id: impl Into<String>) -> Self {
        self.lineage_id = Some(lineage_id.into());
        self
    }

    /// Set the checkpoint ID
    pub fn with_checkpoint_id(mut self, checkpoint_id: impl Into<CheckpointId>) -> Self {
        self.checkpoint_id = Some(checkpoint_id.into());
        self
    }
}

/// A tuple containing a checkpoint and its associated data
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointTuple {
    /// Configuration for this checkpoint
    pub config: CheckpointConfig,

    /// The checkpoint itself
    pub checkpoint: Checkpoint,

    /// Metadata associated with the checkpoint
    pub metadata: CheckpointMetadata,

    /// Parent configuration (if any)
    pub parent_config: Option<CheckpointConfig>,
}

impl CheckpointTuple {
    /// Create a new checkpoint tuple
    pub fn new(
        config: CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Self {
        Self {
            config,
            checkpoint,
            metadata,
            parent_config: None,
        }
    }

    /// Set the parent configuration
    pub fn with_parent_config(mut self, parent_config: CheckpointConfig) -> Self {
        self.parent_config = Some(parent_config);
        self
    }

    /// Parent checkpoint id, if this is not a root
    pub fn parent_id(&self) -> Option<&str> {
        self.parent_config
            .as_ref()
            .and_then(|c| c.checkpoint_id.as_deref())
    }
}

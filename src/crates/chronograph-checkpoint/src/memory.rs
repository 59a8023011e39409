//! In-memory checkpoint storage
//!
//! [`InMemoryCheckpointSaver`] is the reference [`CheckpointSaver`]. It keeps
//! every lineage in a map ordered by checkpoint id and stores each checkpoint
//! as serialized bytes, so a tuple handed out by the saver is always a fresh
//! copy and stored history cannot be mutated through it.
//!
//! It enforces the full storage contract (immutable ids, parent-before-child)
//! and is what the engine uses when no other saver is configured. Data lives
//! only as long as the process.
//!
//! ```rust
//! use chronograph_checkpoint::{
//!     Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver,
//!     InMemoryCheckpointSaver,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let saver = InMemoryCheckpointSaver::new();
//! let stored = saver
//!     .put(
//!         &CheckpointConfig::for_lineage("lineage-1"),
//!         Checkpoint::empty(),
//!         CheckpointMetadata::new(),
//!     )
//!     .await?;
//!
//! let latest = saver.get_tuple(&CheckpointConfig::for_lineage("lineage-1")).await?;
//! assert_eq!(latest.map(|t| t.config), Some(stored));
//! # Ok(())
//! # }
//! ```

use crate::{
    checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple},
    error::{CheckpointError, Result},
    id::CheckpointId,
    serializer::{JsonSerializer, SerializerProtocol},
    traits::{metadata_matches, CheckpointSaver, CheckpointStream, MetadataFilter},
};
use async_trait::async_trait;
use futures::stream;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Storage entry for in-memory checkpoints
#[derive(Debug, Clone)]
struct CheckpointEntry {
    parent_id: Option<CheckpointId>,
    checkpoint: Vec<u8>,
    metadata: Vec<u8>,
}

/// Lineage id -> (checkpoint id -> entry), ids ascending
type CheckpointStorage = Arc<RwLock<HashMap<String, BTreeMap<CheckpointId, CheckpointEntry>>>>;

/// In-memory checkpoint saver implementation
///
/// Cloning the saver shares the underlying storage.
#[derive(Debug, Clone)]
pub struct InMemoryCheckpointSaver<S = JsonSerializer> {
    storage: CheckpointStorage,
    serde: S,
}

impl InMemoryCheckpointSaver<JsonSerializer> {
    /// Create a new in-memory checkpoint saver
    pub fn new() -> Self {
        Self::with_serializer(JsonSerializer::new())
    }
}

impl Default for InMemoryCheckpointSaver<JsonSerializer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SerializerProtocol> InMemoryCheckpointSaver<S> {
    /// Create a saver that encodes entries with `serde`
    pub fn with_serializer(serde: S) -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
            serde,
        }
    }

    /// Get the number of lineages being tracked
    pub async fn lineage_count(&self) -> usize {
        self.storage.read().await.len()
    }

    /// Get the total number of checkpoints across all lineages
    pub async fn checkpoint_count(&self) -> usize {
        self.storage
            .read()
            .await
            .values()
            .map(|entries| entries.len())
            .sum()
    }

    fn decode(
        &self,
        lineage_id: &str,
        checkpoint_id: &str,
        entry: &CheckpointEntry,
    ) -> Result<CheckpointTuple> {
        let checkpoint: Checkpoint = self.serde.loads(&entry.checkpoint)?;
        let metadata: CheckpointMetadata = self.serde.loads(&entry.metadata)?;
        let config = CheckpointConfig::for_lineage(lineage_id).with_checkpoint_id(checkpoint_id);
        let parent_config = entry
            .parent_id
            .as_ref()
            .map(|parent| CheckpointConfig::for_lineage(lineage_id).with_checkpoint_id(parent.clone()));

        Ok(CheckpointTuple {
            config,
            checkpoint,
            metadata,
            parent_config,
        })
    }
}

fn require_lineage(config: &CheckpointConfig) -> Result<&str> {
    config
        .lineage_id
        .as_deref()
        .ok_or_else(|| CheckpointError::invalid("lineage_id is required"))
}

#[async_trait]
impl<S: SerializerProtocol> CheckpointSaver for InMemoryCheckpointSaver<S> {
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        let lineage_id = require_lineage(config)?;
        let storage = self.storage.read().await;

        let Some(entries) = storage.get(lineage_id) else {
            return Ok(None);
        };

        let found = match &config.checkpoint_id {
            Some(checkpoint_id) => entries.get_key_value(checkpoint_id),
            None => entries.iter().next_back(),
        };

        found
            .map(|(id, entry)| self.decode(lineage_id, id, entry))
            .transpose()
    }

    async fn list(
        &self,
        config: Option<&CheckpointConfig>,
        filter: Option<MetadataFilter>,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> Result<CheckpointStream> {
        let storage = self.storage.read().await;
        let before_id = before.and_then(|b| b.checkpoint_id.as_deref());

        // Determine which lineages to search
        let mut candidates: Vec<(&str, &CheckpointId, &CheckpointEntry)> =
            match config.and_then(|c| c.lineage_id.as_deref()) {
                Some(lineage_id) => storage
                    .get(lineage_id)
                    .into_iter()
                    .flat_map(|entries| entries.iter().map(move |(id, e)| (lineage_id, id, e)))
                    .collect(),
                None => storage
                    .iter()
                    .flat_map(|(lineage, entries)| {
                        entries.iter().map(move |(id, e)| (lineage.as_str(), id, e))
                    })
                    .collect(),
            };
        candidates.sort_by(|a, b| b.1.cmp(a.1));

        let mut results = Vec::new();
        for (lineage_id, id, entry) in candidates {
            if let Some(before_id) = before_id {
                if id.as_str() >= before_id {
                    continue;
                }
            }

            let tuple = self.decode(lineage_id, id, entry)?;
            if let Some(filter_map) = &filter {
                if !metadata_matches(&tuple.metadata, filter_map) {
                    continue;
                }
            }

            results.push(Ok(tuple));
            if limit.is_some_and(|lim| results.len() >= lim) {
                break;
            }
        }

        Ok(Box::pin(stream::iter(results)))
    }

    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointConfig> {
        let lineage_id = require_lineage(config)?;
        if checkpoint.id.is_empty() {
            return Err(CheckpointError::invalid("checkpoint id must not be empty"));
        }

        let entry = CheckpointEntry {
            parent_id: config.checkpoint_id.clone(),
            checkpoint: self.serde.dumps(&checkpoint)?,
            metadata: self.serde.dumps(&metadata)?,
        };

        let mut storage = self.storage.write().await;
        let entries = storage.entry(lineage_id.to_string()).or_default();

        if entries.contains_key(&checkpoint.id) {
            return Err(CheckpointError::AlreadyExists {
                lineage_id: lineage_id.to_string(),
                checkpoint_id: checkpoint.id,
            });
        }
        if let Some(parent_id) = &entry.parent_id {
            if !entries.contains_key(parent_id) {
                return Err(CheckpointError::ParentNotFound {
                    lineage_id: lineage_id.to_string(),
                    parent_id: parent_id.clone(),
                });
            }
        }

        tracing::debug!(
            lineage_id,
            checkpoint_id = %checkpoint.id,
            parent_id = ?entry.parent_id,
            step = metadata.step,
            "stored checkpoint"
        );
        entries.insert(checkpoint.id.clone(), entry);

        Ok(CheckpointConfig::for_lineage(lineage_id).with_checkpoint_id(checkpoint.id))
    }

    async fn delete_lineage(&self, lineage_id: &str) -> Result<()> {
        let mut storage = self.storage.write().await;
        storage.remove(lineage_id);
        Ok(())
    }
}

//! Extensible checkpoint storage trait for custom backend implementations
//!
//! This module defines **[`CheckpointSaver`]**, the only interface the engine
//! uses to persist and load state. Any store that can keep immutable records
//! keyed by `(lineage_id, checkpoint_id)` with a parent pointer can implement
//! it: a relational table, an object store, an embedded key-value engine.
//!
//! # Contract
//!
//! - **Immutability** - a stored checkpoint is never modified. `put` with an id
//!   that already exists in the lineage fails with
//!   [`CheckpointError::AlreadyExists`](crate::CheckpointError::AlreadyExists).
//! - **Parent first** - `put` names the parent through `config.checkpoint_id`;
//!   the parent must already be stored.
//! - **Ordering** - ids are time-ordered strings (see [`crate::id`]); `list`
//!   returns newest first and `get_tuple` without an id returns the newest.
//! - **Absence is not an error** - `get_tuple` returns `Ok(None)` for unknown
//!   lineages or ids.
//!
//! # Implementing a Backend
//!
//! ```rust,ignore
//! use chronograph_checkpoint::{
//!     CheckpointSaver, CheckpointConfig, Checkpoint, CheckpointMetadata,
//!     CheckpointTuple, CheckpointStream, Result,
//! };
//! use async_trait::async_trait;
//!
//! struct PostgresCheckpointSaver {
//!     pool: sqlx::PgPool,
//! }
//!
//! #[async_trait]
//! impl CheckpointSaver for PostgresCheckpointSaver {
//!     async fn put(
//!         &self,
//!         config: &CheckpointConfig,
//!         checkpoint: Checkpoint,
//!         metadata: CheckpointMetadata,
//!     ) -> Result<CheckpointConfig> {
//!         // INSERT ... (lineage_id, checkpoint_id, parent_checkpoint_id, checkpoint, metadata)
//!         // A primary key on (lineage_id, checkpoint_id) gives AlreadyExists.
//!         todo!()
//!     }
//!
//!     async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
//!         // SELECT ... WHERE lineage_id = $1 [AND checkpoint_id = $2]
//!         // ORDER BY checkpoint_id DESC LIMIT 1
//!         todo!()
//!     }
//!
//!     // list() ...
//! }
//! ```

use crate::{
    checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple},
    error::Result,
};
use async_trait::async_trait;
use futures::stream::Stream;
use std::collections::HashMap;
use std::pin::Pin;

/// Stream of checkpoint tuples returned by [`CheckpointSaver::list`]
pub type CheckpointStream =
    Pin<Box<dyn Stream<Item = Result<CheckpointTuple>> + Send + 'static>>;

/// Metadata filter for [`CheckpointSaver::list`]: every key must be present in
/// the serialized metadata with an equal value
pub type MetadataFilter = HashMap<String, serde_json::Value>;

/// Storage backend for checkpoints.
///
/// Implementations must be safe to share between concurrently running
/// lineages; the engine guarantees at most one writer per lineage.
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Fetch a checkpoint using the given configuration
    async fn get(&self, config: &CheckpointConfig) -> Result<Option<Checkpoint>> {
        if let Some(tuple) = self.get_tuple(config).await? {
            Ok(Some(tuple.checkpoint))
        } else {
            Ok(None)
        }
    }

    /// Retrieve a checkpoint tuple.
    ///
    /// - `checkpoint_id` set: that exact checkpoint
    /// - otherwise: the newest checkpoint of `lineage_id`
    ///
    /// `lineage_id` is required.
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>>;

    /// List checkpoints newest first.
    ///
    /// # Arguments
    ///
    /// * `config` - restrict to one lineage (`None` lists every lineage)
    /// * `filter` - metadata equality filter, see [`MetadataFilter`]
    /// * `before` - only checkpoints with an id strictly lower than this config's id
    /// * `limit` - maximum number of tuples
    async fn list(
        &self,
        config: Option<&CheckpointConfig>,
        filter: Option<MetadataFilter>,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> Result<CheckpointStream>;

    /// Store a checkpoint.
    ///
    /// `config.lineage_id` names the lineage and `config.checkpoint_id`, when
    /// set, names the parent. Returns the config addressing the stored
    /// checkpoint.
    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointConfig>;

    /// Delete every checkpoint of a lineage. The engine never calls this.
    async fn delete_lineage(&self, lineage_id: &str) -> Result<()> {
        let _ = lineage_id;
        Ok(())
    }
}

/// Whether `metadata` satisfies `filter`.
///
/// Backends without native JSON querying can use this to post-filter rows.
pub fn metadata_matches(metadata: &CheckpointMetadata, filter: &MetadataFilter) -> bool {
    if filter.is_empty() {
        return true;
    }
    let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(metadata) else {
        return false;
    };
    filter
        .iter()
        .all(|(key, expected)| fields.get(key) == Some(expected))
}

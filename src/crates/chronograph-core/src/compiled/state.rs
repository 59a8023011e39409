//! State management methods (get_state, update_state, history, replay)
//!
//! Reads never take the lineage lock. `update_state` writes a checkpoint and
//! therefore claims the lineage like an invocation does.

use super::{CompiledGraph, StateSnapshot, StateSnapshotStream};
use crate::error::{GraphError, Result};
use crate::lineage::{HistoryMode, Lineage};
use chronograph_checkpoint::{ChannelValues, CheckpointConfig, MetadataFilter, Write};
use futures::StreamExt;

impl CompiledGraph {
    fn lineage<'a>(&'a self, lineage_id: &'a str) -> Lineage<'a> {
        Lineage::new(&self.graph, self.checkpoint_saver.as_ref(), lineage_id)
            .with_interrupts(&self.config.interrupt)
    }

    /// Newest checkpoint of a lineage
    pub async fn get_state(&self, lineage_id: &str) -> Result<StateSnapshot> {
        Ok(self.lineage(lineage_id).load(None).await?.into())
    }

    /// One specific checkpoint of a lineage
    pub async fn get_state_at(&self, lineage_id: &str, checkpoint_id: &str) -> Result<StateSnapshot> {
        Ok(self.lineage(lineage_id).load(Some(checkpoint_id)).await?.into())
    }

    /// Fork the lineage with manual writes.
    ///
    /// `overrides` are folded through the channel reducers on top of
    /// `checkpoint_id` (the newest checkpoint when `None`) and stored as a
    /// new child of it. With `as_node` the next frontier is routed as if
    /// that node had produced the writes. The returned snapshot can be
    /// resumed like any other.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// // Replace the last message and let routing decide the rest
    /// let edited = compiled
    ///     .update_state("lineage-1", Some(&checkpoint_id), vec![Write::new("messages", message)], None)
    ///     .await?;
    /// let done = compiled.resume(&RunConfig::new("lineage-1")).await?;
    /// ```
    pub async fn update_state(
        &self,
        lineage_id: &str,
        checkpoint_id: Option<&str>,
        overrides: Vec<Write>,
        as_node: Option<&str>,
    ) -> Result<StateSnapshot> {
        let _guard = self.locks().acquire(lineage_id)?;
        let forked = self
            .lineage(lineage_id)
            .fork(checkpoint_id, overrides, as_node)
            .await?;
        Ok(forked.into())
    }

    /// Checkpoints of a lineage, newest first
    pub async fn get_state_history(
        &self,
        lineage_id: &str,
        mode: HistoryMode,
    ) -> Result<Vec<StateSnapshot>> {
        let history = self.lineage(lineage_id).history(mode).await?;
        Ok(history.into_iter().map(StateSnapshot::from).collect())
    }

    /// `checkpoint_id` and its ancestors, newest first
    pub async fn get_state_history_from(
        &self,
        lineage_id: &str,
        checkpoint_id: &str,
    ) -> Result<Vec<StateSnapshot>> {
        let history = self.lineage(lineage_id).history_from(checkpoint_id).await?;
        Ok(history.into_iter().map(StateSnapshot::from).collect())
    }

    /// Page through every checkpoint of a lineage, newest first.
    ///
    /// * `filter` - metadata equality filter, e.g. `{"source": "update"}`
    /// * `before` - only checkpoints older than this id
    /// * `limit` - maximum number of snapshots
    pub async fn list_state_history(
        &self,
        lineage_id: &str,
        filter: Option<MetadataFilter>,
        before: Option<&str>,
        limit: Option<usize>,
    ) -> Result<StateSnapshotStream> {
        let config = CheckpointConfig::for_lineage(lineage_id);
        let before = before.map(|id| CheckpointConfig::for_lineage(lineage_id).with_checkpoint_id(id));

        let checkpoint_stream = self
            .checkpoint_saver
            .list(Some(&config), filter, before.as_ref(), limit)
            .await?;

        let snapshot_stream =
            checkpoint_stream.map(|result| result.map(StateSnapshot::from).map_err(GraphError::from));

        Ok(Box::pin(snapshot_stream))
    }

    /// Rebuild the channel map of a checkpoint (the newest when `None`) from
    /// the writes recorded along its chain
    pub async fn replay(&self, lineage_id: &str, checkpoint_id: Option<&str>) -> Result<ChannelValues> {
        self.lineage(lineage_id).replay(checkpoint_id).await
    }
}

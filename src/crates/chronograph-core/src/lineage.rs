//! Lineage history, forking and replay
//!
//! Checkpoints of a lineage form a tree: every checkpoint points at its
//! parent, and forking from an older checkpoint starts a new branch without
//! touching anything already stored. The *active branch* is the chain from
//! the newest checkpoint back to the root.
//!
//! ```text
//!  c0 ── c1 ── c2 ── c3            ActiveBranch (before fork): c3 c2 c1 c0
//!         └─── f4 ── f5            ActiveBranch (after fork):  f5 f4 c1 c0
//!                                  FullTree:                   f5 f4 c3 c2 c1 c0
//! ```
//!
//! Every checkpoint records the writes that produced it, grouped by writer,
//! so folding those writes from the root reproduces its channel map exactly.

use crate::channels::ChannelStore;
use crate::error::{GraphError, Result};
use crate::graph::{Graph, START};
use crate::interrupt::{InterruptConfig, RESUMES_INTERRUPT};
use crate::pregel::algo::{next_frontier, UPDATE};
use crate::pregel::loop_impl::persist;
use chronograph_checkpoint::{
    ChannelValues, ChannelVersions, Checkpoint, CheckpointConfig, CheckpointMetadata,
    CheckpointSaver, CheckpointSource, CheckpointTuple, Write,
};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which checkpoints [`Lineage::history`] returns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryMode {
    /// Newest checkpoint and its ancestors
    #[default]
    ActiveBranch,
    /// Every checkpoint of every branch
    FullTree,
}

/// Read and fork access to one lineage
pub struct Lineage<'a> {
    graph: &'a Graph,
    saver: &'a dyn CheckpointSaver,
    lineage_id: &'a str,
    interrupt: Option<&'a InterruptConfig>,
}

impl<'a> Lineage<'a> {
    pub fn new(graph: &'a Graph, saver: &'a dyn CheckpointSaver, lineage_id: &'a str) -> Self {
        Self {
            graph,
            saver,
            lineage_id,
            interrupt: None,
        }
    }

    /// Interrupts the lineage runs under; forks of a checkpoint paused by
    /// them resume without pausing again
    pub fn with_interrupts(mut self, interrupt: &'a InterruptConfig) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    fn config(&self, checkpoint_id: Option<&str>) -> CheckpointConfig {
        let config = CheckpointConfig::for_lineage(self.lineage_id);
        match checkpoint_id {
            Some(id) => config.with_checkpoint_id(id),
            None => config,
        }
    }

    /// The addressed checkpoint, or the newest one when `checkpoint_id` is `None`
    pub async fn load(&self, checkpoint_id: Option<&str>) -> Result<CheckpointTuple> {
        self.saver
            .get_tuple(&self.config(checkpoint_id))
            .await?
            .ok_or_else(|| {
                GraphError::checkpoint_not_found(self.lineage_id, checkpoint_id.map(str::to_string))
            })
    }

    /// Newest first, no duplicates. An unknown lineage has an empty history.
    pub async fn history(&self, mode: HistoryMode) -> Result<Vec<CheckpointTuple>> {
        match mode {
            HistoryMode::ActiveBranch => {
                let Some(head) = self.saver.get_tuple(&self.config(None)).await? else {
                    return Ok(Vec::new());
                };
                self.ancestors(head).await
            }
            HistoryMode::FullTree => {
                let stream = self
                    .saver
                    .list(Some(&self.config(None)), None, None, None)
                    .await?;
                Ok(stream.try_collect::<Vec<_>>().await?)
            }
        }
    }

    /// `checkpoint_id` followed by its ancestors, newest first
    pub async fn history_from(&self, checkpoint_id: &str) -> Result<Vec<CheckpointTuple>> {
        let start = self.load(Some(checkpoint_id)).await?;
        self.ancestors(start).await
    }

    async fn ancestors(&self, start: CheckpointTuple) -> Result<Vec<CheckpointTuple>> {
        let mut chain = Vec::new();
        let mut parent = start.parent_id().map(str::to_string);
        chain.push(start);

        while let Some(parent_id) = parent {
            let tuple = self.load(Some(&parent_id)).await?;
            parent = tuple.parent_id().map(str::to_string);
            chain.push(tuple);
        }

        Ok(chain)
    }

    /// Write a new checkpoint on top of `checkpoint_id` (newest when `None`)
    /// with `overrides` folded through the channel reducers.
    ///
    /// The new frontier is routed as though `as_node` had just produced the
    /// overrides. Without `as_node` it is routed from the nodes that produced
    /// the target checkpoint, so the pending work is recomputed against the
    /// edited content. The target and everything before it stay untouched.
    ///
    /// Editing a checkpoint the run paused on counts as handling that pause:
    /// the fork carries [`RESUMES_INTERRUPT`] and resumes straight into its
    /// frontier. Any other fork is checked for interrupts like a fresh head.
    #[tracing::instrument(skip(self, overrides), fields(lineage_id = %self.lineage_id))]
    pub async fn fork(
        &self,
        checkpoint_id: Option<&str>,
        overrides: Vec<Write>,
        as_node: Option<&str>,
    ) -> Result<CheckpointTuple> {
        if let Some(node) = as_node {
            if node != START && !self.graph.nodes.contains_key(node) {
                return Err(GraphError::Validation(format!(
                    "cannot update state as unknown node '{node}'"
                )));
            }
        }

        let target = self.load(checkpoint_id).await?;
        let target_id = target.checkpoint.id.as_str();
        let writer = as_node.unwrap_or(UPDATE);

        let writes = BTreeMap::from([(writer.to_string(), overrides)]);
        let applied = ChannelStore::new(&self.graph.channels)
            .apply(
                &target.checkpoint.channel_values,
                &target.checkpoint.channel_versions,
                &writes,
            )
            .map_err(|e| e.at(self.lineage_id, Some(target_id)))?;

        let ran = match as_node {
            Some(node) => vec![node.to_string()],
            None => target.metadata.ran.clone(),
        };
        let next = next_frontier(self.graph, &ran, &applied.values)
            .map_err(|e| e.at(self.lineage_id, Some(target_id)))?;

        let mut metadata = CheckpointMetadata::new()
            .with_source(CheckpointSource::Update)
            .with_step(target.metadata.step + 1)
            .with_ran(ran);
        metadata.writes = writes;
        if self.interrupt.is_some_and(|i| i.paused_at(&target)) {
            metadata = metadata.with_extra(RESUMES_INTERRUPT, serde_json::Value::Bool(true));
        }

        let forked = persist(
            self.saver,
            self.lineage_id,
            Some(&target.config),
            Checkpoint::new(applied.values, applied.versions, next),
            metadata,
        )
        .await?;

        tracing::debug!(
            parent_id = %target_id,
            checkpoint_id = %forked.checkpoint.id,
            next = ?forked.checkpoint.next,
            "Forked lineage"
        );
        Ok(forked)
    }

    /// Rebuild the channel map of `checkpoint_id` (newest when `None`) by
    /// folding the recorded writes of its chain from the root.
    pub async fn replay(&self, checkpoint_id: Option<&str>) -> Result<ChannelValues> {
        let target = self.load(checkpoint_id).await?;
        let mut chain = self.ancestors(target).await?;
        chain.reverse();

        let store = ChannelStore::new(&self.graph.channels);
        let mut values = ChannelValues::new();
        let mut versions = ChannelVersions::new();

        for tuple in &chain {
            let applied = store
                .apply(&values, &versions, &tuple.metadata.writes)
                .map_err(|e| e.at(self.lineage_id, tuple.parent_id()))?;
            values = applied.values;
            versions = applied.versions;
        }

        Ok(values)
    }
}

//! The superstep loop.
//!
//! [`PregelLoop`] advances one lineage from a head checkpoint until the
//! frontier is empty, an interrupt pauses it, or an error stops it. Every
//! committed superstep is persisted before the next one starts, so the last
//! checkpoint written is always a consistent resume point.

use super::algo::{next_frontier, plan_input, INPUT};
use super::executor::{SuperstepContext, TaskExecutor};
use crate::channels::ChannelStore;
use crate::compiled::StateSnapshot;
use crate::config::EngineConfig;
use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::interrupt::{InterruptState, InterruptWhen, RESUMES_INTERRUPT};
use crate::stream::StreamEvent;
use chronograph_checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver, CheckpointSource,
    CheckpointTuple, Write,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How an invocation ended
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// Last checkpoint of the invocation; `interrupt` is set when it paused
    pub snapshot: StateSnapshot,
    /// Supersteps executed by this invocation
    pub supersteps: usize,
}

pub struct PregelLoop {
    graph: Arc<Graph>,
    saver: Arc<dyn CheckpointSaver>,
    config: EngineConfig,
    lineage_id: String,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<Result<StreamEvent>>>,
}

impl PregelLoop {
    pub fn new(
        graph: Arc<Graph>,
        saver: Arc<dyn CheckpointSaver>,
        config: EngineConfig,
        lineage_id: impl Into<String>,
    ) -> Self {
        Self {
            graph,
            saver,
            config,
            lineage_id: lineage_id.into(),
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    /// Stop between supersteps once `cancel` fires
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Emit one event per committed checkpoint. Dropping the receiver
    /// cancels the loop at the next superstep boundary.
    pub fn with_events(mut self, events: mpsc::Sender<Result<StreamEvent>>) -> Self {
        self.events = Some(events);
        self
    }

    /// Advance the lineage from `head`.
    ///
    /// With `input`, the input is committed first as its own checkpoint. A
    /// run that continues a checkpoint it paused on (no input, or input
    /// merged into the paused frontier) does not re-check interrupt-before on
    /// its first superstep. Any other head is checked like every boundary.
    #[tracing::instrument(skip_all, fields(lineage_id = %self.lineage_id))]
    pub async fn run(
        &self,
        head: Option<CheckpointTuple>,
        input: Option<Vec<Write>>,
    ) -> Result<LoopOutcome> {
        let interrupt = &self.config.interrupt;
        let (mut current, mut resuming) = match input {
            Some(writes) => {
                let paused = head.as_ref().is_some_and(|h| interrupt.paused_at(h));
                let plan = plan_input(&self.graph, head.as_ref(), writes.clone()).map_err(|e| {
                    e.at(
                        &self.lineage_id,
                        head.as_ref().map(|h| h.checkpoint.id.as_str()),
                    )
                })?;
                let resuming = plan.continues_suspended && paused;
                let checkpoint = Checkpoint::new(plan.values, plan.versions, plan.next);
                let metadata = CheckpointMetadata::new()
                    .with_source(CheckpointSource::Input)
                    .with_step(plan.step)
                    .with_ran(plan.ran)
                    .with_writes(INPUT, writes);
                let tuple = self
                    .persist(head.as_ref().map(|h| &h.config), checkpoint, metadata)
                    .await?;
                self.emit(StreamEvent::Checkpoint(tuple.clone().into())).await;
                (tuple, resuming)
            }
            None => {
                let head = head
                    .ok_or_else(|| GraphError::checkpoint_not_found(self.lineage_id.clone(), None))?;
                let paused = interrupt.paused_at(&head);
                (head, paused)
            }
        };

        let mut supersteps = 0;
        loop {
            let checkpoint_id = current.checkpoint.id.clone();

            if current.checkpoint.next.is_empty() {
                tracing::debug!(checkpoint_id = %checkpoint_id, supersteps, "Lineage completed");
                return Ok(LoopOutcome {
                    snapshot: current.into(),
                    supersteps,
                });
            }

            if !resuming {
                let hits = interrupt.before_hits(&current.checkpoint.next);
                if !hits.is_empty() {
                    let at = if interrupt.paused_at(&current) {
                        current
                    } else {
                        self.record_pause(current).await?
                    };
                    return Ok(self.suspend(at, hits, InterruptWhen::Before, supersteps).await);
                }
            }
            resuming = false;

            if self.cancel.is_cancelled() {
                tracing::warn!(checkpoint_id = %checkpoint_id, "Execution cancelled");
                return Err(GraphError::Cancelled {
                    lineage_id: self.lineage_id.clone(),
                    checkpoint_id: Some(checkpoint_id),
                });
            }

            if supersteps >= self.config.recursion_limit {
                tracing::error!(
                    limit = self.config.recursion_limit,
                    checkpoint_id = %checkpoint_id,
                    "Recursion limit reached"
                );
                return Err(GraphError::RecursionLimit {
                    limit: self.config.recursion_limit,
                    lineage_id: self.lineage_id.clone(),
                    checkpoint_id: Some(checkpoint_id),
                });
            }

            let (committed, ran) = self.superstep(&current).await?;
            supersteps += 1;
            self.emit(StreamEvent::Checkpoint(committed.clone().into())).await;

            let hits = interrupt.after_hits(&ran);
            if !hits.is_empty() && !committed.checkpoint.next.is_empty() {
                return Ok(self.suspend(committed, hits, InterruptWhen::After, supersteps).await);
            }

            current = committed;
        }
    }

    /// Run, fold, route and persist one superstep on top of `current`.
    async fn superstep(&self, current: &CheckpointTuple) -> Result<(CheckpointTuple, Vec<String>)> {
        let checkpoint_id = current.checkpoint.id.as_str();
        let step = current.metadata.step + 1;
        let frontier = current.checkpoint.next.clone();

        tracing::debug!(step, nodes = ?frontier, "Starting superstep");

        let ctx = SuperstepContext {
            lineage_id: self.lineage_id.clone(),
            checkpoint_id: Some(checkpoint_id.to_string()),
            step,
            cancel: self.cancel.clone(),
        };
        let snapshot = Arc::new(current.checkpoint.channel_values.clone());
        let outcome = TaskExecutor::new(self.config.max_concurrency)
            .run_superstep(&self.graph, &frontier, snapshot, &ctx)
            .await;

        if !outcome.is_success() {
            return Err(GraphError::NodeExecution {
                lineage_id: self.lineage_id.clone(),
                checkpoint_id: Some(checkpoint_id.to_string()),
                failures: outcome.failures,
                partial_writes: outcome.writes,
            });
        }

        let applied = ChannelStore::new(&self.graph.channels)
            .apply(
                &current.checkpoint.channel_values,
                &current.checkpoint.channel_versions,
                &outcome.writes,
            )
            .map_err(|e| e.at(&self.lineage_id, Some(checkpoint_id)))?;

        let next = next_frontier(&self.graph, &frontier, &applied.values)
            .map_err(|e| e.at(&self.lineage_id, Some(checkpoint_id)))?;

        let mut metadata = CheckpointMetadata::new()
            .with_source(CheckpointSource::Loop)
            .with_step(step)
            .with_ran(frontier.clone());
        metadata.writes = outcome.writes;

        let checkpoint = Checkpoint::new(applied.values, applied.versions, next);
        let committed = self
            .persist(Some(&current.config), checkpoint, metadata)
            .await?;

        tracing::debug!(
            step,
            checkpoint_id = %committed.checkpoint.id,
            updated = ?applied.updated,
            next = ?committed.checkpoint.next,
            "Superstep committed"
        );

        Ok((committed, frontier))
    }

    async fn persist(
        &self,
        parent: Option<&CheckpointConfig>,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointTuple> {
        persist(
            self.saver.as_ref(),
            &self.lineage_id,
            parent,
            checkpoint,
            metadata,
        )
        .await
    }

    /// Persist a pause point on top of a head that is not recognisable as one.
    ///
    /// Only manual updates that were not themselves an answer to a pause get
    /// here. The child repeats their state and carries [`RESUMES_INTERRUPT`].
    async fn record_pause(&self, head: CheckpointTuple) -> Result<CheckpointTuple> {
        let checkpoint = Checkpoint::new(
            head.checkpoint.channel_values.clone(),
            head.checkpoint.channel_versions.clone(),
            head.checkpoint.next.clone(),
        );
        let metadata = CheckpointMetadata::new()
            .with_source(CheckpointSource::Update)
            .with_step(head.metadata.step + 1)
            .with_ran(head.metadata.ran.clone())
            .with_extra(RESUMES_INTERRUPT, serde_json::Value::Bool(true));

        let paused = self.persist(Some(&head.config), checkpoint, metadata).await?;
        self.emit(StreamEvent::Checkpoint(paused.clone().into())).await;
        Ok(paused)
    }

    async fn suspend(
        &self,
        at: CheckpointTuple,
        nodes: Vec<String>,
        when: InterruptWhen,
        supersteps: usize,
    ) -> LoopOutcome {
        let interrupt = InterruptState::new(
            self.lineage_id.clone(),
            nodes,
            when,
            at.metadata.step,
            at.checkpoint.id.clone(),
        );
        tracing::info!(
            nodes = ?interrupt.nodes,
            when = ?interrupt.when,
            checkpoint_id = %interrupt.checkpoint_id,
            "Execution interrupted"
        );

        let snapshot = StateSnapshot::from(at).with_interrupt(Some(interrupt.clone()));
        self.emit(StreamEvent::Interrupted {
            interrupt,
            snapshot: snapshot.clone(),
        })
        .await;

        LoopOutcome {
            snapshot,
            supersteps,
        }
    }

    async fn emit(&self, event: StreamEvent) {
        let Some(events) = &self.events else {
            return;
        };
        if events.send(Ok(event)).await.is_err() {
            tracing::debug!("Stream consumer dropped, stopping after this superstep");
            self.cancel.cancel();
        }
    }
}

/// Store `checkpoint` in `lineage_id`, parented at `parent` when given
pub(crate) async fn persist(
    saver: &dyn CheckpointSaver,
    lineage_id: &str,
    parent: Option<&CheckpointConfig>,
    checkpoint: Checkpoint,
    metadata: CheckpointMetadata,
) -> Result<CheckpointTuple> {
    let put_config = parent
        .cloned()
        .unwrap_or_else(|| CheckpointConfig::for_lineage(lineage_id));
    let stored = saver
        .put(&put_config, checkpoint.clone(), metadata.clone())
        .await?;

    let tuple = CheckpointTuple::new(stored, checkpoint, metadata);
    Ok(match parent {
        Some(parent) => tuple.with_parent_config(parent.clone()),
        None => tuple,
    })
}

//! Graph execution methods (invoke, resume)

use super::graph::LineageGuard;
use super::{CompiledGraph, RunConfig, StateSnapshot};
use crate::error::{GraphError, Result};
use crate::pregel::PregelLoop;
use chronograph_checkpoint::{CheckpointTuple, Write};

impl CompiledGraph {
    /// Advance a lineage until it completes or pauses.
    ///
    /// With `input` the writes are committed first as an input checkpoint:
    /// on a new lineage they seed it, on a completed head they start a new
    /// turn, and on a suspended head they are merged before the pending
    /// frontier runs. With `None` the run resumes from the addressed
    /// checkpoint, which must exist.
    ///
    /// The returned snapshot is the last checkpoint written (or the one the
    /// run paused on). Its `interrupt` is set when the run paused.
    ///
    /// # Example
    ///
    /// ```rust
    /// use chronograph_core::{AppendReducer, RunConfig, StateGraph, Write, END};
    /// use serde_json::json;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut graph = StateGraph::new();
    /// graph.add_channel("log", AppendReducer);
    /// graph.add_node("greet", |_state, _ctx| async move {
    ///     Ok(vec![Write::new("log", json!("hello"))])
    /// });
    /// graph.set_entry("greet");
    /// graph.add_edge("greet", END);
    /// let compiled = graph.compile()?;
    ///
    /// let config = RunConfig::new("lineage-1");
    /// let done = compiled.invoke(&config, Some(vec![Write::new("log", json!("hi"))])).await?;
    /// assert_eq!(done.values["log"], json!(["hi", "hello"]));
    /// assert!(done.is_complete());
    /// # Ok(())
    /// # }
    /// ```
    #[tracing::instrument(skip(self, config, input), fields(lineage_id = %config.lineage_id))]
    pub async fn invoke(&self, config: &RunConfig, input: Option<Vec<Write>>) -> Result<StateSnapshot> {
        let (_guard, head) = self.prepare(config, input.is_some()).await?;

        let outcome = self.pregel_loop(config).run(head, input).await?;
        tracing::debug!(
            supersteps = outcome.supersteps,
            checkpoint_id = ?outcome.snapshot.checkpoint_id(),
            interrupted = outcome.snapshot.is_interrupted(),
            "Invocation finished"
        );
        Ok(outcome.snapshot)
    }

    /// Continue a lineage from its newest checkpoint (or `config.checkpoint_id`)
    /// without new input
    pub async fn resume(&self, config: &RunConfig) -> Result<StateSnapshot> {
        self.invoke(config, None).await
    }

    /// Claim the lineage and load the head the run starts from
    pub(crate) async fn prepare(
        &self,
        config: &RunConfig,
        has_input: bool,
    ) -> Result<(LineageGuard, Option<CheckpointTuple>)> {
        let guard = self.locks().acquire(&config.lineage_id)?;

        let head = self
            .checkpoint_saver
            .get_tuple(&config.checkpoint_config())
            .await?;

        let missing = match (&head, &config.checkpoint_id) {
            (None, Some(_)) => true,
            (None, None) => !has_input,
            _ => false,
        };
        if missing {
            return Err(GraphError::checkpoint_not_found(
                config.lineage_id.clone(),
                config.checkpoint_id.clone(),
            ));
        }

        Ok((guard, head))
    }

    pub(crate) fn pregel_loop(&self, config: &RunConfig) -> PregelLoop {
        PregelLoop::new(
            self.graph.clone(),
            self.checkpoint_saver.clone(),
            self.config.clone(),
            config.lineage_id.clone(),
        )
        .with_cancel_token(config.cancel.child_token())
    }
}

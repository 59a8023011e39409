//! Streaming execution methods

use super::{CompiledGraph, EventStream, RunConfig};
use crate::error::Result;
use chronograph_checkpoint::Write;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

impl CompiledGraph {
    /// Run like [`invoke`](Self::invoke) and stream one event per committed
    /// checkpoint.
    ///
    /// Claiming the lineage and loading the head happen before this returns,
    /// so `ConcurrentLineage` and `CheckpointNotFound` surface here rather
    /// than on the stream. Errors from the run itself arrive as the last
    /// item. Dropping the stream stops the run at the next superstep
    /// boundary; everything committed up to then stays committed.
    pub async fn stream(&self, config: &RunConfig, input: Option<Vec<Write>>) -> Result<EventStream> {
        let (guard, head) = self.prepare(config, input.is_some()).await?;

        let (tx, rx) = mpsc::channel(self.config.stream_buffer);
        let pregel_loop = self.pregel_loop(config).with_events(tx.clone());
        let lineage_id = config.lineage_id.clone();

        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = pregel_loop.run(head, input).await {
                tracing::debug!(lineage_id = %lineage_id, error = %e, "Streamed run failed");
                let _ = tx.send(Err(e)).await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

//! Processing nodes
//!
//! A node reads a read-only snapshot of the channel map and returns the
//! writes it wants committed. Nodes never see each other's writes from the
//! same superstep.
//!
//! ```rust
//! use chronograph_core::{FnNode, Write};
//! use serde_json::json;
//!
//! let greet = FnNode::new(|state, _ctx| async move {
//!     let name = state.get("name").and_then(|v| v.as_str()).unwrap_or("world").to_string();
//!     Ok(vec![Write::new("greeting", json!(format!("hello {name}")))])
//! });
//! # let _ = greet;
//! ```

use async_trait::async_trait;
use chronograph_checkpoint::{ChannelValues, CheckpointId, Write};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Error returned by a node body
pub type NodeError = Box<dyn std::error::Error + Send + Sync>;

/// Result of one node invocation
pub type NodeOutput = Result<Vec<Write>, NodeError>;

/// Explicit per-invocation context handed to every node
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub lineage_id: String,
    /// Checkpoint the superstep started from
    pub checkpoint_id: Option<CheckpointId>,
    /// Step index the superstep will commit as
    pub step: i64,
    pub node: String,
    /// 1-based attempt number under the node's retry policy
    pub attempt: usize,
    /// Cancelled when the caller cancels the invocation
    pub cancel: CancellationToken,
}

#[async_trait]
pub trait Node: Send + Sync {
    async fn run(&self, state: Arc<ChannelValues>, ctx: NodeContext) -> NodeOutput;
}

/// Adapts an async closure into a [`Node`]
pub struct FnNode<F> {
    func: F,
}

impl<F, Fut> FnNode<F>
where
    F: Fn(Arc<ChannelValues>, NodeContext) -> Fut + Send + Sync,
    Fut: Future<Output = NodeOutput> + Send,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> Node for FnNode<F>
where
    F: Fn(Arc<ChannelValues>, NodeContext) -> Fut + Send + Sync,
    Fut: Future<Output = NodeOutput> + Send,
{
    async fn run(&self, state: Arc<ChannelValues>, ctx: NodeContext) -> NodeOutput {
        (self.func)(state, ctx).await
    }
}

//! # chronograph-core - Durable graph execution with time travel
//!
//! `chronograph-core` runs a graph of async nodes over a set of named
//! channels in synchronized rounds (**supersteps**) and persists a checkpoint
//! after every round. Any checkpoint can later be inspected, resumed, edited
//! into a new branch or replayed from its recorded writes.
//!
//! ## Core Concepts
//!
//! ### 1. Channels and reducers
//!
//! State is a map of named channels. Each channel has a [`Reducer`] that
//! folds incoming writes into its value: overwrite, append, add-messages or
//! any binary operator.
//!
//! ### 2. Supersteps
//!
//! Every node of the current frontier runs concurrently against the same
//! snapshot. Their writes are folded in node name order, edges are evaluated
//! on the result to pick the next frontier, and the outcome is persisted as
//! one checkpoint. A failing node aborts the whole superstep before anything
//! is committed.
//!
//! ### 3. Lineages
//!
//! All checkpoints of one conversation or job share a lineage id and form a
//! tree through their parent pointers. [`CompiledGraph::update_state`] forks
//! a new branch from any checkpoint; nothing already stored ever changes.
//!
//! ### 4. Human-in-the-loop
//!
//! [`InterruptConfig`] pauses a run before or after chosen nodes. The paused
//! checkpoint is resumed with [`CompiledGraph::resume`], optionally after
//! editing it.
//!
//! ## Quick Start
//!
//! ```rust
//! use chronograph_core::{AppendReducer, RunConfig, StateGraph, Write, END};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> chronograph_core::Result<()> {
//! let mut graph = StateGraph::new();
//! graph.add_channel("steps", AppendReducer);
//! graph.add_node("plan", |_state, _ctx| async move {
//!     Ok(vec![Write::new("steps", json!("plan"))])
//! });
//! graph.add_node("act", |_state, _ctx| async move {
//!     Ok(vec![Write::new("steps", json!("act"))])
//! });
//! graph.set_entry("plan");
//! graph.add_edge("plan", "act");
//! graph.add_edge("act", END);
//!
//! let compiled = graph.compile()?;
//! let config = RunConfig::new("job-42");
//! let done = compiled.invoke(&config, Some(vec![])).await?;
//!
//! assert_eq!(done.values["steps"], json!(["plan", "act"]));
//! assert_eq!(compiled.get_state_history(&config.lineage_id, Default::default()).await?.len(), 3);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`builder`] - [`StateGraph`] construction and compilation
//! - [`graph`] - immutable graph definition, edges and routes
//! - [`state`] - reducers
//! - [`channels`] - folding writes into channel maps
//! - [`node`] - the [`Node`] trait and closure adapter
//! - [`pregel`] - superstep loop, executor and routing
//! - [`compiled`] - [`CompiledGraph`] runtime API
//! - [`lineage`] - history, fork and replay
//! - [`interrupt`] - interrupt configuration and state
//! - [`retry`] - per-node retry policies
//! - [`stream`] - streaming events
//! - [`config`] - engine configuration from code, YAML or environment

pub mod builder;
pub mod channels;
pub mod compiled;
pub mod config;
pub mod error;
pub mod graph;
pub mod interrupt;
pub mod lineage;
pub mod node;
pub mod pregel;
pub mod retry;
pub mod state;
pub mod stream;

pub use builder::StateGraph;
pub use channels::{Applied, ChannelStore};
pub use compiled::{CompiledGraph, EventStream, RunConfig, StateSnapshot, StateSnapshotStream};
pub use config::{EngineConfig, DEFAULT_ENV_PREFIX};
pub use error::{CommitError, GraphError, NodeFailure, Result};
pub use graph::{ChannelSpec, Edge, Graph, NodeId, NodeSpec, Route, RouterFn, END, START};
pub use interrupt::{InterruptConfig, InterruptState, InterruptWhen, RESUMES_INTERRUPT};
pub use lineage::{HistoryMode, Lineage};
pub use node::{FnNode, Node, NodeContext, NodeError, NodeOutput};
pub use pregel::{INPUT, UPDATE};
pub use retry::RetryPolicy;
pub use state::{
    AddMessagesReducer, AppendReducer, BinaryOperatorFn, BinaryOperatorReducer, OverwriteReducer,
    Reducer, StateError,
};
pub use stream::StreamEvent;

pub use chronograph_checkpoint::{
    ChannelValues, ChannelVersions, CheckpointConfig, CheckpointId, CheckpointMetadata,
    CheckpointSaver, CheckpointSource, InMemoryCheckpointSaver, MetadataFilter, Write,
};

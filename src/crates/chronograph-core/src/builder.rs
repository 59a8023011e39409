//! StateGraph builder API
//!
//! [`StateGraph`] collects channels, nodes and edges, then validates them
//! once and compiles into an executable [`CompiledGraph`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  StateGraph (Builder)                                   │
//! │                                                         │
//! │   __start__ ──> agent ──(router)──> action ──┐          │
//! │                   ↑          └────> __end__  │          │
//! │                   └──────────────────────────┘          │
//! │                                                         │
//! │   channels: messages (add_messages), count (sum), ...   │
//! └─────────────────────────────────────────────────────────┘
//!                       │ compile()
//!                       ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  CompiledGraph (Executable)                             │
//! │   • superstep execution, parallel within a step         │
//! │   • one checkpoint per committed step                   │
//! │   • interrupts, history, fork and replay                │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use chronograph_core::{AddMessagesReducer, ChannelValues, Route, StateGraph, Write, END};
//! use serde_json::json;
//! use std::collections::HashMap;
//!
//! let mut graph = StateGraph::new();
//! graph.add_channel("messages", AddMessagesReducer);
//! graph.add_node("agent", |_state, _ctx| async move {
//!     Ok(vec![Write::new("messages", json!({"id": "1", "content": "hi"}))])
//! });
//! graph.add_node("action", |_state, _ctx| async move { Ok(vec![]) });
//! graph.set_entry("agent");
//! graph.add_conditional_edge(
//!     "agent",
//!     |values: &ChannelValues| {
//!         let calls = values["messages"]
//!             .as_array()
//!             .and_then(|m| m.last())
//!             .map(|m| m.get("tool_calls").is_some())
//!             .unwrap_or(false);
//!         Route::from(if calls { "continue" } else { "end" })
//!     },
//!     HashMap::from([
//!         ("continue".to_string(), "action".to_string()),
//!         ("end".to_string(), END.to_string()),
//!     ]),
//! );
//! graph.add_edge("action", "agent");
//!
//! let compiled = graph.compile().unwrap();
//! assert_eq!(compiled.graph().nodes.len(), 2);
//! ```

use crate::compiled::CompiledGraph;
use crate::config::EngineConfig;
use crate::error::{GraphError, Result};
use crate::graph::{ChannelSpec, Graph, NodeId, NodeSpec, Route, END, START};
use crate::node::{FnNode, Node, NodeContext, NodeOutput};
use crate::retry::RetryPolicy;
use crate::state::Reducer;
use chronograph_checkpoint::ChannelValues;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Builder for a graph over named channels
#[derive(Debug, Default)]
pub struct StateGraph {
    graph: Graph,
    duplicates: Vec<String>,
}

impl StateGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a channel and the reducer that folds writes into it
    pub fn add_channel(&mut self, name: impl Into<String>, reducer: impl Reducer + 'static) -> &mut Self {
        self.add_channel_with_reducer(name, Arc::new(reducer))
    }

    pub fn add_channel_with_reducer(
        &mut self,
        name: impl Into<String>,
        reducer: Arc<dyn Reducer>,
    ) -> &mut Self {
        let name = name.into();
        if self.graph.channels.contains_key(&name) {
            self.duplicates.push(format!("channel '{name}' declared twice"));
        }
        self.graph.add_channel(ChannelSpec { name, reducer });
        self
    }

    /// Add a node backed by an async closure
    pub fn add_node<F, Fut>(&mut self, id: impl Into<NodeId>, func: F) -> &mut Self
    where
        F: Fn(Arc<ChannelValues>, NodeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = NodeOutput> + Send + 'static,
    {
        self.add_node_impl(id, Arc::new(FnNode::new(func)))
    }

    /// Add a node backed by any [`Node`] implementation
    pub fn add_node_impl(&mut self, id: impl Into<NodeId>, node: Arc<dyn Node>) -> &mut Self {
        let name = id.into();
        if self.graph.nodes.contains_key(&name) {
            self.duplicates.push(format!("node '{name}' added twice"));
        }
        self.graph.add_node(NodeSpec {
            name,
            node,
            retry: None,
        });
        self
    }

    /// Retry `node` in place under `policy` when it fails
    pub fn with_retry(&mut self, node: &str, policy: RetryPolicy) -> &mut Self {
        match self.graph.nodes.get_mut(node) {
            Some(spec) => spec.retry = Some(policy),
            None => self
                .duplicates
                .push(format!("retry policy for unknown node '{node}'")),
        }
        self
    }

    pub fn add_edge(&mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) -> &mut Self {
        self.graph.add_edge(from.into(), to.into());
        self
    }

    /// Add a conditional edge that routes based on the post-commit channel map
    ///
    /// # Arguments
    ///
    /// * `from` - Source node ID
    /// * `router` - Returns one or more labels
    /// * `branches` - Label to node map; empty means labels are node names
    pub fn add_conditional_edge<F>(
        &mut self,
        from: impl Into<NodeId>,
        router: F,
        branches: HashMap<String, NodeId>,
    ) -> &mut Self
    where
        F: Fn(&ChannelValues) -> Route + Send + Sync + 'static,
    {
        self.graph
            .add_conditional_edge(from.into(), Arc::new(router), branches);
        self
    }

    /// Add an edge from START to `node`
    pub fn set_entry(&mut self, node: impl Into<NodeId>) -> &mut Self {
        self.add_edge(START, node)
    }

    /// Add an edge from `node` to END
    pub fn add_finish(&mut self, node: impl Into<NodeId>) -> &mut Self {
        self.add_edge(node, END)
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Check the structure without compiling
    pub fn validate(&self) -> Result<()> {
        if let Some(problem) = self.duplicates.first() {
            return Err(GraphError::Validation(problem.clone()));
        }
        self.graph.validate().map_err(GraphError::Validation)
    }

    /// Compile with the default [`EngineConfig`]
    pub fn compile(self) -> Result<CompiledGraph> {
        self.compile_with_config(EngineConfig::default())
    }

    /// Compile with explicit engine settings.
    ///
    /// Fails when the structure is invalid, the config is invalid, or an
    /// interrupt names a node that does not exist.
    pub fn compile_with_config(self, config: EngineConfig) -> Result<CompiledGraph> {
        self.validate()?;
        config.validate()?;

        config.interrupt.validate_nodes(&self.graph)?;

        tracing::debug!(
            nodes = self.graph.nodes.len(),
            channels = self.graph.channels.len(),
            "Compiled graph"
        );
        Ok(CompiledGraph::new(self.graph, config))
    }
}

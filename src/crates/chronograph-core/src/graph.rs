//! Immutable graph definition
//!
//! A [`Graph`] is a closed description of the computation: named nodes,
//! declared channels with their reducers, static edges and conditional edges.
//! It is built by [`StateGraph`](crate::StateGraph), validated once at compile
//! time and only read afterwards.
//!
//! Two reserved node names exist: [`START`] is the virtual source whose
//! outgoing edges select the entry nodes, and [`END`] is the terminal label
//! that contributes nothing to the next frontier.

use crate::node::Node;
use crate::retry::RetryPolicy;
use crate::state::Reducer;
use chronograph_checkpoint::ChannelValues;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type NodeId = String;

/// Virtual entry node; its outgoing edges select the entry nodes
pub const START: &str = "__start__";

/// Terminal label
pub const END: &str = "__end__";

/// Result of a routing function: one or more labels
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Label(String),
    Labels(Vec<String>),
}

impl Route {
    /// Route straight to the terminal label
    pub fn end() -> Self {
        Route::Label(END.to_string())
    }

    pub fn into_labels(self) -> Vec<String> {
        match self {
            Route::Label(label) => vec![label],
            Route::Labels(labels) => labels,
        }
    }
}

impl From<&str> for Route {
    fn from(label: &str) -> Self {
        Route::Label(label.to_string())
    }
}

impl From<String> for Route {
    fn from(label: String) -> Self {
        Route::Label(label)
    }
}

impl From<Vec<String>> for Route {
    fn from(labels: Vec<String>) -> Self {
        Route::Labels(labels)
    }
}

impl From<Vec<&str>> for Route {
    fn from(labels: Vec<&str>) -> Self {
        Route::Labels(labels.iter().map(|s| s.to_string()).collect())
    }
}

/// Routing function evaluated on the post-commit channel map
pub type RouterFn = Arc<dyn Fn(&ChannelValues) -> Route + Send + Sync>;

#[derive(Clone)]
pub enum Edge {
    /// Always schedules the target
    Direct(NodeId),

    /// Schedules the nodes the router's labels resolve to.
    ///
    /// With an empty `branches` map labels are node names. [`END`] is always
    /// accepted as a label.
    Conditional {
        router: RouterFn,
        branches: HashMap<String, NodeId>,
    },
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Direct(node_id) => f.debug_tuple("Direct").field(node_id).finish(),
            Edge::Conditional { branches, .. } => f
                .debug_struct("Conditional")
                .field("router", &"<function>")
                .field("branches", branches)
                .finish(),
        }
    }
}

#[derive(Clone)]
pub struct NodeSpec {
    pub name: NodeId,
    pub node: Arc<dyn Node>,
    pub retry: Option<RetryPolicy>,
}

impl fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSpec")
            .field("name", &self.name)
            .field("node", &"<node>")
            .field("retry", &self.retry)
            .finish()
    }
}

#[derive(Clone)]
pub struct ChannelSpec {
    pub name: String,
    pub reducer: Arc<dyn Reducer>,
}

impl fmt::Debug for ChannelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSpec")
            .field("name", &self.name)
            .field("reducer", &self.reducer.name())
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub nodes: HashMap<NodeId, NodeSpec>,
    pub edges: HashMap<NodeId, Vec<Edge>>,
    pub channels: HashMap<String, ChannelSpec>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, spec: NodeSpec) {
        self.nodes.insert(spec.name.clone(), spec);
    }

    pub fn add_channel(&mut self, spec: ChannelSpec) {
        self.channels.insert(spec.name.clone(), spec);
    }

    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        self.edges.entry(from).or_default().push(Edge::Direct(to));
    }

    pub fn add_conditional_edge(
        &mut self,
        from: NodeId,
        router: RouterFn,
        branches: HashMap<String, NodeId>,
    ) {
        self.edges
            .entry(from)
            .or_default()
            .push(Edge::Conditional { router, branches });
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelSpec> {
        self.channels.get(name)
    }

    pub fn edges_from(&self, node: &str) -> &[Edge] {
        self.edges.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    fn is_target(&self, name: &str) -> bool {
        name == END || self.nodes.contains_key(name)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.edges_from(START).is_empty() {
            return Err(format!("graph has no entry point: add an edge from {START}"));
        }

        for reserved in [START, END] {
            if self.nodes.contains_key(reserved) {
                return Err(format!("{reserved} is a reserved node name"));
            }
            if self.channels.contains_key(reserved) {
                return Err(format!("{reserved} is a reserved channel name"));
            }
        }

        for (from, edges) in &self.edges {
            if from == END {
                return Err(format!("{END} cannot have outgoing edges"));
            }
            if from != START && !self.nodes.contains_key(from) {
                return Err(format!("Edge source {from} does not exist"));
            }

            for edge in edges {
                match edge {
                    Edge::Direct(to) => {
                        if !self.is_target(to) {
                            return Err(format!("Edge target {to} does not exist"));
                        }
                    }
                    Edge::Conditional { branches, .. } => {
                        for to in branches.values() {
                            if !self.is_target(to) {
                                return Err(format!("Branch target {to} does not exist"));
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::FnNode;
    use crate::state::OverwriteReducer;

    fn noop(name: &str) -> NodeSpec {
        NodeSpec {
            name: name.to_string(),
            node: Arc::new(FnNode::new(|_, _| async { Ok(vec![]) })),
            retry: None,
        }
    }

    #[test]
    fn test_route_conversions() {
        assert_eq!(Route::from("a").into_labels(), vec!["a"]);
        assert_eq!(Route::from(vec!["a", "b"]).into_labels(), vec!["a", "b"]);
        assert_eq!(Route::end().into_labels(), vec![END]);
    }

    #[test]
    fn test_graph_validation() {
        let mut graph = Graph::new();
        graph.add_node(noop("node1"));
        graph.add_channel(ChannelSpec {
            name: "value".to_string(),
            reducer: Arc::new(OverwriteReducer),
        });
        graph.add_edge(START.to_string(), "node1".to_string());
        graph.add_edge("node1".to_string(), END.to_string());

        assert!(graph.validate().is_ok());
        assert_eq!(graph.edges_from("node1").len(), 1);
        assert!(graph.edges_from("missing").is_empty());
    }

    #[test]
    fn test_graph_validation_requires_entry() {
        let mut graph = Graph::new();
        graph.add_node(noop("node1"));

        assert!(graph.validate().unwrap_err().contains("entry point"));
    }

    #[test]
    fn test_graph_validation_fails_missing_node() {
        let mut graph = Graph::new();
        graph.add_edge(START.to_string(), "nonexistent".to_string());

        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_graph_validation_checks_branch_targets() {
        let mut graph = Graph::new();
        graph.add_node(noop("a"));
        graph.add_edge(START.to_string(), "a".to_string());
        graph.add_conditional_edge(
            "a".to_string(),
            Arc::new(|_: &ChannelValues| Route::from("x")),
            HashMap::from([("x".to_string(), "ghost".to_string())]),
        );

        assert!(graph.validate().unwrap_err().contains("ghost"));
    }

    #[test]
    fn test_reserved_names_rejected() {
        let mut graph = Graph::new();
        graph.add_node(noop(END));
        graph.add_edge(START.to_string(), END.to_string());

        assert!(graph.validate().unwrap_err().contains("reserved"));
    }
}

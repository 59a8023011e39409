//! Core superstep algorithm functions.
//!
//! Everything here is pure: given a graph, a channel map and the nodes that
//! just ran, compute what comes next. The loop, fork and replay all go
//! through these functions so they agree on routing and fold order.

use crate::channels::ChannelStore;
use crate::error::CommitError;
use crate::graph::{Edge, Graph, NodeId, END, START};
use chronograph_checkpoint::{ChannelValues, ChannelVersions, CheckpointTuple, Write};
use std::collections::{BTreeMap, BTreeSet};

/// Writer name under which external input is recorded in checkpoint metadata
pub const INPUT: &str = "__input__";

/// Writer name for manual state updates that do not act as a node
pub const UPDATE: &str = "__update__";

/// Compute the frontier that follows `ran` on the post-commit map `values`.
///
/// Static edges contribute their target. Conditional edges call their router
/// on `values` and resolve each label, through the branch map when one was
/// given, otherwise as a node name. [`END`] contributes nothing. The result
/// is deduplicated and sorted by node name.
///
/// ```text
/// ran = [agent]        agent --(router)--> "continue" -> action
///                                      \-> "end"      -> END
/// values.messages[-1] has tool calls   => next = [action]
/// ```
pub fn next_frontier(
    graph: &Graph,
    ran: &[NodeId],
    values: &ChannelValues,
) -> Result<Vec<NodeId>, CommitError> {
    let mut next = BTreeSet::new();

    for node in ran {
        for edge in graph.edges_from(node) {
            match edge {
                Edge::Direct(to) => {
                    if to != END {
                        next.insert(to.clone());
                    }
                }
                Edge::Conditional { router, branches } => {
                    for label in router(values).into_labels() {
                        if label == END {
                            continue;
                        }
                        let target = if branches.is_empty() {
                            Some(&label)
                        } else {
                            branches.get(&label)
                        };
                        match target {
                            Some(to) if to == END => {}
                            Some(to) if graph.nodes.contains_key(to) => {
                                next.insert(to.clone());
                            }
                            _ => {
                                return Err(CommitError::Routing {
                                    node: node.clone(),
                                    label,
                                })
                            }
                        }
                    }
                }
            }
        }
    }

    Ok(next.into_iter().collect())
}

/// Everything needed to write the checkpoint that records external input
#[derive(Debug, Clone, PartialEq)]
pub struct InputPlan {
    pub values: ChannelValues,
    pub versions: ChannelVersions,
    pub next: Vec<NodeId>,
    pub ran: Vec<NodeId>,
    pub step: i64,
    /// Input was merged into a suspended checkpoint, keeping its frontier
    pub continues_suspended: bool,
}

/// Fold external input into the head of a lineage.
///
/// - no head: a fresh lineage at step 0, frontier routed out of [`START`]
/// - completed head: a new turn on top of the head's channels
/// - suspended head: the input is merged and the pending frontier is kept
pub fn plan_input(
    graph: &Graph,
    head: Option<&CheckpointTuple>,
    input: Vec<Write>,
) -> Result<InputPlan, CommitError> {
    let store = ChannelStore::new(&graph.channels);
    let writes = BTreeMap::from([(INPUT.to_string(), input)]);

    let (values, versions, step) = match head {
        Some(head) => (
            &head.checkpoint.channel_values,
            &head.checkpoint.channel_versions,
            head.metadata.step + 1,
        ),
        None => (&ChannelValues::new(), &ChannelVersions::new(), 0),
    };
    let applied = store.apply(values, versions, &writes)?;

    match head {
        Some(head) if !head.checkpoint.next.is_empty() => Ok(InputPlan {
            values: applied.values,
            versions: applied.versions,
            next: head.checkpoint.next.clone(),
            ran: head.metadata.ran.clone(),
            step,
            continues_suspended: true,
        }),
        _ => {
            let ran = vec![START.to_string()];
            let next = next_frontier(graph, &ran, &applied.values)?;
            Ok(InputPlan {
                values: applied.values,
                versions: applied.versions,
                next,
                ran,
                step,
                continues_suspended: false,
            })
        }
    }
}

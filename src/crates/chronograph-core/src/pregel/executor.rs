//! Task executor for one superstep.
//!
//! Runs every frontier node as its own tokio task, bounded by a semaphore,
//! against the same read-only snapshot. Each node is retried in place under
//! its [`RetryPolicy`]. The executor never commits anything; it hands the
//! successful writes and the failures back to the loop.

use crate::error::NodeFailure;
use crate::graph::{Graph, NodeId};
use crate::node::{Node, NodeContext};
use crate::retry::RetryPolicy;
use chronograph_checkpoint::{ChannelValues, CheckpointId, Write};
use futures::FutureExt;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Everything produced by the nodes of one superstep
#[derive(Debug, Default)]
pub struct SuperstepOutcome {
    /// Writes of every node that succeeded, keyed by node name
    pub writes: BTreeMap<NodeId, Vec<Write>>,
    /// Failures in node name order
    pub failures: Vec<NodeFailure>,
}

impl SuperstepOutcome {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Context shared by every node of one superstep
#[derive(Debug, Clone)]
pub struct SuperstepContext {
    pub lineage_id: String,
    pub checkpoint_id: Option<CheckpointId>,
    pub step: i64,
    pub cancel: CancellationToken,
}

impl SuperstepContext {
    fn for_node(&self, node: &str) -> NodeContext {
        NodeContext {
            lineage_id: self.lineage_id.clone(),
            checkpoint_id: self.checkpoint_id.clone(),
            step: self.step,
            node: node.to_string(),
            attempt: 1,
            cancel: self.cancel.clone(),
        }
    }
}

/// Executor for superstep tasks with bounded concurrency and retries.
#[derive(Debug, Clone)]
pub struct TaskExecutor {
    semaphore: Arc<Semaphore>,
}

impl TaskExecutor {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Run `frontier` to completion.
    ///
    /// Every node runs even when another one fails, so the outcome reports
    /// all failures of the superstep at once.
    pub async fn run_superstep(
        &self,
        graph: &Graph,
        frontier: &[NodeId],
        snapshot: Arc<ChannelValues>,
        ctx: &SuperstepContext,
    ) -> SuperstepOutcome {
        let mut join_set = JoinSet::new();
        let mut outcome = SuperstepOutcome::default();
        let mut failures = BTreeMap::new();

        for name in frontier {
            let Some(spec) = graph.nodes.get(name) else {
                failures.insert(
                    name.clone(),
                    NodeFailure {
                        node: name.clone(),
                        error: "node is not part of the graph".to_string(),
                        attempts: 0,
                    },
                );
                continue;
            };

            let node = spec.node.clone();
            let retry = spec.retry.clone();
            let snapshot = snapshot.clone();
            let node_ctx = ctx.for_node(name);
            let semaphore = self.semaphore.clone();
            let name = name.clone();

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = execute_with_retry(node, retry, snapshot, node_ctx).await;
                (name, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(writes))) => {
                    outcome.writes.insert(name, writes);
                }
                Ok((name, Err(failure))) => {
                    failures.insert(name, failure);
                }
                Err(e) => {
                    tracing::error!(error = %e, "task join error");
                }
            }
        }

        // A task lost to a join error never reported back
        for name in frontier {
            if !outcome.writes.contains_key(name) && !failures.contains_key(name) {
                failures.insert(
                    name.clone(),
                    NodeFailure {
                        node: name.clone(),
                        error: "task did not complete".to_string(),
                        attempts: 0,
                    },
                );
            }
        }

        outcome.failures = failures.into_values().collect();
        outcome
    }
}

/// Run one node, retrying under `retry`. A panic counts as a failed attempt.
async fn execute_with_retry(
    node: Arc<dyn Node>,
    retry: Option<RetryPolicy>,
    snapshot: Arc<ChannelValues>,
    mut ctx: NodeContext,
) -> Result<Vec<Write>, NodeFailure> {
    let max_attempts = retry.as_ref().map(|p| p.max_attempts.max(1)).unwrap_or(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        ctx.attempt = attempts;

        tracing::debug!(
            node = %ctx.node,
            step = ctx.step,
            attempt = attempts,
            max_attempts = max_attempts,
            "Executing node"
        );

        let result = AssertUnwindSafe(node.run(snapshot.clone(), ctx.clone()))
            .catch_unwind()
            .await;

        let error = match result {
            Ok(Ok(writes)) => {
                if attempts > 1 {
                    tracing::info!(
                        node = %ctx.node,
                        attempts = attempts,
                        "Node succeeded after retry"
                    );
                }
                return Ok(writes);
            }
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic_message(panic.as_ref()),
        };

        match retry.as_ref() {
            Some(policy) if policy.should_retry(attempts) => {
                let delay = policy.calculate_delay(attempts);
                tracing::warn!(
                    node = %ctx.node,
                    attempt = attempts,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Node failed, retrying after delay"
                );
                tokio::time::sleep(delay).await;
            }
            _ => {
                tracing::error!(
                    node = %ctx.node,
                    attempts = attempts,
                    error = %error,
                    "Node failed after all retry attempts"
                );
                return Err(NodeFailure {
                    node: ctx.node.clone(),
                    error,
                    attempts,
                });
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("node panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("node panicked: {s}")
    } else {
        "node panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeSpec;
    use crate::node::{FnNode, NodeError};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx() -> SuperstepContext {
        SuperstepContext {
            lineage_id: "lineage-1".to_string(),
            checkpoint_id: None,
            step: 1,
            cancel: CancellationToken::new(),
        }
    }

    fn add(graph: &mut Graph, name: &str, node: Arc<dyn Node>, retry: Option<RetryPolicy>) {
        graph.add_node(NodeSpec {
            name: name.to_string(),
            node,
            retry,
        });
    }

    fn fast_retry(max_attempts: usize) -> RetryPolicy {
        RetryPolicy::new(max_attempts)
            .with_initial_interval(0.001)
            .with_max_interval(0.01)
            .with_jitter(false)
    }

    #[tokio::test]
    async fn test_nodes_share_one_snapshot() {
        let mut graph = Graph::new();
        for name in ["a", "b"] {
            add(
                &mut graph,
                name,
                Arc::new(FnNode::new(|state: Arc<ChannelValues>, ctx: NodeContext| async move {
                    let seen = state.get("n").cloned().unwrap_or(json!(null));
                    Ok(vec![Write::new(ctx.node.clone(), seen)])
                })),
                None,
            );
        }

        let snapshot = Arc::new(ChannelValues::from([("n".to_string(), json!(7))]));
        let outcome = TaskExecutor::new(4)
            .run_superstep(&graph, &["a".to_string(), "b".to_string()], snapshot, &ctx())
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.writes["a"], vec![Write::new("a", json!(7))]);
        assert_eq!(outcome.writes["b"], vec![Write::new("b", json!(7))]);
    }

    #[tokio::test]
    async fn test_every_failure_is_reported() {
        let mut graph = Graph::new();
        add(
            &mut graph,
            "ok",
            Arc::new(FnNode::new(|_, _| async { Ok(vec![Write::new("x", json!(1))]) })),
            None,
        );
        for name in ["bad1", "bad2"] {
            add(
                &mut graph,
                name,
                Arc::new(FnNode::new(|_, ctx: NodeContext| async move {
                    Err(NodeError::from(format!("{} broke", ctx.node)))
                })),
                None,
            );
        }

        let frontier: Vec<NodeId> = ["bad2", "ok", "bad1"].iter().map(|s| s.to_string()).collect();
        let outcome = TaskExecutor::new(2)
            .run_superstep(&graph, &frontier, Arc::new(ChannelValues::new()), &ctx())
            .await;

        let failed: Vec<_> = outcome.failures.iter().map(|f| f.node.as_str()).collect();
        assert_eq!(failed, vec!["bad1", "bad2"]);
        assert_eq!(outcome.failures[0].error, "bad1 broke");
        assert!(outcome.writes.contains_key("ok"));
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut graph = Graph::new();
        add(
            &mut graph,
            "flaky",
            Arc::new(FnNode::new(move |_, ctx: NodeContext| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if ctx.attempt < 3 {
                        Err(NodeError::from("not yet"))
                    } else {
                        Ok(vec![Write::new("attempt", json!(ctx.attempt))])
                    }
                }
            })),
            Some(fast_retry(3)),
        );

        let outcome = TaskExecutor::new(1)
            .run_superstep(&graph, &["flaky".to_string()], Arc::new(ChannelValues::new()), &ctx())
            .await;

        assert!(outcome.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.writes["flaky"], vec![Write::new("attempt", json!(3))]);
    }

    #[tokio::test]
    async fn test_retry_exhausted_reports_attempts() {
        let mut graph = Graph::new();
        add(
            &mut graph,
            "doomed",
            Arc::new(FnNode::new(|_, _| async { Err(NodeError::from("always")) })),
            Some(fast_retry(2)),
        );

        let outcome = TaskExecutor::new(1)
            .run_superstep(&graph, &["doomed".to_string()], Arc::new(ChannelValues::new()), &ctx())
            .await;

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_panic_becomes_failure() {
        let mut graph = Graph::new();
        add(
            &mut graph,
            "panics",
            Arc::new(FnNode::new(|_, ctx: NodeContext| async move {
                if ctx.step > 0 {
                    panic!("kaboom");
                }
                Ok(vec![])
            })),
            None,
        );

        let outcome = TaskExecutor::new(1)
            .run_superstep(&graph, &["panics".to_string()], Arc::new(ChannelValues::new()), &ctx())
            .await;

        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].error.contains("kaboom"));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut graph = Graph::new();
        let mut frontier = Vec::new();

        for i in 0..6 {
            let running = running.clone();
            let peak = peak.clone();
            let name = format!("n{i}");
            add(
                &mut graph,
                &name,
                Arc::new(FnNode::new(move |_, _| {
                    let running = running.clone();
                    let peak = peak.clone();
                    async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok(vec![])
                    }
                })),
                None,
            );
            frontier.push(name);
        }

        let outcome = TaskExecutor::new(2)
            .run_superstep(&graph, &frontier, Arc::new(ChannelValues::new()), &ctx())
            .await;

        assert!(outcome.is_success());
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}

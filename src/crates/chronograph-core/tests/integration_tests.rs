//! Integration tests for complete lineages
//!
//! These tests drive the public API end to end: a tool-calling agent loop,
//! human-in-the-loop edits, branching and replay.

use chronograph_core::{
    AddMessagesReducer, AppendReducer, BinaryOperatorReducer, ChannelValues, CheckpointSource,
    CompiledGraph, EngineConfig, GraphError, HistoryMode, InterruptConfig, NodeError,
    OverwriteReducer, RetryPolicy, Route, RunConfig, StateGraph, Write, END,
};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn last_message(values: &ChannelValues) -> Option<&Value> {
    values.get("messages")?.as_array()?.last()
}

fn wants_tool(values: &ChannelValues) -> bool {
    last_message(values)
        .and_then(|m| m.get("tool_calls"))
        .and_then(Value::as_array)
        .map(|calls| !calls.is_empty())
        .unwrap_or(false)
}

/// agent -> (continue) action -> agent, or agent -> (end) END.
///
/// The first agent turn (`a1`) asks for the weather tool, the tool answers
/// (`t1`) and the second agent turn (`a2`) closes the conversation.
fn agent_graph() -> StateGraph {
    let mut graph = StateGraph::new();
    graph.add_channel("messages", AddMessagesReducer);

    graph.add_node("agent", |state: Arc<ChannelValues>, _| async move {
        let answered = state["messages"]
            .as_array()
            .map(|m| m.iter().any(|m| m["role"] == "tool"))
            .unwrap_or(false);
        let message = if answered {
            json!({"id": "a2", "role": "ai", "content": "it is sunny"})
        } else {
            json!({
                "id": "a1",
                "role": "ai",
                "content": "",
                "tool_calls": [{"id": "call-1", "name": "weather"}]
            })
        };
        Ok(vec![Write::new("messages", message)])
    });
    graph.add_node("action", |_, _| async move {
        Ok(vec![Write::new(
            "messages",
            json!({"id": "t1", "role": "tool", "content": "sunny", "tool_call_id": "call-1"}),
        )])
    });

    graph.set_entry("agent");
    graph.add_conditional_edge(
        "agent",
        |values: &ChannelValues| Route::from(if wants_tool(values) { "continue" } else { "end" }),
        HashMap::from([
            ("continue".to_string(), "action".to_string()),
            ("end".to_string(), END.to_string()),
        ]),
    );
    graph.add_edge("action", "agent");
    graph
}

fn hi() -> Option<Vec<Write>> {
    Some(vec![Write::new(
        "messages",
        json!({"id": "h1", "role": "human", "content": "hi"}),
    )])
}

fn message_ids(values: &ChannelValues) -> Vec<String> {
    values["messages"]
        .as_array()
        .map(|m| {
            m.iter()
                .filter_map(|m| m["id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn test_agent_loop_checkpoints_follow_the_frontier() {
    init_tracing();
    let compiled = agent_graph().compile().unwrap();
    let config = RunConfig::new("weather");

    let done = compiled.invoke(&config, hi()).await.unwrap();
    assert!(done.is_complete());
    assert_eq!(message_ids(&done.values), vec!["h1", "a1", "t1", "a2"]);

    let mut history = compiled
        .get_state_history("weather", HistoryMode::ActiveBranch)
        .await
        .unwrap();
    history.reverse();

    let frontiers: Vec<Vec<String>> = history.iter().map(|s| s.next.clone()).collect();
    assert_eq!(
        frontiers,
        vec![
            vec!["agent".to_string()],
            vec!["action".to_string()],
            vec!["agent".to_string()],
            vec![],
        ]
    );
    let steps: Vec<i64> = history.iter().map(|s| s.step()).collect();
    assert_eq!(steps, vec![0, 1, 2, 3]);
    assert_eq!(history[0].metadata.source, CheckpointSource::Input);
    assert!(history[1..]
        .iter()
        .all(|s| s.metadata.source == CheckpointSource::Loop));
}

#[tokio::test]
async fn test_update_state_reroutes_from_edited_content() {
    init_tracing();
    let compiled = agent_graph().compile().unwrap();
    compiled.invoke(&RunConfig::new("edit"), hi()).await.unwrap();

    let mut history = compiled
        .get_state_history("edit", HistoryMode::ActiveBranch)
        .await
        .unwrap();
    history.reverse();
    let asked = &history[1];
    assert_eq!(asked.next, vec!["action"]);

    let edited = compiled
        .update_state(
            "edit",
            asked.checkpoint_id(),
            vec![Write::new(
                "messages",
                json!({"id": "a1", "role": "ai", "content": "its warm!"}),
            )],
            None,
        )
        .await
        .unwrap();

    assert!(edited.next.is_empty());
    assert_eq!(edited.metadata.source, CheckpointSource::Update);
    assert_eq!(edited.parent_checkpoint_id(), asked.checkpoint_id());
    assert_eq!(edited.step(), asked.step() + 1);
    assert_eq!(message_ids(&edited.values), vec!["h1", "a1"]);
    assert_eq!(last_message(&edited.values).unwrap()["content"], "its warm!");

    // the original checkpoint is untouched
    let original = compiled
        .get_state_at("edit", asked.checkpoint_id().unwrap())
        .await
        .unwrap();
    assert_eq!(original, *asked);
}

#[tokio::test]
async fn test_interrupt_and_resume_matches_uninterrupted_run() {
    init_tracing();
    let plain = agent_graph().compile().unwrap();
    let straight = plain.invoke(&RunConfig::new("straight"), hi()).await.unwrap();

    let paused_graph = agent_graph()
        .compile_with_config(
            EngineConfig::new()
                .with_interrupts(InterruptConfig::new().with_interrupt_before(vec!["action"])),
        )
        .unwrap();
    let config = RunConfig::new("paused");

    let paused = paused_graph.invoke(&config, hi()).await.unwrap();
    assert!(paused.is_interrupted());
    assert_eq!(paused.next, vec!["action"]);

    let resumed = paused_graph.resume(&config).await.unwrap();
    assert!(resumed.is_complete());
    assert_eq!(resumed.values, straight.values);
}

#[tokio::test]
async fn test_human_edit_during_pause_then_resume() {
    init_tracing();
    let compiled = agent_graph()
        .compile_with_config(
            EngineConfig::new()
                .with_interrupts(InterruptConfig::new().with_interrupt_before(vec!["action"])),
        )
        .unwrap();
    let config = RunConfig::new("review");

    let paused = compiled.invoke(&config, hi()).await.unwrap();
    let approved = compiled
        .update_state(
            "review",
            paused.checkpoint_id(),
            vec![Write::new(
                "messages",
                json!({
                    "id": "a1",
                    "role": "ai",
                    "content": "",
                    "tool_calls": [{"id": "call-1", "name": "weather", "args": {"city": "Oslo"}}]
                }),
            )],
            None,
        )
        .await
        .unwrap();
    assert_eq!(approved.next, vec!["action"]);

    let done = compiled.resume(&config).await.unwrap();
    assert!(done.is_complete());
    assert_eq!(message_ids(&done.values), vec!["h1", "a1", "t1", "a2"]);
    assert_eq!(
        done.values["messages"][1]["tool_calls"][0]["args"]["city"],
        "Oslo"
    );
}

#[tokio::test]
async fn test_fork_leaves_existing_branch_intact() {
    init_tracing();
    let compiled = agent_graph().compile().unwrap();
    let first = compiled.invoke(&RunConfig::new("tree"), hi()).await.unwrap();

    let before = compiled
        .get_state_history("tree", HistoryMode::FullTree)
        .await
        .unwrap();
    let root = before.last().unwrap().clone();

    compiled
        .update_state(
            "tree",
            root.checkpoint_id(),
            vec![Write::new(
                "messages",
                json!({"id": "h1", "role": "human", "content": "hello again"}),
            )],
            None,
        )
        .await
        .unwrap();
    let branched = compiled.resume(&RunConfig::new("tree")).await.unwrap();
    assert!(branched.is_complete());
    assert_eq!(last_message(&branched.values).unwrap()["id"], "a2");

    for snapshot in &before {
        let reloaded = compiled
            .get_state_at("tree", snapshot.checkpoint_id().unwrap())
            .await
            .unwrap();
        assert_eq!(&reloaded, snapshot);
    }
    assert_eq!(
        compiled
            .get_state_at("tree", first.checkpoint_id().unwrap())
            .await
            .unwrap()
            .values,
        first.values
    );

    let after = compiled
        .get_state_history("tree", HistoryMode::FullTree)
        .await
        .unwrap();
    assert_eq!(after.len(), before.len() + 4);

    let active = compiled
        .get_state_history("tree", HistoryMode::ActiveBranch)
        .await
        .unwrap();
    assert_eq!(active.len(), 5);
    assert_eq!(active.last().unwrap().checkpoint_id(), root.checkpoint_id());
}

#[tokio::test]
async fn test_history_is_newest_first_without_duplicates() {
    let compiled = agent_graph().compile().unwrap();
    let config = RunConfig::new("ordered");
    compiled.invoke(&config, hi()).await.unwrap();
    compiled
        .invoke(
            &config,
            Some(vec![Write::new(
                "messages",
                json!({"id": "h2", "role": "human", "content": "and tomorrow?"}),
            )]),
        )
        .await
        .unwrap();

    let history = compiled
        .get_state_history("ordered", HistoryMode::FullTree)
        .await
        .unwrap();
    let ids: Vec<&str> = history.iter().filter_map(|s| s.checkpoint_id()).collect();
    let unique: HashSet<&str> = ids.iter().copied().collect();
    assert_eq!(unique.len(), ids.len());
    assert!(ids.windows(2).all(|w| w[0] > w[1]));

    let steps: Vec<i64> = history.iter().map(|s| s.step()).collect();
    assert!(steps.windows(2).all(|w| w[0] > w[1]));

    let unknown = compiled
        .get_state_history("nobody", HistoryMode::FullTree)
        .await
        .unwrap();
    assert!(unknown.is_empty());
}

#[tokio::test]
async fn test_replay_reproduces_every_checkpoint() {
    let compiled = agent_graph().compile().unwrap();
    compiled.invoke(&RunConfig::new("replayed"), hi()).await.unwrap();

    let history = compiled
        .get_state_history("replayed", HistoryMode::ActiveBranch)
        .await
        .unwrap();
    for snapshot in &history {
        let rebuilt = compiled
            .replay("replayed", snapshot.checkpoint_id())
            .await
            .unwrap();
        assert_eq!(rebuilt, snapshot.values);
    }
}

#[tokio::test]
async fn test_parallel_branches_fold_in_node_order() {
    let mut graph = StateGraph::new();
    graph.add_channel("log", AppendReducer);
    graph.add_channel("winner", OverwriteReducer);
    for name in ["zeta", "alpha", "mid"] {
        graph.add_node(name, move |_, _| async move {
            Ok(vec![
                Write::new("log", json!(name)),
                Write::new("winner", json!(name)),
            ])
        });
        graph.set_entry(name);
        graph.add_finish(name);
    }
    let compiled = graph.compile().unwrap();

    let done = compiled
        .invoke(&RunConfig::new("fan"), Some(vec![]))
        .await
        .unwrap();
    assert_eq!(done.values["log"], json!(["alpha", "mid", "zeta"]));
    assert_eq!(done.values["winner"], json!("zeta"));
    assert_eq!(done.metadata.ran, vec!["alpha", "mid", "zeta"]);
    assert_eq!(done.step(), 1);
}

#[tokio::test]
async fn test_unknown_route_label_fails_without_commit() {
    let mut graph = StateGraph::new();
    graph.add_channel("x", OverwriteReducer);
    graph.add_node("lost", |_, _| async { Ok(vec![Write::new("x", json!(1))]) });
    graph.set_entry("lost");
    graph.add_conditional_edge(
        "lost",
        |_: &ChannelValues| Route::from("nowhere"),
        HashMap::from([("somewhere".to_string(), END.to_string())]),
    );
    let compiled = graph.compile().unwrap();

    let err = compiled
        .invoke(&RunConfig::new("route"), Some(vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Routing { ref label, .. } if label == "nowhere"));

    let head = compiled.get_state("route").await.unwrap();
    assert_eq!(err.last_checkpoint_id(), head.checkpoint_id());
    assert_eq!(head.step(), 0);
}

#[tokio::test]
async fn test_retry_commits_like_first_success() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();

    let mut graph = StateGraph::new();
    graph.add_channel("count", BinaryOperatorReducer::sum());
    graph.add_node("flaky", move |_, _| {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(NodeError::from("not yet"))
            } else {
                Ok(vec![Write::new("count", json!(5))])
            }
        }
    });
    graph.with_retry(
        "flaky",
        RetryPolicy::new(3)
            .with_initial_interval(0.001)
            .with_jitter(false),
    );
    graph.set_entry("flaky");
    graph.add_finish("flaky");
    let compiled = graph.compile().unwrap();

    let done = compiled
        .invoke(&RunConfig::new("retry"), Some(vec![]))
        .await
        .unwrap();
    assert_eq!(done.values["count"], json!(5));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(done.step(), 1);
}

#[tokio::test]
async fn test_checkpointer_is_shared_across_compilations() {
    let saver = Arc::new(chronograph_core::InMemoryCheckpointSaver::new());
    let writer: CompiledGraph = agent_graph().compile().unwrap().with_checkpointer(saver.clone());
    let reader: CompiledGraph = agent_graph().compile().unwrap().with_checkpointer(saver);

    let done = writer.invoke(&RunConfig::new("shared"), hi()).await.unwrap();
    let seen = reader.get_state("shared").await.unwrap();
    assert_eq!(seen, done);
}

/// Adds each input to `total`, logs it, and loops `rounds` times per turn
fn accumulator(rounds: i64) -> StateGraph {
    let mut graph = StateGraph::new();
    graph.add_channel("total", BinaryOperatorReducer::sum());
    graph.add_channel("seen", AppendReducer);
    graph.add_channel("rounds", BinaryOperatorReducer::sum());
    graph.add_node("double", |state: Arc<ChannelValues>, ctx| async move {
        let total = state.get("total").and_then(Value::as_i64).unwrap_or(0);
        Ok(vec![
            Write::new("total", json!(total)),
            Write::new("seen", json!(format!("{}@{}", total, ctx.step))),
            Write::new("rounds", json!(1)),
        ])
    });
    graph.set_entry("double");
    graph.add_conditional_edge(
        "double",
        move |values: &ChannelValues| {
            let done = values.get("rounds").and_then(Value::as_i64).unwrap_or(0);
            if done % rounds == 0 {
                Route::end()
            } else {
                Route::from("double")
            }
        },
        HashMap::new(),
    );
    graph
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_replay_matches_persisted_state(
        inputs in prop::collection::vec(-50i64..50, 1..4),
        rounds in 1i64..4,
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let compiled = accumulator(rounds).compile().unwrap();
            let config = RunConfig::new("prop");
            for value in &inputs {
                compiled
                    .invoke(&config, Some(vec![Write::new("total", json!(value))]))
                    .await
                    .unwrap();
            }

            let head = compiled.get_state("prop").await.unwrap();
            let replayed = compiled.replay("prop", None).await.unwrap();
            prop_assert_eq!(&replayed, &head.values);
            prop_assert_eq!(
                head.values["rounds"].as_i64(),
                Some(rounds * inputs.len() as i64)
            );
            Ok(())
        })?;
    }
}

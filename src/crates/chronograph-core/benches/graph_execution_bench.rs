use chronograph_core::{
    AppendReducer, BinaryOperatorReducer, ChannelValues, CompiledGraph, HistoryMode, Route,
    RunConfig, StateGraph, Write,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};
use std::collections::HashMap;

/// A single node that loops until `count` reaches `steps`
fn counter_graph(steps: i64) -> CompiledGraph {
    let mut graph = StateGraph::new();
    graph.add_channel("count", BinaryOperatorReducer::sum());
    graph.add_channel("log", AppendReducer);
    graph.add_node("tick", |_, ctx| async move {
        Ok(vec![
            Write::new("count", json!(1)),
            Write::new("log", json!(ctx.step)),
        ])
    });
    graph.set_entry("tick");
    graph.add_conditional_edge(
        "tick",
        move |values: &ChannelValues| {
            if values.get("count").and_then(Value::as_i64).unwrap_or(0) >= steps {
                Route::end()
            } else {
                Route::from("tick")
            }
        },
        HashMap::new(),
    );
    graph
        .compile_with_config(
            chronograph_core::EngineConfig::new().with_recursion_limit(steps as usize + 1),
        )
        .unwrap()
}

/// `width` nodes running in the same superstep
fn fan_out_graph(width: usize) -> CompiledGraph {
    let mut graph = StateGraph::new();
    graph.add_channel("count", BinaryOperatorReducer::sum());
    for i in 0..width {
        let name = format!("worker_{i}");
        graph.add_node(name.clone(), |_, _| async {
            Ok(vec![Write::new("count", json!(1))])
        });
        graph.set_entry(name.clone());
        graph.add_finish(name);
    }
    graph.compile().unwrap()
}

fn superstep_loop_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("superstep loop");

    for steps in [1i64, 10, 20] {
        let compiled = counter_graph(steps);
        group.bench_with_input(BenchmarkId::from_parameter(steps), &steps, |b, _| {
            b.to_async(&runtime).iter(|| async {
                let config = RunConfig::new(uuid::Uuid::new_v4().to_string());
                black_box(compiled.invoke(&config, Some(vec![])).await.unwrap());
            });
        });
    }
    group.finish();
}

fn fan_out_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("parallel superstep");

    for width in [2usize, 8, 32] {
        let compiled = fan_out_graph(width);
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.to_async(&runtime).iter(|| async {
                let config = RunConfig::new(uuid::Uuid::new_v4().to_string());
                black_box(compiled.invoke(&config, Some(vec![])).await.unwrap());
            });
        });
    }
    group.finish();
}

fn time_travel_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let compiled = counter_graph(20);
    let config = RunConfig::new("bench-history");
    runtime.block_on(async {
        compiled.invoke(&config, Some(vec![])).await.unwrap();
    });

    c.bench_function("history active branch 21", |b| {
        b.to_async(&runtime).iter(|| async {
            black_box(
                compiled
                    .get_state_history("bench-history", HistoryMode::ActiveBranch)
                    .await
                    .unwrap(),
            );
        });
    });

    c.bench_function("replay 21", |b| {
        b.to_async(&runtime).iter(|| async {
            black_box(compiled.replay("bench-history", None).await.unwrap());
        });
    });
}

criterion_group!(
    benches,
    superstep_loop_benchmark,
    fan_out_benchmark,
    time_travel_benchmark
);
criterion_main!(benches);

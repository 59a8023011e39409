use criterion::{black_box, criterion_group, criterion_main, Criterion};
use chronograph_checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver, InMemoryCheckpointSaver,
};
use futures::StreamExt;
use serde_json::json;

fn sample_checkpoint() -> Checkpoint {
    let mut checkpoint = Checkpoint::empty();
    checkpoint.channel_values.insert(
        "messages".to_string(),
        json!((0..50).map(|i| json!({"id": i, "content": "hello"})).collect::<Vec<_>>()),
    );
    checkpoint.channel_versions.insert("messages".to_string(), 50);
    checkpoint
}

fn checkpoint_save_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("checkpoint save", |b| {
        b.to_async(&runtime).iter(|| async {
            let saver = InMemoryCheckpointSaver::new();
            let config = CheckpointConfig::for_lineage("bench-lineage");

            saver
                .put(&config, black_box(sample_checkpoint()), black_box(CheckpointMetadata::new()))
                .await
                .unwrap();
        });
    });
}

fn checkpoint_load_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("checkpoint load", |b| {
        b.to_async(&runtime).iter(|| async {
            let saver = InMemoryCheckpointSaver::new();
            let config = CheckpointConfig::for_lineage("bench-lineage");

            let saved_config = saver
                .put(&config, sample_checkpoint(), CheckpointMetadata::new())
                .await
                .unwrap();

            saver.get_tuple(black_box(&saved_config)).await.unwrap();
        });
    });
}

fn checkpoint_list_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let saver = InMemoryCheckpointSaver::new();
    let lineage = CheckpointConfig::for_lineage("bench-lineage");
    runtime.block_on(async {
        let mut parent = lineage.clone();
        for step in 0..200 {
            parent = saver
                .put(&parent, sample_checkpoint(), CheckpointMetadata::new().with_step(step))
                .await
                .unwrap();
        }
    });

    c.bench_function("checkpoint list 200", |b| {
        b.to_async(&runtime).iter(|| async {
            let stream = saver.list(Some(&lineage), None, None, Some(50)).await.unwrap();
            let page: Vec<_> = stream.collect().await;
            black_box(page);
        });
    });
}

criterion_group!(
    benches,
    checkpoint_save_benchmark,
    checkpoint_load_benchmark,
    checkpoint_list_benchmark
);
criterion_main!(benches);

//! Performance benchmarks for the hierarchy engines
//!
//! Run with: `cargo bench -p hierarchy-core` (needs the default `turso` feature)
//!
//! These benchmarks measure the cost each encoding pays for structure:
//! - Building a balanced tree (create)
//! - Moving a mid-sized subtree back and forth (move)
//! - Ancestor lookup for a deep leaf (query)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hierarchy_core::db::{MemoryStore, TursoStore};
use hierarchy_core::engines::{Engine, HierarchyEngine, Strategy};
use hierarchy_core::models::NodeId;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;

const FANOUT: usize = 4;
const LEVELS: usize = 4;

/// Build a tree with `FANOUT` children per node, `LEVELS` deep; returns (root, deepest leaf)
async fn build_tree(engine: &Engine) -> anyhow::Result<(NodeId, NodeId)> {
    let root = engine.create("root", None).await?.id;
    let mut frontier = vec![root];
    let mut leaf = root;

    for level in 0..LEVELS {
        let mut next = Vec::with_capacity(frontier.len() * FANOUT);
        for parent in &frontier {
            for i in 0..FANOUT {
                let child = engine.create(&format!("n{level}-{i}"), Some(*parent)).await?;
                next.push(child.id);
                leaf = child.id;
            }
        }
        frontier = next;
    }
    Ok((root, leaf))
}

fn bench_create(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("create_tree");
    group.sample_size(10);

    for strategy in Strategy::ALL {
        group.bench_with_input(
            BenchmarkId::from_parameter(strategy),
            &strategy,
            |b, strategy| {
                b.iter(|| {
                    rt.block_on(async {
                        let engine = Engine::new(*strategy, Arc::new(MemoryStore::new()));
                        black_box(build_tree(&engine).await.unwrap())
                    })
                });
            },
        );
    }
    group.finish();
}

fn bench_move_subtree(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("move_subtree");
    group.sample_size(20);

    for strategy in Strategy::ALL {
        let engine = Engine::new(strategy, Arc::new(MemoryStore::new()));
        let (subtree, target) = rt.block_on(async {
            let (root, _) = build_tree(&engine).await.unwrap();
            let children = engine.children(root).await.unwrap();
            (children[0].id, children[FANOUT - 1].id)
        });

        group.bench_with_input(
            BenchmarkId::from_parameter(strategy),
            &strategy,
            |b, _| {
                b.iter(|| {
                    rt.block_on(async {
                        engine.move_node(subtree, Some(target)).await.unwrap();
                        engine.move_node(subtree, None).await.unwrap();
                    })
                });
            },
        );
    }
    group.finish();
}

fn bench_ancestors(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("ancestors_turso");

    for strategy in Strategy::ALL {
        let temp_dir = TempDir::new().unwrap();
        let engine = rt.block_on(async {
            let store = TursoStore::new(temp_dir.path().join("bench.db")).await.unwrap();
            Engine::new(strategy, Arc::new(store))
        });
        let (_, leaf) = rt.block_on(build_tree(&engine)).unwrap();

        group.bench_with_input(
            BenchmarkId::from_parameter(strategy),
            &strategy,
            |b, _| {
                b.iter(|| rt.block_on(async { black_box(engine.ancestors(leaf).await.unwrap()) }));
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_create, bench_move_subtree, bench_ancestors);
criterion_main!(benches);

//! # Graph Benchmarks
//!
//! Performance benchmarks for flexgraph-core edits, submission building
//! and snapshot encoding.
//!
//! Run with: `cargo bench -p flexgraph-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use flexgraph_core::bridge::build_submission;
use flexgraph_core::library::rgba_len;
use flexgraph_core::{
    Endpoint, FilterKind, HeadlessEngine, NodeKind, PersistedState, Session, decode_durable,
    encode_durable, encode_shareable,
};
use std::hint::black_box;

/// A session with one image feeding a chain of `size` filters into the
/// Renderer.
fn create_filter_chain(size: usize) -> Session {
    let mut session = Session::new(Box::new(HeadlessEngine::new()));
    let img = session
        .add_image("bench.png", 64, 64, vec![255; rgba_len(64, 64)], false)
        .expect("image");
    let src = session.add_source(&img).expect("source");
    let mut prev = src;
    for _ in 0..size {
        let f = session
            .add_node(NodeKind::filter(FilterKind::Brightness), None, None)
            .expect("filter");
        session
            .connect(Endpoint::new(prev, "out"), Endpoint::new(f.clone(), "in"))
            .expect("connect");
        prev = f;
    }
    session
        .connect(Endpoint::new(prev, "out"), Endpoint::new("renderer", "in"))
        .expect("to renderer");
    session
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_node_insertion(c: &mut Criterion) {
    let mut group = c.benchmark_group("node_insertion");

    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let mut session = Session::new(Box::new(HeadlessEngine::new()));
                for _ in 0..size {
                    let _ = session.add_node(NodeKind::affine(), None, None);
                }
                black_box(session)
            });
        });
    }

    group.finish();
}

fn bench_build_submission(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_submission");

    for size in [10, 100, 1000].iter() {
        let session = create_filter_chain(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(build_submission(session.graph(), session.library())));
        });
    }

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");
    let session = create_filter_chain(200);
    let state = PersistedState::capture(&session, 0);
    let text = encode_durable(&state).expect("encode");

    group.bench_function("encode_durable", |b| {
        b.iter(|| black_box(encode_durable(&state)))
    });
    group.bench_function("decode_durable", |b| {
        b.iter(|| black_box(decode_durable(&text)))
    });
    group.bench_function("encode_shareable", |b| {
        b.iter(|| black_box(encode_shareable(&state)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_node_insertion,
    bench_build_submission,
    bench_snapshot
);
criterion_main!(benches);

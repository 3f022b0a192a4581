//! Benchmarks for turning wire bytes into frame snapshots
//!
//! Covers the per-frame receive path:
//! - Splitting a buffer into tagged blocks
//! - Decoding block bodies into typed objects
//! - Assembling snapshots with the connection-side builder

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use mocap_stream::codec::ByteBuffer;
use mocap_stream::connection::{Delivery, SnapshotBuilder};
use mocap_stream::objects::{Block, ObjectKind};
use mocap_stream::source::RawBlock;
use mocap_stream::test_utils::{encode_blocks, frame_blocks, subjects_block};
use mocap_stream::transport::DatagramBlocks;
use std::hint::black_box;

const FRAMES: u32 = 100;

fn stream_bytes() -> ByteBuffer {
    let blocks: Vec<Block> = (1..=FRAMES).flat_map(frame_blocks).collect();
    encode_blocks(&blocks)
}

fn bench_block_split(c: &mut Criterion) {
    let bytes = stream_bytes();

    let mut group = c.benchmark_group("block_split");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("datagram_blocks", |b| {
        b.iter(|| DatagramBlocks::new(black_box(bytes.as_bytes())).count())
    });
    group.finish();
}

fn bench_body_decode(c: &mut Criterion) {
    let names: Vec<String> = (0..32).map(|i| format!("Subject{i}")).collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let encoded = subjects_block(&names).to_buffer();
    let body = encoded.as_bytes()[8..].to_vec();

    let mut group = c.benchmark_group("body_decode");
    group.throughput(Throughput::Bytes(body.len() as u64));
    group.bench_function("subjects_32", |b| {
        b.iter(|| {
            let mut buffer = ByteBuffer::from_bytes(black_box(body.clone()));
            black_box(Block::decode(ObjectKind::Subjects, &mut buffer))
        })
    });
    group.finish();
}

fn bench_snapshot_assembly(c: &mut Criterion) {
    // Skipped blocks log at trace level; RUST_LOG=trace shows the cost
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let bytes = stream_bytes();
    let blocks: Vec<RawBlock> = DatagramBlocks::new(bytes.as_bytes())
        .map(|(header, body)| RawBlock::new(header.tag, body))
        .collect();

    let mut group = c.benchmark_group("snapshot_assembly");
    group.throughput(Throughput::Elements(FRAMES as u64));
    group.bench_function("builder_100_frames", |b| {
        b.iter(|| {
            let mut builder = SnapshotBuilder::new(ObjectKind::default_request_set());
            let mut deliveries = Vec::new();
            for block in blocks.iter().cloned() {
                builder.process(block, &mut deliveries);
            }
            let frames = deliveries.iter().filter(|d| matches!(d, Delivery::Dynamic(_))).count();
            black_box(frames)
        })
    });
    group.finish();
}

criterion_group!(benches, bench_block_split, bench_body_decode, bench_snapshot_assembly);
criterion_main!(benches);

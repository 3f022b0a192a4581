//! Benchmarks for axis remapping of delivered frames
//!
//! Measures the cost callers pay on every poll or subscription item:
//! - Flattening a frame pair into a `FrameState`
//! - Remapping every spatial field
//! - Quaternion conversions used for lightweight segments

use criterion::{Criterion, criterion_group, criterion_main};
use mocap_stream::axis::{AxisMapping, Direction, matrix_to_quaternion, quaternion_to_matrix};
use mocap_stream::frame::{FramePair, FrameState};
use mocap_stream::test_utils::{dynamic_objects, static_objects};
use std::hint::black_box;

fn y_up() -> AxisMapping {
    AxisMapping::new(Direction::Forward, Direction::Up, Direction::Right).expect("valid mapping")
}

fn bench_frame_state(c: &mut Criterion) {
    let pair = FramePair {
        statics: Some(static_objects(&["Alice", "Bob"])),
        dynamics: dynamic_objects(1),
    };
    let mapping = y_up();

    let mut group = c.benchmark_group("frame_state");
    group.bench_function("from_pair", |b| b.iter(|| FrameState::from_pair(black_box(&pair))));
    group.bench_function("from_pair_remapped", |b| {
        b.iter(|| FrameState::from_pair(black_box(&pair)).remapped(black_box(&mapping)))
    });
    group.finish();
}

fn bench_primitives(c: &mut Criterion) {
    let mapping = y_up();
    let rotation = [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];

    let mut group = c.benchmark_group("axis_primitives");
    group.bench_function("translation", |b| {
        b.iter(|| mapping.transform_translation(black_box(&[1.0, 2.0, 3.0])))
    });
    group.bench_function("rotation", |b| {
        b.iter(|| mapping.transform_rotation(black_box(&rotation)))
    });
    group.bench_function("quaternion_round_trip", |b| {
        b.iter(|| quaternion_to_matrix(&matrix_to_quaternion(black_box(&rotation))))
    });
    group.finish();
}

criterion_group!(benches, bench_frame_state, bench_primitives);
criterion_main!(benches);

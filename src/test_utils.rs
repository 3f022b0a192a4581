//! Fixture builders for blocks, frames and snapshots
//!
//! Shared by unit tests and the benchmarks; everything here produces data in
//! exactly the layout a capture server puts on the wire.

#![cfg(any(test, feature = "benchmark"))]

use std::sync::Arc;

use crate::axis::{Matrix3, Vector3};
use crate::codec::ByteBuffer;
use crate::objects::{
    Block, DynamicObject, DynamicObjects, ForcePlate, ForceSample, FrameInfo, LabeledReconstruction,
    SegmentDefinition, SegmentPose, StaticObject, StaticObjects, Subject, SubjectPose,
};
use crate::source::RawBlock;
use crate::transport::BLOCK_HEADER_LEN;

pub const IDENTITY: Matrix3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// Encode `block` and split it back into tag and body.
pub fn raw(block: &Block) -> RawBlock {
    let encoded = block.to_buffer();
    RawBlock::new(block.kind().tag(), &encoded.as_bytes()[BLOCK_HEADER_LEN..])
}

/// Encode every block, headers included, back to back.
pub fn encode_blocks(blocks: &[Block]) -> ByteBuffer {
    let mut buffer = ByteBuffer::new();
    for block in blocks {
        block.append_to(&mut buffer);
    }
    buffer
}

pub fn frame_info(frame_number: u32) -> FrameInfo {
    FrameInfo { frame_number, hardware_frame_number: frame_number * 2, frame_rate: 100.0 }
}

pub fn frame_info_block(frame_number: u32) -> RawBlock {
    raw(&Block::Dynamic(DynamicObject::FrameInfo(frame_info(frame_number))))
}

/// A two-segment pose: root at `offset` and a child one unit further along X.
pub fn subject_pose(subject_id: u32, offset: Vector3) -> SubjectPose {
    let child = [offset[0] + 1.0, offset[1], offset[2]];
    SubjectPose {
        subject_id,
        segments: vec![
            SegmentPose { translation: offset, rotation: IDENTITY, occluded: false },
            SegmentPose { translation: child, rotation: IDENTITY, occluded: false },
        ],
    }
}

pub fn segments_block(subject_id: u32) -> RawBlock {
    let pose = subject_pose(subject_id, [0.1, 0.2, 0.3]);
    raw(&Block::Dynamic(DynamicObject::GlobalSegments(vec![pose])))
}

/// The blocks a server sends for one frame: segment poses, then frame info.
pub fn frame_blocks(frame_number: u32) -> Vec<Block> {
    let offset = [frame_number as f64, 0.0, 1.0];
    vec![
        Block::Dynamic(DynamicObject::GlobalSegments(vec![subject_pose(1, offset)])),
        Block::Dynamic(DynamicObject::FrameInfo(frame_info(frame_number))),
    ]
}

pub fn subject(id: u32, name: &str) -> Subject {
    Subject {
        id,
        name: name.to_string(),
        segments: vec![
            SegmentDefinition { id: 0, name: "Root".to_string(), parent: -1 },
            SegmentDefinition { id: 1, name: "Child".to_string(), parent: 0 },
        ],
        markers: Vec::new(),
    }
}

pub fn subjects_block(names: &[&str]) -> Block {
    let subjects = names.iter().zip(1u32..).map(|(name, id)| subject(id, name)).collect();
    Block::Static(StaticObject::Subjects(subjects))
}

/// A plate whose axes are rotated half a turn about X relative to the volume.
pub fn flipped_force_plate(id: u32) -> ForcePlate {
    ForcePlate {
        id,
        device_id: 100 + id,
        origin: [0.0; 3],
        orientation: [[1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, -1.0]],
        corners: [[0.0; 3], [0.6, 0.0, 0.0], [0.6, 0.4, 0.0], [0.0, 0.4, 0.0]],
    }
}

pub fn static_objects(subject_names: &[&str]) -> Arc<StaticObjects> {
    let mut statics = StaticObjects::default();
    if let Block::Static(object) = subjects_block(subject_names) {
        statics.apply(object);
    }
    Arc::new(statics)
}

/// A decoded frame with one subject, one marker and one force sample.
pub fn dynamic_objects(frame_number: u32) -> Arc<DynamicObjects> {
    let offset = [frame_number as f64, 0.0, 1.0];
    Arc::new(DynamicObjects {
        frame: frame_info(frame_number),
        global_segments: vec![subject_pose(1, offset)],
        labeled_reconstructions: vec![LabeledReconstruction {
            id: 7,
            position: [1.0, 2.0, 3.0],
            residual: 0.5,
        }],
        forces: vec![ForceSample {
            plate_id: 1,
            force: [0.0, 0.0, 700.0],
            moment: [1.0, 0.0, 0.0],
            centre_of_pressure: [0.3, 0.2, 0.0],
        }],
        ..Default::default()
    })
}

//! Folds decoded blocks into static and dynamic snapshots

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::objects::{
    Category, DynamicObject, DynamicObjects, ObjectKind, RequestSet, StaticObject, StaticObjects,
};
use crate::source::RawBlock;

/// Something a connection hands to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// The scene description changed
    Static(Arc<StaticObjects>),
    /// A frame completed
    Dynamic(Arc<DynamicObjects>),
    /// The server advertised the kinds it can produce
    Capabilities(BTreeSet<ObjectKind>),
}

/// Per-connection build-in-progress state.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    requested: RequestSet,
    statics: StaticObjects,
    static_dirty: bool,
    dynamics: DynamicObjects,
}

impl SnapshotBuilder {
    pub fn new(requested: RequestSet) -> Self {
        Self { requested, ..Default::default() }
    }

    pub fn set_requested(&mut self, requested: RequestSet) {
        self.requested = requested;
    }

    fn wants(&self, kind: ObjectKind) -> bool {
        kind.is_always_enabled() || self.requested.contains(&kind)
    }

    /// Decode one block, pushing whatever it completes onto `out`.
    ///
    /// The body is decoded from its own buffer, so a malformed or ignored
    /// block never affects the next one.
    pub fn process(&mut self, block: RawBlock, out: &mut Vec<Delivery>) {
        let RawBlock { tag, mut body } = block;
        let Some(kind) = ObjectKind::from_tag(tag) else {
            trace!(tag, length = body.len(), "Skipping unknown block");
            return;
        };
        if !self.wants(kind) {
            trace!(?kind, "Skipping unrequested block");
            return;
        }

        match kind.category() {
            Category::Static => {
                let Some(object) = StaticObject::decode(kind, &mut body) else {
                    warn!(?kind, length = body.len(), "Failed to decode static block");
                    return;
                };
                if let StaticObject::ServerInfo(info) = &object {
                    out.push(Delivery::Capabilities(info.supported_kinds()));
                }
                debug!(?kind, "Static objects updated");
                self.statics.apply(object);
                self.static_dirty = true;
            }
            Category::Dynamic => {
                let Some(object) = DynamicObject::decode(kind, &mut body) else {
                    warn!(?kind, length = body.len(), "Failed to decode dynamic block");
                    return;
                };
                let completes_frame = matches!(object, DynamicObject::FrameInfo(_));
                self.dynamics.apply(object);
                if completes_frame {
                    self.finish_frame(out);
                }
            }
            Category::Control => {
                trace!(?kind, "Ignoring control block from server");
            }
        }
    }

    fn finish_frame(&mut self, out: &mut Vec<Delivery>) {
        if self.static_dirty {
            self.static_dirty = false;
            out.push(Delivery::Static(Arc::new(self.statics.clone())));
        }
        let frame = std::mem::take(&mut self.dynamics);
        trace!(frame = frame.frame_number(), "Frame complete");
        out.push(Delivery::Dynamic(Arc::new(frame)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{Block, FrameInfo, ServerInfo, Subject, SubjectPose};
    use crate::test_utils::{frame_info_block, raw};

    fn subjects_block() -> RawBlock {
        raw(&Block::Static(StaticObject::Subjects(vec![Subject {
            id: 1,
            name: "Performer".to_string(),
            ..Default::default()
        }])))
    }

    fn segments_block() -> RawBlock {
        raw(&Block::Dynamic(DynamicObject::GlobalSegments(vec![SubjectPose {
            subject_id: 1,
            segments: Vec::new(),
        }])))
    }

    #[test]
    fn frame_info_completes_a_frame() {
        let mut builder = SnapshotBuilder::new(ObjectKind::default_request_set());
        let mut out = Vec::new();

        builder.process(segments_block(), &mut out);
        assert!(out.is_empty());
        builder.process(frame_info_block(5), &mut out);

        let [Delivery::Dynamic(frame)] = out.as_slice() else {
            panic!("expected one dynamic delivery, got {out:?}");
        };
        assert_eq!(frame.frame_number(), 5);
        assert_eq!(frame.global_segments.len(), 1);
    }

    #[test]
    fn frame_state_does_not_leak_between_frames() {
        let mut builder = SnapshotBuilder::new(ObjectKind::default_request_set());
        let mut out = Vec::new();
        builder.process(segments_block(), &mut out);
        builder.process(frame_info_block(1), &mut out);
        builder.process(frame_info_block(2), &mut out);

        let Some(Delivery::Dynamic(second)) = out.last() else { panic!("expected a frame") };
        assert_eq!(second.frame_number(), 2);
        assert!(second.global_segments.is_empty());
    }

    #[test]
    fn changed_statics_are_delivered_once_before_the_frame() {
        let mut builder = SnapshotBuilder::new(ObjectKind::default_request_set());
        let mut out = Vec::new();
        builder.process(subjects_block(), &mut out);
        builder.process(frame_info_block(1), &mut out);
        builder.process(frame_info_block(2), &mut out);

        assert_eq!(out.len(), 3);
        assert!(matches!(&out[0], Delivery::Static(s) if s.subjects.len() == 1));
        assert!(matches!(&out[1], Delivery::Dynamic(_)));
        assert!(matches!(&out[2], Delivery::Dynamic(_)));
    }

    #[test]
    fn unrequested_kinds_are_skipped() {
        let mut builder = SnapshotBuilder::new(RequestSet::new());
        let mut out = Vec::new();
        builder.process(segments_block(), &mut out);
        builder.process(subjects_block(), &mut out);
        builder.process(frame_info_block(9), &mut out);

        let [Delivery::Dynamic(frame)] = out.as_slice() else {
            panic!("expected only the frame, got {out:?}");
        };
        assert!(frame.global_segments.is_empty());
    }

    #[test]
    fn truncated_body_is_treated_as_absent() {
        let mut builder = SnapshotBuilder::new(ObjectKind::default_request_set());
        let mut out = Vec::new();
        let mut block = segments_block();
        let length = block.body.len();
        block.body.set_length(length - 1);

        builder.process(block, &mut out);
        builder.process(frame_info_block(3), &mut out);
        let [Delivery::Dynamic(frame)] = out.as_slice() else { panic!("expected a frame") };
        assert!(frame.global_segments.is_empty());
    }

    #[test]
    fn server_info_reports_capabilities() {
        let mut builder = SnapshotBuilder::new(RequestSet::new());
        let mut out = Vec::new();
        let info = ServerInfo {
            application: "Capture".to_string(),
            version: "1.0".to_string(),
            supported_tags: [ObjectKind::FrameInfo.tag(), ObjectKind::Forces.tag()]
                .into_iter()
                .collect(),
        };
        builder.process(raw(&Block::Static(StaticObject::ServerInfo(info))), &mut out);

        let [Delivery::Capabilities(kinds)] = out.as_slice() else {
            panic!("expected capabilities, got {out:?}");
        };
        assert!(kinds.contains(&ObjectKind::Forces));
        assert!(!kinds.contains(&ObjectKind::Video));

        let frame = FrameInfo { frame_number: 4, ..Default::default() };
        builder.process(raw(&Block::Dynamic(DynamicObject::FrameInfo(frame))), &mut out);
        assert!(matches!(&out[1], Delivery::Static(s) if s.server_info.is_some()));
    }
}

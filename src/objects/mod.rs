//! Object categories carried on the wire and their typed records.
//!
//! Every block on the wire starts with a `u32` tag naming its [`ObjectKind`].
//! Kinds fall into three categories:
//!
//! - **Static**: scene description that changes rarely (subjects, cameras,
//!   devices). Decoded into [`StaticObject`] and folded into a
//!   [`StaticObjects`] snapshot.
//! - **Dynamic**: per-frame samples. Decoded into [`DynamicObject`] and folded
//!   into a [`DynamicObjects`] snapshot, which is complete once the
//!   [`ObjectKind::FrameInfo`] block arrives.
//! - **Control**: client-to-server requests ([`ControlMessage`]).
//!
//! The set of kinds is closed; unknown tags are skipped by length.

mod control;
mod dynamic_objects;
mod static_objects;

pub use control::{ControlMessage, FrameRequest, MulticastStart, StreamMode};
pub use dynamic_objects::{
    CameraCentroids, Centroid, DeviceVoltages, DynamicObject, DynamicObjects, ForceSample,
    FrameInfo, GazeSample, LabeledReconstruction, Latency, LatencySample, LightweightSegment,
    LightweightSubjectPose, RayAssignment, SegmentPose, SubjectPose, Timecode,
    UnlabeledReconstruction, VideoFrame,
};
pub use static_objects::{
    Camera, CameraCalibration, Device, DeviceChannel, EyeTracker, ForcePlate, MarkerDefinition,
    SegmentDefinition, ServerInfo, StaticObject, StaticObjects, StreamInfo, Subject,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::codec::{ByteBuffer, Encode};
use crate::transport::append_block;

/// Which snapshot a kind belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Static,
    Dynamic,
    Control,
}

macro_rules! object_kinds {
    ($($(#[$meta:meta])* $variant:ident = $tag:literal => $category:ident),* $(,)?) => {
        /// Wire category identifier.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum ObjectKind {
            $($(#[$meta])* $variant,)*
        }

        impl ObjectKind {
            /// Every kind, in tag order.
            pub const ALL: &'static [ObjectKind] = &[$(ObjectKind::$variant,)*];

            pub fn tag(self) -> u32 {
                match self {
                    $(ObjectKind::$variant => $tag,)*
                }
            }

            pub fn from_tag(tag: u32) -> Option<Self> {
                match tag {
                    $($tag => Some(ObjectKind::$variant),)*
                    _ => None,
                }
            }

            pub fn category(self) -> Category {
                match self {
                    $(ObjectKind::$variant => Category::$category,)*
                }
            }
        }
    };
}

object_kinds! {
    /// Protocol version and nominal frame rate
    StreamInfo = 0x0101 => Static,
    /// Server application description and supported kinds
    ServerInfo = 0x0102 => Static,
    Cameras = 0x0103 => Static,
    CameraCalibrations = 0x0104 => Static,
    /// Subject and segment topology
    Subjects = 0x0105 => Static,
    SubjectScales = 0x0106 => Static,
    Devices = 0x0107 => Static,
    ForcePlates = 0x0108 => Static,
    EyeTrackers = 0x0109 => Static,

    /// Frame number and rate; terminates a frame
    FrameInfo = 0x0201 => Dynamic,
    Timecode = 0x0202 => Dynamic,
    Latency = 0x0203 => Dynamic,
    Centroids = 0x0204 => Dynamic,
    Video = 0x0205 => Dynamic,
    LabeledReconstructions = 0x0206 => Dynamic,
    UnlabeledReconstructions = 0x0207 => Dynamic,
    RayAssignments = 0x0208 => Dynamic,
    Voltages = 0x0209 => Dynamic,
    Forces = 0x020A => Dynamic,
    GlobalSegments = 0x020B => Dynamic,
    LocalSegments = 0x020C => Dynamic,
    /// Reduced-precision segment poses
    LightweightSegments = 0x020D => Dynamic,
    EyeGaze = 0x020E => Dynamic,

    ObjectRequest = 0x0301 => Control,
    StreamModeRequest = 0x0302 => Control,
    FrameRequest = 0x0303 => Control,
    DeviceFeedback = 0x0304 => Control,
    MulticastStart = 0x0305 => Control,
    MulticastStop = 0x0306 => Control,
}

/// Set of kinds a client asks the server for.
pub type RequestSet = BTreeSet<ObjectKind>;

impl ObjectKind {
    /// Kinds decoded regardless of the request set; the stream cannot be
    /// followed without them.
    pub fn is_always_enabled(self) -> bool {
        matches!(self, ObjectKind::StreamInfo | ObjectKind::ServerInfo | ObjectKind::FrameInfo)
    }

    /// Whether a client may ask for this kind at all.
    pub fn is_requestable(self) -> bool {
        self.category() != Category::Control
    }

    /// Kinds requested by a freshly created client.
    pub fn default_request_set() -> RequestSet {
        [ObjectKind::Subjects, ObjectKind::GlobalSegments].into_iter().collect()
    }
}

/// One decoded block.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Static(StaticObject),
    Dynamic(DynamicObject),
    Control(ControlMessage),
}

impl Block {
    /// Decode the body of a block whose tag resolved to `kind`.
    pub fn decode(kind: ObjectKind, body: &mut ByteBuffer) -> Option<Self> {
        match kind.category() {
            Category::Static => StaticObject::decode(kind, body).map(Block::Static),
            Category::Dynamic => DynamicObject::decode(kind, body).map(Block::Dynamic),
            Category::Control => ControlMessage::decode(kind, body).map(Block::Control),
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            Block::Static(object) => object.kind(),
            Block::Dynamic(object) => object.kind(),
            Block::Control(message) => message.kind(),
        }
    }

    /// Append this block, header included, to `buffer`.
    pub fn append_to(&self, buffer: &mut ByteBuffer) {
        append_block(buffer, self.kind().tag(), self);
    }

    /// Encode this block, header included, into a fresh buffer.
    pub fn to_buffer(&self) -> ByteBuffer {
        let mut buffer = ByteBuffer::new();
        self.append_to(&mut buffer);
        buffer
    }
}

impl Encode for Block {
    fn encode(&self, buffer: &mut ByteBuffer) {
        match self {
            Block::Static(object) => object.encode(buffer),
            Block::Dynamic(object) => object.encode(buffer),
            Block::Control(message) => message.encode(buffer),
        }
    }
}

impl From<StaticObject> for Block {
    fn from(object: StaticObject) -> Self {
        Block::Static(object)
    }
}

impl From<DynamicObject> for Block {
    fn from(object: DynamicObject) -> Self {
        Block::Dynamic(object)
    }
}

impl From<ControlMessage> for Block {
    fn from(message: ControlMessage) -> Self {
        Block::Control(message)
    }
}

//! Client-to-server control messages

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{ObjectKind, RequestSet};
use crate::codec::{ByteBuffer, Decode, Encode, wire_record};

/// How frames are delivered by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StreamMode {
    /// Server sends a frame only when asked.
    ClientPull,
    /// As `ClientPull`, but the server sends the next frame as soon as the
    /// previous one has been taken.
    ClientPullPreFetch,
    /// Server pushes every frame as it is produced.
    #[default]
    ServerPush,
}

impl StreamMode {
    /// Whether frames arrive without explicit requests.
    pub fn is_streaming(self) -> bool {
        self == StreamMode::ServerPush
    }

    fn wire_value(self) -> u32 {
        match self {
            StreamMode::ClientPull => 0,
            StreamMode::ClientPullPreFetch => 1,
            StreamMode::ServerPush => 2,
        }
    }
}

impl Encode for StreamMode {
    fn encode(&self, buffer: &mut ByteBuffer) {
        buffer.write(&self.wire_value());
    }
}

impl Decode for StreamMode {
    fn decode(buffer: &mut ByteBuffer) -> Option<Self> {
        match buffer.read::<u32>()? {
            0 => Some(StreamMode::ClientPull),
            1 => Some(StreamMode::ClientPullPreFetch),
            2 => Some(StreamMode::ServerPush),
            _ => None,
        }
    }
}

wire_record! {
    pub struct FrameRequest {
        /// Ask for the frame after the latest one rather than the latest itself
        pub next: bool,
    }
}

wire_record! {
    /// Ask the server to start multicasting frames
    pub struct MulticastStart {
        pub server_address: String,
        pub multicast_address: String,
        pub port: u16,
    }
}

/// One control message.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// Replace the set of kinds the server sends (by tag)
    ObjectRequest(BTreeSet<u32>),
    StreamMode(StreamMode),
    FrameRequest(FrameRequest),
    /// Devices that should have haptic feedback switched on
    DeviceFeedback(BTreeSet<u32>),
    MulticastStart(MulticastStart),
    MulticastStop,
}

impl ControlMessage {
    pub fn object_request(requested: &RequestSet) -> Self {
        ControlMessage::ObjectRequest(requested.iter().map(|kind| kind.tag()).collect())
    }

    pub(crate) fn decode(kind: ObjectKind, body: &mut ByteBuffer) -> Option<Self> {
        let message = match kind {
            ObjectKind::ObjectRequest => ControlMessage::ObjectRequest(body.read()?),
            ObjectKind::StreamModeRequest => ControlMessage::StreamMode(body.read()?),
            ObjectKind::FrameRequest => ControlMessage::FrameRequest(body.read()?),
            ObjectKind::DeviceFeedback => ControlMessage::DeviceFeedback(body.read()?),
            ObjectKind::MulticastStart => ControlMessage::MulticastStart(body.read()?),
            ObjectKind::MulticastStop => ControlMessage::MulticastStop,
            _ => return None,
        };
        Some(message)
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            ControlMessage::ObjectRequest(_) => ObjectKind::ObjectRequest,
            ControlMessage::StreamMode(_) => ObjectKind::StreamModeRequest,
            ControlMessage::FrameRequest(_) => ObjectKind::FrameRequest,
            ControlMessage::DeviceFeedback(_) => ObjectKind::DeviceFeedback,
            ControlMessage::MulticastStart(_) => ObjectKind::MulticastStart,
            ControlMessage::MulticastStop => ObjectKind::MulticastStop,
        }
    }
}

impl Encode for ControlMessage {
    fn encode(&self, buffer: &mut ByteBuffer) {
        match self {
            ControlMessage::ObjectRequest(tags) => buffer.write(tags),
            ControlMessage::StreamMode(mode) => buffer.write(mode),
            ControlMessage::FrameRequest(request) => buffer.write(request),
            ControlMessage::DeviceFeedback(devices) => buffer.write(devices),
            ControlMessage::MulticastStart(start) => buffer.write(start),
            ControlMessage::MulticastStop => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_request_carries_tags() {
        let requested: RequestSet =
            [ObjectKind::GlobalSegments, ObjectKind::Forces].into_iter().collect();
        let ControlMessage::ObjectRequest(tags) = ControlMessage::object_request(&requested) else {
            panic!("expected object request");
        };
        assert!(tags.contains(&ObjectKind::GlobalSegments.tag()));
        assert!(tags.contains(&ObjectKind::Forces.tag()));
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn unknown_stream_mode_is_rejected() {
        let mut buffer = ByteBuffer::new();
        buffer.write(&7u32);
        buffer.set_offset(0);
        assert_eq!(buffer.read::<StreamMode>(), None);
    }

    #[test]
    fn multicast_stop_has_empty_body() {
        let mut buffer = ByteBuffer::new();
        buffer.write(&ControlMessage::MulticastStop);
        assert!(buffer.is_empty());
        assert_eq!(
            ControlMessage::decode(ObjectKind::MulticastStop, &mut buffer),
            Some(ControlMessage::MulticastStop)
        );
    }

    #[test]
    fn only_server_push_streams() {
        assert!(StreamMode::ServerPush.is_streaming());
        assert!(!StreamMode::ClientPull.is_streaming());
        assert!(!StreamMode::ClientPullPreFetch.is_streaming());
    }
}

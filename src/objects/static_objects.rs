//! Scene-description records and the snapshot they build up

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::ObjectKind;
use crate::axis::{Matrix3, Vector3};
use crate::codec::{ByteBuffer, Encode, wire_record};

wire_record! {
    /// Protocol version and nominal capture rate
    pub struct StreamInfo {
        pub version: [u32; 3],
        pub frame_rate: f64,
    }
}

wire_record! {
    /// Server application description
    pub struct ServerInfo {
        pub application: String,
        pub version: String,
        /// Tags of every object kind this server can produce
        pub supported_tags: BTreeSet<u32>,
    }
}

impl ServerInfo {
    /// Known kinds among the advertised tags.
    pub fn supported_kinds(&self) -> BTreeSet<ObjectKind> {
        self.supported_tags.iter().filter_map(|tag| ObjectKind::from_tag(*tag)).collect()
    }
}

wire_record! {
    pub struct Camera {
        pub id: u32,
        pub name: String,
        pub display_type: String,
        pub resolution: [u32; 2],
        pub is_video: bool,
    }
}

wire_record! {
    /// Camera pose and lens parameters
    pub struct CameraCalibration {
        pub camera_id: u32,
        pub position: Vector3,
        pub orientation: Matrix3,
        pub principal_point: [f64; 2],
        pub focal_length: f64,
        pub radial_distortion: [f64; 3],
    }
}

wire_record! {
    pub struct SegmentDefinition {
        pub id: u32,
        pub name: String,
        /// Index of the parent segment, negative for a root
        pub parent: i32,
    }
}

wire_record! {
    pub struct MarkerDefinition {
        pub name: String,
        pub segment_id: u32,
    }
}

wire_record! {
    /// Subject topology
    pub struct Subject {
        pub id: u32,
        pub name: String,
        pub segments: Vec<SegmentDefinition>,
        pub markers: Vec<MarkerDefinition>,
    }
}

impl Subject {
    pub fn segment(&self, name: &str) -> Option<&SegmentDefinition> {
        self.segments.iter().find(|segment| segment.name == name)
    }

    pub fn root_segments(&self) -> impl Iterator<Item = &SegmentDefinition> {
        self.segments.iter().filter(|segment| segment.parent < 0)
    }
}

wire_record! {
    pub struct DeviceChannel {
        pub name: String,
        pub unit: String,
    }
}

wire_record! {
    /// Analog device (force plate amplifier, EMG, ...)
    pub struct Device {
        pub id: u32,
        pub name: String,
        pub device_type: String,
        pub channels: Vec<DeviceChannel>,
    }
}

wire_record! {
    pub struct ForcePlate {
        pub id: u32,
        pub device_id: u32,
        pub origin: Vector3,
        /// Plate axes relative to the capture volume
        pub orientation: Matrix3,
        pub corners: [Vector3; 4],
    }
}

wire_record! {
    pub struct EyeTracker {
        pub id: u32,
        pub subject_id: u32,
        pub segment_id: u32,
        pub offset: Vector3,
    }
}

/// One decoded static block.
#[derive(Debug, Clone, PartialEq)]
pub enum StaticObject {
    StreamInfo(StreamInfo),
    ServerInfo(ServerInfo),
    Cameras(Vec<Camera>),
    CameraCalibrations(Vec<CameraCalibration>),
    Subjects(Vec<Subject>),
    SubjectScales(BTreeMap<u32, f64>),
    Devices(Vec<Device>),
    ForcePlates(Vec<ForcePlate>),
    EyeTrackers(Vec<EyeTracker>),
}

impl StaticObject {
    pub(crate) fn decode(kind: ObjectKind, body: &mut ByteBuffer) -> Option<Self> {
        let object = match kind {
            ObjectKind::StreamInfo => StaticObject::StreamInfo(body.read()?),
            ObjectKind::ServerInfo => StaticObject::ServerInfo(body.read()?),
            ObjectKind::Cameras => StaticObject::Cameras(body.read()?),
            ObjectKind::CameraCalibrations => StaticObject::CameraCalibrations(body.read()?),
            ObjectKind::Subjects => StaticObject::Subjects(body.read()?),
            ObjectKind::SubjectScales => StaticObject::SubjectScales(body.read()?),
            ObjectKind::Devices => StaticObject::Devices(body.read()?),
            ObjectKind::ForcePlates => StaticObject::ForcePlates(body.read()?),
            ObjectKind::EyeTrackers => StaticObject::EyeTrackers(body.read()?),
            _ => return None,
        };
        Some(object)
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            StaticObject::StreamInfo(_) => ObjectKind::StreamInfo,
            StaticObject::ServerInfo(_) => ObjectKind::ServerInfo,
            StaticObject::Cameras(_) => ObjectKind::Cameras,
            StaticObject::CameraCalibrations(_) => ObjectKind::CameraCalibrations,
            StaticObject::Subjects(_) => ObjectKind::Subjects,
            StaticObject::SubjectScales(_) => ObjectKind::SubjectScales,
            StaticObject::Devices(_) => ObjectKind::Devices,
            StaticObject::ForcePlates(_) => ObjectKind::ForcePlates,
            StaticObject::EyeTrackers(_) => ObjectKind::EyeTrackers,
        }
    }
}

impl Encode for StaticObject {
    fn encode(&self, buffer: &mut ByteBuffer) {
        match self {
            StaticObject::StreamInfo(info) => buffer.write(info),
            StaticObject::ServerInfo(info) => buffer.write(info),
            StaticObject::Cameras(cameras) => buffer.write(cameras),
            StaticObject::CameraCalibrations(calibrations) => buffer.write(calibrations),
            StaticObject::Subjects(subjects) => buffer.write(subjects),
            StaticObject::SubjectScales(scales) => buffer.write(scales),
            StaticObject::Devices(devices) => buffer.write(devices),
            StaticObject::ForcePlates(plates) => buffer.write(plates),
            StaticObject::EyeTrackers(trackers) => buffer.write(trackers),
        }
    }
}

/// Latest known scene description.
///
/// Built up block by block on each connection and published as an immutable
/// `Arc<StaticObjects>` that every buffered frame shares until a newer one
/// replaces it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StaticObjects {
    pub stream_info: Option<StreamInfo>,
    pub server_info: Option<ServerInfo>,
    pub cameras: Vec<Camera>,
    pub camera_calibrations: Vec<CameraCalibration>,
    pub subjects: Vec<Subject>,
    /// Scale factor per subject id
    pub subject_scales: BTreeMap<u32, f64>,
    pub devices: Vec<Device>,
    pub force_plates: Vec<ForcePlate>,
    pub eye_trackers: Vec<EyeTracker>,
}

impl StaticObjects {
    /// Replace the field `object` describes.
    pub fn apply(&mut self, object: StaticObject) {
        match object {
            StaticObject::StreamInfo(info) => self.stream_info = Some(info),
            StaticObject::ServerInfo(info) => self.server_info = Some(info),
            StaticObject::Cameras(cameras) => self.cameras = cameras,
            StaticObject::CameraCalibrations(calibrations) => {
                self.camera_calibrations = calibrations
            }
            StaticObject::Subjects(subjects) => self.subjects = subjects,
            StaticObject::SubjectScales(scales) => self.subject_scales = scales,
            StaticObject::Devices(devices) => self.devices = devices,
            StaticObject::ForcePlates(plates) => self.force_plates = plates,
            StaticObject::EyeTrackers(trackers) => self.eye_trackers = trackers,
        }
    }

    pub fn subject(&self, name: &str) -> Option<&Subject> {
        self.subjects.iter().find(|subject| subject.name == name)
    }

    pub fn force_plate(&self, id: u32) -> Option<&ForcePlate> {
        self.force_plates.iter().find(|plate| plate.id == id)
    }
}

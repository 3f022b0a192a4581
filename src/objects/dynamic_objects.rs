//! Per-frame records and the frame snapshot they build up

use serde::Serialize;

use super::ObjectKind;
use crate::axis::{Matrix3, Vector3, quaternion_to_matrix};
use crate::codec::{ByteBuffer, Encode, wire_record};

wire_record! {
    /// Frame identity; its arrival completes the frame
    pub struct FrameInfo {
        pub frame_number: u32,
        pub hardware_frame_number: u32,
        pub frame_rate: f64,
    }
}

wire_record! {
    pub struct Timecode {
        pub hours: u32,
        pub minutes: u32,
        pub seconds: u32,
        pub frames: u32,
        pub sub_frame: u32,
        pub field_flag: bool,
        pub standard: u32,
        pub subframes_per_frame: u32,
        pub user_bits: u32,
    }
}

wire_record! {
    pub struct LatencySample {
        pub name: String,
        pub seconds: f64,
    }
}

wire_record! {
    /// Processing latency broken down by pipeline stage
    pub struct Latency {
        pub samples: Vec<LatencySample>,
    }
}

impl Latency {
    pub fn total(&self) -> f64 {
        self.samples.iter().map(|sample| sample.seconds).sum()
    }
}

wire_record! {
    pub struct Centroid {
        pub position: [f64; 2],
        pub radius: f64,
        pub accuracy: f64,
    }
}

wire_record! {
    pub struct CameraCentroids {
        pub camera_id: u32,
        pub centroids: Vec<Centroid>,
    }
}

wire_record! {
    pub struct VideoFrame {
        pub camera_id: u32,
        pub width: u32,
        pub height: u32,
        pub pixel_format: u32,
        pub data: Vec<u8>,
    }
}

wire_record! {
    pub struct LabeledReconstruction {
        pub id: u32,
        pub position: Vector3,
        pub residual: f64,
    }
}

wire_record! {
    pub struct UnlabeledReconstruction {
        pub position: Vector3,
        pub residual: f64,
    }
}

wire_record! {
    /// Camera ray contributing to a reconstruction
    pub struct RayAssignment {
        pub reconstruction_id: u32,
        pub camera_id: u32,
        pub centroid_index: u32,
    }
}

wire_record! {
    pub struct DeviceVoltages {
        pub device_id: u32,
        /// Samples per channel for this frame
        pub channels: Vec<Vec<f64>>,
    }
}

wire_record! {
    /// Force plate output, in plate coordinates
    pub struct ForceSample {
        pub plate_id: u32,
        pub force: Vector3,
        pub moment: Vector3,
        pub centre_of_pressure: Vector3,
    }
}

wire_record! {
    pub struct SegmentPose {
        pub translation: Vector3,
        pub rotation: Matrix3,
        pub occluded: bool,
    }
}

wire_record! {
    /// Segment poses for one subject, indexed like its segment definitions
    pub struct SubjectPose {
        pub subject_id: u32,
        pub segments: Vec<SegmentPose>,
    }
}

wire_record! {
    /// Reduced-precision segment pose
    pub struct LightweightSegment {
        pub translation: [f32; 3],
        /// Unit quaternion `[x, y, z, w]`
        pub rotation: [f32; 4],
        pub occluded: bool,
    }
}

impl LightweightSegment {
    /// Expand into a full-precision pose.
    pub fn to_pose(&self) -> SegmentPose {
        let translation = self.translation.map(f64::from);
        let rotation = quaternion_to_matrix(&self.rotation.map(f64::from));
        SegmentPose { translation, rotation, occluded: self.occluded }
    }
}

wire_record! {
    pub struct LightweightSubjectPose {
        pub subject_id: u32,
        pub segments: Vec<LightweightSegment>,
    }
}

wire_record! {
    pub struct GazeSample {
        pub tracker_id: u32,
        pub position: Vector3,
        pub direction: Vector3,
        pub occluded: bool,
    }
}

/// One decoded dynamic block.
#[derive(Debug, Clone, PartialEq)]
pub enum DynamicObject {
    FrameInfo(FrameInfo),
    Timecode(Timecode),
    Latency(Latency),
    Centroids(Vec<CameraCentroids>),
    Video(Vec<VideoFrame>),
    LabeledReconstructions(Vec<LabeledReconstruction>),
    UnlabeledReconstructions(Vec<UnlabeledReconstruction>),
    RayAssignments(Vec<RayAssignment>),
    Voltages(Vec<DeviceVoltages>),
    Forces(Vec<ForceSample>),
    GlobalSegments(Vec<SubjectPose>),
    LocalSegments(Vec<SubjectPose>),
    LightweightSegments(Vec<LightweightSubjectPose>),
    EyeGaze(Vec<GazeSample>),
}

impl DynamicObject {
    pub(crate) fn decode(kind: ObjectKind, body: &mut ByteBuffer) -> Option<Self> {
        let object = match kind {
            ObjectKind::FrameInfo => DynamicObject::FrameInfo(body.read()?),
            ObjectKind::Timecode => DynamicObject::Timecode(body.read()?),
            ObjectKind::Latency => DynamicObject::Latency(body.read()?),
            ObjectKind::Centroids => DynamicObject::Centroids(body.read()?),
            ObjectKind::Video => DynamicObject::Video(body.read()?),
            ObjectKind::LabeledReconstructions => {
                DynamicObject::LabeledReconstructions(body.read()?)
            }
            ObjectKind::UnlabeledReconstructions => {
                DynamicObject::UnlabeledReconstructions(body.read()?)
            }
            ObjectKind::RayAssignments => DynamicObject::RayAssignments(body.read()?),
            ObjectKind::Voltages => DynamicObject::Voltages(body.read()?),
            ObjectKind::Forces => DynamicObject::Forces(body.read()?),
            ObjectKind::GlobalSegments => DynamicObject::GlobalSegments(body.read()?),
            ObjectKind::LocalSegments => DynamicObject::LocalSegments(body.read()?),
            ObjectKind::LightweightSegments => DynamicObject::LightweightSegments(body.read()?),
            ObjectKind::EyeGaze => DynamicObject::EyeGaze(body.read()?),
            _ => return None,
        };
        Some(object)
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            DynamicObject::FrameInfo(_) => ObjectKind::FrameInfo,
            DynamicObject::Timecode(_) => ObjectKind::Timecode,
            DynamicObject::Latency(_) => ObjectKind::Latency,
            DynamicObject::Centroids(_) => ObjectKind::Centroids,
            DynamicObject::Video(_) => ObjectKind::Video,
            DynamicObject::LabeledReconstructions(_) => ObjectKind::LabeledReconstructions,
            DynamicObject::UnlabeledReconstructions(_) => ObjectKind::UnlabeledReconstructions,
            DynamicObject::RayAssignments(_) => ObjectKind::RayAssignments,
            DynamicObject::Voltages(_) => ObjectKind::Voltages,
            DynamicObject::Forces(_) => ObjectKind::Forces,
            DynamicObject::GlobalSegments(_) => ObjectKind::GlobalSegments,
            DynamicObject::LocalSegments(_) => ObjectKind::LocalSegments,
            DynamicObject::LightweightSegments(_) => ObjectKind::LightweightSegments,
            DynamicObject::EyeGaze(_) => ObjectKind::EyeGaze,
        }
    }
}

impl Encode for DynamicObject {
    fn encode(&self, buffer: &mut ByteBuffer) {
        match self {
            DynamicObject::FrameInfo(info) => buffer.write(info),
            DynamicObject::Timecode(timecode) => buffer.write(timecode),
            DynamicObject::Latency(latency) => buffer.write(latency),
            DynamicObject::Centroids(centroids) => buffer.write(centroids),
            DynamicObject::Video(frames) => buffer.write(frames),
            DynamicObject::LabeledReconstructions(recons) => buffer.write(recons),
            DynamicObject::UnlabeledReconstructions(recons) => buffer.write(recons),
            DynamicObject::RayAssignments(rays) => buffer.write(rays),
            DynamicObject::Voltages(voltages) => buffer.write(voltages),
            DynamicObject::Forces(forces) => buffer.write(forces),
            DynamicObject::GlobalSegments(poses) => buffer.write(poses),
            DynamicObject::LocalSegments(poses) => buffer.write(poses),
            DynamicObject::LightweightSegments(poses) => buffer.write(poses),
            DynamicObject::EyeGaze(samples) => buffer.write(samples),
        }
    }
}

/// Everything received for a single frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DynamicObjects {
    pub frame: FrameInfo,
    pub timecode: Option<Timecode>,
    pub latency: Option<Latency>,
    pub centroids: Vec<CameraCentroids>,
    pub video: Vec<VideoFrame>,
    pub labeled_reconstructions: Vec<LabeledReconstruction>,
    pub unlabeled_reconstructions: Vec<UnlabeledReconstruction>,
    pub ray_assignments: Vec<RayAssignment>,
    pub voltages: Vec<DeviceVoltages>,
    pub forces: Vec<ForceSample>,
    pub global_segments: Vec<SubjectPose>,
    pub local_segments: Vec<SubjectPose>,
    pub lightweight_segments: Vec<LightweightSubjectPose>,
    pub eye_gaze: Vec<GazeSample>,
}

impl DynamicObjects {
    /// Frame id used for arbitration between connections.
    pub fn frame_number(&self) -> u32 {
        self.frame.frame_number
    }

    pub fn apply(&mut self, object: DynamicObject) {
        match object {
            DynamicObject::FrameInfo(info) => self.frame = info,
            DynamicObject::Timecode(timecode) => self.timecode = Some(timecode),
            DynamicObject::Latency(latency) => self.latency = Some(latency),
            DynamicObject::Centroids(centroids) => self.centroids = centroids,
            DynamicObject::Video(frames) => self.video = frames,
            DynamicObject::LabeledReconstructions(recons) => self.labeled_reconstructions = recons,
            DynamicObject::UnlabeledReconstructions(recons) => {
                self.unlabeled_reconstructions = recons
            }
            DynamicObject::RayAssignments(rays) => self.ray_assignments = rays,
            DynamicObject::Voltages(voltages) => self.voltages = voltages,
            DynamicObject::Forces(forces) => self.forces = forces,
            DynamicObject::GlobalSegments(poses) => self.global_segments = poses,
            DynamicObject::LocalSegments(poses) => self.local_segments = poses,
            DynamicObject::LightweightSegments(poses) => self.lightweight_segments = poses,
            DynamicObject::EyeGaze(samples) => self.eye_gaze = samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lightweight_identity_expands_to_identity_rotation() {
        let segment = LightweightSegment {
            translation: [0.5, -1.0, 2.0],
            rotation: [0.0, 0.0, 0.0, 1.0],
            occluded: false,
        };
        let pose = segment.to_pose();
        assert_eq!(pose.translation, [0.5, -1.0, 2.0]);
        assert_eq!(pose.rotation, [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
    }

    #[test]
    fn latency_total_sums_stages() {
        let latency = Latency {
            samples: vec![
                LatencySample { name: "Camera".to_string(), seconds: 0.002 },
                LatencySample { name: "Solve".to_string(), seconds: 0.003 },
            ],
        };
        assert!((latency.total() - 0.005).abs() < 1e-12);
    }

    #[test]
    fn apply_sets_frame_identity() {
        let mut dynamics = DynamicObjects::default();
        dynamics.apply(DynamicObject::FrameInfo(FrameInfo {
            frame_number: 88,
            hardware_frame_number: 90,
            frame_rate: 200.0,
        }));
        dynamics.apply(DynamicObject::LabeledReconstructions(vec![LabeledReconstruction {
            id: 4,
            position: [1.0, 2.0, 3.0],
            residual: 0.1,
        }]));
        assert_eq!(dynamics.frame_number(), 88);
        assert_eq!(dynamics.labeled_reconstructions.len(), 1);
    }

    #[test]
    fn truncated_segment_block_fails_to_decode() {
        let object = DynamicObject::GlobalSegments(vec![SubjectPose {
            subject_id: 1,
            segments: vec![SegmentPose::default(); 3],
        }]);
        let mut buffer = ByteBuffer::new();
        buffer.write(&object);
        let full = buffer.len();

        let mut truncated = ByteBuffer::from_bytes(buffer.as_bytes()[..full - 1].to_vec());
        assert_eq!(DynamicObject::decode(ObjectKind::GlobalSegments, &mut truncated), None);

        buffer.set_offset(0);
        assert_eq!(DynamicObject::decode(ObjectKind::GlobalSegments, &mut buffer), Some(object));
    }
}

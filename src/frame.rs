//! Frame pairs and the flattened frame state handed to callers.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::axis::{AxisMapping, Vector3, matrix_to_quaternion, quaternion_to_matrix};
use crate::objects::{
    Camera, CameraCalibration, CameraCentroids, Device, DeviceVoltages, DynamicObjects, EyeTracker,
    ForcePlate, ForceSample, GazeSample, LabeledReconstruction, Latency, LightweightSegment,
    LightweightSubjectPose, RayAssignment, SegmentPose, ServerInfo, StaticObjects, StreamInfo,
    Subject, SubjectPose, Timecode, UnlabeledReconstruction, VideoFrame,
};

/// One buffered frame: the scene description known when it was accepted,
/// plus its per-frame data.
#[derive(Debug, Clone, PartialEq)]
pub struct FramePair {
    /// `None` until the first static update arrives
    pub statics: Option<Arc<StaticObjects>>,
    pub dynamics: Arc<DynamicObjects>,
}

/// Everything known about one frame in a single self-contained record.
///
/// Built fresh for every poll, wait or subscription item; nothing in it is
/// shared with the client afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameState {
    // Scene description
    pub stream_info: Option<StreamInfo>,
    pub server_info: Option<ServerInfo>,
    pub cameras: Vec<Camera>,
    pub camera_calibrations: Vec<CameraCalibration>,
    pub subjects: Vec<Subject>,
    pub subject_scales: BTreeMap<u32, f64>,
    pub devices: Vec<Device>,
    pub force_plates: Vec<ForcePlate>,
    pub eye_trackers: Vec<EyeTracker>,

    // Per-frame data
    pub frame_number: u32,
    pub hardware_frame_number: u32,
    pub frame_rate: f64,
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

impl FrameState {
    /// Copy both halves of `pair` into one record.
    pub fn from_pair(pair: &FramePair) -> Self {
        let mut state = Self::default();
        if let Some(statics) = &pair.statics {
            state.copy_statics(statics);
        }
        state.copy_dynamics(&pair.dynamics);
        state
    }

    fn copy_statics(&mut self, statics: &StaticObjects) {
        self.stream_info = statics.stream_info.clone();
        self.server_info = statics.server_info.clone();
        self.cameras = statics.cameras.clone();
        self.camera_calibrations = statics.camera_calibrations.clone();
        self.subjects = statics.subjects.clone();
        self.subject_scales = statics.subject_scales.clone();
        self.devices = statics.devices.clone();
        self.force_plates = statics.force_plates.clone();
        self.eye_trackers = statics.eye_trackers.clone();
    }

    fn copy_dynamics(&mut self, dynamics: &DynamicObjects) {
        self.frame_number = dynamics.frame.frame_number;
        self.hardware_frame_number = dynamics.frame.hardware_frame_number;
        self.frame_rate = dynamics.frame.frame_rate;
        self.timecode = dynamics.timecode.clone();
        self.latency = dynamics.latency.clone();
        self.centroids = dynamics.centroids.clone();
        self.video = dynamics.video.clone();
        self.labeled_reconstructions = dynamics.labeled_reconstructions.clone();
        self.unlabeled_reconstructions = dynamics.unlabeled_reconstructions.clone();
        self.ray_assignments = dynamics.ray_assignments.clone();
        self.voltages = dynamics.voltages.clone();
        self.forces = dynamics.forces.clone();
        self.global_segments = dynamics.global_segments.clone();
        self.local_segments = dynamics.local_segments.clone();
        self.lightweight_segments = dynamics.lightweight_segments.clone();
        self.eye_gaze = dynamics.eye_gaze.clone();
    }

    /// Express every spatial value in the frame chosen by `mapping`.
    ///
    /// Force samples are reported in plate coordinates on the wire; they are
    /// rotated into the volume through their plate's orientation first, when
    /// the plate is known. Local segment poses are relative to their parent
    /// segment and stay as they are.
    pub fn remapped(mut self, mapping: &AxisMapping) -> Self {
        for subject in &mut self.global_segments {
            for segment in &mut subject.segments {
                remap_pose(mapping, segment);
            }
        }
        for subject in &mut self.lightweight_segments {
            for segment in &mut subject.segments {
                remap_lightweight(mapping, segment);
            }
        }
        for marker in &mut self.labeled_reconstructions {
            marker.position = mapping.transform_translation(&marker.position);
        }
        for marker in &mut self.unlabeled_reconstructions {
            marker.position = mapping.transform_translation(&marker.position);
        }

        for sample in &mut self.forces {
            let orientation = self
                .force_plates
                .iter()
                .find(|plate| plate.id == sample.plate_id)
                .map(|plate| plate.orientation);
            let remap = |vector: &Vector3| match &orientation {
                Some(orientation) => mapping.transform_translation_in(orientation, vector),
                None => mapping.transform_translation(vector),
            };
            sample.force = remap(&sample.force);
            sample.moment = remap(&sample.moment);
            sample.centre_of_pressure = remap(&sample.centre_of_pressure);
        }
        for plate in &mut self.force_plates {
            plate.origin = mapping.transform_translation(&plate.origin);
            plate.corners = plate.corners.map(|corner| mapping.transform_translation(&corner));
        }

        for gaze in &mut self.eye_gaze {
            gaze.position = mapping.transform_translation(&gaze.position);
            gaze.direction = mapping.transform_translation(&gaze.direction);
        }
        for calibration in &mut self.camera_calibrations {
            calibration.position = mapping.transform_translation(&calibration.position);
            calibration.orientation = mapping.transform_rotation(&calibration.orientation);
        }
        self
    }

    pub fn subject(&self, name: &str) -> Option<&Subject> {
        self.subjects.iter().find(|subject| subject.name == name)
    }

    /// Global pose of a named segment of a named subject.
    pub fn segment_pose(&self, subject_name: &str, segment_name: &str) -> Option<&SegmentPose> {
        let subject = self.subject(subject_name)?;
        let index = subject.segments.iter().position(|segment| segment.name == segment_name)?;
        self.global_segments
            .iter()
            .find(|pose| pose.subject_id == subject.id)?
            .segments
            .get(index)
    }
}

impl From<&FramePair> for FrameState {
    fn from(pair: &FramePair) -> Self {
        Self::from_pair(pair)
    }
}

fn remap_pose(mapping: &AxisMapping, pose: &mut SegmentPose) {
    pose.translation = mapping.transform_translation(&pose.translation);
    pose.rotation = mapping.transform_rotation(&pose.rotation);
}

fn remap_lightweight(mapping: &AxisMapping, segment: &mut LightweightSegment) {
    let translation = mapping.transform_translation(&segment.translation.map(f64::from));
    let rotation = quaternion_to_matrix(&segment.rotation.map(f64::from));
    let rotation = mapping.transform_rotation(&rotation);
    segment.translation = translation.map(|value| value as f32);
    segment.rotation = matrix_to_quaternion(&rotation).map(|value| value as f32);
}

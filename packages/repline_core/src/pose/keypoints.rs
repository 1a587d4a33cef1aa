//! Keypoints and per-frame predictions
//!
//! Coordinates are in the shared pixel space the estimator already mapped
//! back from model space. Lower y means higher in the frame.

use serde::{Deserialize, Serialize};

/// Number of landmarks in the COCO pose schema.
pub const LANDMARK_COUNT: usize = 17;

/// One detected body landmark.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Detection confidence in [0, 1].
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    /// Whether the landmark was detected with at least `min_confidence`.
    pub fn is_visible(&self, min_confidence: f32) -> bool {
        self.confidence >= min_confidence
    }
}

/// Canonical COCO body-landmark schema. The discriminant is the index
/// into a `Prediction`'s keypoint array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Landmark {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl Landmark {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "left_eye",
            Self::RightEye => "right_eye",
            Self::LeftEar => "left_ear",
            Self::RightEar => "right_ear",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftElbow => "left_elbow",
            Self::RightElbow => "right_elbow",
            Self::LeftWrist => "left_wrist",
            Self::RightWrist => "right_wrist",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
            Self::LeftKnee => "left_knee",
            Self::RightKnee => "right_knee",
            Self::LeftAnkle => "left_ankle",
            Self::RightAnkle => "right_ankle",
        }
    }
}

/// Detection bounding box in pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// The best-scoring pose detection for one processed frame.
/// Immutable once produced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Prediction {
    keypoints: [Keypoint; LANDMARK_COUNT],
    bounding_box: BoundingBox,
    score: f32,
}

impl Prediction {
    pub fn new(keypoints: [Keypoint; LANDMARK_COUNT], bounding_box: BoundingBox, score: f32) -> Self {
        Self {
            keypoints,
            bounding_box,
            score,
        }
    }

    pub fn keypoint(&self, landmark: Landmark) -> &Keypoint {
        &self.keypoints[landmark.index()]
    }

    pub fn keypoints(&self) -> &[Keypoint; LANDMARK_COUNT] {
        &self.keypoints
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounding_box
    }

    pub fn score(&self) -> f32 {
        self.score
    }
}

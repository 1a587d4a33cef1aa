//! Pose data model
//!
//! One `Prediction` per processed video frame: 17 COCO-schema keypoints,
//! a detection bounding box, and a detection score. Produced by the
//! external pose estimator, consumed by calibration and rep analysis.

pub mod keypoints;

pub use keypoints::{BoundingBox, Keypoint, Landmark, Prediction, LANDMARK_COUNT};

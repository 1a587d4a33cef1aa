//! Overhead reach calibration
//!
//! Optional pre-session step: samples the user's true overhead reach to
//! derive a personalized per-arm threshold. A frame contributes only
//! when both wrists simultaneously clear the coarse nose-line test with
//! sufficient confidence; each qualifying frame adds one y-sample per
//! arm. The per-arm threshold is the arithmetic mean of that arm's
//! samples once enough have accumulated.

use serde::{Deserialize, Serialize};

use crate::pose::{Landmark, Prediction};

/// Samples needed per arm before calibration completes (~1s at 30fps).
pub const SAMPLES_NEEDED: usize = 30;

const CONFIDENCE_THRESHOLD: f32 = 0.3;

/// Calibrated per-arm overhead thresholds, in the keypoint coordinate
/// space. Produced once, then frozen for the session.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArmThresholds {
    pub left: f32,
    pub right: f32,
}

/// Collects overhead-reach samples and derives `ArmThresholds`.
pub struct CalibrationEngine {
    active: bool,
    left_samples: Vec<f32>,
    right_samples: Vec<f32>,
    thresholds: Option<ArmThresholds>,
}

impl CalibrationEngine {
    pub fn new() -> Self {
        Self {
            active: false,
            left_samples: Vec::new(),
            right_samples: Vec::new(),
            thresholds: None,
        }
    }

    /// Begin a calibration run, discarding any prior samples.
    pub fn start(&mut self) {
        self.active = true;
        self.left_samples.clear();
        self.right_samples.clear();
        self.thresholds = None;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_calibrated(&self) -> bool {
        self.thresholds.is_some()
    }

    pub fn thresholds(&self) -> Option<ArmThresholds> {
        self.thresholds
    }

    /// Fraction of required samples collected, taking the better arm.
    pub fn progress(&self) -> f32 {
        let collected = self.left_samples.len().max(self.right_samples.len());
        (collected as f32 / SAMPLES_NEEDED as f32).min(1.0)
    }

    /// Feed one frame. Frames where either wrist fails the coarse
    /// overhead test are ignored.
    pub fn process(&mut self, prediction: &Prediction) {
        if !self.active {
            return;
        }

        let nose = prediction.keypoint(Landmark::Nose);
        let left_wrist = prediction.keypoint(Landmark::LeftWrist);
        let right_wrist = prediction.keypoint(Landmark::RightWrist);

        if !nose.is_visible(CONFIDENCE_THRESHOLD)
            || !left_wrist.is_visible(CONFIDENCE_THRESHOLD)
            || !right_wrist.is_visible(CONFIDENCE_THRESHOLD)
        {
            return;
        }

        // Coarse test: both wrists above the nose line at once.
        if left_wrist.y >= nose.y || right_wrist.y >= nose.y {
            return;
        }

        self.left_samples.push(left_wrist.y);
        self.right_samples.push(right_wrist.y);

        if self.left_samples.len() >= SAMPLES_NEEDED && self.right_samples.len() >= SAMPLES_NEEDED {
            self.finish();
        }
    }

    /// Abandon or clear a calibration run. Leaves no partial threshold
    /// state behind; a later run starts from nothing.
    pub fn reset(&mut self) {
        self.active = false;
        self.left_samples.clear();
        self.right_samples.clear();
        self.thresholds = None;
    }

    fn finish(&mut self) {
        let mean = |samples: &[f32]| samples.iter().sum::<f32>() / samples.len() as f32;
        let thresholds = ArmThresholds {
            left: mean(&self.left_samples),
            right: mean(&self.right_samples),
        };
        log::info!(
            "calibration complete: left={:.1} right={:.1}",
            thresholds.left,
            thresholds.right
        );
        self.thresholds = Some(thresholds);
        self.active = false;
    }
}

impl Default for CalibrationEngine {
    fn default() -> Self {
        Self::new()
    }
}

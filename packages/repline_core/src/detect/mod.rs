//! Rep analysis
//!
//! Converts continuous limb position into discrete, debounced rep events.
//!
//! # Concepts
//!
//! - **Limb group**: reps are attributed to `left`, `right`, or `both`.
//!   Each group runs its own hysteresis machine; a frame yields at most
//!   one detection, chosen in fixed priority both > left > right.
//!
//! - **Hold / cooldown / debounce**: a limb must stay overhead for the
//!   hold window before its rep counts, stay below the line for the
//!   cooldown window before it can re-arm, and no two accepted detections
//!   may fall within the global debounce window of each other.
//!
//! - **Overhead rule**: the reference line a wrist must clear. Either a
//!   fixed offset above the nose (uncalibrated) or a per-arm calibrated
//!   threshold. Both run through the same machine; other strategies plug
//!   in behind the `RepDetector` trait.

pub mod calibration;
pub mod hysteresis;

pub use calibration::{ArmThresholds, CalibrationEngine};
pub use hysteresis::{HysteresisDetector, LimbState, OverheadRule};

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::pose::Prediction;

/// Limb group a rep is attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArmKind {
    Left,
    Right,
    Both,
}

impl ArmKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Both => "both",
        }
    }
}

/// A rep detected on the current frame. Transient: consumed immediately
/// by the rep counter, never persisted.
#[derive(Clone, Copy, Debug)]
pub struct RepDetection {
    pub arm: ArmKind,
    pub at: Instant,
}

/// Detection tunables. The relative roles are fixed: hold before
/// counting, cooldown before re-arming, global debounce across limb
/// groups.
#[derive(Clone, Copy, Debug)]
pub struct DetectorConfig {
    /// Minimum keypoint confidence for a frame to advance the machines.
    pub confidence_threshold: f32,
    /// How far above the nose a wrist must be in the uncalibrated mode.
    pub overhead_offset_px: f32,
    /// Continuous overhead time required before a rep counts.
    pub hold: Duration,
    /// Continuous below-line time required before a limb re-arms.
    pub cooldown: Duration,
    /// Minimum spacing between any two accepted detections.
    pub debounce: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.3,
            overhead_offset_px: 50.0,
            hold: Duration::from_millis(150),
            cooldown: Duration::from_millis(300),
            debounce: Duration::from_millis(800),
        }
    }
}

/// A rep detection strategy. Implementations consume one frame at a time
/// and emit at most one detection per call.
pub trait RepDetector: Send {
    /// Process one frame. Returns the accepted detection, if any.
    fn detect(&mut self, prediction: &Prediction, now: Instant) -> Option<RepDetection>;

    /// Reinitialize all per-limb state and the debounce clock.
    /// Called at session start; state never carries across sessions.
    fn reset(&mut self);
}

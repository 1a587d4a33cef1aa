//! Per-limb hysteresis state machine
//!
//! Three machines (left, right, both) advance together on every frame.
//! Each machine is the same three-state cycle:
//!
//! ```text
//! ready --overhead--> overhead --held long enough--> complete (emit)
//!   ^                    |  dropped early                |
//!   |                    v                               v
//!   +---- false start ---+          below line for the cooldown window
//! ```
//!
//! A frame with insufficient keypoint confidence holds machine state
//! rather than resetting it; low-confidence frames are common and inert.

use tokio::time::Instant;

use super::{ArmKind, ArmThresholds, DetectorConfig, RepDetection, RepDetector};
use crate::pose::{Landmark, Prediction};

/// Reference line a wrist must clear to count as overhead.
#[derive(Clone, Copy, Debug)]
pub enum OverheadRule {
    /// Wrist must be at least this many pixels above the nose.
    NoseOffset(f32),
    /// Wrist must be above the calibrated per-arm threshold.
    Calibrated(ArmThresholds),
}

/// State of one limb-group machine. Exactly one state at a time;
/// transitions happen only on frame processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimbState {
    Ready,
    Overhead,
    Complete,
}

struct LimbTracker {
    arm: ArmKind,
    state: LimbState,
    overhead_since: Option<Instant>,
    below_since: Option<Instant>,
}

impl LimbTracker {
    fn new(arm: ArmKind) -> Self {
        Self {
            arm,
            state: LimbState::Ready,
            overhead_since: None,
            below_since: None,
        }
    }

    fn reset(&mut self) {
        self.state = LimbState::Ready;
        self.overhead_since = None;
        self.below_since = None;
    }

    /// Advance one frame. `overhead` is None when the frame lacked the
    /// confidence to judge this limb; the machine holds.
    /// Returns true when the machine completes a rep this frame.
    fn advance(&mut self, overhead: Option<bool>, config: &DetectorConfig, now: Instant) -> bool {
        let overhead = match overhead {
            Some(value) => value,
            None => return false,
        };

        match self.state {
            LimbState::Ready => {
                if overhead {
                    self.overhead_since = Some(now);
                    self.state = LimbState::Overhead;
                }
                false
            }
            LimbState::Overhead => {
                if !overhead {
                    // False start: dropped before the hold elapsed.
                    self.overhead_since = None;
                    self.state = LimbState::Ready;
                    return false;
                }
                let held = self
                    .overhead_since
                    .map(|since| now.duration_since(since) > config.hold)
                    .unwrap_or(false);
                if held {
                    self.below_since = None;
                    self.state = LimbState::Complete;
                    return true;
                }
                false
            }
            LimbState::Complete => {
                if overhead {
                    // Flicker back above the line resets the down-timer.
                    self.below_since = None;
                    return false;
                }
                match self.below_since {
                    None => self.below_since = Some(now),
                    Some(since) => {
                        if now.duration_since(since) >= config.cooldown {
                            self.below_since = None;
                            self.overhead_since = None;
                            self.state = LimbState::Ready;
                        }
                    }
                }
                false
            }
        }
    }
}

/// The canonical hold/cooldown detector. One parametrized machine per
/// limb group, a shared overhead rule, and a global debounce across all
/// three machines.
pub struct HysteresisDetector {
    config: DetectorConfig,
    rule: OverheadRule,
    trackers: [LimbTracker; 3],
    last_accepted: Option<Instant>,
}

impl HysteresisDetector {
    pub fn new(config: DetectorConfig, rule: OverheadRule) -> Self {
        Self {
            config,
            rule,
            trackers: [
                LimbTracker::new(ArmKind::Both),
                LimbTracker::new(ArmKind::Left),
                LimbTracker::new(ArmKind::Right),
            ],
            last_accepted: None,
        }
    }

    pub fn rule(&self) -> &OverheadRule {
        &self.rule
    }

    /// Current state of one limb-group machine.
    pub fn limb_state(&self, arm: ArmKind) -> LimbState {
        self.trackers
            .iter()
            .find(|t| t.arm == arm)
            .map(|t| t.state)
            .unwrap_or(LimbState::Ready)
    }

    /// Judge one wrist against the overhead rule.
    /// None when the nose or the wrist lacks confidence this frame.
    fn wrist_overhead(&self, prediction: &Prediction, wrist: Landmark) -> Option<bool> {
        let threshold = self.config.confidence_threshold;
        let nose = prediction.keypoint(Landmark::Nose);
        let wrist_point = prediction.keypoint(wrist);
        if !nose.is_visible(threshold) || !wrist_point.is_visible(threshold) {
            return None;
        }
        // Lower y means higher in the frame.
        let reference = match self.rule {
            OverheadRule::NoseOffset(offset) => nose.y - offset,
            OverheadRule::Calibrated(thresholds) => match wrist {
                Landmark::LeftWrist => thresholds.left,
                _ => thresholds.right,
            },
        };
        Some(wrist_point.y < reference)
    }
}

impl RepDetector for HysteresisDetector {
    fn detect(&mut self, prediction: &Prediction, now: Instant) -> Option<RepDetection> {
        let left = self.wrist_overhead(prediction, Landmark::LeftWrist);
        let right = self.wrist_overhead(prediction, Landmark::RightWrist);
        // The both-group requires both wrists to independently qualify.
        let both = match (left, right) {
            (Some(l), Some(r)) => Some(l && r),
            _ => None,
        };

        // Every machine advances every frame; trackers are ordered
        // both > left > right so the first completion wins the frame.
        let mut candidate: Option<ArmKind> = None;
        for tracker in self.trackers.iter_mut() {
            let overhead = match tracker.arm {
                ArmKind::Both => both,
                ArmKind::Left => left,
                ArmKind::Right => right,
            };
            let fired = tracker.advance(overhead, &self.config, now);
            if fired && candidate.is_none() {
                candidate = Some(tracker.arm);
            }
        }

        let arm = candidate?;

        // Global debounce: backstop against near-simultaneous triggers
        // from different machines. Suppressed detections are discarded;
        // the machines have already moved to their cooldown.
        if let Some(last) = self.last_accepted {
            if now.duration_since(last) < self.config.debounce {
                return None;
            }
        }
        self.last_accepted = Some(now);
        Some(RepDetection { arm, at: now })
    }

    fn reset(&mut self) {
        for tracker in self.trackers.iter_mut() {
            tracker.reset();
        }
        self.last_accepted = None;
    }
}

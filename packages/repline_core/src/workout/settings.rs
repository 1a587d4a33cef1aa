//! Workout settings

use serde::{Deserialize, Serialize};

/// Unit for milestone intervals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Reps,
    Seconds,
}

/// Immutable settings snapshot. Replaced wholesale on update, never
/// patched in place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSettings {
    /// Start countdown length in seconds; 0 skips the countdown.
    pub countdown_duration: u32,
    /// Session length in seconds; None means unlimited.
    pub session_duration: Option<u64>,
    /// Stop automatically when the session duration elapses.
    pub auto_stop_on_time_limit: bool,
    /// Beep every this many units; 0 disables beeps.
    pub beep_interval: u32,
    pub beep_unit: IntervalUnit,
    /// Announce progress every this many units; 0 disables.
    pub announcement_interval: u32,
    pub announcement_unit: IntervalUnit,
}

impl Default for WorkoutSettings {
    fn default() -> Self {
        Self {
            countdown_duration: 3,
            session_duration: None,
            auto_stop_on_time_limit: false,
            beep_interval: 0,
            beep_unit: IntervalUnit::Reps,
            announcement_interval: 0,
            announcement_unit: IntervalUnit::Seconds,
        }
    }
}

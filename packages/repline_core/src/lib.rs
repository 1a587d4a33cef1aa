// Repline - Overhead Repetition Tracking Engine

pub mod detect;
pub mod device;
pub mod pose;
pub mod session;
pub mod workout;

pub use detect::{ArmKind, DetectorConfig, RepDetection, RepDetector};
pub use pose::{Keypoint, Landmark, Prediction};
pub use session::{Rep, RepCounter, WorkoutSession};
pub use workout::{
    DetectionMode, WorkoutEvent, WorkoutOrchestrator, WorkoutPhase, WorkoutSettings,
};

//! Session orchestration
//!
//! The orchestrator drives the idle → countdown → active → idle cycle:
//! it owns the continuous frame-processing loop, the countdown and
//! session-duration timers, and sequences the detector, rep counter,
//! audio feedback, and external camera/recording collaborators.

pub mod audio;
pub mod orchestrator;
pub mod settings;
pub mod timer;

pub use audio::AudioFeedback;
pub use orchestrator::{DetectionMode, WorkoutEvent, WorkoutOrchestrator, WorkoutPhase};
pub use settings::{IntervalUnit, WorkoutSettings};
pub use timer::TimerHandle;

use thiserror::Error;

use crate::device::DeviceError;
use crate::session::SessionError;

#[derive(Error, Debug)]
pub enum WorkoutError {
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
}

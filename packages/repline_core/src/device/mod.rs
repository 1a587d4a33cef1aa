//! External collaborator boundary
//!
//! Provides the abstract interfaces the engine consumes (camera, pose
//! estimator, recorder/storage, audio primitives, settings persistence),
//! simulated in-process implementations for testing, and a JSON-file
//! settings store.

pub mod settings_file;
pub mod simulated;
pub mod traits;

pub use settings_file::JsonSettingsStore;
pub use traits::{
    AudioSink, Camera, CameraFrame, PoseEstimator, Recorder, RecordingSummary, SettingsStore,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Pose model error: {0}")]
    Model(String),

    #[error("Recording error: {0}")]
    Recording(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

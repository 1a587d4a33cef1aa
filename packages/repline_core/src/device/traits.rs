//! Collaborator trait definitions
//!
//! Defines the abstract interfaces that real device/platform
//! implementations and the simulated test implementations conform to.
//! The engine only ever holds these as trait objects.

use async_trait::async_trait;
use uuid::Uuid;

use super::DeviceError;
use crate::pose::Prediction;
use crate::session::WorkoutSession;
use crate::workout::WorkoutSettings;

/// One raw video frame as delivered by the camera.
#[derive(Clone, Debug)]
pub struct CameraFrame {
    /// Monotonically increasing frame number.
    pub seq: u64,
    pub width: u32,
    pub height: u32,
    /// Raw pixel data; layout is an implementation concern.
    pub data: Vec<u8>,
}

/// Result of stopping a recording.
#[derive(Clone, Copy, Debug)]
pub struct RecordingSummary {
    pub id: Uuid,
    pub size_bytes: u64,
}

/// A video frame source. `next_frame` is the suspend-until-next-paint
/// primitive that drives the processing loop.
#[async_trait]
pub trait Camera: Send + Sync {
    /// Acquire the camera at the requested capture size.
    async fn start(&self, width: u32, height: u32) -> Result<(), DeviceError>;

    /// Release the camera.
    fn stop(&self);

    /// Suspend until the next frame is available.
    async fn next_frame(&self) -> Result<CameraFrame, DeviceError>;
}

/// The opaque pose model: one best-scoring detection per frame.
pub trait PoseEstimator: Send + Sync {
    fn process(&self, frame: &CameraFrame) -> Result<Prediction, DeviceError>;

    /// Release the model resource. Must be safe to call repeatedly.
    fn dispose(&self);
}

/// Media recording and on-device session storage.
#[async_trait]
pub trait Recorder: Send + Sync {
    async fn start_recording(&self, id: Uuid) -> Result<(), DeviceError>;

    /// Stop the active recording. Errors with an invalid-state failure
    /// when nothing is recording.
    async fn stop_recording(&self) -> Result<RecordingSummary, DeviceError>;

    async fn save_session(
        &self,
        id: Uuid,
        session: &WorkoutSession,
        size_bytes: u64,
    ) -> Result<(), DeviceError>;
}

/// Audio output primitives.
#[async_trait]
pub trait AudioSink: Send + Sync {
    fn play_tone(&self, frequency_hz: f32, duration_ms: u64, volume: f32);

    /// Speak a phrase; resolves when the utterance finishes.
    async fn speak(&self, text: &str, rate: f32, pitch: f32, volume: f32)
        -> Result<(), DeviceError>;

    /// Cancel any in-flight utterance. Safe when nothing is speaking.
    fn cancel_speech(&self);
}

/// Workout settings persistence.
pub trait SettingsStore: Send + Sync {
    /// Load persisted settings; None when nothing was ever saved.
    fn load(&self) -> Result<Option<WorkoutSettings>, DeviceError>;

    fn save(&self, settings: &WorkoutSettings) -> Result<(), DeviceError>;

    fn clear(&self) -> Result<(), DeviceError>;
}

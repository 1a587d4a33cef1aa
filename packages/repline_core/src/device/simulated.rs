//! In-process simulated collaborators
//!
//! Fully functional fakes for every device trait, used by unit and
//! integration tests: a camera that emits frames on a fixed interval
//! (virtual-time friendly), a pose estimator driven by a frame script,
//! a recorder that captures saved sessions, and an audio sink that logs
//! every tone and utterance.

use std::future::pending;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::traits::{
    AudioSink, Camera, CameraFrame, PoseEstimator, Recorder, RecordingSummary, SettingsStore,
};
use super::DeviceError;
use crate::pose::Prediction;
use crate::session::WorkoutSession;
use crate::workout::WorkoutSettings;

/// Simulated camera emitting one frame per interval while started.
pub struct SimCamera {
    frame_interval: Duration,
    started: AtomicBool,
    seq: AtomicU64,
    /// Test hook: make the next `start` fail (permission denial).
    fail_start: AtomicBool,
    /// Test hook: make `next_frame` fail (camera died mid-session).
    fail_frames: AtomicBool,
}

impl SimCamera {
    pub fn new() -> Self {
        Self::with_interval(Duration::from_millis(33))
    }

    pub fn with_interval(frame_interval: Duration) -> Self {
        Self {
            frame_interval,
            started: AtomicBool::new(false),
            seq: AtomicU64::new(0),
            fail_start: AtomicBool::new(false),
            fail_frames: AtomicBool::new(false),
        }
    }

    pub fn fail_next_start(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }

    pub fn fail_frames(&self) {
        self.fail_frames.store(true, Ordering::SeqCst);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

impl Default for SimCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Camera for SimCamera {
    async fn start(&self, _width: u32, _height: u32) -> Result<(), DeviceError> {
        if self.fail_start.swap(false, Ordering::SeqCst) {
            return Err(DeviceError::Camera("permission denied".to_string()));
        }
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
    }

    async fn next_frame(&self) -> Result<CameraFrame, DeviceError> {
        tokio::time::sleep(self.frame_interval).await;
        if self.fail_frames.load(Ordering::SeqCst) {
            return Err(DeviceError::Camera("device disconnected".to_string()));
        }
        if !self.started.load(Ordering::SeqCst) {
            // A stopped camera never paints; callers cancel via their
            // own shutdown signal.
            pending::<()>().await;
        }
        Ok(CameraFrame {
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            width: 640,
            height: 480,
            data: Vec::new(),
        })
    }
}

/// Simulated pose estimator driven by a script of (frame count,
/// prediction) segments. Once the script runs out the last prediction
/// repeats indefinitely.
pub struct SimPoseEstimator {
    script: Mutex<FrameScript>,
    dispose_count: AtomicU32,
}

struct FrameScript {
    segments: Vec<(u32, Prediction)>,
    position: usize,
    emitted: u32,
}

impl SimPoseEstimator {
    pub fn new(segments: Vec<(u32, Prediction)>) -> Self {
        Self {
            script: Mutex::new(FrameScript {
                segments,
                position: 0,
                emitted: 0,
            }),
            dispose_count: AtomicU32::new(0),
        }
    }

    /// Append a segment to the running script.
    pub fn append(&self, frames: u32, prediction: Prediction) {
        if let Ok(mut script) = self.script.lock() {
            script.segments.push((frames, prediction));
        }
    }

    pub fn dispose_count(&self) -> u32 {
        self.dispose_count.load(Ordering::SeqCst)
    }
}

impl PoseEstimator for SimPoseEstimator {
    fn process(&self, _frame: &CameraFrame) -> Result<Prediction, DeviceError> {
        let mut script = self
            .script
            .lock()
            .map_err(|_| DeviceError::Model("script lock poisoned".to_string()))?;

        while script.position < script.segments.len() {
            let frames = script.segments[script.position].0;
            if script.emitted < frames {
                script.emitted += 1;
                return Ok(script.segments[script.position].1.clone());
            }
            script.position += 1;
            script.emitted = 0;
        }

        // Script exhausted: hold the last prediction.
        script
            .segments
            .last()
            .map(|(_, prediction)| prediction.clone())
            .ok_or_else(|| DeviceError::Model("empty frame script".to_string()))
    }

    fn dispose(&self) {
        self.dispose_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// A session saved through the recorder, captured for assertions.
#[derive(Clone, Debug)]
pub struct SavedWorkout {
    pub id: Uuid,
    pub session: WorkoutSession,
    pub size_bytes: u64,
}

/// Simulated recorder/storage capturing everything it is told to save.
pub struct SimRecorder {
    active: Mutex<Option<Uuid>>,
    saved: Mutex<Vec<SavedWorkout>>,
}

const SIM_RECORDING_SIZE: u64 = 2_048;

impl SimRecorder {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(None),
            saved: Mutex::new(Vec::new()),
        }
    }

    pub fn saved(&self) -> Vec<SavedWorkout> {
        self.saved.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn is_recording(&self) -> bool {
        self.active.lock().map(|a| a.is_some()).unwrap_or(false)
    }
}

impl Default for SimRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Recorder for SimRecorder {
    async fn start_recording(&self, id: Uuid) -> Result<(), DeviceError> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| DeviceError::Recording("state lock poisoned".to_string()))?;
        if active.is_some() {
            return Err(DeviceError::InvalidState(
                "a recording is already active".to_string(),
            ));
        }
        *active = Some(id);
        Ok(())
    }

    async fn stop_recording(&self) -> Result<RecordingSummary, DeviceError> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| DeviceError::Recording("state lock poisoned".to_string()))?;
        match active.take() {
            Some(id) => Ok(RecordingSummary {
                id,
                size_bytes: SIM_RECORDING_SIZE,
            }),
            None => Err(DeviceError::InvalidState(
                "no recording in progress".to_string(),
            )),
        }
    }

    async fn save_session(
        &self,
        id: Uuid,
        session: &WorkoutSession,
        size_bytes: u64,
    ) -> Result<(), DeviceError> {
        let mut saved = self
            .saved
            .lock()
            .map_err(|_| DeviceError::Storage("store lock poisoned".to_string()))?;
        saved.push(SavedWorkout {
            id,
            session: session.clone(),
            size_bytes,
        });
        Ok(())
    }
}

/// One tone played through the simulated sink.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tone {
    pub frequency_hz: f32,
    pub duration_ms: u64,
    pub volume: f32,
}

/// Simulated audio sink logging every tone and utterance.
pub struct SimAudioSink {
    tones: Mutex<Vec<Tone>>,
    utterances: Mutex<Vec<String>>,
    cancel_count: AtomicU32,
}

impl SimAudioSink {
    pub fn new() -> Self {
        Self {
            tones: Mutex::new(Vec::new()),
            utterances: Mutex::new(Vec::new()),
            cancel_count: AtomicU32::new(0),
        }
    }

    pub fn tones(&self) -> Vec<Tone> {
        self.tones.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn utterances(&self) -> Vec<String> {
        self.utterances.lock().map(|u| u.clone()).unwrap_or_default()
    }

    pub fn cancel_count(&self) -> u32 {
        self.cancel_count.load(Ordering::SeqCst)
    }
}

impl Default for SimAudioSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioSink for SimAudioSink {
    fn play_tone(&self, frequency_hz: f32, duration_ms: u64, volume: f32) {
        if let Ok(mut tones) = self.tones.lock() {
            tones.push(Tone {
                frequency_hz,
                duration_ms,
                volume,
            });
        }
    }

    async fn speak(
        &self,
        text: &str,
        _rate: f32,
        _pitch: f32,
        _volume: f32,
    ) -> Result<(), DeviceError> {
        let mut utterances = self
            .utterances
            .lock()
            .map_err(|_| DeviceError::Audio("utterance lock poisoned".to_string()))?;
        utterances.push(text.to_string());
        Ok(())
    }

    fn cancel_speech(&self) {
        self.cancel_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Settings store backed by process memory.
pub struct InMemorySettingsStore {
    stored: Mutex<Option<WorkoutSettings>>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self {
            stored: Mutex::new(None),
        }
    }
}

impl Default for InMemorySettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore for InMemorySettingsStore {
    fn load(&self) -> Result<Option<WorkoutSettings>, DeviceError> {
        self.stored
            .lock()
            .map(|s| s.clone())
            .map_err(|_| DeviceError::Storage("settings lock poisoned".to_string()))
    }

    fn save(&self, settings: &WorkoutSettings) -> Result<(), DeviceError> {
        let mut stored = self
            .stored
            .lock()
            .map_err(|_| DeviceError::Storage("settings lock poisoned".to_string()))?;
        *stored = Some(settings.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), DeviceError> {
        let mut stored = self
            .stored
            .lock()
            .map_err(|_| DeviceError::Storage("settings lock poisoned".to_string()))?;
        *stored = None;
        Ok(())
    }
}

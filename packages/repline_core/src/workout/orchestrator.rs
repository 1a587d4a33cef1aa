//! Workout orchestrator
//!
//! Top-level state machine: `Idle → [Calibrating] → Countdown → Active →
//! Idle`, reusable across many session cycles. Owns the continuous
//! frame-processing loop, the countdown and session-duration timers, and
//! sequences the detector, counter, audio feedback, and external
//! camera/recording collaborators.
//!
//! Cancellation discipline: every lifecycle transition runs under one
//! async mutex, and each armed timer and the frame loop carry the epoch
//! they were started in. Stopping bumps the epoch before anything else,
//! so a callback that was already in flight sees a stale epoch and
//! becomes a no-op instead of firing into the wrong state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use uuid::Uuid;

use super::audio::AudioFeedback;
use super::settings::WorkoutSettings;
use super::timer::TimerHandle;
use super::WorkoutError;
use crate::detect::{
    CalibrationEngine, DetectorConfig, HysteresisDetector, OverheadRule, RepDetector,
};
use crate::device::{AudioSink, Camera, CameraFrame, PoseEstimator, Recorder, SettingsStore};
use crate::session::{RepCounter, SessionError, WorkoutSession};

const CAMERA_WIDTH: u32 = 640;
const CAMERA_HEIGHT: u32 = 480;
/// Lead time for the session-ending 3-2-1 warning.
const END_WARNING_LEAD: Duration = Duration::from_secs(3);

/// Which overhead test drives detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionMode {
    /// Fixed geometric offset above the nose; no calibration step.
    FixedOffset,
    /// Per-arm calibrated thresholds; sessions begin with a
    /// calibration phase.
    Calibrated,
}

/// Lifecycle phase of the orchestrator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkoutPhase {
    Idle,
    Calibrating,
    Countdown,
    Active,
}

/// Everything the orchestrator tells its subscribers.
#[derive(Clone, Debug)]
pub enum WorkoutEvent {
    /// Fired on every accepted rep and on session end.
    SessionUpdate(Option<WorkoutSession>),
    /// Start countdown value; None hides the countdown.
    Countdown(Option<u32>),
    /// Session-ending countdown value; None hides it.
    SessionEndCountdown(Option<u32>),
    /// Calibration progress in [0, 1].
    CalibrationProgress(f32),
    /// The configured session duration elapsed without auto-stop.
    TimeUp,
    /// Unrecoverable collaborator failure.
    Error(String),
}

struct SessionTimers {
    countdown: Option<TimerHandle>,
    end_countdown: Option<TimerHandle>,
    timeout: Option<TimerHandle>,
}

impl SessionTimers {
    fn none() -> Self {
        Self {
            countdown: None,
            end_countdown: None,
            timeout: None,
        }
    }

    fn clear(&mut self) {
        self.countdown = None;
        self.end_countdown = None;
        self.timeout = None;
    }
}

pub struct WorkoutOrchestrator {
    camera: Arc<dyn Camera>,
    pose: Arc<dyn PoseEstimator>,
    recorder: Arc<dyn Recorder>,
    settings_store: Arc<dyn SettingsStore>,
    audio: AudioFeedback,
    detection_mode: DetectionMode,
    config: DetectorConfig,

    /// Serializes lifecycle transitions (start, activation, timeout, stop).
    transition: tokio::sync::Mutex<()>,
    phase: RwLock<WorkoutPhase>,
    detector: Mutex<Box<dyn RepDetector>>,
    calibration: Mutex<CalibrationEngine>,
    counter: Mutex<RepCounter>,
    settings: RwLock<WorkoutSettings>,
    timers: Mutex<SessionTimers>,
    recording_id: Mutex<Option<Uuid>>,
    last_error: RwLock<Option<String>>,

    events_tx: broadcast::Sender<WorkoutEvent>,
    frame_stop_tx: broadcast::Sender<()>,
    /// Session generation; bumped on every shutdown. Stale callbacks
    /// compare against it and bail.
    epoch: AtomicU64,
    live: AtomicBool,
    disposed: AtomicBool,
}

impl WorkoutOrchestrator {
    pub fn new(
        camera: Arc<dyn Camera>,
        pose: Arc<dyn PoseEstimator>,
        recorder: Arc<dyn Recorder>,
        audio_sink: Arc<dyn AudioSink>,
        settings_store: Arc<dyn SettingsStore>,
        detection_mode: DetectionMode,
    ) -> Arc<Self> {
        Self::with_config(
            camera,
            pose,
            recorder,
            audio_sink,
            settings_store,
            detection_mode,
            DetectorConfig::default(),
        )
    }

    pub fn with_config(
        camera: Arc<dyn Camera>,
        pose: Arc<dyn PoseEstimator>,
        recorder: Arc<dyn Recorder>,
        audio_sink: Arc<dyn AudioSink>,
        settings_store: Arc<dyn SettingsStore>,
        detection_mode: DetectionMode,
        config: DetectorConfig,
    ) -> Arc<Self> {
        let settings = WorkoutSettings::default();
        let (events_tx, _) = broadcast::channel(64);
        let (frame_stop_tx, _) = broadcast::channel(4);
        let detector: Box<dyn RepDetector> = Box::new(HysteresisDetector::new(
            config,
            OverheadRule::NoseOffset(config.overhead_offset_px),
        ));

        Arc::new(Self {
            camera,
            pose,
            recorder,
            settings_store,
            audio: AudioFeedback::new(audio_sink, settings.clone()),
            detection_mode,
            config,
            transition: tokio::sync::Mutex::new(()),
            phase: RwLock::new(WorkoutPhase::Idle),
            detector: Mutex::new(detector),
            calibration: Mutex::new(CalibrationEngine::new()),
            counter: Mutex::new(RepCounter::new()),
            settings: RwLock::new(settings),
            timers: Mutex::new(SessionTimers::none()),
            recording_id: Mutex::new(None),
            last_error: RwLock::new(None),
            events_tx,
            frame_stop_tx,
            epoch: AtomicU64::new(0),
            live: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        })
    }

    /// Load persisted settings; a missing or unreadable store keeps the
    /// defaults. Returns the effective settings.
    pub fn initialize(&self) -> WorkoutSettings {
        match self.settings_store.load() {
            Ok(Some(saved)) => {
                if let Ok(mut settings) = self.settings.write() {
                    *settings = saved.clone();
                }
                self.audio.update_settings(saved.clone());
                saved
            }
            Ok(None) => self.settings(),
            Err(e) => {
                log::warn!("failed to load settings, using defaults: {}", e);
                self.settings()
            }
        }
    }

    /// Subscribe to orchestrator events.
    pub fn events(&self) -> broadcast::Receiver<WorkoutEvent> {
        self.events_tx.subscribe()
    }

    pub fn phase(&self) -> WorkoutPhase {
        self.phase
            .read()
            .map(|phase| *phase)
            .unwrap_or(WorkoutPhase::Idle)
    }

    pub fn settings(&self) -> WorkoutSettings {
        self.settings
            .read()
            .map(|settings| settings.clone())
            .unwrap_or_default()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().map(|e| e.clone()).unwrap_or(None)
    }

    /// Snapshot of the in-progress session, or None outside one.
    pub fn current_session(&self) -> Option<WorkoutSession> {
        self.counter
            .lock()
            .map(|counter| counter.current())
            .unwrap_or(None)
    }

    /// Replace the settings wholesale, forward them to audio feedback,
    /// and persist them.
    pub fn update_settings(&self, settings: WorkoutSettings) -> Result<(), WorkoutError> {
        if let Ok(mut current) = self.settings.write() {
            *current = settings.clone();
        }
        self.audio.update_settings(settings.clone());
        self.settings_store.save(&settings)?;
        Ok(())
    }

    /// Begin a session cycle: acquire the camera, start the frame loop,
    /// and enter Calibrating or Countdown depending on detection mode.
    pub async fn start(self: &Arc<Self>) -> Result<(), WorkoutError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(WorkoutError::InvalidState(
                "orchestrator is disposed".to_string(),
            ));
        }
        let _guard = self.transition.lock().await;
        if self.phase() != WorkoutPhase::Idle {
            return Err(WorkoutError::InvalidState(format!(
                "cannot start from {:?}",
                self.phase()
            )));
        }
        if let Ok(mut error) = self.last_error.write() {
            *error = None;
        }

        if let Err(e) = self.camera.start(CAMERA_WIDTH, CAMERA_HEIGHT).await {
            self.report_error(format!("Camera start failed: {}", e));
            return Err(WorkoutError::Device(e));
        }

        self.live.store(true, Ordering::SeqCst);
        let epoch = self.epoch.load(Ordering::SeqCst);
        self.spawn_frame_loop(epoch);

        match self.detection_mode {
            DetectionMode::Calibrated => {
                if let Ok(mut calibration) = self.calibration.lock() {
                    calibration.start();
                }
                self.set_phase(WorkoutPhase::Calibrating);
                self.emit(WorkoutEvent::CalibrationProgress(0.0));
            }
            DetectionMode::FixedOffset => {
                self.begin_countdown_locked(epoch).await;
            }
        }
        Ok(())
    }

    /// Manually stop the current cycle. Returns the finalized session
    /// when one was active; stopping from Idle is a no-op.
    pub async fn stop(self: &Arc<Self>) -> Option<WorkoutSession> {
        let _guard = self.transition.lock().await;
        self.shutdown_locked(true).await
    }

    /// Stop and release the pose model. Idempotent and safe from any state.
    pub async fn dispose(self: &Arc<Self>) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let _guard = self.transition.lock().await;
            let _ = self.shutdown_locked(true).await;
        }
        self.pose.dispose();
    }

    // ------------------------------------------------------------------
    // Frame loop
    // ------------------------------------------------------------------

    fn is_live(&self, epoch: u64) -> bool {
        self.live.load(Ordering::SeqCst) && self.epoch.load(Ordering::SeqCst) == epoch
    }

    fn spawn_frame_loop(self: &Arc<Self>, epoch: u64) {
        let orch = Arc::clone(self);
        let mut stop_rx = self.frame_stop_tx.subscribe();
        tokio::spawn(async move {
            loop {
                if !orch.is_live(epoch) {
                    break;
                }
                tokio::select! {
                    result = orch.camera.next_frame() => match result {
                        Ok(frame) => {
                            if !orch.is_live(epoch) {
                                break;
                            }
                            orch.process_frame(&frame, epoch).await;
                            // Re-checked before the loop continues so
                            // cancellation lands even mid-frame.
                            if !orch.is_live(epoch) {
                                break;
                            }
                        }
                        Err(e) => {
                            orch.handle_camera_failure(epoch, e.to_string()).await;
                            break;
                        }
                    },
                    _ = stop_rx.recv() => break,
                }
            }
        });
    }

    async fn process_frame(self: &Arc<Self>, frame: &CameraFrame, epoch: u64) {
        let prediction = match self.pose.process(frame) {
            Ok(prediction) => prediction,
            Err(e) => {
                log::warn!("pose estimation failed on frame {}: {}", frame.seq, e);
                return;
            }
        };
        let now = Instant::now();

        match self.phase() {
            WorkoutPhase::Calibrating => {
                let (progress, calibrated) = match self.calibration.lock() {
                    Ok(mut calibration) => {
                        calibration.process(&prediction);
                        (calibration.progress(), calibration.is_calibrated())
                    }
                    Err(_) => return,
                };
                self.emit(WorkoutEvent::CalibrationProgress(progress));
                if calibrated {
                    let _guard = self.transition.lock().await;
                    if self.is_live(epoch) {
                        self.begin_countdown_locked(epoch).await;
                    }
                }
            }
            WorkoutPhase::Active => {
                let detection = match self.detector.lock() {
                    Ok(mut detector) => detector.detect(&prediction, now),
                    Err(_) => return,
                };
                let Some(detection) = detection else { return };

                let added = match self.counter.lock() {
                    Ok(mut counter) => counter.add_rep(detection.arm, detection.at),
                    Err(_) => return,
                };
                match added {
                    Ok(()) => {}
                    // A frame already in flight when the session stopped.
                    Err(SessionError::NotActive) => return,
                    Err(e) => {
                        self.report_error(format!("Failed to record rep: {}", e));
                        return;
                    }
                }

                if let Some(session) = self.current_session() {
                    self.audio.handle_update(&session, now);
                    self.emit(WorkoutEvent::SessionUpdate(Some(session)));
                }
            }
            // Idle and Countdown frames are rendered only.
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Transitions (caller holds `transition`)
    // ------------------------------------------------------------------

    async fn begin_countdown_locked(self: &Arc<Self>, epoch: u64) {
        self.set_phase(WorkoutPhase::Countdown);
        let duration = self.settings().countdown_duration;
        if duration == 0 {
            self.activate_locked(epoch).await;
            return;
        }

        self.emit(WorkoutEvent::Countdown(Some(duration)));
        self.audio.play_countdown_beep();

        let orch = Arc::clone(self);
        let handle = TimerHandle::spawn(async move {
            let mut remaining = duration;
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;
                let _guard = orch.transition.lock().await;
                if !orch.is_live(epoch) {
                    return;
                }
                remaining -= 1;
                if remaining > 0 {
                    orch.emit(WorkoutEvent::Countdown(Some(remaining)));
                    orch.audio.play_countdown_beep();
                } else {
                    orch.emit(WorkoutEvent::Countdown(None));
                    orch.activate_locked(epoch).await;
                    return;
                }
            }
        });
        if let Ok(mut timers) = self.timers.lock() {
            timers.countdown = Some(handle);
        }
    }

    /// Countdown reached zero: start the session proper.
    async fn activate_locked(self: &Arc<Self>, epoch: u64) {
        if !self.is_live(epoch) {
            return;
        }

        match self.detector.lock() {
            Ok(mut detector) => match self.detection_mode {
                DetectionMode::Calibrated => {
                    let thresholds = self
                        .calibration
                        .lock()
                        .ok()
                        .and_then(|calibration| calibration.thresholds());
                    match thresholds {
                        Some(thresholds) => {
                            *detector = Box::new(HysteresisDetector::new(
                                self.config,
                                OverheadRule::Calibrated(thresholds),
                            ));
                        }
                        None => detector.reset(),
                    }
                }
                DetectionMode::FixedOffset => detector.reset(),
            },
            Err(_) => return,
        }

        let now = Instant::now();
        let started = match self.counter.lock() {
            Ok(mut counter) => counter.start(now),
            Err(_) => return,
        };
        if let Err(e) = started {
            self.fail_locked(format!("Failed to start session: {}", e)).await;
            return;
        }

        let workout_id = Uuid::new_v4();
        if let Err(e) = self.recorder.start_recording(workout_id).await {
            self.fail_locked(format!("Failed to start recording: {}", e)).await;
            return;
        }
        if let Ok(mut recording_id) = self.recording_id.lock() {
            *recording_id = Some(workout_id);
        }

        self.audio.start_session(now);
        self.set_phase(WorkoutPhase::Active);
        self.audio.play_start_beep();
        self.arm_session_timers(epoch);
        log::info!("workout session {} active", workout_id);
    }

    fn arm_session_timers(self: &Arc<Self>, epoch: u64) {
        let settings = self.settings();
        let Some(duration_secs) = settings.session_duration else {
            return;
        };
        if duration_secs == 0 {
            return;
        }
        let total = Duration::from_secs(duration_secs);

        let orch = Arc::clone(self);
        let end_countdown = TimerHandle::spawn(async move {
            if total > END_WARNING_LEAD {
                tokio::time::sleep(total - END_WARNING_LEAD).await;
            }
            let mut remaining = END_WARNING_LEAD.as_secs() as u32;
            loop {
                {
                    let _guard = orch.transition.lock().await;
                    if !orch.is_live(epoch) {
                        return;
                    }
                    orch.emit(WorkoutEvent::SessionEndCountdown(Some(remaining)));
                    orch.audio.play_countdown_beep();
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
                remaining -= 1;
                if remaining == 0 {
                    return;
                }
            }
        });

        let orch = Arc::clone(self);
        let timeout = TimerHandle::spawn(async move {
            tokio::time::sleep(total).await;
            let _guard = orch.transition.lock().await;
            if !orch.is_live(epoch) {
                return;
            }
            orch.emit(WorkoutEvent::SessionEndCountdown(None));
            if orch.settings().auto_stop_on_time_limit {
                let _ = orch.shutdown_locked(false).await;
            } else {
                orch.emit(WorkoutEvent::TimeUp);
                orch.audio.play_final_beep();
            }
        });

        if let Ok(mut timers) = self.timers.lock() {
            timers.end_countdown = Some(end_countdown);
            timers.timeout = Some(timeout);
        }
    }

    /// Tear down the current cycle. `manual` selects the closing audio
    /// cue. Returns the finalized session when one was active.
    async fn shutdown_locked(self: &Arc<Self>, manual: bool) -> Option<WorkoutSession> {
        if self.phase() == WorkoutPhase::Idle {
            return None;
        }

        // Cancellation before action: anything still armed sees a stale
        // epoch from here on.
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.live.store(false, Ordering::SeqCst);
        let _ = self.frame_stop_tx.send(());

        let session = self
            .counter
            .lock()
            .map(|mut counter| counter.stop())
            .unwrap_or(None);
        let recording_id = self
            .recording_id
            .lock()
            .map(|mut id| id.take())
            .unwrap_or(None);

        if let Some(session) = &session {
            if let Some(id) = recording_id {
                match self.recorder.stop_recording().await {
                    Ok(summary) => {
                        if let Err(e) = self
                            .recorder
                            .save_session(id, session, summary.size_bytes)
                            .await
                        {
                            log::warn!("failed to save session {}: {}", id, e);
                            self.report_error(format!("Failed to save session: {}", e));
                        }
                    }
                    Err(e) => log::warn!("failed to stop recording {}: {}", id, e),
                }
            }
            self.audio.end_session(manual);
        } else {
            self.audio.stop();
        }

        self.camera.stop();
        if let Ok(mut calibration) = self.calibration.lock() {
            calibration.reset();
        }
        self.set_phase(WorkoutPhase::Idle);
        self.emit(WorkoutEvent::Countdown(None));
        self.emit(WorkoutEvent::SessionEndCountdown(None));
        self.emit(WorkoutEvent::SessionUpdate(session.clone()));

        // Dropping the handles aborts any timer that is still pending.
        // Kept last: a timer tearing the session down itself must not be
        // cancelled before its synchronous cleanup finishes.
        if let Ok(mut timers) = self.timers.lock() {
            timers.clear();
        }
        session
    }

    /// Collaborator failure: surface the error, tear everything down,
    /// return to Idle. The in-progress session, if any, is discarded.
    async fn fail_locked(self: &Arc<Self>, message: String) {
        self.report_error(message);

        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.live.store(false, Ordering::SeqCst);
        let _ = self.frame_stop_tx.send(());

        let discarded = self
            .counter
            .lock()
            .map(|mut counter| counter.stop())
            .unwrap_or(None);
        if let Some(session) = discarded {
            log::warn!(
                "discarding in-progress session with {} reps after failure",
                session.total_reps
            );
        }
        let recording_id = self
            .recording_id
            .lock()
            .map(|mut id| id.take())
            .unwrap_or(None);
        if recording_id.is_some() {
            if let Err(e) = self.recorder.stop_recording().await {
                log::warn!("failed to stop recording after failure: {}", e);
            }
        }

        self.audio.stop();
        self.camera.stop();
        if let Ok(mut calibration) = self.calibration.lock() {
            calibration.reset();
        }
        self.set_phase(WorkoutPhase::Idle);
        self.emit(WorkoutEvent::Countdown(None));
        self.emit(WorkoutEvent::SessionEndCountdown(None));
        self.emit(WorkoutEvent::SessionUpdate(None));

        if let Ok(mut timers) = self.timers.lock() {
            timers.clear();
        }
    }

    async fn handle_camera_failure(self: &Arc<Self>, epoch: u64, message: String) {
        let _guard = self.transition.lock().await;
        if !self.is_live(epoch) {
            return;
        }
        self.fail_locked(format!("Camera failure: {}", message)).await;
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn set_phase(&self, phase: WorkoutPhase) {
        if let Ok(mut current) = self.phase.write() {
            *current = phase;
        }
    }

    fn emit(&self, event: WorkoutEvent) {
        let _ = self.events_tx.send(event);
    }

    fn report_error(&self, message: String) {
        log::warn!("{}", message);
        if let Ok(mut error) = self.last_error.write() {
            *error = Some(message.clone());
        }
        self.emit(WorkoutEvent::Error(message));
    }
}

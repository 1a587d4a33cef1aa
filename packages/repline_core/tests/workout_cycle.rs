//! End-to-end workout cycle tests
//!
//! Drives the full orchestrator over the simulated collaborators under
//! tokio virtual time: scripted pose frames flow through detection and
//! counting while countdown/session timers run against the paused clock.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;

use repline::detect::ArmKind;
use repline::device::simulated::{
    InMemorySettingsStore, SimAudioSink, SimCamera, SimPoseEstimator, SimRecorder,
};
use repline::device::SettingsStore;
use repline::pose::{BoundingBox, Keypoint, Landmark, Prediction, LANDMARK_COUNT};
use repline::workout::{
    DetectionMode, IntervalUnit, WorkoutEvent, WorkoutOrchestrator, WorkoutPhase, WorkoutSettings,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const NOSE_Y: f32 = 300.0;
const RAISED_Y: f32 = 200.0;
const LOWERED_Y: f32 = 500.0;
/// Frames per second the simulated camera runs at (33ms interval).
const FRAME_MS: u64 = 33;

fn pose_frame(left_y: f32, right_y: f32) -> Prediction {
    let mut keypoints = [Keypoint::new(0.0, 0.0, 0.0); LANDMARK_COUNT];
    keypoints[Landmark::Nose.index()] = Keypoint::new(320.0, NOSE_Y, 0.9);
    keypoints[Landmark::LeftWrist.index()] = Keypoint::new(250.0, left_y, 0.9);
    keypoints[Landmark::RightWrist.index()] = Keypoint::new(390.0, right_y, 0.9);
    Prediction::new(keypoints, BoundingBox::default(), 0.9)
}

fn both_raised() -> Prediction {
    pose_frame(RAISED_Y, RAISED_Y)
}

fn both_lowered() -> Prediction {
    pose_frame(LOWERED_Y, LOWERED_Y)
}

fn right_raised() -> Prediction {
    pose_frame(LOWERED_Y, RAISED_Y)
}

struct Rig {
    orchestrator: Arc<WorkoutOrchestrator>,
    camera: Arc<SimCamera>,
    pose: Arc<SimPoseEstimator>,
    recorder: Arc<SimRecorder>,
    audio: Arc<SimAudioSink>,
    store: Arc<InMemorySettingsStore>,
}

fn rig(script: Vec<(u32, Prediction)>, mode: DetectionMode, settings: WorkoutSettings) -> Rig {
    let camera = Arc::new(SimCamera::with_interval(Duration::from_millis(FRAME_MS)));
    let pose = Arc::new(SimPoseEstimator::new(script));
    let recorder = Arc::new(SimRecorder::new());
    let audio = Arc::new(SimAudioSink::new());
    let store = Arc::new(InMemorySettingsStore::new());
    let orchestrator = WorkoutOrchestrator::new(
        camera.clone(),
        pose.clone(),
        recorder.clone(),
        audio.clone(),
        store.clone(),
        mode,
    );
    orchestrator.update_settings(settings).unwrap();
    Rig {
        orchestrator,
        camera,
        pose,
        recorder,
        audio,
        store,
    }
}

/// Settings with the start countdown disabled, so sessions activate
/// immediately and frame timings line up with the virtual clock.
fn instant_start() -> WorkoutSettings {
    WorkoutSettings {
        countdown_duration: 0,
        ..WorkoutSettings::default()
    }
}

fn drain(rx: &mut Receiver<WorkoutEvent>) -> Vec<WorkoutEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    events
}

async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
}

// ---------------------------------------------------------------------------
// Detection scenarios
// ---------------------------------------------------------------------------

/// Both wrists cross the line and hold for ~230ms: exactly one rep of
/// type `both`, never two single-arm reps.
#[tokio::test(start_paused = true)]
async fn test_clean_double_arm_rep() {
    let rig = rig(
        vec![(10, both_lowered()), (7, both_raised()), (20, both_lowered())],
        DetectionMode::FixedOffset,
        instant_start(),
    );
    rig.orchestrator.start().await.unwrap();
    assert_eq!(rig.orchestrator.phase(), WorkoutPhase::Active);

    advance(Duration::from_secs(2)).await;
    let session = rig.orchestrator.stop().await.expect("session finalized");

    assert_eq!(session.total_reps, 1);
    assert_eq!(session.reps.len(), 1);
    assert_eq!(session.reps[0].arm, ArmKind::Both);
}

/// A raise shorter than the hold window never counts.
#[tokio::test(start_paused = true)]
async fn test_short_raise_is_a_false_start() {
    // 4 frames raised = 132ms, under the 150ms hold.
    let rig = rig(
        vec![(10, both_lowered()), (4, both_raised()), (20, both_lowered())],
        DetectionMode::FixedOffset,
        instant_start(),
    );
    rig.orchestrator.start().await.unwrap();

    advance(Duration::from_secs(2)).await;
    let session = rig.orchestrator.stop().await.expect("session finalized");
    assert_eq!(session.total_reps, 0);
}

/// Right arm cycles raise-200ms / lower-2.77s three times: three reps
/// at a ~20/min cadence, with the windowed estimate tracking it.
#[tokio::test(start_paused = true)]
async fn test_rapid_single_arm_reps_track_cadence() {
    let mut script = Vec::new();
    for _ in 0..3 {
        script.push((6, right_raised()));
        script.push((84, both_lowered()));
    }
    let rig = rig(script, DetectionMode::FixedOffset, instant_start());
    rig.orchestrator.start().await.unwrap();

    advance(Duration::from_secs(10)).await;
    let session = rig.orchestrator.stop().await.expect("session finalized");

    assert_eq!(session.total_reps, 3);
    assert!(session.reps.iter().all(|rep| rep.arm == ArmKind::Right));
    assert!((session.estimated_reps_per_minute - 20.0).abs() < 1.0);
    assert!(session.estimated_reps_per_minute <= 60.0);
}

/// Two otherwise-valid detections inside the debounce window yield only
/// the first.
#[tokio::test(start_paused = true)]
async fn test_debounce_suppresses_back_to_back_detections() {
    // Left completes, then right completes ~400ms later.
    let rig = rig(
        vec![
            (7, pose_frame(RAISED_Y, LOWERED_Y)),
            (5, both_lowered()),
            (7, pose_frame(LOWERED_Y, RAISED_Y)),
            (20, both_lowered()),
        ],
        DetectionMode::FixedOffset,
        instant_start(),
    );
    rig.orchestrator.start().await.unwrap();

    advance(Duration::from_secs(2)).await;
    let session = rig.orchestrator.stop().await.expect("session finalized");

    assert_eq!(session.total_reps, 1);
    assert_eq!(session.reps[0].arm, ArmKind::Left);
}

// ---------------------------------------------------------------------------
// Lifecycle scenarios
// ---------------------------------------------------------------------------

/// The start countdown ticks once per second, beeping, then activates.
#[tokio::test(start_paused = true)]
async fn test_countdown_ticks_then_activates() {
    let settings = WorkoutSettings {
        countdown_duration: 3,
        ..WorkoutSettings::default()
    };
    let rig = rig(vec![(1, both_lowered())], DetectionMode::FixedOffset, settings);
    let mut events = rig.orchestrator.events();

    rig.orchestrator.start().await.unwrap();
    assert_eq!(rig.orchestrator.phase(), WorkoutPhase::Countdown);

    advance(Duration::from_millis(3_100)).await;
    assert_eq!(rig.orchestrator.phase(), WorkoutPhase::Active);

    let countdowns: Vec<Option<u32>> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            WorkoutEvent::Countdown(value) => Some(value),
            _ => None,
        })
        .collect();
    assert_eq!(countdowns, vec![Some(3), Some(2), Some(1), None]);

    // Countdown beeps plus the start beep.
    let tones = rig.audio.tones();
    assert_eq!(tones.iter().filter(|t| t.frequency_hz == 1000.0).count(), 3);
    assert_eq!(tones.iter().filter(|t| t.frequency_hz == 600.0).count(), 1);

    rig.orchestrator.stop().await;
}

/// Stopping mid-countdown cancels without ever starting a session.
#[tokio::test(start_paused = true)]
async fn test_stop_mid_countdown_never_starts_session() {
    let settings = WorkoutSettings {
        countdown_duration: 5,
        ..WorkoutSettings::default()
    };
    let rig = rig(vec![(1, both_lowered())], DetectionMode::FixedOffset, settings);

    rig.orchestrator.start().await.unwrap();
    advance(Duration::from_millis(1_500)).await;

    let session = rig.orchestrator.stop().await;
    assert!(session.is_none());
    assert_eq!(rig.orchestrator.phase(), WorkoutPhase::Idle);
    assert!(!rig.camera.is_started());
    assert!(!rig.recorder.is_recording());
    assert!(rig.recorder.saved().is_empty());

    // No stray countdown ticks after the stop.
    let mut events = rig.orchestrator.events();
    advance(Duration::from_secs(10)).await;
    assert!(drain(&mut events).is_empty());
}

/// With a session duration and auto-stop, the session ends itself at the
/// limit: 3-2-1 warning, finalized session, saved recording, idle phase,
/// and no frames processed afterwards.
#[tokio::test(start_paused = true)]
async fn test_session_duration_auto_stop() {
    let settings = WorkoutSettings {
        countdown_duration: 0,
        session_duration: Some(10),
        auto_stop_on_time_limit: true,
        ..WorkoutSettings::default()
    };
    // 1s rep cycles for the whole session.
    let mut script = Vec::new();
    for _ in 0..20 {
        script.push((6, both_raised()));
        script.push((24, both_lowered()));
    }
    let rig = rig(script, DetectionMode::FixedOffset, settings);
    let mut events = rig.orchestrator.events();

    rig.orchestrator.start().await.unwrap();
    advance(Duration::from_secs(15)).await;

    assert_eq!(rig.orchestrator.phase(), WorkoutPhase::Idle);
    assert!(!rig.camera.is_started());

    let saved = rig.recorder.saved();
    assert_eq!(saved.len(), 1);
    let session = &saved[0].session;
    // Reps detected at ~198ms + n*990ms, for n = 0..=9 inside the 10s.
    assert_eq!(session.total_reps, 10);
    assert!(session
        .reps
        .iter()
        .all(|rep| rep.offset_ms < 10_000 && rep.arm == ArmKind::Both));

    let collected = drain(&mut events);
    let warnings: Vec<Option<u32>> = collected
        .iter()
        .filter_map(|event| match event {
            WorkoutEvent::SessionEndCountdown(value) => Some(*value),
            _ => None,
        })
        .collect();
    assert_eq!(warnings, vec![Some(3), Some(2), Some(1), None, None]);
    assert!(!collected
        .iter()
        .any(|event| matches!(event, WorkoutEvent::TimeUp)));

    // Natural end: the closing sequence ends in the final tone.
    let tones = rig.audio.tones();
    assert!(tones.iter().filter(|t| t.frequency_hz == 600.0).count() >= 1);

    // Idempotent: stopping an already-ended session is a no-op.
    assert!(rig.orchestrator.stop().await.is_none());
}

/// Without auto-stop the limit only signals: TimeUp fires, the final
/// beep plays, and the session keeps counting until a manual stop.
#[tokio::test(start_paused = true)]
async fn test_time_up_without_auto_stop() {
    let settings = WorkoutSettings {
        countdown_duration: 0,
        session_duration: Some(5),
        auto_stop_on_time_limit: false,
        ..WorkoutSettings::default()
    };
    let rig = rig(
        vec![(1, both_lowered())],
        DetectionMode::FixedOffset,
        settings,
    );
    let mut events = rig.orchestrator.events();

    rig.orchestrator.start().await.unwrap();
    advance(Duration::from_secs(7)).await;

    assert_eq!(rig.orchestrator.phase(), WorkoutPhase::Active);
    assert!(drain(&mut events)
        .iter()
        .any(|event| matches!(event, WorkoutEvent::TimeUp)));

    let session = rig.orchestrator.stop().await;
    assert!(session.is_some());
    assert_eq!(rig.orchestrator.phase(), WorkoutPhase::Idle);
}

/// stop() twice, then dispose() twice: one finalized session, no extra
/// events, no duplicate cleanup, no panic.
#[tokio::test(start_paused = true)]
async fn test_idempotent_stop_and_dispose() {
    let rig = rig(
        vec![(10, both_lowered()), (7, both_raised()), (20, both_lowered())],
        DetectionMode::FixedOffset,
        instant_start(),
    );
    rig.orchestrator.start().await.unwrap();
    advance(Duration::from_secs(2)).await;

    let first = rig.orchestrator.stop().await;
    assert!(first.is_some());
    assert_eq!(rig.recorder.saved().len(), 1);

    let mut events = rig.orchestrator.events();
    assert!(rig.orchestrator.stop().await.is_none());
    advance(Duration::from_secs(5)).await;
    assert!(drain(&mut events).is_empty());
    assert_eq!(rig.recorder.saved().len(), 1);

    rig.orchestrator.dispose().await;
    rig.orchestrator.dispose().await;
    assert_eq!(rig.pose.dispose_count(), 1);
}

/// The finalized session lands in storage with the recording id and size.
#[tokio::test(start_paused = true)]
async fn test_finished_session_is_saved() {
    let rig = rig(
        vec![(10, both_lowered()), (7, both_raised()), (20, both_lowered())],
        DetectionMode::FixedOffset,
        instant_start(),
    );
    rig.orchestrator.start().await.unwrap();
    advance(Duration::from_secs(2)).await;
    let session = rig.orchestrator.stop().await.expect("session finalized");

    let saved = rig.recorder.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].session.total_reps, session.total_reps);
    assert!(saved[0].size_bytes > 0);
    assert!(!rig.recorder.is_recording());
}

/// A camera dying mid-session surfaces an error and returns to idle.
#[tokio::test(start_paused = true)]
async fn test_camera_failure_mid_session() {
    let rig = rig(
        vec![(1, both_lowered())],
        DetectionMode::FixedOffset,
        instant_start(),
    );
    let mut events = rig.orchestrator.events();
    rig.orchestrator.start().await.unwrap();
    advance(Duration::from_secs(1)).await;

    rig.camera.fail_frames();
    advance(Duration::from_secs(1)).await;

    assert_eq!(rig.orchestrator.phase(), WorkoutPhase::Idle);
    assert!(rig.orchestrator.last_error().is_some());
    assert!(drain(&mut events)
        .iter()
        .any(|event| matches!(event, WorkoutEvent::Error(_))));
    assert!(!rig.recorder.is_recording());
}

// ---------------------------------------------------------------------------
// Calibration mode
// ---------------------------------------------------------------------------

/// Calibrated mode: sampling completes, progress reaches 1.0, and reps
/// are judged against the calibrated per-arm thresholds.
#[tokio::test(start_paused = true)]
async fn test_calibrated_mode_full_cycle() {
    // 30 calibration frames with both arms raised, arms down, then two
    // rep cycles raised well above the calibrated line.
    let mut script = vec![(30, both_raised()), (20, both_lowered())];
    for _ in 0..2 {
        script.push((7, pose_frame(RAISED_Y - 60.0, RAISED_Y - 60.0)));
        script.push((30, both_lowered()));
    }
    let rig = rig(script, DetectionMode::Calibrated, instant_start());
    let mut events = rig.orchestrator.events();

    rig.orchestrator.start().await.unwrap();
    assert_eq!(rig.orchestrator.phase(), WorkoutPhase::Calibrating);

    advance(Duration::from_secs(5)).await;
    assert_eq!(rig.orchestrator.phase(), WorkoutPhase::Active);

    let progress: Vec<f32> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            WorkoutEvent::CalibrationProgress(fraction) => Some(fraction),
            _ => None,
        })
        .collect();
    assert!(progress.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(progress.last().copied(), Some(1.0));

    let session = rig.orchestrator.stop().await.expect("session finalized");
    assert_eq!(session.total_reps, 2);
}

// ---------------------------------------------------------------------------
// Settings persistence
// ---------------------------------------------------------------------------

/// save(settings) then load() through a fresh orchestrator yields the
/// same value in every field.
#[tokio::test(start_paused = true)]
async fn test_settings_round_trip_between_orchestrators() {
    let rig = rig(
        vec![(1, both_lowered())],
        DetectionMode::FixedOffset,
        WorkoutSettings::default(),
    );
    let settings = WorkoutSettings {
        countdown_duration: 5,
        session_duration: Some(300),
        auto_stop_on_time_limit: true,
        beep_interval: 10,
        beep_unit: IntervalUnit::Reps,
        announcement_interval: 60,
        announcement_unit: IntervalUnit::Seconds,
    };
    rig.orchestrator.update_settings(settings.clone()).unwrap();
    assert_eq!(rig.store.load().unwrap(), Some(settings.clone()));

    let fresh = WorkoutOrchestrator::new(
        Arc::new(SimCamera::new()),
        Arc::new(SimPoseEstimator::new(vec![(1, both_lowered())])),
        Arc::new(SimRecorder::new()),
        Arc::new(SimAudioSink::new()),
        rig.store.clone(),
        DetectionMode::FixedOffset,
    );
    assert_eq!(fresh.initialize(), settings);
}

//! Audio feedback coordination
//!
//! Decides *when* to fire audio cues; never decides whether a rep
//! occurred. Time-based beeps run on their own repeating timer;
//! rep-based beeps and announcements advance watermarks on each session
//! update; time-based announcements compare wall-clock elapsed time
//! opportunistically on each update.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use super::settings::{IntervalUnit, WorkoutSettings};
use super::timer::TimerHandle;
use crate::device::AudioSink;
use crate::session::WorkoutSession;

// Cue palette.
const COUNTDOWN_TONE: (f32, u64, f32) = (1000.0, 150, 0.4);
const START_TONE: (f32, u64, f32) = (600.0, 300, 0.5);
const REP_MILESTONE_TONE: (f32, u64, f32) = (800.0, 150, 0.5);
const TIME_MILESTONE_TONE: (f32, u64, f32) = (800.0, 200, 0.6);
const FINAL_TONE: (f32, u64, f32) = (600.0, 400, 0.6);

const SPEECH_RATE: f32 = 1.1;
const SPEECH_PITCH: f32 = 1.0;
const SPEECH_VOLUME: f32 = 0.7;

#[derive(Default)]
struct FeedbackState {
    last_beep_reps: u32,
    last_announcement_reps: u32,
    last_announcement_at: Option<Instant>,
}

/// Session-scoped audio cue scheduler.
pub struct AudioFeedback {
    sink: Arc<dyn AudioSink>,
    settings: Mutex<WorkoutSettings>,
    state: Mutex<FeedbackState>,
    beep_timer: Mutex<Option<TimerHandle>>,
}

impl AudioFeedback {
    pub fn new(sink: Arc<dyn AudioSink>, settings: WorkoutSettings) -> Self {
        Self {
            sink,
            settings: Mutex::new(settings),
            state: Mutex::new(FeedbackState::default()),
            beep_timer: Mutex::new(None),
        }
    }

    pub fn update_settings(&self, settings: WorkoutSettings) {
        if let Ok(mut current) = self.settings.lock() {
            *current = settings;
        }
    }

    pub fn play_countdown_beep(&self) {
        let (freq, dur, vol) = COUNTDOWN_TONE;
        self.sink.play_tone(freq, dur, vol);
    }

    pub fn play_start_beep(&self) {
        let (freq, dur, vol) = START_TONE;
        self.sink.play_tone(freq, dur, vol);
    }

    pub fn play_final_beep(&self) {
        let (freq, dur, vol) = FINAL_TONE;
        self.sink.play_tone(freq, dur, vol);
    }

    /// Arm session-scoped state. With second-based beeps configured this
    /// starts the repeating beep timer.
    pub fn start_session(&self, now: Instant) {
        let settings = self.settings_snapshot();
        if let Ok(mut state) = self.state.lock() {
            *state = FeedbackState {
                last_beep_reps: 0,
                last_announcement_reps: 0,
                last_announcement_at: Some(now),
            };
        }

        if settings.beep_interval > 0 && settings.beep_unit == IntervalUnit::Seconds {
            let interval = Duration::from_secs(settings.beep_interval as u64);
            let sink = Arc::clone(&self.sink);
            let handle = TimerHandle::spawn(async move {
                loop {
                    tokio::time::sleep(interval).await;
                    let (freq, dur, vol) = TIME_MILESTONE_TONE;
                    sink.play_tone(freq, dur, vol);
                }
            });
            if let Ok(mut timer) = self.beep_timer.lock() {
                *timer = Some(handle);
            }
        }
    }

    /// Called once per accepted rep.
    pub fn handle_update(&self, session: &WorkoutSession, now: Instant) {
        let settings = self.settings_snapshot();
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(_) => return,
        };

        if settings.beep_interval > 0 && settings.beep_unit == IntervalUnit::Reps {
            let since_last = session.total_reps.saturating_sub(state.last_beep_reps);
            if since_last >= settings.beep_interval {
                self.play_rep_milestone();
                state.last_beep_reps = session.total_reps;
            }
        }

        if settings.announcement_interval > 0 {
            match settings.announcement_unit {
                IntervalUnit::Reps => {
                    let since_last = session
                        .total_reps
                        .saturating_sub(state.last_announcement_reps);
                    if since_last >= settings.announcement_interval {
                        self.speak_progress(session.total_reps, session.reps_per_minute);
                        state.last_announcement_reps = session.total_reps;
                    }
                }
                IntervalUnit::Seconds => {
                    let interval = Duration::from_secs(settings.announcement_interval as u64);
                    let due = state
                        .last_announcement_at
                        .map(|last| now.duration_since(last) >= interval)
                        .unwrap_or(false);
                    // No pace to announce until the average moves off zero.
                    if due && session.reps_per_minute > 0.0 {
                        self.speak_progress(session.total_reps, session.reps_per_minute);
                        state.last_announcement_at = Some(now);
                    }
                }
            }
        }
    }

    /// Final cue for a finished session: a lone long beep on manual stop,
    /// the full 3-2-1-plus-final sequence on a natural end.
    pub fn end_session(&self, manual: bool) {
        self.cancel_timers();
        self.sink.cancel_speech();
        if manual {
            self.play_final_beep();
        } else {
            // Fire-and-forget: the closing sequence outlives the session.
            let sink = Arc::clone(&self.sink);
            tokio::spawn(async move {
                for _ in 0..3 {
                    let (freq, dur, vol) = COUNTDOWN_TONE;
                    sink.play_tone(freq, dur, vol);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                let (freq, dur, vol) = FINAL_TONE;
                sink.play_tone(freq, dur, vol);
            });
        }
    }

    /// Cancel everything pending. Safe when no session was ever started.
    pub fn stop(&self) {
        self.cancel_timers();
        self.sink.cancel_speech();
    }

    fn cancel_timers(&self) {
        if let Ok(mut timer) = self.beep_timer.lock() {
            *timer = None;
        }
    }

    fn play_rep_milestone(&self) {
        let (freq, dur, vol) = REP_MILESTONE_TONE;
        self.sink.play_tone(freq, dur, vol);
        // Second half of the double beep.
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            sink.play_tone(freq, dur, vol);
        });
    }

    fn speak_progress(&self, total_reps: u32, reps_per_minute: f64) {
        let message = compose_progress_message(total_reps, reps_per_minute);
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            if let Err(e) = sink
                .speak(&message, SPEECH_RATE, SPEECH_PITCH, SPEECH_VOLUME)
                .await
            {
                log::warn!("progress announcement failed: {}", e);
            }
        });
    }

    fn settings_snapshot(&self) -> WorkoutSettings {
        self.settings
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

fn compose_progress_message(total_reps: u32, reps_per_minute: f64) -> String {
    let rpm = reps_per_minute.round() as i64;
    if total_reps == 1 {
        format!("1 rep at {} RPM", rpm)
    } else {
        format!("{} reps at {} RPM", total_reps, rpm)
    }
}

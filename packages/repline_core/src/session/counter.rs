//! Rep counter and pace statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::SessionError;
use crate::detect::ArmKind;

/// Trailing window for the estimated-pace metric.
const PACE_WINDOW_MS: u64 = 60_000;
/// Minimum reps inside the window before extrapolating a rate.
const MIN_REPS_FOR_PACE: usize = 2;
/// Hard cap on the extrapolated estimate.
const MAX_ESTIMATED_RPM: f64 = 60.0;

/// One completed repetition. Append-only; never mutated or removed
/// except by session reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rep {
    /// Milliseconds since session start.
    pub offset_ms: u64,
    pub arm: ArmKind,
}

/// The active workout session. Owned exclusively by the `RepCounter`;
/// everything handed out is a clone, so readers never observe a
/// half-updated session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkoutSession {
    pub started_at: DateTime<Utc>,
    /// Chronological, append-only.
    pub reps: Vec<Rep>,
    pub total_reps: u32,
    /// Lifetime average: total reps over total elapsed minutes.
    pub reps_per_minute: f64,
    /// Reactive estimate from the trailing 60-second window.
    pub estimated_reps_per_minute: f64,
}

/// Owns the single active session and its statistics.
pub struct RepCounter {
    session: Option<WorkoutSession>,
    started: Option<Instant>,
}

impl RepCounter {
    pub fn new() -> Self {
        Self {
            session: None,
            started: None,
        }
    }

    /// Begin a fresh session. Rejects if one is already active.
    pub fn start(&mut self, now: Instant) -> Result<(), SessionError> {
        if self.session.is_some() {
            return Err(SessionError::AlreadyActive);
        }
        self.session = Some(WorkoutSession {
            started_at: Utc::now(),
            reps: Vec::new(),
            total_reps: 0,
            reps_per_minute: 0.0,
            estimated_reps_per_minute: 0.0,
        });
        self.started = Some(now);
        Ok(())
    }

    /// Append a detected rep and recompute both pace metrics.
    pub fn add_rep(&mut self, arm: ArmKind, at: Instant) -> Result<(), SessionError> {
        let started = self.started.ok_or(SessionError::NotActive)?;
        let session = self.session.as_mut().ok_or(SessionError::NotActive)?;

        let offset_ms = at.duration_since(started).as_millis() as u64;
        session.reps.push(Rep { offset_ms, arm });
        session.total_reps += 1;

        let elapsed_minutes = offset_ms as f64 / 60_000.0;
        if elapsed_minutes > 0.0 {
            session.reps_per_minute = session.total_reps as f64 / elapsed_minutes;
        }
        session.estimated_reps_per_minute = estimated_pace(&session.reps, offset_ms);
        Ok(())
    }

    /// Detach and return the finalized session. Subsequent `start()`
    /// begins clean. Returns None when no session was active.
    pub fn stop(&mut self) -> Option<WorkoutSession> {
        self.started = None;
        self.session.take()
    }

    /// Snapshot of the current session, or None outside a session.
    pub fn current(&self) -> Option<WorkoutSession> {
        self.session.clone()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }
}

impl Default for RepCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Estimate reps-per-minute at current cadence from the reps inside the
/// trailing window. With fewer than two qualifying reps the estimate is
/// the qualifying count itself, never an extrapolated rate.
fn estimated_pace(reps: &[Rep], now_offset_ms: u64) -> f64 {
    let window_start = now_offset_ms.saturating_sub(PACE_WINDOW_MS);
    let recent: Vec<u64> = reps
        .iter()
        .map(|rep| rep.offset_ms)
        .filter(|offset| *offset >= window_start)
        .collect();

    if recent.len() < MIN_REPS_FOR_PACE {
        return recent.len() as f64;
    }

    let total_gap: u64 = recent.windows(2).map(|pair| pair[1] - pair[0]).sum();
    let mean_interval = total_gap as f64 / (recent.len() - 1) as f64;
    if mean_interval <= 0.0 {
        return recent.len() as f64;
    }
    (PACE_WINDOW_MS as f64 / mean_interval)
        .round()
        .min(MAX_ESTIMATED_RPM)
}

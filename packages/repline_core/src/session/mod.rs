//! Workout sessions and statistics
//!
//! The rep counter owns the one active `WorkoutSession`, appends detected
//! reps, and keeps two distinct pace metrics: the lifetime average and a
//! trailing-window estimate of current cadence.

pub mod counter;

pub use counter::{Rep, RepCounter, WorkoutSession};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("A session is already active")]
    AlreadyActive,

    #[error("No active session")]
    NotActive,
}

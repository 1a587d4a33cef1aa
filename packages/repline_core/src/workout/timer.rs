//! Owned cancellable timers
//!
//! Every armed timer is an explicit owned value. Cancelling (or simply
//! dropping) the handle aborts the underlying task, so a timer released
//! during a state transition can never fire into the next state.

use std::future::Future;

use tokio::task::JoinHandle;

pub struct TimerHandle {
    handle: JoinHandle<()>,
}

impl TimerHandle {
    /// Arm a timer by spawning its task.
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(future),
        }
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

//! External control of a running simulation: pause/resume and
//! cancellation, checked at tick boundaries only.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

/// Shared handle for pausing, resuming, and cancelling a simulation run
/// from another thread. A tick is atomic: both flags take effect at the
/// top of the next tick.
#[derive(Debug, Default)]
pub struct SimControl {
    paused: Mutex<bool>,
    resumed: Condvar,
    cancelled: AtomicBool,
}

impl SimControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        *self.paused.lock().unwrap() = true;
    }

    pub fn resume(&self) {
        *self.paused.lock().unwrap() = false;
        self.resumed.notify_all();
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // wake a paused loop so it can observe the cancellation
        self.resume();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Block the calling simulation loop while paused.
    pub fn wait_if_paused(&self) {
        let mut paused = self.paused.lock().unwrap();
        while *paused && !self.is_cancelled() {
            paused = self.resumed.wait(paused).unwrap();
        }
    }
}

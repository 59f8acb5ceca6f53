//! Run state shared between the worker thread and its controller.
//!
//! The controller writes `paused`/`stop`; the worker writes `running` and the
//! progress counters. Pause is a mutex-guarded flag with a condition variable,
//! so a paused worker sleeps until `resume` or `stop` wakes it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::info;

use super::error::MacroError;

#[derive(Debug, Default)]
pub struct RunState {
    running: AtomicBool,
    stop: AtomicBool,
    paused: Mutex<bool>,
    wake: Condvar,
    current_row: AtomicUsize,
    current_action: AtomicUsize,
}

impl RunState {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.lock()
    }

    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// 1-based row (excel mode) or repetition currently executing; 0 before the first.
    pub fn current_row(&self) -> usize {
        self.current_row.load(Ordering::SeqCst)
    }

    /// 1-based index of the action currently executing; 0 before the first.
    pub fn current_action(&self) -> usize {
        self.current_action.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        *self.paused.lock() = true;
    }

    pub fn resume(&self) {
        let mut paused = self.paused.lock();
        *paused = false;
        self.wake.notify_all();
    }

    pub fn stop(&self) {
        // Flag set under the lock so a worker about to wait cannot miss it.
        let _guard = self.paused.lock();
        self.stop.store(true, Ordering::SeqCst);
        self.wake.notify_all();
    }

    /// Mark a run as started and reset the counters.
    ///
    /// A stop or pause requested before the run begins is kept and applies to it.
    pub(crate) fn begin(&self) -> Result<(), MacroError> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| MacroError::AlreadyRunning)?;
        self.current_row.store(0, Ordering::SeqCst);
        self.current_action.store(0, Ordering::SeqCst);
        Ok(())
    }

    /// Mark the run as over. Stop and pause requests are consumed by it.
    pub(crate) fn finish(&self) {
        {
            let mut paused = self.paused.lock();
            *paused = false;
            self.stop.store(false, Ordering::SeqCst);
        }
        self.running.store(false, Ordering::SeqCst);
    }

    pub(crate) fn set_current_row(&self, row: usize) {
        self.current_row.store(row, Ordering::SeqCst);
    }

    pub(crate) fn set_current_action(&self, index: usize) {
        self.current_action.store(index, Ordering::SeqCst);
    }

    /// Block while paused. Returns `false` if a stop was requested.
    pub(crate) fn wait_while_paused(&self) -> bool {
        let mut paused = self.paused.lock();
        while *paused && !self.should_stop() {
            self.wake.wait(&mut paused);
        }
        !self.should_stop()
    }

    /// Sleep for `duration` unless a stop arrives first. Returns `false` on stop.
    pub(crate) fn sleep_unless_stopped(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut guard = self.paused.lock();
        while !self.should_stop() {
            if self.wake.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        !self.should_stop()
    }
}

/// Cloneable handle used by the controlling thread (UI, CLI, hotkeys).
#[derive(Debug, Clone, Default)]
pub struct ExecutorHandle {
    state: Arc<RunState>,
}

impl ExecutorHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn pause(&self) {
        info!(target: "macroflow::control", "Pause requested");
        self.state.pause();
    }

    pub fn resume(&self) {
        info!(target: "macroflow::control", "Resume requested");
        self.state.resume();
    }

    /// Pause if running, resume if paused.
    pub fn toggle_pause(&self) {
        if self.is_paused() {
            self.resume();
        } else {
            self.pause();
        }
    }

    pub fn stop(&self) {
        info!(target: "macroflow::control", "Stop requested");
        self.state.stop();
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn is_paused(&self) -> bool {
        self.state.is_paused()
    }

    pub fn should_stop(&self) -> bool {
        self.state.should_stop()
    }

    pub fn current_row(&self) -> usize {
        self.state.current_row()
    }

    pub fn current_action(&self) -> usize {
        self.state.current_action()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_begin_twice_is_rejected() {
        let s = RunState::default();
        s.begin().unwrap();
        assert!(matches!(s.begin(), Err(MacroError::AlreadyRunning)));
        s.finish();
        assert!(!s.is_running());
        s.begin().unwrap();
    }

    #[test]
    fn test_stop_before_begin_is_kept_until_finish() {
        let s = RunState::default();
        s.stop();
        s.pause();
        s.set_current_row(4);
        s.begin().unwrap();
        assert!(s.should_stop());
        assert!(s.is_paused());
        assert_eq!(s.current_row(), 0);
        assert!(!s.wait_while_paused());

        s.finish();
        assert!(!s.should_stop());
        assert!(!s.is_paused());
        assert!(!s.is_running());
    }

    #[test]
    fn test_resume_wakes_paused_worker() {
        let h = ExecutorHandle::new();
        h.pause();
        let worker = {
            let h = h.clone();
            thread::spawn(move || h.state().wait_while_paused())
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!worker.is_finished());
        h.resume();
        assert!(worker.join().unwrap());
    }

    #[test]
    fn test_stop_wakes_paused_worker() {
        let h = ExecutorHandle::new();
        h.toggle_pause();
        assert!(h.is_paused());
        let worker = {
            let h = h.clone();
            thread::spawn(move || h.state().wait_while_paused())
        };
        thread::sleep(Duration::from_millis(50));
        h.stop();
        assert!(!worker.join().unwrap());
    }

    #[test]
    fn test_sleep_unless_stopped() {
        let h = ExecutorHandle::new();
        let started = Instant::now();
        assert!(h.state().sleep_unless_stopped(Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(30));

        let sleeper = {
            let h = h.clone();
            thread::spawn(move || h.state().sleep_unless_stopped(Duration::from_secs(10)))
        };
        thread::sleep(Duration::from_millis(50));
        let stopped_at = Instant::now();
        h.stop();
        assert!(!sleeper.join().unwrap());
        assert!(stopped_at.elapsed() < Duration::from_secs(5));
    }
}

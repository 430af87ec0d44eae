//! Runner/worker control block for pause, resume, and liveness.
//!
//! Owned by the runner and shared with every worker. The event path only
//! reads one atomic flag per iteration; the mutex and condvars are touched
//! when a pause is actually in force, so this never becomes a third lock on
//! the hot path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

struct ControlState {
    pause_requested: bool,
    paused: usize,
    live: usize,
}

pub(crate) struct ControlBlock {
    pause_flag: AtomicBool,
    state: Mutex<ControlState>,
    /// Workers park here while a pause is in force.
    worker_cv: Condvar,
    /// The runner waits here for pause acknowledgements and exits.
    runner_cv: Condvar,
}

impl ControlBlock {
    pub fn new(workers: usize) -> Self {
        Self {
            pause_flag: AtomicBool::new(false),
            state: Mutex::new(ControlState {
                pause_requested: false,
                paused: 0,
                live: workers,
            }),
            worker_cv: Condvar::new(),
            runner_cv: Condvar::new(),
        }
    }

    /// Worker-side safe point: returns immediately unless a pause is in
    /// force, in which case the calling worker acknowledges and parks until
    /// resumed. Workers call this holding no event and no lock.
    pub fn pause_point(&self) {
        if !self.pause_flag.load(Ordering::Acquire) {
            return;
        }
        let mut state = crate::lock(&self.state);
        if !state.pause_requested {
            return;
        }
        state.paused += 1;
        self.runner_cv.notify_all();
        while state.pause_requested {
            state = self
                .worker_cv
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.paused -= 1;
    }

    /// Phase one: raise the pause flag. Phase two: wait until every live
    /// worker has parked, up to `timeout`. Returns whether all acknowledged;
    /// on `false` the pause is still in force and stragglers will park at
    /// their next safe point.
    pub fn request_pause(&self, timeout: Duration) -> bool {
        let mut state = crate::lock(&self.state);
        state.pause_requested = true;
        self.pause_flag.store(true, Ordering::Release);
        let deadline = Instant::now() + timeout;
        while state.paused < state.live {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .runner_cv
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
        true
    }

    /// Lower the pause flag and release every parked worker.
    pub fn resume(&self) {
        let mut state = crate::lock(&self.state);
        state.pause_requested = false;
        self.pause_flag.store(false, Ordering::Release);
        self.worker_cv.notify_all();
    }

    /// A worker's thread is ending, normally or not. An exit counts toward a
    /// pending pause: the runner must not wait for a dead worker's ack.
    pub fn worker_exited(&self) {
        let mut state = crate::lock(&self.state);
        state.live = state.live.saturating_sub(1);
        self.runner_cv.notify_all();
    }

    pub fn live_workers(&self) -> usize {
        crate::lock(&self.state).live
    }

    pub fn paused_workers(&self) -> usize {
        crate::lock(&self.state).paused
    }
}

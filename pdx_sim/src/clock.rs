//! Virtual monotonic clock.
//!
//! `SimClock` implements `CycleTimer` on virtual time. Sleeping never blocks
//! the calling thread: it moves virtual time to the requested deadline plus
//! an injected wakeup jitter. Clones share the same time line, so a test can
//! hand one clone to the engine and keep another to simulate application work
//! (`advance`) or signal delivery (`interrupt_next`).

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use pdx_common::time::{CycleTimer, TimerError, Timestamp};

/// Most recent sleep deadlines kept by [`SimClock::requested_deadlines`].
pub const DEADLINE_HISTORY: usize = 1024;

#[derive(Debug, Default)]
struct SimClockState {
    now: Timestamp,
    jitter: Vec<u64>,
    jitter_idx: usize,
    pending_interrupts: u32,
    deadlines: VecDeque<Timestamp>,
}

/// Shared virtual clock.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    state: Arc<Mutex<SimClockState>>,
}

impl SimClock {
    /// Create a clock reading `start`.
    pub fn new(start: Timestamp) -> Self {
        let clock = Self::default();
        clock.state.lock().now = start;
        clock
    }

    /// Wake up late by the given amounts [ns], applied cyclically per sleep.
    pub fn with_jitter(self, pattern: Vec<u64>) -> Self {
        {
            let mut st = self.state.lock();
            st.jitter = pattern;
            st.jitter_idx = 0;
        }
        self
    }

    /// Make the next `count` sleeps return `TimerError::Interrupted`.
    pub fn interrupt_next(&self, count: u32) {
        self.state.lock().pending_interrupts += count;
    }

    /// Move virtual time forward (application work, slow I/O).
    pub fn advance(&self, ns: u64) {
        let mut st = self.state.lock();
        st.now = st.now.add_nanos(ns);
    }

    /// Current virtual time.
    pub fn current(&self) -> Timestamp {
        self.state.lock().now
    }

    /// The last [`DEADLINE_HISTORY`] deadlines passed to `sleep_until`,
    /// in call order.
    pub fn requested_deadlines(&self) -> Vec<Timestamp> {
        self.state.lock().deadlines.iter().copied().collect()
    }
}

impl CycleTimer for SimClock {
    fn now(&mut self) -> Result<Timestamp, TimerError> {
        Ok(self.state.lock().now)
    }

    fn sleep_until(&mut self, deadline: Timestamp) -> Result<(), TimerError> {
        let mut st = self.state.lock();
        if st.deadlines.len() == DEADLINE_HISTORY {
            st.deadlines.pop_front();
        }
        st.deadlines.push_back(deadline);

        if st.pending_interrupts > 0 {
            st.pending_interrupts -= 1;
            return Err(TimerError::Interrupted);
        }

        if st.now < deadline {
            st.now = deadline;
        }
        if !st.jitter.is_empty() {
            let late = st.jitter[st.jitter_idx % st.jitter.len()];
            st.jitter_idx += 1;
            st.now = st.now.add_nanos(late);
        }
        Ok(())
    }
}

//! Absolute cycle schedule.
//!
//! The next wakeup is always `previous wakeup + period`, never "now +
//! period", so time spent in the cycle body or in a late wakeup does not
//! accumulate as drift. Sleeping uses an absolute deadline on
//! `CLOCK_MONOTONIC`; an interrupted sleep re-waits on the same deadline.
//!
//! A wakeup later than the overrun tolerance produces an [`OverrunEvent`].
//! If the deadline has already passed on entry, no sleep happens and the
//! cycle proceeds immediately; the schedule is not skipped forward, so the
//! following deadlines stay on the original grid.

use nix::time::{ClockId, ClockNanosleepFlags, clock_gettime, clock_nanosleep};
use pdx_common::time::{CycleTimer, TimerError, Timestamp};

/// `CLOCK_MONOTONIC` timer with absolute-deadline sleep.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl MonotonicClock {
    const CLOCK: ClockId = ClockId::CLOCK_MONOTONIC;
}

impl CycleTimer for MonotonicClock {
    fn now(&mut self) -> Result<Timestamp, TimerError> {
        Ok(clock_gettime(Self::CLOCK)?.into())
    }

    fn sleep_until(&mut self, deadline: Timestamp) -> Result<(), TimerError> {
        clock_nanosleep(
            Self::CLOCK,
            ClockNanosleepFlags::TIMER_ABSTIME,
            &deadline.into(),
        )?;
        Ok(())
    }
}

/// A wakeup that came later than the tolerance allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverrunEvent {
    /// Scheduled wakeup.
    pub deadline: Timestamp,
    /// Actual wakeup.
    pub woke_at: Timestamp,
    /// `woke_at - deadline` [ns].
    pub lateness_ns: u64,
    /// The deadline had already passed before the sleep was entered.
    pub missed_before_sleep: bool,
}

/// One scheduled wakeup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// 1-based tick number.
    pub index: u64,
    /// Scheduled wakeup time.
    pub deadline: Timestamp,
    /// Time observed after the sleep returned.
    pub woke_at: Timestamp,
    /// Number of interrupted sleeps re-waited on this deadline.
    pub interrupts: u32,
    /// Set when the wakeup was later than the tolerance.
    pub overrun: Option<OverrunEvent>,
}

impl Tick {
    /// Wakeup latency [ns], clamped at zero.
    #[inline]
    pub fn latency_ns(&self) -> u64 {
        self.woke_at.diff_nanos(&self.deadline).max(0) as u64
    }
}

/// Drift-free periodic schedule on top of a [`CycleTimer`].
///
/// The schedule is anchored on the first call to [`CycleClock::next`]:
/// the first deadline is `anchor + period`.
#[derive(Debug)]
pub struct CycleClock<T> {
    timer: T,
    period_ns: u64,
    period: Timestamp,
    tolerance_ns: u64,
    next_wakeup: Option<Timestamp>,
    ticks: u64,
}

impl<T: CycleTimer> CycleClock<T> {
    /// Create an unanchored schedule.
    pub fn new(timer: T, period_ns: u64, tolerance_ns: u64) -> Self {
        debug_assert!(period_ns > 0, "period must be positive");
        Self {
            timer,
            period_ns,
            period: Timestamp::from_nanos(period_ns),
            tolerance_ns,
            next_wakeup: None,
            ticks: 0,
        }
    }

    /// Create a schedule anchored on the current time.
    pub fn start(mut timer: T, period_ns: u64, tolerance_ns: u64) -> Result<Self, TimerError> {
        let anchor = timer.now()?;
        Ok(Self::anchored(timer, period_ns, tolerance_ns, anchor))
    }

    /// Create a schedule anchored on `anchor`; the first deadline is
    /// `anchor + period`.
    pub fn anchored(timer: T, period_ns: u64, tolerance_ns: u64, anchor: Timestamp) -> Self {
        let mut clock = Self::new(timer, period_ns, tolerance_ns);
        clock.next_wakeup = Some(anchor);
        clock
    }

    /// Advance the schedule by one period and block until the new deadline.
    ///
    /// # Errors
    /// Only non-EINTR clock failures. Interrupted sleeps are retried on the
    /// same deadline and counted in [`Tick::interrupts`].
    pub fn next(&mut self) -> Result<Tick, TimerError> {
        let base = match self.next_wakeup {
            Some(ts) => ts,
            None => self.timer.now()?,
        };
        let deadline = base.add(self.period);
        self.next_wakeup = Some(deadline);

        let entered = self.timer.now()?;
        let missed_before_sleep = entered >= deadline;
        let mut interrupts = 0u32;

        let woke_at = if missed_before_sleep {
            entered
        } else {
            loop {
                match self.timer.sleep_until(deadline) {
                    Ok(()) => break,
                    Err(TimerError::Interrupted) => interrupts += 1,
                    Err(e) => return Err(e),
                }
            }
            self.timer.now()?
        };

        let lateness = woke_at.diff_nanos(&deadline);
        let overrun = (lateness > self.tolerance_ns as i64).then_some(OverrunEvent {
            deadline,
            woke_at,
            lateness_ns: lateness as u64,
            missed_before_sleep,
        });

        self.ticks += 1;
        Ok(Tick {
            index: self.ticks,
            deadline,
            woke_at,
            interrupts,
            overrun,
        })
    }

    /// Current time from the underlying timer.
    #[inline]
    pub fn now(&mut self) -> Result<Timestamp, TimerError> {
        self.timer.now()
    }

    /// Most recent deadline, `None` before the first tick.
    pub fn next_wakeup(&self) -> Option<Timestamp> {
        self.next_wakeup
    }

    pub fn period_ns(&self) -> u64 {
        self.period_ns
    }

    pub fn tolerance_ns(&self) -> u64 {
        self.tolerance_ns
    }

    /// Ticks produced so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }
}

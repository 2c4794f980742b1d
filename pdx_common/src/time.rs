//! Absolute timestamps and the cycle timer abstraction.
//!
//! `Timestamp` is a normalised `(seconds, nanoseconds)` pair with
//! `0 <= nsec < 1e9`, the same shape as a POSIX `timespec`. All schedule
//! arithmetic is done on this type so that sub-second overflow always carries
//! into the seconds field.
//!
//! `CycleTimer` is the seam between the cycle clock and the platform: the
//! production implementation sleeps with `clock_nanosleep(TIMER_ABSTIME)`,
//! the simulated one advances a virtual clock.

use core::fmt;

use nix::errno::Errno;
use nix::sys::time::TimeSpec;
use thiserror::Error;

use crate::consts::NSEC_PER_SEC;

/// Absolute point in time on a monotonic clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    sec: i64,
    nsec: i64,
}

impl Timestamp {
    /// The clock origin.
    pub const ZERO: Self = Self { sec: 0, nsec: 0 };

    /// Build a timestamp from seconds and a nanosecond part in `[0, 1e9)`.
    ///
    /// # Panics
    /// Panics in debug mode if `nsec` is out of range.
    #[inline]
    pub const fn new(sec: i64, nsec: i64) -> Self {
        debug_assert!(nsec >= 0 && nsec < NSEC_PER_SEC);
        Self { sec, nsec }
    }

    /// Build a timestamp from a nanosecond count since the clock origin.
    #[inline]
    pub const fn from_nanos(ns: u64) -> Self {
        Self {
            sec: (ns / NSEC_PER_SEC as u64) as i64,
            nsec: (ns % NSEC_PER_SEC as u64) as i64,
        }
    }

    /// Whole seconds.
    #[inline]
    pub const fn sec(&self) -> i64 {
        self.sec
    }

    /// Nanosecond part, always in `[0, 1e9)`.
    #[inline]
    pub const fn nsec(&self) -> i64 {
        self.nsec
    }

    /// Sum of two normalised timestamps.
    ///
    /// Since both nanosecond parts are below one second, their sum is below
    /// two seconds and carries at most once.
    #[inline]
    pub const fn add(self, rhs: Self) -> Self {
        let nsec = self.nsec + rhs.nsec;
        if nsec >= NSEC_PER_SEC {
            Self {
                sec: self.sec + rhs.sec + 1,
                nsec: nsec - NSEC_PER_SEC,
            }
        } else {
            Self {
                sec: self.sec + rhs.sec,
                nsec,
            }
        }
    }

    /// Advance by a nanosecond duration (may exceed one second).
    #[inline]
    pub const fn add_nanos(self, ns: u64) -> Self {
        self.add(Self::from_nanos(ns))
    }

    /// Nanoseconds since the clock origin. Times before the origin saturate to 0.
    #[inline]
    pub const fn as_nanos(&self) -> u64 {
        if self.sec < 0 {
            0
        } else {
            self.sec as u64 * NSEC_PER_SEC as u64 + self.nsec as u64
        }
    }

    /// Signed difference `self - earlier` in nanoseconds.
    #[inline]
    pub const fn diff_nanos(&self, earlier: &Self) -> i64 {
        (self.sec - earlier.sec) * NSEC_PER_SEC + (self.nsec - earlier.nsec)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}s", self.sec, self.nsec)
    }
}

impl From<TimeSpec> for Timestamp {
    fn from(ts: TimeSpec) -> Self {
        Self {
            sec: ts.tv_sec() as i64,
            nsec: ts.tv_nsec() as i64,
        }
    }
}

impl From<Timestamp> for TimeSpec {
    fn from(ts: Timestamp) -> Self {
        TimeSpec::new(ts.sec as _, ts.nsec as _)
    }
}

/// Failure of the underlying clock or sleep primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimerError {
    /// The sleep was interrupted before the deadline (EINTR).
    #[error("sleep interrupted by signal")]
    Interrupted,

    /// Any other clock failure.
    #[error("clock error: {0}")]
    Clock(Errno),
}

impl From<Errno> for TimerError {
    fn from(e: Errno) -> Self {
        match e {
            Errno::EINTR => Self::Interrupted,
            other => Self::Clock(other),
        }
    }
}

/// Monotonic time source with an absolute sleep primitive.
///
/// Implementations must never sleep relative to "now": `sleep_until` blocks
/// until the given absolute time has been reached, or returns
/// [`TimerError::Interrupted`] so that the caller can wait again for the same
/// deadline.
pub trait CycleTimer {
    /// Current monotonic time.
    fn now(&mut self) -> Result<Timestamp, TimerError>;

    /// Block until `deadline` has been reached.
    fn sleep_until(&mut self, deadline: Timestamp) -> Result<(), TimerError>;
}

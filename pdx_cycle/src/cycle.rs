//! Exchange loop: one fixed-period cycle of process-data exchange.
//!
//! ## Cycle Body
//!
//! | Phase | Action |
//! |-------|--------|
//! | `AwaitDeadline` | sleep until `previous deadline + period` |
//! | `SyncTime` | `application_time(deadline)` |
//! | `Receive` | `receive()`, `domain_process()` |
//! | `Monitor` | exchange state every cycle, link state every N cycles |
//! | `ApplicationExchange` | application reads inputs / writes outputs |
//! | `Queue` | `domain_queue()` |
//! | `Send` | `send()` |
//!
//! The cancel flag is checked before `AwaitDeadline`, so a shutdown request
//! completes the current cycle instead of abandoning it mid-exchange.
//!
//! ## Ownership
//! The domain buffer is owned by the master. It is only borrowed inside
//! `ApplicationExchange`, through the `CycleContext` passed to the
//! application; the borrow ends before `domain_queue()`.

use std::sync::atomic::{AtomicBool, Ordering};

use pdx_common::master::{DomainId, FieldbusMaster};
use pdx_common::time::{CycleTimer, Timestamp};
use tracing::{info, warn};

use crate::app::{Application, CycleContext, DomainData};
use crate::clock::{CycleClock, OverrunEvent};
use crate::error::CycleError;
use crate::events::{EngineEvent, EventSink};
use crate::monitor::{ExchangeTransition, LinkTransition, StateMonitor};
use crate::registry::OffsetTable;

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    AwaitDeadline,
    SyncTime,
    Receive,
    Monitor,
    ApplicationExchange,
    Queue,
    Send,
    /// Releasing the master.
    ShuttingDown,
    /// Master released; no further cycles.
    Stopped,
}

impl Phase {
    /// No further cycles will run.
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::ShuttingDown | Self::Stopped)
    }
}

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-cycle timing statistics.
///
/// Updated every cycle with no allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleStats {
    /// Total cycles executed.
    pub cycle_count: u64,
    /// Last cycle body duration [ns].
    pub last_cycle_ns: i64,
    /// Minimum cycle body duration [ns].
    pub min_cycle_ns: i64,
    /// Maximum cycle body duration [ns].
    pub max_cycle_ns: i64,
    /// Running sum for average computation.
    pub sum_cycle_ns: i64,
    /// Maximum wake-up latency [ns] (time between deadline and actual wake).
    pub max_latency_ns: i64,
    /// Wakeups later than the tolerance.
    pub overruns: u64,
    /// Interrupted sleeps.
    pub interrupts: u64,
    /// Cycles run while link or exchange was degraded.
    pub degraded_cycles: u64,
    /// Cycles where the domain buffer was unavailable.
    pub skipped_exchanges: u64,
    /// Link transitions reported.
    pub link_transitions: u64,
    /// Exchange transitions reported.
    pub exchange_transitions: u64,
}

impl CycleStats {
    /// Create a new zeroed stats instance.
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: i64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            max_latency_ns: 0,
            overruns: 0,
            interrupts: 0,
            degraded_cycles: 0,
            skipped_exchanges: 0,
            link_transitions: 0,
            exchange_transitions: 0,
        }
    }

    /// Record one cycle. O(1), no allocation.
    #[inline]
    pub fn record(&mut self, duration_ns: i64, latency_ns: i64) {
        self.cycle_count += 1;
        self.last_cycle_ns = duration_ns;
        if duration_ns < self.min_cycle_ns {
            self.min_cycle_ns = duration_ns;
        }
        if duration_ns > self.max_cycle_ns {
            self.max_cycle_ns = duration_ns;
        }
        self.sum_cycle_ns += duration_ns;
        if latency_ns > self.max_latency_ns {
            self.max_latency_ns = latency_ns;
        }
    }

    /// Average cycle time [ns] (returns 0 if no cycles).
    #[inline]
    pub fn avg_cycle_ns(&self) -> i64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count as i64
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Exchange Loop ──────────────────────────────────────────────────

/// Result of one [`ExchangeLoop::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    /// 1-based cycle number.
    pub cycle: u64,
    /// Scheduled wakeup.
    pub deadline: Timestamp,
    /// Set when the wakeup was late.
    pub overrun: Option<OverrunEvent>,
    /// Link change observed this cycle.
    pub link: Option<LinkTransition>,
    /// Exchange change observed this cycle.
    pub exchange: Option<ExchangeTransition>,
    /// State was degraded when the application ran.
    pub degraded: bool,
    /// The application ran on the domain buffer.
    pub exchanged: bool,
}

/// Engine context: the activated master, its domain and offsets, the
/// schedule, the monitor and the event sink.
///
/// Built by [`crate::setup::setup`]. Dropping the loop releases the master
/// if [`shutdown`](Self::shutdown) was not called.
pub struct ExchangeLoop<M: FieldbusMaster, T: CycleTimer, S: EventSink> {
    master: M,
    domain: DomainId,
    offsets: OffsetTable,
    monitor: StateMonitor,
    clock: CycleClock<T>,
    sink: S,
    stats: CycleStats,
    stats_interval: u64,
    phase: Phase,
    cycle: u64,
}

impl<M: FieldbusMaster, T: CycleTimer, S: EventSink> ExchangeLoop<M, T, S> {
    /// Assemble a loop around an activated master.
    pub fn new(
        master: M,
        offsets: OffsetTable,
        monitor: StateMonitor,
        clock: CycleClock<T>,
        sink: S,
        stats_interval: u32,
    ) -> Self {
        Self {
            master,
            domain: offsets.domain(),
            offsets,
            monitor,
            clock,
            sink,
            stats: CycleStats::new(),
            stats_interval: stats_interval.max(1) as u64,
            phase: Phase::AwaitDeadline,
            cycle: 0,
        }
    }

    /// Run one full cycle.
    ///
    /// Link loss, incomplete exchanges and overruns are reported through
    /// the sink and the returned outcome, never as errors.
    ///
    /// # Errors
    /// `ShutDown` after [`shutdown`](Self::shutdown), `Clock` on clock
    /// failure.
    pub fn step<A: Application + ?Sized>(&mut self, app: &mut A) -> Result<CycleOutcome, CycleError> {
        if self.phase.is_terminal() {
            return Err(CycleError::ShutDown);
        }

        // 1. Wait for the absolute deadline.
        self.phase = Phase::AwaitDeadline;
        let tick = self.clock.next()?;
        self.cycle += 1;
        let cycle = self.cycle;

        if tick.interrupts > 0 {
            self.stats.interrupts += tick.interrupts as u64;
            self.sink.publish(EngineEvent::SleepInterrupted {
                deadline: tick.deadline,
                count: tick.interrupts,
            });
        }
        if let Some(overrun) = tick.overrun {
            self.stats.overruns += 1;
            self.sink.publish(EngineEvent::Overrun(overrun));
        }

        // 2. Distributed-clock reference: the scheduled time, not the
        // observed wakeup.
        self.phase = Phase::SyncTime;
        self.master.application_time(tick.deadline.as_nanos());

        // 3. Fetch frames and update the domain buffer.
        self.phase = Phase::Receive;
        self.master.receive();
        self.master.domain_process(self.domain);

        // 4. State monitoring.
        self.phase = Phase::Monitor;
        let exchange = self.monitor.check_exchange_state(&self.master, self.domain);
        if let Some(t) = exchange {
            self.stats.exchange_transitions += 1;
            self.sink.publish(EngineEvent::ExchangeChanged(t));
        }
        let link = if self.monitor.link_due(cycle) {
            self.monitor.check_link_state(&self.master)
        } else {
            None
        };
        if let Some(t) = link {
            self.stats.link_transitions += 1;
            self.sink.publish(EngineEvent::LinkChanged(t));
        }
        let degraded = self.monitor.is_degraded();
        if degraded {
            self.stats.degraded_cycles += 1;
        }

        // 5. Application.
        self.phase = Phase::ApplicationExchange;
        let exchanged = match self.master.domain_data(self.domain) {
            Some(bytes) => {
                let mut ctx = CycleContext {
                    data: DomainData::new(bytes),
                    offsets: &self.offsets,
                    cycle,
                    deadline: tick.deadline,
                    degraded,
                };
                app.exchange(&mut ctx);
                true
            }
            None => false,
        };
        if !exchanged {
            self.stats.skipped_exchanges += 1;
            self.sink.publish(EngineEvent::DomainUnavailable { cycle });
        }

        // 6. Queue and send.
        self.phase = Phase::Queue;
        self.master.domain_queue(self.domain);
        self.phase = Phase::Send;
        self.master.send();

        let done = self.clock.now()?;
        self.stats
            .record(done.diff_nanos(&tick.woke_at), tick.latency_ns() as i64);
        if cycle % self.stats_interval == 0 {
            self.sink.publish(EngineEvent::Statistics(self.stats.clone()));
        }

        self.phase = Phase::AwaitDeadline;
        Ok(CycleOutcome {
            cycle,
            deadline: tick.deadline,
            overrun: tick.overrun,
            link,
            exchange,
            degraded,
            exchanged,
        })
    }

    /// Run cycles until `cancel` is set, then shut down.
    ///
    /// The flag is checked before each `AwaitDeadline`.
    ///
    /// # Errors
    /// Clock failure; the master is released before returning.
    pub fn run<A: Application + ?Sized>(
        &mut self,
        app: &mut A,
        cancel: &AtomicBool,
    ) -> Result<CycleStats, CycleError> {
        self.run_until(app, cancel, None)
    }

    /// Like [`run`](Self::run), but also stops once `limit` cycles have
    /// completed in this call.
    pub fn run_until<A: Application + ?Sized>(
        &mut self,
        app: &mut A,
        cancel: &AtomicBool,
        limit: Option<u64>,
    ) -> Result<CycleStats, CycleError> {
        info!(
            "Entering exchange loop (period={}ns, tolerance={}ns)",
            self.clock.period_ns(),
            self.clock.tolerance_ns()
        );

        let start = self.cycle;
        let result = loop {
            if cancel.load(Ordering::Acquire) {
                info!("Shutdown requested after {} cycles", self.cycle);
                break Ok(());
            }
            if limit.is_some_and(|n| self.cycle - start >= n) {
                info!("Cycle limit reached after {} cycles", self.cycle);
                break Ok(());
            }
            if let Err(e) = self.step(app) {
                warn!("Exchange loop failed in cycle {}: {}", self.cycle + 1, e);
                break Err(e);
            }
        };

        self.shutdown();
        result.map(|()| self.stats.clone())
    }

    /// Run exactly `cycles` cycles without shutting down.
    pub fn run_for<A: Application + ?Sized>(
        &mut self,
        app: &mut A,
        cycles: u64,
    ) -> Result<CycleStats, CycleError> {
        for _ in 0..cycles {
            self.step(app)?;
        }
        Ok(self.stats.clone())
    }

    /// Release the master. Idempotent.
    pub fn shutdown(&mut self) {
        if self.phase == Phase::Stopped {
            return;
        }
        self.phase = Phase::ShuttingDown;
        self.master.release();
        self.sink.publish(EngineEvent::ShutDown { cycles: self.cycle });
        self.phase = Phase::Stopped;
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Cycles completed so far.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    pub fn offsets(&self) -> &OffsetTable {
        &self.offsets
    }

    pub fn domain(&self) -> DomainId {
        self.domain
    }

    pub fn monitor(&self) -> &StateMonitor {
        &self.monitor
    }

    pub fn clock(&self) -> &CycleClock<T> {
        &self.clock
    }

    pub fn master(&self) -> &M {
        &self.master
    }

    /// Mutable master access, e.g. to inject faults into a simulated bus.
    pub fn master_mut(&mut self) -> &mut M {
        &mut self.master
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}

impl<M: FieldbusMaster, T: CycleTimer, S: EventSink> Drop for ExchangeLoop<M, T, S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

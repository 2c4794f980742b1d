//! Engine events and sinks.
//!
//! The exchange loop never logs directly from its hot path; it publishes
//! [`EngineEvent`]s to an [`EventSink`]. [`TracingSink`] turns them into
//! log lines, [`ChannelSink`] hands them to another thread without ever
//! blocking the cycle, and `Vec<EngineEvent>` collects them for tests.

use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

use pdx_common::master::WcState;
use pdx_common::time::Timestamp;
use tracing::{info, warn};

use crate::clock::OverrunEvent;
use crate::cycle::CycleStats;
use crate::monitor::{ExchangeTransition, LinkTransition};

/// Something observable happened in the exchange loop.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Master link state changed.
    LinkChanged(LinkTransition),
    /// Domain exchange state changed.
    ExchangeChanged(ExchangeTransition),
    /// Wakeup later than the tolerance.
    Overrun(OverrunEvent),
    /// Sleep was interrupted and re-waited on the same deadline.
    SleepInterrupted {
        deadline: Timestamp,
        count: u32,
    },
    /// The master exposed no domain buffer; the application was skipped.
    DomainUnavailable {
        cycle: u64,
    },
    /// Periodic statistics snapshot.
    Statistics(CycleStats),
    /// Loop left; the master has been released.
    ShutDown {
        cycles: u64,
    },
}

/// Receiver of engine events. Must not block.
pub trait EventSink {
    fn publish(&mut self, event: EngineEvent);
}

impl EventSink for Vec<EngineEvent> {
    fn publish(&mut self, event: EngineEvent) {
        self.push(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn publish(&mut self, event: EngineEvent) {
        (**self).publish(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn publish(&mut self, event: EngineEvent) {
        (**self).publish(event);
    }
}

/// Logs events with `tracing`.
///
/// Overrun warnings are throttled: the first 10, then every 1000th.
#[derive(Debug, Default)]
pub struct TracingSink {
    overruns: u64,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overruns seen so far.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }
}

impl EventSink for TracingSink {
    fn publish(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::LinkChanged(t) => {
                if let Some(n) = t.slaves_responding {
                    info!("{} slave(s).", n);
                }
                if let Some(al) = t.al_states {
                    info!("AL states: 0x{:02X}.", al.bits());
                }
                if let Some(up) = t.link_up {
                    if up {
                        info!("Link is up.");
                    } else {
                        warn!("Link is down.");
                    }
                }
            }
            EngineEvent::ExchangeChanged(t) => {
                if let Some(wc) = t.working_counter {
                    info!("Domain: WC {}.", wc);
                }
                if let Some(state) = t.wc_state {
                    if state == WcState::Complete {
                        info!("Domain: State {}.", state);
                    } else {
                        warn!("Domain: State {}.", state);
                    }
                }
            }
            EngineEvent::Overrun(o) => {
                self.overruns += 1;
                if self.overruns <= 10 || self.overruns % 1000 == 0 {
                    warn!(
                        "Cycle overrun #{}: woke {}us late (deadline {}{})",
                        self.overruns,
                        o.lateness_ns / 1000,
                        o.deadline,
                        if o.missed_before_sleep {
                            ", missed before sleep"
                        } else {
                            ""
                        }
                    );
                }
            }
            EngineEvent::SleepInterrupted { deadline, count } => {
                info!("Sleep interrupted {} time(s), re-waited until {}", count, deadline);
            }
            EngineEvent::DomainUnavailable { cycle } => {
                warn!("Cycle {}: domain data unavailable, application skipped", cycle);
            }
            EngineEvent::Statistics(s) => {
                info!(
                    "Exchange loop: {} cycles, avg={}us, max={}us, max_latency={}us, overruns={}, degraded={}",
                    s.cycle_count,
                    s.avg_cycle_ns() / 1000,
                    s.max_cycle_ns / 1000,
                    s.max_latency_ns / 1000,
                    s.overruns,
                    s.degraded_cycles
                );
            }
            EngineEvent::ShutDown { cycles } => {
                info!("Exchange loop stopped after {} cycles, master released", cycles);
            }
        }
    }
}

/// Forwards events over a bounded channel.
///
/// A full or disconnected channel drops the event and counts it; the cycle
/// never waits for the consumer.
#[derive(Debug)]
pub struct ChannelSink {
    tx: SyncSender<EngineEvent>,
    dropped: u64,
}

impl ChannelSink {
    /// Create a sink with room for `capacity` pending events.
    pub fn new(capacity: usize) -> (Self, Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::sync_channel(capacity);
        (Self { tx, dropped: 0 }, rx)
    }

    /// Events dropped because the consumer was slow or gone.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl EventSink for ChannelSink {
    fn publish(&mut self, event: EngineEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
            }
        }
    }
}

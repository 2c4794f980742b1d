//! # PDX Cycle
//!
//! Fixed-period process-data exchange engine for a fieldbus master. Once per
//! cycle it wakes up on an absolute, drift-free schedule, pulls received
//! frames into the shared domain buffer, checks link and exchange state,
//! lets the application read inputs and write outputs, then queues and sends
//! the domain.
//!
//! ## Components (leaf first)
//!
//! 1. [`registry`]: PDO `(index, subindex)` → domain byte offset, resolved
//!    once before activation
//! 2. [`monitor`]: change-only link / exchange state detection
//! 3. [`clock`]: absolute wakeup schedule with overrun detection
//! 4. [`cycle`]: the exchange loop state machine
//!
//! [`setup`] builds the engine context from an `EngineConfig`, [`events`]
//! carries observability events out of the loop, [`rt`] prepares the
//! process for real-time scheduling.
//!
//! ## Cycle
//!
//! ```text
//! AwaitDeadline → SyncTime → Receive → Monitor → ApplicationExchange → Queue → Send ─┐
//!       ▲                                                                            │
//!       └────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A cancel flag is checked before `AwaitDeadline`; the loop then enters
//! `ShuttingDown` and releases the master.

pub mod app;
pub mod clock;
pub mod cycle;
pub mod error;
pub mod events;
pub mod monitor;
pub mod registry;
pub mod rt;
pub mod setup;

pub use crate::app::{Application, ConstantWriter, CycleContext, DomainData};
pub use crate::clock::{CycleClock, MonotonicClock, OverrunEvent, Tick};
pub use crate::cycle::{CycleOutcome, CycleStats, ExchangeLoop, Phase};
pub use crate::error::{ConfigurationError, CycleError};
pub use crate::events::{ChannelSink, EngineEvent, EventSink, TracingSink};
pub use crate::monitor::{ExchangeTransition, LinkTransition, StateMonitor};
pub use crate::registry::{OffsetEntry, OffsetRegistry, OffsetTable};
pub use crate::setup::setup;

//! # PDX Simulation
//!
//! Software stand-ins for the two external dependencies of the exchange
//! engine: the fieldbus master library and the monotonic clock.
//!
//! - [`master`] - `SimulatedLibrary` / `SimulatedMaster` implementing the
//!   `pdx_common::master` traits over a virtual bus of `SimulatedSlave`s
//! - [`clock`] - `SimClock` implementing `CycleTimer` on virtual time, with
//!   injectable wakeup jitter, signal interrupts and application work time
//!
//! Both are deterministic, which makes them suitable for exact scheduling
//! and change-detection tests.

#![deny(missing_docs)]

pub mod clock;
pub mod master;

pub use crate::clock::SimClock;
pub use crate::master::{SimCounters, SimProbe, SimulatedLibrary, SimulatedMaster, SimulatedSlave};

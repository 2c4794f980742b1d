//! Prelude module for common re-exports.
//!
//! ```rust
//! use pdx_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, EngineConfig, LogLevel, SharedConfig};

// ─── Master Interface ───────────────────────────────────────────────
pub use crate::master::{
    AlStates, DomainId, ExchangeStateSnapshot, FieldbusMaster, LinkStateSnapshot, MasterError,
    MasterLibrary, PdoPlacement, SlaveConfigId, SlaveIdentity, WcState,
};

// ─── Time ───────────────────────────────────────────────────────────
pub use crate::time::{CycleTimer, TimerError, Timestamp};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{DEFAULT_PERIOD_NS, NSEC_PER_SEC};

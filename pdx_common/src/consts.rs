//! System-wide constants for the PDX workspace.
//!
//! Single source of truth for numeric limits and defaults.

use static_assertions::const_assert;

/// Nanoseconds per second.
pub const NSEC_PER_SEC: i64 = 1_000_000_000;

/// Default cycle frequency (1 kHz).
pub const DEFAULT_FREQUENCY_HZ: u32 = 1000;

/// Default cycle period in nanoseconds (1 ms).
pub const DEFAULT_PERIOD_NS: u64 = NSEC_PER_SEC as u64 / DEFAULT_FREQUENCY_HZ as u64;

/// Maximum number of PDO entries registered in one domain.
pub const MAX_PDO_ENTRIES: usize = 256;

/// Maximum number of configured slaves.
pub const MAX_SLAVES: usize = 64;

/// Default link-state check cadence [cycles].
pub const DEFAULT_LINK_CHECK_INTERVAL: u32 = 1;

/// Default statistics publication interval [cycles].
pub const DEFAULT_STATS_INTERVAL: u32 = 1000;

/// Default SCHED_FIFO priority of the exchange thread.
pub const DEFAULT_RT_PRIORITY: i32 = 80;

/// Default CPU core for the exchange thread.
pub const DEFAULT_CPU_CORE: usize = 1;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/pdx/pdx.toml";

const_assert!(DEFAULT_PERIOD_NS > 0);
const_assert!(MAX_PDO_ENTRIES <= u16::MAX as usize);

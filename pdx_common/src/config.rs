//! Configuration loading traits and engine configuration.
//!
//! Every identity the exchange engine needs (master index, slave addresses,
//! vendor/product codes, PDO entries, cycle period) is supplied here at setup
//! time instead of being compiled in.
//!
//! # Usage
//!
//! ```rust,no_run
//! use pdx_common::config::{ConfigError, EngineConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = EngineConfig::load_validated(Path::new("pdx.toml"))?;
//!     println!("period: {} ns", config.cycle.period_ns());
//!     Ok(())
//! }
//! ```
//!
//! # TOML Example
//!
//! ```toml
//! [shared]
//! service_name = "pdx-cycle"
//!
//! [cycle]
//! frequency_hz = 1000
//!
//! [master]
//! index = 0
//!
//! [[slaves]]
//! alias = 69
//! position = 0
//! vendor_id = 0x0000079A
//! product_code = 0xDEADBEEF
//! entries = [{ index = 0x0005, subindex = 1 }]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::consts::{
    DEFAULT_CPU_CORE, DEFAULT_LINK_CHECK_INTERVAL, DEFAULT_PERIOD_NS, DEFAULT_RT_PRIORITY,
    DEFAULT_STATS_INTERVAL, MAX_PDO_ENTRIES, MAX_SLAVES, NSEC_PER_SEC,
};
use crate::master::SlaveIdentity;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Matching `tracing` level.
    pub const fn as_tracing(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

/// Common configuration fields shared across all PDX applications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── Engine Configuration ───────────────────────────────────────────

/// Cycle timing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CycleConfig {
    /// Cycle period [ns]. Mutually exclusive with `frequency_hz`.
    #[serde(default)]
    pub period_ns: Option<u64>,

    /// Cycle frequency [Hz]. Mutually exclusive with `period_ns`.
    #[serde(default)]
    pub frequency_hz: Option<u32>,

    /// Link-state check cadence [cycles]; 1 = every cycle.
    #[serde(default = "default_link_check_interval")]
    pub link_check_interval: u32,

    /// Wakeup lateness tolerated before an overrun is reported [ns].
    /// Defaults to a quarter of the period.
    #[serde(default)]
    pub overrun_tolerance_ns: Option<u64>,

    /// Statistics publication interval [cycles].
    #[serde(default = "default_stats_interval")]
    pub stats_interval: u32,

    /// CPU core the exchange thread is pinned to (`rt` feature).
    #[serde(default = "default_cpu_core")]
    pub cpu_core: usize,

    /// SCHED_FIFO priority (`rt` feature).
    #[serde(default = "default_rt_priority")]
    pub rt_priority: i32,
}

fn default_link_check_interval() -> u32 {
    DEFAULT_LINK_CHECK_INTERVAL
}

fn default_stats_interval() -> u32 {
    DEFAULT_STATS_INTERVAL
}

fn default_cpu_core() -> usize {
    DEFAULT_CPU_CORE
}

fn default_rt_priority() -> i32 {
    DEFAULT_RT_PRIORITY
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            period_ns: None,
            frequency_hz: None,
            link_check_interval: DEFAULT_LINK_CHECK_INTERVAL,
            overrun_tolerance_ns: None,
            stats_interval: DEFAULT_STATS_INTERVAL,
            cpu_core: DEFAULT_CPU_CORE,
            rt_priority: DEFAULT_RT_PRIORITY,
        }
    }
}

impl CycleConfig {
    /// Effective cycle period [ns].
    pub fn period_ns(&self) -> u64 {
        match (self.period_ns, self.frequency_hz) {
            (Some(p), _) => p,
            (None, Some(f)) if f > 0 => NSEC_PER_SEC as u64 / f as u64,
            _ => DEFAULT_PERIOD_NS,
        }
    }

    /// Effective overrun tolerance [ns].
    pub fn overrun_tolerance_ns(&self) -> u64 {
        self.overrun_tolerance_ns
            .unwrap_or_else(|| self.period_ns() / 4)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.period_ns.is_some() && self.frequency_hz.is_some() {
            return Err(ConfigError::ValidationError(
                "cycle: set either period_ns or frequency_hz, not both".to_string(),
            ));
        }
        if self.period_ns == Some(0) || self.frequency_hz == Some(0) {
            return Err(ConfigError::ValidationError(
                "cycle: period must be > 0".to_string(),
            ));
        }
        if let Some(f) = self.frequency_hz {
            if f as i64 > NSEC_PER_SEC {
                return Err(ConfigError::ValidationError(format!(
                    "cycle: frequency {f} Hz is above 1 GHz"
                )));
            }
        }
        if self.link_check_interval == 0 {
            return Err(ConfigError::ValidationError(
                "cycle: link_check_interval must be >= 1".to_string(),
            ));
        }
        if self.stats_interval == 0 {
            return Err(ConfigError::ValidationError(
                "cycle: stats_interval must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Master selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MasterConfig {
    /// Master index passed to `request_master`.
    #[serde(default)]
    pub index: u32,
}

/// Data direction of a PDO entry, seen from the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PdoDirection {
    /// Master → slave (RxPDO).
    #[default]
    Output,
    /// Slave → master (TxPDO).
    Input,
}

/// One PDO entry to register in the domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PdoEntryConfig {
    /// Object index.
    pub index: u16,
    /// Object subindex.
    pub subindex: u8,
    /// Entry size [bits].
    #[serde(default = "default_bit_length")]
    pub bit_length: u16,
    /// Data direction.
    #[serde(default)]
    pub direction: PdoDirection,
    /// Entry may share bits with an earlier registration.
    #[serde(default)]
    pub aliased: bool,
}

fn default_bit_length() -> u16 {
    8
}

/// One slave to configure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlaveConfig {
    /// Station alias.
    #[serde(default)]
    pub alias: u16,
    /// Position relative to the alias.
    pub position: u16,
    /// Expected vendor ID.
    pub vendor_id: u32,
    /// Expected product code.
    pub product_code: u32,
    /// PDO entries registered in the domain.
    #[serde(default)]
    pub entries: Vec<PdoEntryConfig>,
}

impl SlaveConfig {
    /// Bus address and identity of this slave.
    pub const fn identity(&self) -> SlaveIdentity {
        SlaveIdentity {
            alias: self.alias,
            position: self.position,
            vendor_id: self.vendor_id,
            product_code: self.product_code,
        }
    }
}

/// Parameters of the bundled constant-output application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplicationConfig {
    /// Object index of the output entry.
    pub index: u16,
    /// Object subindex of the output entry.
    pub subindex: u8,
    /// Alias of the owning slave; any alias if unset.
    #[serde(default)]
    pub alias: Option<u16>,
    /// Position of the owning slave; any position if unset.
    #[serde(default)]
    pub position: Option<u16>,
    /// Byte written every cycle.
    #[serde(default = "default_output_value")]
    pub value: u8,
}

fn default_output_value() -> u8 {
    0x66
}

impl ApplicationConfig {
    /// Whether `slave` is selected by the configured address.
    pub fn selects(&self, slave: &SlaveConfig) -> bool {
        self.alias.is_none_or(|a| a == slave.alias)
            && self.position.is_none_or(|p| p == slave.position)
    }
}

/// Complete exchange engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Common fields.
    pub shared: SharedConfig,
    /// Cycle timing.
    #[serde(default)]
    pub cycle: CycleConfig,
    /// Master selection.
    #[serde(default)]
    pub master: MasterConfig,
    /// Slaves and their PDO entries.
    #[serde(default)]
    pub slaves: Vec<SlaveConfig>,
    /// Optional constant-output application.
    #[serde(default)]
    pub application: Option<ApplicationConfig>,
}

impl EngineConfig {
    /// Parse from a TOML string and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file and validate.
    pub fn load_validated(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        debug!(
            "Loaded engine config from {:?}: {} slaves, period={}ns",
            path,
            config.slaves.len(),
            config.cycle.period_ns()
        );
        Ok(config)
    }

    /// Number of PDO entries over all slaves.
    pub fn entry_count(&self) -> usize {
        self.slaves.iter().map(|s| s.entries.len()).sum()
    }

    /// Index into `slaves` of the slave the application writes to: the
    /// first selected slave that maps the entry as an output.
    pub fn application_slave(&self) -> Option<usize> {
        let app = self.application.as_ref()?;
        self.slaves.iter().position(|s| {
            app.selects(s)
                && s.entries.iter().any(|e| {
                    e.index == app.index
                        && e.subindex == app.subindex
                        && e.direction == PdoDirection::Output
                })
        })
    }

    /// Semantic validation.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `shared` or `cycle` is invalid
    /// - more than `MAX_SLAVES` slaves or `MAX_PDO_ENTRIES` entries are configured
    /// - two slaves share the same `(alias, position)` address
    /// - an entry has a bit length outside `1..=64`
    /// - the application entry is not an output of the selected slave
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.cycle.validate()?;

        if self.slaves.len() > MAX_SLAVES {
            return Err(ConfigError::ValidationError(format!(
                "{} slaves configured, maximum is {MAX_SLAVES}",
                self.slaves.len()
            )));
        }
        if self.entry_count() > MAX_PDO_ENTRIES {
            return Err(ConfigError::ValidationError(format!(
                "{} PDO entries configured, maximum is {MAX_PDO_ENTRIES}",
                self.entry_count()
            )));
        }

        let mut addresses = HashSet::new();
        for slave in &self.slaves {
            if !addresses.insert((slave.alias, slave.position)) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate slave address {}:{}",
                    slave.alias, slave.position
                )));
            }
            for entry in &slave.entries {
                if entry.bit_length == 0 || entry.bit_length > 64 {
                    return Err(ConfigError::ValidationError(format!(
                        "PDO entry 0x{:04X}:{} has bit_length {} (must be 1..=64)",
                        entry.index, entry.subindex, entry.bit_length
                    )));
                }
            }
        }

        if let Some(app) = &self.application
            && self.application_slave().is_none()
        {
            return Err(ConfigError::ValidationError(format!(
                "application entry 0x{:04X}:{} is not a configured output",
                app.index, app.subindex
            )));
        }
        Ok(())
    }
}

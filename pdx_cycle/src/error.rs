//! Error types of the exchange engine.
//!
//! Setup failures are fatal and name the step that failed
//! (`ConfigurationError`). Steady-state anomalies are never errors: they are
//! published as `EngineEvent`s. `CycleError` only covers platform failures
//! that make further cycles impossible.

use pdx_common::master::{DomainId, MasterError, SlaveIdentity};
use pdx_common::time::TimerError;
use thiserror::Error;

/// Fatal setup-time error. Never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// `request_master` returned nothing.
    #[error("master {index} not found")]
    MasterNotFound {
        /// Requested master index.
        index: u32,
    },

    /// Domain creation failed.
    #[error("domain creation failed: {0}")]
    DomainCreation(MasterError),

    /// A slave could not be configured.
    #[error("slave {identity} configuration failed: {source}")]
    SlaveConfiguration {
        /// Requested slave.
        identity: SlaveIdentity,
        /// Master library error.
        source: MasterError,
    },

    /// A PDO entry could not be resolved to an offset.
    #[error("PDO entry 0x{index:04X}:{subindex} unresolved: {source}")]
    PdoUnresolved {
        /// Object index.
        index: u16,
        /// Object subindex.
        subindex: u8,
        /// Master library error.
        source: MasterError,
    },

    /// A PDO entry overlaps an earlier one without being declared aliased.
    #[error(
        "PDO entry 0x{index:04X}:{subindex} overlaps 0x{other_index:04X}:{other_subindex} at byte {byte_offset}"
    )]
    PdoOverlap {
        /// Object index of the new entry.
        index: u16,
        /// Object subindex of the new entry.
        subindex: u8,
        /// Object index of the existing entry.
        other_index: u16,
        /// Object subindex of the existing entry.
        other_subindex: u8,
        /// Byte offset of the new entry.
        byte_offset: usize,
    },

    /// The offset registry has no room for another entry.
    #[error("offset registry full ({capacity} entries)")]
    RegistryFull {
        /// Registry capacity.
        capacity: usize,
    },

    /// Master activation failed.
    #[error("master activation failed: {0}")]
    Activation(MasterError),

    /// The activated master exposes no buffer for the domain.
    #[error("domain {0} data unavailable after activation")]
    DomainDataUnavailable(DomainId),

    /// A resolved entry lies outside the activated domain.
    #[error(
        "PDO entry 0x{index:04X}:{subindex} ends at byte {end} beyond domain size {domain_len}"
    )]
    OffsetOutOfBounds {
        /// Object index.
        index: u16,
        /// Object subindex.
        subindex: u8,
        /// One past the last byte of the entry.
        end: usize,
        /// Domain size [bytes].
        domain_len: usize,
    },
}

/// Error that stops the exchange loop.
#[derive(Debug, Error)]
pub enum CycleError {
    /// RT process setup failed.
    #[error("RT setup error: {0}")]
    RtSetup(String),

    /// The clock or sleep primitive failed (other than EINTR).
    #[error("clock failure: {0}")]
    Clock(#[from] TimerError),

    /// The loop was already shut down and its master released.
    #[error("exchange loop already shut down")]
    ShutDown,
}

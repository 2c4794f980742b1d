//! Fieldbus master collaborator interface.
//!
//! This module defines:
//! - `MasterLibrary` trait - entry point that hands out master reservations
//! - `FieldbusMaster` trait - narrow synchronous API of one reserved master
//! - `MasterError` enum - failures reported by the master library
//! - Link and exchange state snapshots read every cycle
//!
//! The exchange engine never talks to the network itself; everything below
//! the process image (frame assembly, slave state machines, device
//! discovery) lives behind these traits.

use bitflags::bitflags;
use core::fmt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types reported by a fieldbus master implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MasterError {
    /// No slave matches the requested bus address.
    #[error("no slave at alias {alias}, position {position}")]
    SlaveNotFound {
        /// Configured station alias.
        alias: u16,
        /// Position relative to the alias.
        position: u16,
    },

    /// The slave found at the address has a different identity.
    #[error("slave identity mismatch: expected {expected}, found {found}")]
    IdentityMismatch {
        /// Identity requested by the configuration.
        expected: SlaveIdentity,
        /// Identity reported on the bus.
        found: SlaveIdentity,
    },

    /// The PDO entry is not part of the slave's process data mapping.
    #[error("PDO entry 0x{index:04X}:{subindex} is not mapped")]
    UnknownEntry {
        /// Object index.
        index: u16,
        /// Object subindex.
        subindex: u8,
    },

    /// The handle does not refer to a known domain.
    #[error("unknown domain {0}")]
    UnknownDomain(DomainId),

    /// The handle does not refer to a known slave configuration.
    #[error("unknown slave configuration {0}")]
    UnknownSlaveConfig(SlaveConfigId),

    /// The operation is only valid before activation.
    #[error("master already activated")]
    AlreadyActive,

    /// Generic failure reported by the master library.
    #[error("master error: {0}")]
    Other(String),
}

/// Domain handle returned by [`FieldbusMaster::create_domain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomainId(pub usize);

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Slave configuration handle returned by [`FieldbusMaster::configure_slave`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlaveConfigId(pub usize);

impl fmt::Display for SlaveConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Bus address and expected identity of a slave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlaveIdentity {
    /// Station alias (0 = address by absolute position).
    pub alias: u16,
    /// Position relative to the alias.
    pub position: u16,
    /// Expected vendor ID.
    pub vendor_id: u32,
    /// Expected product code.
    pub product_code: u32,
}

impl fmt::Display for SlaveIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} (vendor 0x{:08X}, product 0x{:08X})",
            self.alias, self.position, self.vendor_id, self.product_code
        )
    }
}

/// Location of a registered PDO entry inside the domain process image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdoPlacement {
    /// Byte offset from the start of the domain buffer.
    pub byte_offset: usize,
    /// Bit position inside the first byte (0 for byte-aligned entries).
    pub bit_position: u8,
    /// Entry size in bits.
    pub bit_length: u16,
}

bitflags! {
    /// Application-layer states present on the bus (OR over all slaves).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AlStates: u8 {
        /// INIT
        const INIT   = 0x01;
        /// PREOP
        const PREOP  = 0x02;
        /// SAFEOP
        const SAFEOP = 0x04;
        /// OP
        const OP     = 0x08;
    }
}

/// Master-level link snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStateSnapshot {
    /// Number of slaves answering on the bus.
    pub slaves_responding: u32,
    /// Application-layer states of all slaves (OR'ed).
    pub al_states: AlStates,
    /// Physical link status.
    pub link_up: bool,
}

/// Working counter interpretation of the last domain exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WcState {
    /// No registered process data was exchanged.
    #[default]
    Zero,
    /// Some, but not all, process data was exchanged.
    Incomplete,
    /// All registered process data was exchanged.
    Complete,
}

impl fmt::Display for WcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Zero => "zero",
            Self::Incomplete => "incomplete",
            Self::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// Domain-level exchange snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExchangeStateSnapshot {
    /// Working counter of the last processed frame.
    pub working_counter: u32,
    /// Working counter state.
    pub wc_state: WcState,
}

/// One reserved fieldbus master.
///
/// # Lifecycle
///
/// 1. Configuration: `create_domain()`, `configure_slave()`, `register_pdo_entry()`
/// 2. `activate()` - the domain layout is frozen, `domain_data()` becomes valid
/// 3. Cyclic: `application_time()`, `receive()`, `domain_process()`,
///    `domain_queue()`, `send()`, `master_state()`, `domain_state()`
/// 4. `release()` - deactivate and give the reservation back
///
/// # Timing Contracts
///
/// | Operation | RT Constraint |
/// |-----------|---------------|
/// | configuration, `activate()` | None (pre-RT) |
/// | cyclic operations | **HARD**, must not block |
/// | `release()` | None (post-RT) |
pub trait FieldbusMaster {
    /// Create a process data domain.
    fn create_domain(&mut self) -> Result<DomainId, MasterError>;

    /// Create a configuration for the slave at the given address.
    fn configure_slave(&mut self, identity: SlaveIdentity) -> Result<SlaveConfigId, MasterError>;

    /// Register a PDO entry of a configured slave in a domain.
    fn register_pdo_entry(
        &mut self,
        slave: SlaveConfigId,
        index: u16,
        subindex: u8,
        domain: DomainId,
    ) -> Result<PdoPlacement, MasterError>;

    /// Finish configuration and start cyclic operation.
    fn activate(&mut self) -> Result<(), MasterError>;

    /// Process image of a domain. `None` before activation or for unknown domains.
    fn domain_data(&mut self, domain: DomainId) -> Option<&mut [u8]>;

    /// Publish the application time base [ns].
    fn application_time(&mut self, app_time_ns: u64);

    /// Fetch received frames from the network device.
    fn receive(&mut self);

    /// Evaluate received frames of a domain into its process image.
    fn domain_process(&mut self, domain: DomainId);

    /// Queue the domain's process image for the next send.
    fn domain_queue(&mut self, domain: DomainId);

    /// Send all queued frames.
    fn send(&mut self);

    /// Current link snapshot.
    fn master_state(&self) -> LinkStateSnapshot;

    /// Current exchange snapshot of a domain.
    fn domain_state(&self, domain: DomainId) -> ExchangeStateSnapshot;

    /// Deactivate (if active) and release the reservation.
    fn release(&mut self);
}

/// Entry point of a master library: hands out master reservations by index.
pub trait MasterLibrary {
    /// Master type handed out by this library.
    type Master: FieldbusMaster;

    /// Reserve master `index`. `None` if no such master exists or it is taken.
    fn request_master(&mut self, index: u32) -> Option<Self::Master>;
}

impl<M: FieldbusMaster + ?Sized> FieldbusMaster for Box<M> {
    fn create_domain(&mut self) -> Result<DomainId, MasterError> {
        (**self).create_domain()
    }

    fn configure_slave(&mut self, identity: SlaveIdentity) -> Result<SlaveConfigId, MasterError> {
        (**self).configure_slave(identity)
    }

    fn register_pdo_entry(
        &mut self,
        slave: SlaveConfigId,
        index: u16,
        subindex: u8,
        domain: DomainId,
    ) -> Result<PdoPlacement, MasterError> {
        (**self).register_pdo_entry(slave, index, subindex, domain)
    }

    fn activate(&mut self) -> Result<(), MasterError> {
        (**self).activate()
    }

    fn domain_data(&mut self, domain: DomainId) -> Option<&mut [u8]> {
        (**self).domain_data(domain)
    }

    fn application_time(&mut self, app_time_ns: u64) {
        (**self).application_time(app_time_ns)
    }

    fn receive(&mut self) {
        (**self).receive()
    }

    fn domain_process(&mut self, domain: DomainId) {
        (**self).domain_process(domain)
    }

    fn domain_queue(&mut self, domain: DomainId) {
        (**self).domain_queue(domain)
    }

    fn send(&mut self) {
        (**self).send()
    }

    fn master_state(&self) -> LinkStateSnapshot {
        (**self).master_state()
    }

    fn domain_state(&self, domain: DomainId) -> ExchangeStateSnapshot {
        (**self).domain_state(domain)
    }

    fn release(&mut self) {
        (**self).release()
    }
}

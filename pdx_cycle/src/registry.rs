//! PDO offset registry.
//!
//! Maps `(slave, index, subindex)` to the byte offset of the entry inside
//! the domain buffer. Registration happens once, before activation; the
//! registry is then sealed against the activated domain size into an
//! immutable [`OffsetTable`] that the cycle reads without locking.
//!
//! Storage is a fixed-capacity `heapless::Vec`, so the table never
//! allocates and its size is bounded by [`MAX_PDO_ENTRIES`].

use core::ops::Range;

use heapless::Vec as HVec;
use pdx_common::consts::{MAX_PDO_ENTRIES, MAX_SLAVES};
use pdx_common::master::{DomainId, FieldbusMaster, SlaveConfigId};
use tracing::debug;

use crate::error::ConfigurationError;

/// One resolved PDO entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetEntry {
    /// Owning slave configuration.
    pub slave: SlaveConfigId,
    /// Object index.
    pub index: u16,
    /// Object subindex.
    pub subindex: u8,
    /// Byte offset inside the domain buffer.
    pub byte_offset: usize,
    /// Bit position inside the first byte.
    pub bit_position: u8,
    /// Entry size [bits].
    pub bit_length: u16,
    /// Registered with [`OffsetRegistry::register_aliased`].
    pub aliased: bool,
}

impl OffsetEntry {
    /// Absolute bit range covered inside the domain.
    #[inline]
    pub fn bit_range(&self) -> Range<usize> {
        let start = self.byte_offset * 8 + self.bit_position as usize;
        start..start + self.bit_length as usize
    }

    /// Number of bytes touched, starting at `byte_offset`.
    #[inline]
    pub fn byte_len(&self) -> usize {
        (self.bit_position as usize + self.bit_length as usize).div_ceil(8)
    }

    /// One past the last byte touched.
    #[inline]
    pub fn end(&self) -> usize {
        self.byte_offset + self.byte_len()
    }

    fn overlaps(&self, other: &Self) -> bool {
        let (a, b) = (self.bit_range(), other.bit_range());
        a.start < b.end && b.start < a.end
    }

    fn is_same(&self, slave: SlaveConfigId, index: u16, subindex: u8) -> bool {
        self.slave == slave && self.index == index && self.subindex == subindex
    }
}

/// Mutable registry used during setup.
#[derive(Debug)]
pub struct OffsetRegistry {
    domain: DomainId,
    slaves: HVec<SlaveConfigId, MAX_SLAVES>,
    entries: HVec<OffsetEntry, MAX_PDO_ENTRIES>,
}

impl OffsetRegistry {
    /// Create an empty registry for `domain`.
    pub fn new(domain: DomainId) -> Self {
        Self {
            domain,
            slaves: HVec::new(),
            entries: HVec::new(),
        }
    }

    pub fn domain(&self) -> DomainId {
        self.domain
    }

    /// Record a configured slave. Slaves are numbered in the order they
    /// are added, matching the order of the configuration.
    pub fn add_slave(&mut self, slave: SlaveConfigId) -> Result<(), ConfigurationError> {
        self.slaves
            .push(slave)
            .map_err(|_| ConfigurationError::RegistryFull {
                capacity: MAX_SLAVES,
            })
    }

    /// Resolve an entry and return its byte offset.
    ///
    /// Registering the same `(slave, index, subindex)` again returns the
    /// existing offset without asking the master.
    ///
    /// # Errors
    /// `PdoUnresolved` if the master does not map the entry, `PdoOverlap`
    /// if it shares bits with an earlier entry, `RegistryFull` when
    /// capacity is exhausted.
    pub fn register<M: FieldbusMaster + ?Sized>(
        &mut self,
        master: &mut M,
        slave: SlaveConfigId,
        index: u16,
        subindex: u8,
    ) -> Result<usize, ConfigurationError> {
        self.register_entry(master, slave, index, subindex, false)
    }

    /// Like [`register`](Self::register), but the entry may share bytes
    /// with other entries (e.g. a status word also mapped bit by bit).
    pub fn register_aliased<M: FieldbusMaster + ?Sized>(
        &mut self,
        master: &mut M,
        slave: SlaveConfigId,
        index: u16,
        subindex: u8,
    ) -> Result<usize, ConfigurationError> {
        self.register_entry(master, slave, index, subindex, true)
    }

    fn register_entry<M: FieldbusMaster + ?Sized>(
        &mut self,
        master: &mut M,
        slave: SlaveConfigId,
        index: u16,
        subindex: u8,
        aliased: bool,
    ) -> Result<usize, ConfigurationError> {
        if let Some(existing) = self.entries.iter().find(|e| e.is_same(slave, index, subindex)) {
            return Ok(existing.byte_offset);
        }
        if self.entries.is_full() {
            return Err(ConfigurationError::RegistryFull {
                capacity: MAX_PDO_ENTRIES,
            });
        }

        let placement = master
            .register_pdo_entry(slave, index, subindex, self.domain)
            .map_err(|source| ConfigurationError::PdoUnresolved {
                index,
                subindex,
                source,
            })?;

        let entry = OffsetEntry {
            slave,
            index,
            subindex,
            byte_offset: placement.byte_offset,
            bit_position: placement.bit_position,
            bit_length: placement.bit_length,
            aliased,
        };

        if !aliased
            && let Some(other) = self
                .entries
                .iter()
                .find(|e| !e.aliased && e.overlaps(&entry))
        {
            return Err(ConfigurationError::PdoOverlap {
                index,
                subindex,
                other_index: other.index,
                other_subindex: other.subindex,
                byte_offset: entry.byte_offset,
            });
        }

        self.entries
            .push(entry)
            .map_err(|_| ConfigurationError::RegistryFull {
                capacity: MAX_PDO_ENTRIES,
            })?;

        debug!(
            "PDO 0x{:04X}:{} of slave {} -> byte {} bit {} ({} bits)",
            index, subindex, slave, entry.byte_offset, entry.bit_position, entry.bit_length
        );
        Ok(entry.byte_offset)
    }

    /// Offset of a registered entry (any slave).
    pub fn offset(&self, index: u16, subindex: u8) -> Option<usize> {
        find(&self.entries, index, subindex).map(|e| e.byte_offset)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check every entry against the activated domain size and freeze the
    /// registry.
    ///
    /// # Errors
    /// `OffsetOutOfBounds` for the first entry that does not fit.
    pub fn seal(self, domain_len: usize) -> Result<OffsetTable, ConfigurationError> {
        if let Some(e) = self.entries.iter().find(|e| e.end() > domain_len) {
            return Err(ConfigurationError::OffsetOutOfBounds {
                index: e.index,
                subindex: e.subindex,
                end: e.end(),
                domain_len,
            });
        }
        Ok(OffsetTable {
            domain: self.domain,
            domain_len,
            slaves: self.slaves,
            entries: self.entries,
        })
    }
}

/// Immutable offset table, valid for the activated domain.
#[derive(Debug, Clone)]
pub struct OffsetTable {
    domain: DomainId,
    domain_len: usize,
    slaves: HVec<SlaveConfigId, MAX_SLAVES>,
    entries: HVec<OffsetEntry, MAX_PDO_ENTRIES>,
}

impl OffsetTable {
    /// Byte offset of the first entry matching `index:subindex`.
    #[inline]
    pub fn offset(&self, index: u16, subindex: u8) -> Option<usize> {
        self.entry(index, subindex).map(|e| e.byte_offset)
    }

    #[inline]
    pub fn entry(&self, index: u16, subindex: u8) -> Option<&OffsetEntry> {
        find(&self.entries, index, subindex)
    }

    /// Entry of a specific slave.
    pub fn slave_entry(&self, slave: SlaveConfigId, index: u16, subindex: u8) -> Option<&OffsetEntry> {
        self.entries.iter().find(|e| e.is_same(slave, index, subindex))
    }

    /// Handle of the `n`-th configured slave.
    pub fn slave(&self, n: usize) -> Option<SlaveConfigId> {
        self.slaves.get(n).copied()
    }

    pub fn entries(&self) -> &[OffsetEntry] {
        &self.entries
    }

    pub fn domain(&self) -> DomainId {
        self.domain
    }

    /// Domain size [bytes] the table was sealed against.
    pub fn domain_len(&self) -> usize {
        self.domain_len
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn find(entries: &[OffsetEntry], index: u16, subindex: u8) -> Option<&OffsetEntry> {
    entries
        .iter()
        .find(|e| e.index == index && e.subindex == subindex)
}

//! Application hook.
//!
//! The application runs once per cycle, in `ApplicationExchange`, with
//! exclusive access to the domain buffer. Inputs in the buffer are fresh
//! from the frame processed in the same cycle; outputs written here are
//! queued right after the hook returns.

use pdx_common::config::EngineConfig;
use pdx_common::time::Timestamp;

use crate::registry::OffsetTable;

/// Little-endian view over the domain process image.
///
/// Accessors panic on out-of-range offsets like slice indexing does;
/// offsets from a sealed [`OffsetTable`] are always in range.
#[derive(Debug)]
pub struct DomainData<'a> {
    bytes: &'a mut [u8],
}

macro_rules! le_accessors {
    ($($ty:ty => $read:ident, $write:ident;)*) => {
        $(
            #[doc = concat!("Read a little-endian `", stringify!($ty), "` at `offset`.")]
            #[inline]
            pub fn $read(&self, offset: usize) -> $ty {
                const N: usize = core::mem::size_of::<$ty>();
                let mut raw = [0u8; N];
                raw.copy_from_slice(&self.bytes[offset..offset + N]);
                <$ty>::from_le_bytes(raw)
            }

            #[doc = concat!("Write a little-endian `", stringify!($ty), "` at `offset`.")]
            #[inline]
            pub fn $write(&mut self, offset: usize, value: $ty) {
                const N: usize = core::mem::size_of::<$ty>();
                self.bytes[offset..offset + N].copy_from_slice(&value.to_le_bytes());
            }
        )*
    };
}

impl<'a> DomainData<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &*self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut *self.bytes
    }

    le_accessors! {
        u8 => read_u8, write_u8;
        i8 => read_i8, write_i8;
        u16 => read_u16, write_u16;
        i16 => read_i16, write_i16;
        u32 => read_u32, write_u32;
        i32 => read_i32, write_i32;
        u64 => read_u64, write_u64;
    }

    /// Read bit `bit` (0..8) of the byte at `offset`.
    #[inline]
    pub fn read_bit(&self, offset: usize, bit: u8) -> bool {
        debug_assert!(bit < 8);
        self.bytes[offset] & (1 << bit) != 0
    }

    /// Set or clear bit `bit` (0..8) of the byte at `offset`.
    #[inline]
    pub fn write_bit(&mut self, offset: usize, bit: u8, value: bool) {
        debug_assert!(bit < 8);
        if value {
            self.bytes[offset] |= 1 << bit;
        } else {
            self.bytes[offset] &= !(1 << bit);
        }
    }
}

/// Per-cycle view handed to the application.
#[derive(Debug)]
pub struct CycleContext<'a> {
    /// Domain process image.
    pub data: DomainData<'a>,
    /// Resolved PDO offsets.
    pub offsets: &'a OffsetTable,
    /// 1-based cycle number.
    pub cycle: u64,
    /// Scheduled wakeup of this cycle; also the application time sent to
    /// the master.
    pub deadline: Timestamp,
    /// Link or exchange state is not nominal; inputs may be stale.
    pub degraded: bool,
}

/// Per-cycle application logic.
///
/// Closures `FnMut(&mut CycleContext)` implement it too.
pub trait Application {
    fn exchange(&mut self, ctx: &mut CycleContext<'_>);
}

impl<F> Application for F
where
    F: FnMut(&mut CycleContext<'_>),
{
    fn exchange(&mut self, ctx: &mut CycleContext<'_>) {
        self(ctx)
    }
}

/// Writes the same byte to one output every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantWriter {
    offset: usize,
    value: u8,
}

impl ConstantWriter {
    pub const fn new(offset: usize, value: u8) -> Self {
        Self { offset, value }
    }

    /// Resolve the `[application]` entry on the slave that maps it as an
    /// output. `None` without an application section or if the entry was
    /// never registered.
    pub fn from_config(config: &EngineConfig, offsets: &OffsetTable) -> Option<Self> {
        let app = config.application.as_ref()?;
        let slave = offsets.slave(config.application_slave()?)?;
        offsets
            .slave_entry(slave, app.index, app.subindex)
            .map(|entry| Self::new(entry.byte_offset, app.value))
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn value(&self) -> u8 {
        self.value
    }
}

impl Application for ConstantWriter {
    #[inline]
    fn exchange(&mut self, ctx: &mut CycleContext<'_>) {
        ctx.data.write_u8(self.offset, self.value);
    }
}

//! The byte-addressed non-volatile storage boundary and its layout.
//!
//! Storage starts with the tip-table region (one 32-byte chunk per two tip
//! records), followed by the 32-byte-aligned configuration record. The
//! concrete backend is an EEPROM driver in firmware and [`MemStorage`] on
//! the host.

use crate::config::records::{CONFIG_SIZE, TIP_RECORD_SIZE};
use crate::config::tips::TIP_COUNT;

/// Size of one storage chunk, holding two tip records.
pub const CHUNK_SIZE: usize = 32;

/// Number of chunks in the tip-table region.
pub const TIP_CHUNK_COUNT: usize = TIP_COUNT.div_ceil(2);

/// Number of tip-record slots in the tip-table region.
pub const TIP_SLOT_COUNT: usize = TIP_CHUNK_COUNT * 2;

/// Address of the configuration record: the 32-byte boundary right after
/// the tip-table region.
pub const CONFIG_ADDR: u32 = (TIP_CHUNK_COUNT * CHUNK_SIZE) as u32;

/// Total bytes the core expects the backend to provide.
pub const STORAGE_SIZE: usize = TIP_CHUNK_COUNT * CHUNK_SIZE + CONFIG_SIZE;

/// Address of a tip-record slot.
pub const fn tip_slot_addr(slot: u8) -> u32 {
    slot as u32 * TIP_RECORD_SIZE as u32
}

/// Failures at the storage boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// The access reaches past the end of the backing storage.
    OutOfBounds,
    /// The backing bus or device failed.
    Bus,
}

/// A byte-addressed non-volatile storage backend.
///
/// A write of one record must be presented to the backend as a single call,
/// so a reader that re-validates checksums never sees a half-written record
/// as valid.
pub trait Storage {
    /// Read `buf.len()` bytes starting at `addr`.
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Write `data` starting at `addr`.
    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), StorageError>;
}

/// An in-memory backend for host tests and emulators.
pub struct MemStorage {
    data: [u8; STORAGE_SIZE],
}

impl MemStorage {
    /// Blank (all-zero) storage, as an unprogrammed part would read.
    pub const fn new() -> Self {
        Self {
            data: [0; STORAGE_SIZE],
        }
    }

    /// The raw backing bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the raw backing bytes, for corruption scenarios.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Default for MemStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemStorage {
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        let start = addr as usize;
        let end = start
            .checked_add(buf.len())
            .ok_or(StorageError::OutOfBounds)?;
        if end > STORAGE_SIZE {
            return Err(StorageError::OutOfBounds);
        }
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), StorageError> {
        let start = addr as usize;
        let end = start
            .checked_add(data.len())
            .ok_or(StorageError::OutOfBounds)?;
        if end > STORAGE_SIZE {
            return Err(StorageError::OutOfBounds);
        }
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }
}

//! Persistent settings block in a raw flash partition.
//!
//! The controller's settings live in one fixed-size block at offset 0 of a
//! dedicated data partition. Saving erases the whole sector and programs the
//! block again, as one logical unit.
//!
//! # Flash writes and the UART interrupt
//!
//! The UART interrupt is not IRAM-safe (see
//! [`UART_INTR_IRAM_SAFE`](crate::config::UART_INTR_IRAM_SAFE)), so IDF holds
//! it off while the sector is erased or programmed. Bytes arriving in that
//! window wait in the hardware FIFO; if it fills they are lost and counted
//! as a FIFO overrun. [`SettingsStore::write`] also swaps in
//! [`filter_realtime`] for the duration and puts the previous handler back
//! afterwards, whatever the outcome.

use crate::config::SETTINGS_PARTITION;
use crate::error::StoreError;
use crate::realtime::{filter_realtime, HandlerOverride, RealtimeRedirect};

#[cfg(target_os = "espidf")]
pub use esp::{EspPartition, EspPartitionTable};

/// Flash erase granularity.
pub const SECTOR_SIZE: usize = 4096;

/// A region of raw flash.
pub trait FlashRegion {
    /// Read `dest.len()` bytes at `offset`.
    fn read(&self, offset: usize, dest: &mut [u8]) -> Result<(), StoreError>;

    /// Erase `len` bytes at `offset` (sector aligned).
    fn erase(&mut self, offset: usize, len: usize) -> Result<(), StoreError>;

    /// Program `source` at `offset` (must be erased).
    fn write(&mut self, offset: usize, source: &[u8]) -> Result<(), StoreError>;
}

/// Lookup of flash regions by partition label.
pub trait PartitionTable {
    type Region: FlashRegion;

    /// First data partition with `label`.
    fn find(&self, label: &str) -> Option<Self::Region>;
}

/// Settings block of `SIZE` bytes.
pub struct SettingsStore<T: PartitionTable, const SIZE: usize> {
    table: T,
    region: Option<T::Region>,
}

impl<T: PartitionTable, const SIZE: usize> SettingsStore<T, SIZE> {
    /// Create a store; nothing is looked up until [`SettingsStore::init`].
    pub fn new(table: T) -> Self {
        const { assert!(SIZE <= SECTOR_SIZE, "Settings must fit one flash sector") };

        Self { table, region: None }
    }

    /// Locate the settings partition.
    pub fn init(&mut self) -> Result<(), StoreError> {
        self.region = self.table.find(SETTINGS_PARTITION);

        if self.region.is_none() {
            log::warn!("settings partition '{}' not found", SETTINGS_PARTITION);
            return Err(StoreError::NoPartition);
        }

        Ok(())
    }

    /// Check if a backing partition is known.
    pub fn is_available(&self) -> bool {
        self.region.is_some()
    }

    /// Load the settings block.
    ///
    /// A failed read drops the partition: later reads and writes fail with
    /// [`StoreError::NoPartition`] and the caller runs on defaults.
    pub fn read(&mut self, dest: &mut [u8; SIZE]) -> Result<(), StoreError> {
        let region = self.region.as_ref().ok_or(StoreError::NoPartition)?;

        if let Err(e) = region.read(0, dest) {
            log::error!("settings read failed: {}", e);
            self.region = None;
            return Err(e);
        }

        Ok(())
    }

    /// Erase and program the settings block.
    ///
    /// `stream` is the stream whose interrupt stays live during the write;
    /// its real-time handler is narrowed to [`filter_realtime`] meanwhile.
    pub fn write(&mut self, source: &[u8; SIZE], stream: &dyn RealtimeRedirect) -> Result<(), StoreError> {
        let region = self.region.as_mut().ok_or(StoreError::NoPartition)?;

        let result = {
            let _guard = HandlerOverride::install(stream, filter_realtime);
            region.erase(0, SECTOR_SIZE).and_then(|()| region.write(0, source))
        };

        if let Err(e) = result {
            log::error!("settings write failed: {}", e);
        }

        result
    }
}

#[cfg(target_os = "espidf")]
mod esp {
    use core::ffi::{c_char, c_void};

    use esp_idf_svc::sys::{self, esp, esp_partition_t};

    use super::{FlashRegion, PartitionTable};
    use crate::error::StoreError;

    /// Partition table of the running firmware image.
    pub struct EspPartitionTable;

    /// A data partition found by label.
    pub struct EspPartition {
        part: *const esp_partition_t,
    }

    // SAFETY: partition descriptors are immutable and live for the whole program
    unsafe impl Send for EspPartition {}

    impl PartitionTable for EspPartitionTable {
        type Region = EspPartition;

        fn find(&self, label: &str) -> Option<EspPartition> {
            // Partition labels are at most 16 bytes, plus NUL
            let mut name = [0u8; 17];
            if label.len() >= name.len() {
                return None;
            }
            name[..label.len()].copy_from_slice(label.as_bytes());

            // SAFETY: name is NUL terminated
            let part = unsafe {
                sys::esp_partition_find_first(
                    sys::esp_partition_type_t_ESP_PARTITION_TYPE_DATA,
                    sys::esp_partition_subtype_t_ESP_PARTITION_SUBTYPE_ANY,
                    name.as_ptr() as *const c_char,
                )
            };

            (!part.is_null()).then_some(EspPartition { part })
        }
    }

    impl FlashRegion for EspPartition {
        fn read(&self, offset: usize, dest: &mut [u8]) -> Result<(), StoreError> {
            // SAFETY: valid partition, dest is writable for its length
            esp!(unsafe { sys::esp_partition_read(self.part, offset, dest.as_mut_ptr() as *mut c_void, dest.len()) })
                .map_err(|_| StoreError::ReadFailed)
        }

        fn erase(&mut self, offset: usize, len: usize) -> Result<(), StoreError> {
            // SAFETY: valid partition
            esp!(unsafe { sys::esp_partition_erase_range(self.part, offset, len) }).map_err(|_| StoreError::EraseFailed)
        }

        fn write(&mut self, offset: usize, source: &[u8]) -> Result<(), StoreError> {
            // SAFETY: valid partition, source is readable for its length
            esp!(unsafe {
                sys::esp_partition_write(self.part, offset, source.as_ptr() as *const c_void, source.len())
            })
            .map_err(|_| StoreError::WriteFailed)
        }
    }
}

//! Flash storage driver
//!
//! Uses sequential-storage for wear-leveled key-value storage
//! in the last 64KB of flash.

use embassy_rp::flash::{Async, Flash};
use embassy_rp::peripherals::FLASH;
use embassy_rp::Peri;
use sequential_storage::cache::NoCache;
use sequential_storage::map::{self, SerializationError};

pub const FLASH_SIZE: usize = 2 * 1024 * 1024;
/// Must match the gap left at the end of FLASH in memory.x
pub const CONFIG_PARTITION_SIZE: usize = 64 * 1024;
pub const CONFIG_PARTITION_START: usize = FLASH_SIZE - CONFIG_PARTITION_SIZE;

/// Flash range for the config partition
pub const CONFIG_RANGE: core::ops::Range<u32> =
    (CONFIG_PARTITION_START as u32)..(FLASH_SIZE as u32);

/// Largest stored item
const ITEM_BUFFER_SIZE: usize = 1024;

/// Storage keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StorageKey {
    /// Machine settings (postcard)
    Settings = 0,
    /// Work coordinate offsets and stored positions (postcard)
    Coordinates = 1,
    /// Digest of the machine.toml the stored settings came from
    ConfigDigest = 2,
}

impl map::Key for StorageKey {
    fn serialize_into(&self, buffer: &mut [u8]) -> Result<usize, SerializationError> {
        let slot = buffer.first_mut().ok_or(SerializationError::BufferTooSmall)?;
        *slot = *self as u8;
        Ok(1)
    }

    fn deserialize_from(buffer: &[u8]) -> Result<(Self, usize), SerializationError> {
        let key = match buffer.first() {
            Some(0) => StorageKey::Settings,
            Some(1) => StorageKey::Coordinates,
            Some(2) => StorageKey::ConfigDigest,
            Some(_) => return Err(SerializationError::InvalidFormat),
            None => return Err(SerializationError::BufferTooSmall),
        };
        Ok((key, 1))
    }
}

/// Errors from flash operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    /// Storage operation failed
    Storage,
    /// Key not found
    NotFound,
    /// Buffer too small
    BufferTooSmall,
}

/// Wear-leveled key-value storage for configuration data
pub struct FlashStorage<'d> {
    flash: Flash<'d, FLASH, Async, FLASH_SIZE>,
    buffer: [u8; ITEM_BUFFER_SIZE],
}

impl<'d> FlashStorage<'d> {
    pub fn new(flash: Peri<'d, FLASH>, dma: Peri<'d, impl embassy_rp::dma::Channel>) -> Self {
        Self {
            flash: Flash::new(flash, dma),
            buffer: [0; ITEM_BUFFER_SIZE],
        }
    }

    /// Read a value by key into `out`, returning its length
    pub async fn read(&mut self, key: StorageKey, out: &mut [u8]) -> Result<usize, FlashError> {
        let result = map::fetch_item::<StorageKey, &[u8], _>(
            &mut self.flash,
            CONFIG_RANGE,
            &mut NoCache::new(),
            &mut self.buffer,
            &key,
        )
        .await;

        match result {
            Ok(Some(data)) => {
                let len = data.len();
                let dest = out.get_mut(..len).ok_or(FlashError::BufferTooSmall)?;
                dest.copy_from_slice(data);
                Ok(len)
            }
            Ok(None) => Err(FlashError::NotFound),
            Err(_) => Err(FlashError::Storage),
        }
    }

    /// Write a value by key
    pub async fn write(&mut self, key: StorageKey, data: &[u8]) -> Result<(), FlashError> {
        map::store_item(
            &mut self.flash,
            CONFIG_RANGE,
            &mut NoCache::new(),
            &mut self.buffer,
            &key,
            &data,
        )
        .await
        .map_err(|_| FlashError::Storage)
    }
}

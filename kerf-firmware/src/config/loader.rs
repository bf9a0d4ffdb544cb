//! Configuration persistence
//!
//! Settings and coordinate data live in flash as postcard images. The
//! settings image is tagged with a digest of the machine.toml it was parsed
//! from; when the embedded file changes, the next boot reparses it and
//! replaces the stored copy.

use defmt::*;

use kerf_core::config::{Settings, SettingsError, MAX_SETTINGS_SIZE};
use kerf_core::gcode::coords::MAX_COORDS_SIZE;
use kerf_core::gcode::CoordinateTable;

use super::toml::{parse_settings, ParseError};
use crate::flash::{FlashError, FlashStorage, StorageKey};

/// Configuration persistence errors
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Flash operation failed
    Flash(FlashError),
    /// Stored image failed to decode or validate
    Settings(SettingsError),
    /// Embedded machine.toml failed to parse
    Toml(ParseError),
    /// Coordinate image failed to decode
    Coordinates,
}

impl From<FlashError> for ConfigError {
    fn from(e: FlashError) -> Self {
        ConfigError::Flash(e)
    }
}

impl From<SettingsError> for ConfigError {
    fn from(e: SettingsError) -> Self {
        ConfigError::Settings(e)
    }
}

impl From<ParseError> for ConfigError {
    fn from(e: ParseError) -> Self {
        ConfigError::Toml(e)
    }
}

/// 32-bit FNV-1a over the config text
pub fn config_digest(text: &str) -> u32 {
    text.bytes().fold(0x811c_9dc5, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(0x0100_0193)
    })
}

/// Loads and stores settings and coordinates
pub struct ConfigPersistence<'d> {
    storage: FlashStorage<'d>,
}

impl<'d> ConfigPersistence<'d> {
    pub fn new(storage: FlashStorage<'d>) -> Self {
        Self { storage }
    }

    /// Settings for this boot.
    ///
    /// The flash image is used when it came from `embedded`; otherwise the
    /// embedded text is parsed, validated and written back to flash.
    pub async fn load_settings(&mut self, embedded: &str) -> Result<Settings, ConfigError> {
        let digest = config_digest(embedded);
        match self.load_stored_settings(digest).await {
            Ok(settings) => {
                info!("Loaded settings from flash");
                return Ok(settings);
            }
            Err(ConfigError::Flash(FlashError::NotFound)) => {
                info!("No stored settings, using embedded machine.toml");
            }
            Err(e) => {
                warn!("Stored settings unusable ({:?}), using embedded machine.toml", e);
            }
        }

        let settings = parse_settings(embedded)?;
        settings.validate()?;
        if let Err(e) = self.store_settings(&settings, digest).await {
            // Still usable for this boot
            warn!("Failed to store settings: {:?}", e);
        }
        Ok(settings)
    }

    async fn load_stored_settings(&mut self, digest: u32) -> Result<Settings, ConfigError> {
        let mut tag = [0u8; 4];
        let len = self.storage.read(StorageKey::ConfigDigest, &mut tag).await?;
        if len != tag.len() || u32::from_le_bytes(tag) != digest {
            debug!("machine.toml changed since the settings were stored");
            return Err(ConfigError::Settings(SettingsError::VersionMismatch));
        }

        let mut buffer = [0u8; MAX_SETTINGS_SIZE];
        let len = self.storage.read(StorageKey::Settings, &mut buffer).await?;
        debug!("Read {} bytes of settings from flash", len);
        Ok(Settings::from_bytes(&buffer[..len])?)
    }

    async fn store_settings(&mut self, settings: &Settings, digest: u32) -> Result<(), ConfigError> {
        let mut buffer = [0u8; MAX_SETTINGS_SIZE];
        let bytes = settings.to_bytes(&mut buffer)?;
        self.storage.write(StorageKey::Settings, bytes).await?;
        self.storage
            .write(StorageKey::ConfigDigest, &digest.to_le_bytes())
            .await?;
        Ok(())
    }

    /// Stored coordinate data, or an empty table
    pub async fn load_coordinates(&mut self) -> CoordinateTable {
        let mut buffer = [0u8; MAX_COORDS_SIZE];
        match self.storage.read(StorageKey::Coordinates, &mut buffer).await {
            Ok(len) => CoordinateTable::from_bytes(&buffer[..len]).unwrap_or_else(|| {
                warn!("Stored coordinates corrupt, starting from zero");
                CoordinateTable::new()
            }),
            Err(FlashError::NotFound) => CoordinateTable::new(),
            Err(e) => {
                warn!("Failed to read coordinates: {:?}", e);
                CoordinateTable::new()
            }
        }
    }

    pub async fn store_coordinates(&mut self, coords: &CoordinateTable) -> Result<(), ConfigError> {
        let mut buffer = [0u8; MAX_COORDS_SIZE];
        let bytes = coords
            .to_bytes(&mut buffer)
            .ok_or(ConfigError::Coordinates)?;
        self.storage.write(StorageKey::Coordinates, bytes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_digest() {
        // FNV-1a reference values
        assert_eq!(config_digest(""), 0x811c_9dc5);
        assert_eq!(config_digest("a"), 0xe40c_292c);
        assert_ne!(config_digest("n_axis = 3"), config_digest("n_axis = 4"));
    }
}

//! Configuration loading and parsing
//!
//! Settings come from flash, or from the machine.toml embedded at build
//! time, parsed by a small no_std reader.

pub mod loader;
pub mod toml;

pub use loader::{ConfigError, ConfigPersistence};
pub use toml::parse_settings;

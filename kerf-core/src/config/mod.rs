//! Configuration types
//!
//! Board-agnostic settings stored as postcard binary data.

pub mod settings;

pub use settings::*;

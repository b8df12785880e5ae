//! acboptions - codec for Assassin's Creed Brotherhood OPTIONS files
//!
//! This crate provides round-trip-accurate reading and writing of the
//! game's options container on PC and PS3: the LZSS compression the game
//! uses for its sections, the two bespoke checksums (zero-seed Adler-32
//! and the PS3 prefix CRC-32), the section headers, and the four typed
//! property dialects carried in the sections. Loading a file and saving it
//! without edits reproduces the input byte for byte.

pub mod binio;
pub mod checksum;
pub mod error;
pub mod file;
pub mod format;
pub mod lzss;
pub mod names;

// Re-exports for convenience
pub use error::{Error, Result};
pub use file::OptionsFile;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::file::OptionsFile;
    pub use crate::format::property::{Property, PropertyValue};
    pub use crate::format::{Platform, Section, SectionPayload};
    pub use crate::names::NameTable;
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

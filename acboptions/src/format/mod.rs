//! On-disk structures of the options container
//!
//! The container holds a sequence of LZSS-compressed sections, each with a
//! 44-byte header and a typed-property payload in one of four dialects.
//! This module tree mirrors that structure: [`header`] for the section
//! header, one module per payload dialect, [`types`] for the shared type
//! dictionary and [`property`] for the tree handed to consumers.

pub mod header;
pub mod property;
pub mod section;
pub mod section1;
pub mod section2;
pub mod section3;
pub mod section4;
pub mod types;

pub use header::{SectionHeader, MAGIC_PATTERN, SECTION_HEADER_SIZE};
pub use section::{Section, SectionPayload};

use crate::binio::BinaryReader;
use crate::error::Result;

/// Platform variant of an options file. Files that match neither layout
/// fail to load, so there is no unknown state past detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Windows build; little-endian headers, opaque trailing footer.
    Pc,
    /// PlayStation 3 build; big-endian lead fields, 8-byte CRC prefix,
    /// zero-padded to a fixed file size.
    Ps3,
}

/// Shared ObjectInfo prefix used by the section 1-3 dialects.
///
/// The class-versions count nominally counts 6-byte entries which the game
/// skips on load; they are never preserved, so emitters write the count as
/// the original editor does and no entry bytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectInfo {
    pub nb_class_versions: u8,
    pub object_name: String,
    pub object_id: u32,
    pub instancing_mode: u8,
    /// Only present when `instancing_mode == 1` (section 2).
    pub father_id: Option<u32>,
}

/// Read a 4-byte length-prefixed UTF-8 string with no terminator.
pub(crate) fn read_prefixed_string(reader: &mut BinaryReader) -> Result<String> {
    let len = reader.read_u32()? as usize;
    if len == 0 {
        return Ok(String::new());
    }
    let bytes = reader.read_bytes(len)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

//! A section of the options container
//!
//! A [`Section`] owns its header, the compressed and decompressed bytes
//! captured at load time, and (after [`Section::parse`]) the typed payload
//! for its dialect. Payloads are a tagged variant keyed by the header's
//! section id; an id with no known dialect keeps the decompressed bytes
//! verbatim.
//!
//! Lifecycle: a section born from load starts clean and replays its
//! captured compressed bytes and raw header on save. Marking it dirty
//! makes the save path re-serialize, re-compress and re-checksum it.

use tracing::warn;

use crate::error::Result;
use crate::format::header::SectionHeader;
use crate::format::property::Property;
use crate::format::types::section_hash;
use crate::format::{section1, section2, section3, section4};
use crate::lzss;

/// Parsed payload, one arm per dialect.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionPayload {
    /// Not parsed yet (or parse failed); serialize falls back to the
    /// captured decompressed bytes.
    Unparsed,
    /// Section 1.
    SaveGame(section1::SaveGameData),
    /// Section 2.
    PlayerOptions(section2::ObjectStructure),
    /// Section 3.
    SingleProfile(section3::SingleProfileData),
    /// Section 4.
    MultiProfile(section4::MultiProfileData),
    /// Unknown section id; the decompressed bytes pass through unchanged.
    Unknown,
}

/// One section: header, raw buffers, parsed payload and dirty state.
#[derive(Debug, Clone)]
pub struct Section {
    header: SectionHeader,
    raw_compressed: Vec<u8>,
    raw_decompressed: Vec<u8>,
    payload: SectionPayload,
    root_property: Option<Property>,
    valid: bool,
    dirty: bool,
}

/// Root type hash for a dialect number, 0 when unknown.
pub fn root_hash_for_section(number: u32) -> u32 {
    match number {
        1 => section_hash::SAVE_GAME,
        2 => section_hash::PLAYER_OPTIONS,
        3 => section_hash::SINGLE_PROFILE,
        4 => section_hash::MULTI_PROFILE,
        _ => 0,
    }
}

impl Section {
    /// Assemble a section from its header and payload buffers, as captured
    /// by the container walk. The section starts clean and unparsed.
    pub fn from_parts(
        header: SectionHeader,
        raw_compressed: Vec<u8>,
        raw_decompressed: Vec<u8>,
    ) -> Self {
        Section {
            header,
            raw_compressed,
            raw_decompressed,
            payload: SectionPayload::Unparsed,
            root_property: None,
            valid: false,
            dirty: false,
        }
    }

    /// Parse the decompressed bytes into the dialect keyed by the header's
    /// section id, and build the display tree.
    ///
    /// # Errors
    /// Returns the dialect parser's error; the section then stays in the
    /// unparsed state and keeps replaying its captured bytes on save.
    pub fn parse(&mut self) -> Result<()> {
        let number = self.header.section_number();
        let root_hash = root_hash_for_section(number);

        let (payload, tree) = match number {
            1 => {
                let data =
                    section1::parse(&self.raw_decompressed, self.header.section_id(), root_hash)?;
                let tree = section1::build_property_tree(&data);
                (SectionPayload::SaveGame(data), Some(tree))
            }
            2 => {
                let data = section2::parse(&self.raw_decompressed)?;
                let tree = section2::build_property_tree(&data);
                (SectionPayload::PlayerOptions(data), Some(tree))
            }
            3 => {
                let data = section3::parse(&self.raw_decompressed)?;
                let tree = section3::build_property_tree(&data);
                (SectionPayload::SingleProfile(data), Some(tree))
            }
            4 => {
                let data = section4::parse(&self.raw_decompressed)?;
                let tree = section4::build_property_tree(&data);
                (SectionPayload::MultiProfile(data), Some(tree))
            }
            _ => (SectionPayload::Unknown, None),
        };

        self.payload = payload;
        self.root_property = tree;
        self.valid = true;
        Ok(())
    }

    /// Serialize the payload back to decompressed bytes.
    ///
    /// # Errors
    /// Returns the dialect serializer's error.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        match &self.payload {
            SectionPayload::SaveGame(data) => section1::serialize(data),
            SectionPayload::PlayerOptions(data) => section2::serialize(data),
            SectionPayload::SingleProfile(data) => section3::serialize(data),
            SectionPayload::MultiProfile(data) => section4::serialize(data),
            SectionPayload::Unknown | SectionPayload::Unparsed => {
                Ok(self.raw_decompressed.clone())
            }
        }
    }

    /// Run the LZSS decoder over the captured compressed bytes, refreshing
    /// the decompressed buffer.
    pub fn decompress(&mut self) -> bool {
        if self.raw_compressed.is_empty() {
            return false;
        }
        self.raw_decompressed = lzss::decompress(&self.raw_compressed);
        if self.raw_decompressed.len() != self.header.uncompressed_size() as usize {
            warn!(
                "section {}: decompressed {} bytes, header claims {}",
                self.header.section_name(),
                self.raw_decompressed.len(),
                self.header.uncompressed_size()
            );
        }
        !self.raw_decompressed.is_empty()
    }

    /// Run the LZSS encoder over the decompressed buffer, refreshing the
    /// compressed bytes.
    pub fn compress(&mut self) -> bool {
        if self.raw_decompressed.is_empty() {
            return false;
        }
        self.raw_compressed = lzss::compress(&self.raw_decompressed);
        !self.raw_compressed.is_empty()
    }

    /// The section header.
    pub fn header(&self) -> &SectionHeader {
        &self.header
    }

    /// Mutable access to the section header.
    pub fn header_mut(&mut self) -> &mut SectionHeader {
        &mut self.header
    }

    /// The compressed bytes captured at load (or by [`Section::compress`]).
    pub fn raw_compressed(&self) -> &[u8] {
        &self.raw_compressed
    }

    /// The decompressed payload bytes.
    pub fn raw_decompressed(&self) -> &[u8] {
        &self.raw_decompressed
    }

    /// The parsed payload.
    pub fn payload(&self) -> &SectionPayload {
        &self.payload
    }

    /// Mutable access to the parsed payload. Callers that edit it must
    /// also mark the section dirty for the change to reach disk.
    pub fn payload_mut(&mut self) -> &mut SectionPayload {
        &mut self.payload
    }

    /// Root of the display tree, present once parsed.
    pub fn root_property(&self) -> Option<&Property> {
        self.root_property.as_ref()
    }

    /// Whether the last parse succeeded.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Whether the section will be re-encoded on save.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Mark or clear the dirty flag.
    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// Whether the section id maps to a known dialect.
    pub fn is_known(&self) -> bool {
        self.header.section_number() != 0
    }

    /// Dialect number (1-4, or 0 for unknown).
    pub fn section_number(&self) -> u32 {
        self.header.section_number()
    }

    /// Dialect display name.
    pub fn section_name(&self) -> String {
        self.header.section_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::adler32_zero_seed;

    fn sample_section2_bytes() -> Vec<u8> {
        let root = section2::ObjectStructure {
            info: crate::format::ObjectInfo::default(),
            t_hash: section_hash::PLAYER_OPTIONS,
            properties: vec![section2::Record {
                property_id: 0x77,
                class_id: 0,
                type_id: u32::from(section2::T_NUMERIC) << 16,
                packed_info: 0x0B,
                value: section2::Value::UInt32(640),
            }],
            dyn_props: Vec::new(),
        };
        section2::serialize(&root).unwrap()
    }

    fn build_section(section_id: u32, decompressed: Vec<u8>) -> Section {
        let compressed = lzss::compress(&decompressed);
        let mut header = SectionHeader::default();
        header.build(
            section_id,
            decompressed.len() as u32,
            compressed.len() as u32,
            adler32_zero_seed(&compressed),
        );
        Section::from_parts(header, compressed, decompressed)
    }

    #[test]
    fn parse_builds_payload_and_tree() {
        let mut section = build_section(0x11FA_CE11, sample_section2_bytes());
        section.parse().unwrap();
        assert!(section.is_valid());
        assert!(matches!(
            section.payload(),
            SectionPayload::PlayerOptions(_)
        ));
        let tree = section.root_property().unwrap();
        assert_eq!(tree.hash, section_hash::PLAYER_OPTIONS);
        assert_eq!(tree.children.len(), 1);
    }

    #[test]
    fn serialize_matches_original_payload() {
        let bytes = sample_section2_bytes();
        let mut section = build_section(0x11FA_CE11, bytes.clone());
        section.parse().unwrap();
        assert_eq!(section.serialize().unwrap(), bytes);
    }

    #[test]
    fn unknown_sections_pass_through() {
        let payload = vec![0xDE, 0xAD, 0xBE, 0xEF, 0x55];
        let mut section = build_section(0x7777_7777, payload.clone());
        section.parse().unwrap();
        assert!(!section.is_known());
        assert!(section.root_property().is_none());
        assert_eq!(section.serialize().unwrap(), payload);
    }

    #[test]
    fn decompress_refreshes_from_compressed() {
        let bytes = sample_section2_bytes();
        let mut section = build_section(0x11FA_CE11, bytes.clone());
        section.raw_decompressed.clear();
        assert!(section.decompress());
        assert_eq!(section.raw_decompressed(), &bytes[..]);
    }

    #[test]
    fn section_names() {
        let section = build_section(0x11FA_CE11, sample_section2_bytes());
        assert_eq!(section.section_name(), "PlayerOptionsSaveData");
        assert_eq!(section.section_number(), 2);

        let mut header = SectionHeader::default();
        header.build(0xAB, 0, 0, 0);
        let unknown = Section::from_parts(header, Vec::new(), Vec::new());
        assert_eq!(unknown.section_name(), "Unknown (0x000000ab)");
    }
}

//! The 44-byte section header
//!
//! Layout (offsets in bytes):
//!
//! | offset | size | field | endian |
//! |--------|------|-------|--------|
//! | 0x00 | 4 | field0 (opaque) | platform lead |
//! | 0x04 | 4 | field1 (opaque) | platform lead |
//! | 0x08 | 4 | section id | platform lead |
//! | 0x0C | 4 | uncompressed size | little |
//! | 0x10 | 16 | magic pattern | - |
//! | 0x20 | 4 | compressed size | little |
//! | 0x24 | 4 | uncompressed size (copy) | little |
//! | 0x28 | 4 | checksum | little |
//!
//! "Platform lead" is big-endian on PS3 and little-endian on PC; from 0x0C
//! onward both platforms use little-endian. Parsing keeps the raw 44 bytes
//! so an unmodified section writes its header back bit-for-bit.

use crate::binio::{BinaryReader, BinaryWriter, Endian};
use crate::error::{Error, Result};
use crate::format::Platform;

/// Size of the on-disk section header.
pub const SECTION_HEADER_SIZE: usize = 44;

/// Magic pattern at offset 0x10 of every section header.
pub const MAGIC_PATTERN: [u8; 16] = [
    0x33, 0xAA, 0xFB, 0x57, 0x99, 0xFA, 0x04, 0x10, 0x01, 0x00, 0x02, 0x00, 0x80, 0x00, 0x00, 0x01,
];

/// Parsed (or freshly built) section header.
#[derive(Debug, Clone, Default)]
pub struct SectionHeader {
    field0: u32,
    field1: u32,
    section_id: u32,
    uncompressed_size: u32,
    compressed_size: u32,
    checksum: u32,
    /// On-disk bytes, kept so a clean save replays them verbatim.
    raw: Option<Vec<u8>>,
}

impl SectionHeader {
    /// Parse a header at the reader's current position, consuming 44 bytes.
    ///
    /// # Errors
    /// Returns [`Error::TruncatedSection`] if fewer than 44 bytes remain and
    /// [`Error::MagicMismatch`] if the pattern at 0x10 is wrong; the
    /// container walk recovers from the latter by retrying one byte later.
    pub fn parse(reader: &mut BinaryReader, platform: Platform) -> Result<SectionHeader> {
        let offset = reader.position();
        if reader.remaining() < SECTION_HEADER_SIZE {
            return Err(Error::TruncatedSection {
                offset,
                needed: SECTION_HEADER_SIZE,
                available: reader.remaining(),
            });
        }

        let raw = reader.read_bytes(SECTION_HEADER_SIZE)?;
        let mut fields = BinaryReader::new(&raw);
        if platform == Platform::Ps3 {
            fields.set_endian(Endian::Big);
        }

        let field0 = fields.read_u32()?;
        let field1 = fields.read_u32()?;
        let section_id = fields.read_u32()?;

        fields.set_endian(Endian::Little);
        let uncompressed_size = fields.read_u32()?;
        let magic: [u8; 16] = fields.read_array()?;
        let compressed_size = fields.read_u32()?;
        let _uncompressed_copy = fields.read_u32()?;
        let checksum = fields.read_u32()?;

        if magic != MAGIC_PATTERN {
            return Err(Error::MagicMismatch { offset });
        }

        Ok(SectionHeader {
            field0,
            field1,
            section_id,
            uncompressed_size,
            compressed_size,
            checksum,
            raw: Some(raw),
        })
    }

    /// Write the header. Retained on-disk bytes are replayed verbatim; a
    /// rebuilt header is assembled field by field.
    pub fn serialize(&self, writer: &mut BinaryWriter, platform: Platform) {
        if let Some(raw) = &self.raw {
            writer.write_bytes(raw);
            return;
        }

        let mut fields = BinaryWriter::new();
        if platform == Platform::Ps3 {
            fields.set_endian(Endian::Big);
        }
        fields.write_u32(self.field0);
        fields.write_u32(self.field1);
        fields.write_u32(self.section_id);

        fields.set_endian(Endian::Little);
        fields.write_u32(self.uncompressed_size);
        fields.write_bytes(&MAGIC_PATTERN);
        fields.write_u32(self.compressed_size);
        fields.write_u32(self.uncompressed_size);
        fields.write_u32(self.checksum);

        writer.write_bytes(fields.as_bytes());
    }

    /// Refill the header for a re-encoded section. The opaque lead fields
    /// are preserved; the retained raw bytes are dropped so the next
    /// serialize assembles the header from the new values.
    pub fn build(
        &mut self,
        section_id: u32,
        uncompressed_size: u32,
        compressed_size: u32,
        checksum: u32,
    ) {
        self.section_id = section_id;
        self.uncompressed_size = uncompressed_size;
        self.compressed_size = compressed_size;
        self.checksum = checksum;
        self.raw = None;
    }

    /// Opaque field at 0x00.
    pub fn field0(&self) -> u32 {
        self.field0
    }

    /// Opaque field at 0x04.
    pub fn field1(&self) -> u32 {
        self.field1
    }

    /// Dialect key at 0x08.
    pub fn section_id(&self) -> u32 {
        self.section_id
    }

    /// Payload size after decompression.
    pub fn uncompressed_size(&self) -> u32 {
        self.uncompressed_size
    }

    /// Payload size on disk.
    pub fn compressed_size(&self) -> u32 {
        self.compressed_size
    }

    /// Zero-seed Adler-32 of the compressed payload.
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Whether the on-disk header bytes are still retained.
    pub fn has_raw(&self) -> bool {
        self.raw.is_some()
    }

    /// Dialect number for the section id: 1-4 for the known dialects,
    /// 0 for unknown-but-preserved.
    pub fn section_number(&self) -> u32 {
        match self.section_id {
            0x0000_00C5 | 0x0000_00C6 => 1,
            0x11FA_CE11 => 2,
            0x21EF_FE22 => 3,
            0x0000_0007 => 4,
            _ => 0,
        }
    }

    /// Display name of the dialect.
    pub fn section_name(&self) -> String {
        match self.section_number() {
            1 => "SaveGame".to_string(),
            2 => "PlayerOptionsSaveData".to_string(),
            3 => "AssassinSingleProfileData".to_string(),
            4 => "AssassinMultiProfileData".to_string(),
            _ => format!("Unknown ({:#010x})", self.section_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_serialize_pc() {
        let mut header = SectionHeader::default();
        header.build(0x11FA_CE11, 100, 50, 0x1234_5678);

        let mut writer = BinaryWriter::new();
        header.serialize(&mut writer, Platform::Pc);
        let bytes = writer.into_bytes();

        assert_eq!(bytes.len(), SECTION_HEADER_SIZE);
        assert_eq!(&bytes[0x08..0x0C], &0x11FA_CE11u32.to_le_bytes());
        assert_eq!(&bytes[0x0C..0x10], &100u32.to_le_bytes());
        assert_eq!(&bytes[0x10..0x20], &MAGIC_PATTERN);
        assert_eq!(&bytes[0x20..0x24], &50u32.to_le_bytes());
        assert_eq!(&bytes[0x24..0x28], &100u32.to_le_bytes());
        assert_eq!(&bytes[0x28..0x2C], &0x1234_5678u32.to_le_bytes());
    }

    #[test]
    fn ps3_lead_fields_are_big_endian() {
        let mut header = SectionHeader::default();
        header.build(0x0000_0007, 10, 5, 0);

        let mut writer = BinaryWriter::new();
        header.serialize(&mut writer, Platform::Ps3);
        let bytes = writer.into_bytes();

        assert_eq!(&bytes[0x08..0x0C], &0x0000_0007u32.to_be_bytes());
        // From 0x0C on the header stays little-endian.
        assert_eq!(&bytes[0x0C..0x10], &10u32.to_le_bytes());
    }

    #[test]
    fn parse_round_trips_raw_bytes() {
        let mut header = SectionHeader::default();
        header.build(0x21EF_FE22, 640, 480, 0xAABB_CCDD);
        let mut writer = BinaryWriter::new();
        header.serialize(&mut writer, Platform::Pc);
        let bytes = writer.into_bytes();

        let mut reader = BinaryReader::new(&bytes);
        let parsed = SectionHeader::parse(&mut reader, Platform::Pc).unwrap();
        assert_eq!(parsed.section_id(), 0x21EF_FE22);
        assert_eq!(parsed.uncompressed_size(), 640);
        assert_eq!(parsed.compressed_size(), 480);
        assert_eq!(parsed.checksum(), 0xAABB_CCDD);
        assert!(parsed.has_raw());

        let mut rewritten = BinaryWriter::new();
        parsed.serialize(&mut rewritten, Platform::Pc);
        assert_eq!(rewritten.as_bytes(), &bytes[..]);
    }

    #[test]
    fn parse_ps3_header() {
        let mut header = SectionHeader::default();
        header.build(0x0000_00C6, 32, 16, 1);
        let mut writer = BinaryWriter::new();
        header.serialize(&mut writer, Platform::Ps3);
        let bytes = writer.into_bytes();

        let mut reader = BinaryReader::new(&bytes);
        let parsed = SectionHeader::parse(&mut reader, Platform::Ps3).unwrap();
        assert_eq!(parsed.section_id(), 0x0000_00C6);
        assert_eq!(parsed.section_number(), 1);
    }

    #[test]
    fn bad_magic_is_recoverable_mismatch() {
        let mut bytes = vec![0u8; SECTION_HEADER_SIZE];
        bytes[0x10] = 0x33; // only the first magic byte in place
        let mut reader = BinaryReader::new(&bytes);
        let err = SectionHeader::parse(&mut reader, Platform::Pc).unwrap_err();
        assert!(matches!(err, Error::MagicMismatch { offset: 0 }));
    }

    #[test]
    fn section_number_mapping() {
        let ids = [
            (0x0000_00C5u32, 1u32),
            (0x0000_00C6, 1),
            (0x11FA_CE11, 2),
            (0x21EF_FE22, 3),
            (0x0000_0007, 4),
            (0x1234_5678, 0),
        ];
        for (id, number) in ids {
            let mut header = SectionHeader::default();
            header.build(id, 0, 0, 0);
            assert_eq!(header.section_number(), number, "id {id:#x}");
        }
    }
}

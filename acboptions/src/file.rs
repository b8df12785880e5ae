//! The options file container
//!
//! Load path: detect the platform, peel the PS3 prefix if present, then
//! walk the buffer looking for 44-byte section headers. A magic mismatch
//! advances one byte and retries, which also steps over section 4's gap
//! marker; on PC a leading 0x01 at a mismatch position is the start of the
//! opaque footer. Each section's compressed bytes are captured verbatim so
//! an unmodified save is byte-identical to the input.
//!
//! Save path: sections are written in load order. Clean sections replay
//! their captured bytes and raw header; dirty sections are re-serialized,
//! re-compressed and re-checksummed. Section 4 is preceded by its 8-byte
//! gap marker. PC appends the captured footer; PS3 backpatches the prefix
//! with the content size and CRC and zero-pads the file to its fixed size.

use std::path::Path;

use tracing::{debug, warn};

use crate::binio::{BinaryReader, BinaryWriter, Endian};
use crate::checksum::{adler32_zero_seed, crc32_ps3};
use crate::error::{Error, Result};
use crate::format::header::{SectionHeader, MAGIC_PATTERN, SECTION_HEADER_SIZE};
use crate::format::{Platform, Section};
use crate::lzss;

/// Fixed total size of a PS3 options file.
pub const PS3_FILE_SIZE: usize = 51200;

/// Size of the PS3 (content_size, crc) prefix.
const PS3_PREFIX_SIZE: usize = 8;

/// Gap marker type word preceding section 4 on PC.
const GAP_TYPE_PC: u32 = 0x0E;
/// Gap marker type word preceding section 4 on PS3.
const GAP_TYPE_PS3: u32 = 0x08;

/// A loaded options file.
#[derive(Debug, Clone)]
pub struct OptionsFile {
    platform: Platform,
    sections: Vec<Section>,
    /// The 8-byte PS3 prefix as found on disk (empty on PC).
    ps3_prefix: Vec<u8>,
    /// Opaque PC footer (empty on PS3).
    footer: Vec<u8>,
}

impl OptionsFile {
    /// Load and parse an options file from disk.
    ///
    /// # Errors
    /// Returns [`Error::Io`] on read failure, [`Error::UnknownPlatform`]
    /// when the buffer matches neither layout, and [`Error::Malformed`]
    /// when no section can be recovered.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<OptionsFile> {
        let data = std::fs::read(path)?;
        OptionsFile::from_bytes(&data)
    }

    /// Parse an options file from a byte buffer.
    ///
    /// # Errors
    /// See [`OptionsFile::load`].
    pub fn from_bytes(data: &[u8]) -> Result<OptionsFile> {
        let platform = detect_platform(data).ok_or(Error::UnknownPlatform)?;
        debug!("detected platform {platform:?}, {} bytes", data.len());

        let mut reader = BinaryReader::new(data);
        let ps3_prefix = if platform == Platform::Ps3 {
            reader.read_bytes(PS3_PREFIX_SIZE)?
        } else {
            Vec::new()
        };

        let mut sections = Vec::new();
        let mut footer = Vec::new();

        while reader.remaining() >= SECTION_HEADER_SIZE {
            let header_pos = reader.position();
            let header = match SectionHeader::parse(&mut reader, platform) {
                Ok(header) => header,
                Err(_) => {
                    reader.seek(header_pos);
                    // A PC stream that stops matching headers and starts
                    // with 0x01 is the trailing footer.
                    if platform == Platform::Pc
                        && reader.remaining() >= 5
                        && reader.peek_u8()? == 0x01
                    {
                        footer = reader.read_bytes(reader.remaining())?;
                        break;
                    }
                    reader.skip(1);
                    continue;
                }
            };

            let compressed_size = header.compressed_size() as usize;
            if reader.remaining() < compressed_size {
                warn!(
                    "section at {header_pos:#x} claims {compressed_size} compressed bytes, \
                     only {} remain",
                    reader.remaining()
                );
                break;
            }

            let compressed = reader.read_bytes(compressed_size)?;
            let decompressed = lzss::decompress(&compressed);
            debug!(
                "section {} at {header_pos:#x}: {compressed_size} -> {} bytes",
                header.section_name(),
                decompressed.len()
            );

            let mut section = Section::from_parts(header, compressed, decompressed);
            if let Err(e) = section.parse() {
                warn!(
                    "section {} failed to parse ({e}); kept as raw bytes",
                    section.section_name()
                );
            }
            sections.push(section);
        }

        if platform == Platform::Pc && footer.is_empty() && reader.remaining() > 0 {
            footer = reader.read_bytes(reader.remaining())?;
        }

        if sections.is_empty() {
            return Err(Error::malformed(0, "no sections found"));
        }

        Ok(OptionsFile {
            platform,
            sections,
            ps3_prefix,
            footer,
        })
    }

    /// Serialize the file back to bytes.
    ///
    /// # Errors
    /// Fails (before any output is produced for the caller) if a dirty
    /// section cannot be re-serialized.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut writer = BinaryWriter::new();

        // PS3 prefix placeholder, backpatched once the content is known.
        let prefix_pos = writer.position();
        if self.platform == Platform::Ps3 {
            writer.write_u32(0);
            writer.write_u32(0);
        }
        let content_start = writer.position();

        for section in &self.sections {
            let mut header = section.header().clone();
            let compressed;

            if !section.is_dirty() && !section.raw_compressed().is_empty() {
                compressed = section.raw_compressed().to_vec();
            } else {
                let decompressed = section.serialize()?;
                compressed = lzss::compress(&decompressed);
                let checksum = adler32_zero_seed(&compressed);
                header.build(
                    header.section_id(),
                    decompressed.len() as u32,
                    compressed.len() as u32,
                    checksum,
                );
            }

            // Section 4 is preceded by its gap marker, in the platform's
            // lead endian.
            if header.section_number() == 4 {
                let gap_size = (SECTION_HEADER_SIZE + compressed.len() + 4) as u32;
                let (gap_type, endian) = match self.platform {
                    Platform::Ps3 => (GAP_TYPE_PS3, Endian::Big),
                    Platform::Pc => (GAP_TYPE_PC, Endian::Little),
                };
                writer.set_endian(endian);
                writer.write_u32(gap_size);
                writer.write_u32(gap_type);
                writer.set_endian(Endian::Little);
            }

            header.serialize(&mut writer, self.platform);
            writer.write_bytes(&compressed);
        }

        if self.platform == Platform::Pc && !self.footer.is_empty() {
            writer.write_bytes(&self.footer);
        }

        if self.platform == Platform::Ps3 {
            let content_size = (writer.position() - content_start) as u32;
            let crc = crc32_ps3(&writer.as_bytes()[content_start..]);

            writer.set_endian(Endian::Big);
            writer.write_at(prefix_pos, content_size);
            writer.write_at(prefix_pos + 4, crc);
            writer.set_endian(Endian::Little);

            let padding = PS3_FILE_SIZE.saturating_sub(writer.position());
            writer.write_bytes(&vec![0u8; padding]);
        }

        Ok(writer.into_bytes())
    }

    /// Serialize and write the file, then clear every dirty flag.
    ///
    /// # Errors
    /// Nothing is written if serialization fails.
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let bytes = self.serialize()?;
        std::fs::write(path, bytes)?;
        for section in &mut self.sections {
            section.set_dirty(false);
        }
        Ok(())
    }

    /// The detected platform.
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// The sections in load order.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Mutable access to the sections.
    pub fn sections_mut(&mut self) -> &mut [Section] {
        &mut self.sections
    }

    /// The PS3 prefix captured at load (empty on PC).
    pub fn ps3_prefix(&self) -> &[u8] {
        &self.ps3_prefix
    }

    /// The PC footer captured at load (empty on PS3).
    pub fn footer(&self) -> &[u8] {
        &self.footer
    }

    /// Whether any section will be re-encoded on save.
    pub fn is_dirty(&self) -> bool {
        self.sections.iter().any(Section::is_dirty)
    }
}

/// Decide which platform layout a buffer uses.
///
/// A 51200-byte file whose prefix CRC validates is PS3. Otherwise the
/// first four magic bytes settle it: at offset 0x10 the file is PC, at
/// 0x18 (behind the 8-byte prefix) it is PS3. `None` means neither.
pub fn detect_platform(data: &[u8]) -> Option<Platform> {
    if data.len() == PS3_FILE_SIZE {
        let mut reader = BinaryReader::with_endian(data, Endian::Big);
        if let (Ok(content_size), Ok(prefix_crc)) = (reader.read_u32(), reader.read_u32()) {
            let content_size = content_size as usize;
            if content_size < data.len() - PS3_PREFIX_SIZE {
                let crc = crc32_ps3(&data[PS3_PREFIX_SIZE..PS3_PREFIX_SIZE + content_size]);
                if crc == prefix_crc {
                    return Some(Platform::Ps3);
                }
                debug!(
                    "PS3-sized file failed prefix CRC ({crc:#010x} != {prefix_crc:#010x}), \
                     falling back to magic scan"
                );
            }
        }
    }

    let magic_head = &MAGIC_PATTERN[..4];
    if data.len() > 0x14 && &data[0x10..0x14] == magic_head {
        return Some(Platform::Pc);
    }
    if data.len() > 0x1C && &data[0x18..0x1C] == magic_head {
        return Some(Platform::Ps3);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_pc_by_magic_offset() {
        let mut data = vec![0u8; 0x30];
        data[0x10..0x14].copy_from_slice(&MAGIC_PATTERN[..4]);
        assert_eq!(detect_platform(&data), Some(Platform::Pc));
    }

    #[test]
    fn detect_ps3_by_magic_offset() {
        let mut data = vec![0u8; PS3_FILE_SIZE];
        data[0x18..0x1C].copy_from_slice(&MAGIC_PATTERN[..4]);
        // The zeroed prefix fails CRC validation, so detection falls
        // through to the magic scan.
        assert_eq!(detect_platform(&data), Some(Platform::Ps3));
    }

    #[test]
    fn detect_ps3_by_prefix_crc() {
        let content = b"options content";
        let mut data = Vec::new();
        data.extend_from_slice(&(content.len() as u32).to_be_bytes());
        data.extend_from_slice(&crc32_ps3(content).to_be_bytes());
        data.extend_from_slice(content);
        data.resize(PS3_FILE_SIZE, 0);
        assert_eq!(detect_platform(&data), Some(Platform::Ps3));
    }

    #[test]
    fn unknown_platform_rejected() {
        assert_eq!(detect_platform(&[0u8; 64]), None);
        assert!(matches!(
            OptionsFile::from_bytes(&[0u8; 64]),
            Err(Error::UnknownPlatform)
        ));
    }
}

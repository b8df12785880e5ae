//! Section 1 payload: `SaveGame`
//!
//! The simplest dialect. A platform-dependent header (10-byte ObjectInfo on
//! PC, a fixed 16-byte block on PS3, told apart by section id 0xC5 vs 0xC6)
//! is followed by the root type hash, three reserved block-size fields, a
//! root record with no type prefix, a run of child records that each carry
//! a 4-byte type prefix instead of a size, and a sized dynamic-properties
//! block. Values are one of three shapes: a bool byte, a 4-byte word, or a
//! length-prefixed string with a NUL terminator.

use tracing::warn;

use crate::binio::{BinaryReader, BinaryWriter};
use crate::error::Result;
use crate::format::property::{Property, PropertyValue};
use crate::format::read_prefixed_string;
use crate::format::ObjectInfo;

/// Type prefix written before bool-valued child records.
pub const TYPE_PREFIX_BOOL: u32 = 0x0E;
/// Type prefix written before numeric child records.
pub const TYPE_PREFIX_NUMERIC: u32 = 0x11;
/// Type prefix written before string child records.
pub const TYPE_PREFIX_STRING: u32 = 0x19;

/// Descriptor code (bits 16-21 of `type_id`) selecting a bool value.
pub const DESC_BOOL: u32 = 0x00;
/// Descriptor code selecting a string value.
pub const DESC_STRING: u32 = 0x1A;

/// PS3 section id for this dialect (PC uses 0xC5).
const PS3_SECTION_ID: u32 = 0x0000_00C6;

/// Value of one record; the shape also fixes the encoded width.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Numeric(u32),
    String(String),
}

impl Value {
    fn encoded_size(&self) -> u32 {
        match self {
            Value::Bool(_) => 1,
            Value::Numeric(_) => 4,
            Value::String(s) => 4 + s.len() as u32 + 1,
        }
    }
}

/// A property record (root or child).
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub hash: u32,
    pub class_id: u32,
    pub type_id: u32,
    pub packed_info: u8,
    pub value: Value,
}

/// A child record together with its on-disk type prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildRecord {
    pub type_prefix: u32,
    pub record: Record,
}

/// Parsed `SaveGame` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveGameData {
    /// PC header fields; zeroed on the PS3 sub-variant.
    pub info: ObjectInfo,
    /// The 15 header bytes after the count byte on PS3, kept for
    /// re-emission. `None` on PC.
    pub ps3_header: Option<Vec<u8>>,
    pub type_hash: u32,
    pub root: Record,
    pub children: Vec<ChildRecord>,
    pub dyn_props: Vec<ChildRecord>,
}

fn descriptor_type(type_id: u32) -> u32 {
    (type_id >> 16) & 0x3F
}

fn parse_value_by_descriptor(reader: &mut BinaryReader, descriptor: u32) -> Result<Value> {
    match descriptor {
        DESC_BOOL => Ok(Value::Bool(reader.read_u8()? != 0)),
        DESC_STRING => parse_string_value(reader),
        _ => Ok(Value::Numeric(reader.read_u32()?)),
    }
}

fn parse_value_by_prefix(reader: &mut BinaryReader, prefix: u32) -> Result<Value> {
    match prefix {
        TYPE_PREFIX_BOOL => Ok(Value::Bool(reader.read_u8()? != 0)),
        TYPE_PREFIX_STRING => parse_string_value(reader),
        _ => Ok(Value::Numeric(reader.read_u32()?)),
    }
}

fn parse_string_value(reader: &mut BinaryReader) -> Result<Value> {
    let len = reader.read_u32()? as usize;
    let bytes = reader.read_bytes(len)?;
    reader.read_u8()?; // NUL terminator
    Ok(Value::String(String::from_utf8_lossy(&bytes).into_owned()))
}

fn write_value(writer: &mut BinaryWriter, value: &Value) {
    match value {
        Value::Bool(v) => writer.write_u8(u8::from(*v)),
        Value::Numeric(v) => writer.write_u32(*v),
        Value::String(s) => {
            writer.write_u32(s.len() as u32);
            writer.write_bytes(s.as_bytes());
            writer.write_u8(0);
        }
    }
}

fn parse_prefixed_record(reader: &mut BinaryReader) -> Result<ChildRecord> {
    let type_prefix = reader.read_u32()?;
    let hash = reader.read_u32()?;
    let class_id = reader.read_u32()?;
    let type_id = reader.read_u32()?;
    let packed_info = reader.read_u8()?;
    let value = parse_value_by_prefix(reader, type_prefix)?;
    Ok(ChildRecord {
        type_prefix,
        record: Record {
            hash,
            class_id,
            type_id,
            packed_info,
            value,
        },
    })
}

/// Parse a decompressed section-1 payload. `section_id` selects the PC or
/// PS3 header sub-variant; `root_hash` is the expected type hash.
pub fn parse(data: &[u8], section_id: u32, root_hash: u32) -> Result<SaveGameData> {
    let mut reader = BinaryReader::new(data);
    let is_ps3 = section_id == PS3_SECTION_ID;

    let nb_class_versions = reader.read_u8()?;
    let mut info = ObjectInfo {
        nb_class_versions,
        ..ObjectInfo::default()
    };
    let ps3_header = if is_ps3 {
        Some(reader.read_bytes(15)?)
    } else {
        info.object_name = read_prefixed_string(&mut reader)?;
        info.object_id = reader.read_u32()?;
        info.instancing_mode = reader.read_u8()?;
        None
    };

    let type_hash = reader.read_u32()?;
    if type_hash != root_hash {
        warn!(
            "section 1 type hash {type_hash:#010x} does not match expected {root_hash:#010x}"
        );
    }

    // Block sizes recomputed on emit.
    reader.read_u32()?; // object block
    reader.read_u32()?; // properties block
    reader.read_u32()?; // root block

    let hash = reader.read_u32()?;
    let class_id = reader.read_u32()?;
    let type_id = reader.read_u32()?;
    let packed_info = reader.read_u8()?;
    let value = parse_value_by_descriptor(&mut reader, descriptor_type(type_id))?;
    let root = Record {
        hash,
        class_id,
        type_id,
        packed_info,
        value,
    };

    let mut children = Vec::new();
    let mut dyn_props = Vec::new();

    while reader.remaining() >= 4 {
        let marker = reader.peek_u32()?;
        let is_prefix = marker == TYPE_PREFIX_BOOL
            || marker == TYPE_PREFIX_NUMERIC
            || marker == TYPE_PREFIX_STRING;

        if !is_prefix {
            // Not a type prefix: this word is the dynamic-properties size.
            let dyn_size = reader.read_u32()? as usize;
            if dyn_size > 0 {
                let end = reader.position() + dyn_size;
                while reader.position() < end && reader.remaining() >= 17 {
                    match parse_prefixed_record(&mut reader) {
                        Ok(record) => dyn_props.push(record),
                        Err(e) => {
                            warn!("section 1 dynamic property parse failed: {e}");
                            break;
                        }
                    }
                }
                reader.seek(end);
            }
            break;
        }

        children.push(parse_prefixed_record(&mut reader)?);
    }

    Ok(SaveGameData {
        info,
        ps3_header,
        type_hash,
        root,
        children,
        dyn_props,
    })
}

/// Re-emit a section-1 payload. The three block-size fields are computed
/// arithmetically from the record shapes.
pub fn serialize(data: &SaveGameData) -> Result<Vec<u8>> {
    let mut writer = BinaryWriter::new();

    writer.write_u8(data.info.nb_class_versions);
    match &data.ps3_header {
        Some(tail) => writer.write_bytes(tail),
        None => {
            writer.write_u32(data.info.object_name.len() as u32);
            writer.write_bytes(data.info.object_name.as_bytes());
            writer.write_u32(data.info.object_id);
            writer.write_u8(data.info.instancing_mode);
        }
    }

    writer.write_u32(data.type_hash);

    let root_block = 13 + data.root.value.encoded_size();
    let child_total: u32 = data
        .children
        .iter()
        .map(|c| 17 + c.record.value.encoded_size())
        .sum();
    let properties_block = 4 + root_block + child_total;
    let object_block = 4 + properties_block + 4;

    writer.write_u32(object_block);
    writer.write_u32(properties_block);
    writer.write_u32(root_block);

    writer.write_u32(data.root.hash);
    writer.write_u32(data.root.class_id);
    writer.write_u32(data.root.type_id);
    writer.write_u8(data.root.packed_info);
    write_value(&mut writer, &data.root.value);

    for child in &data.children {
        writer.write_u32(child.type_prefix);
        writer.write_u32(child.record.hash);
        writer.write_u32(child.record.class_id);
        writer.write_u32(child.record.type_id);
        writer.write_u8(child.record.packed_info);
        write_value(&mut writer, &child.record.value);
    }

    if data.dyn_props.is_empty() {
        writer.write_u32(0);
    } else {
        let dyn_total: u32 = data
            .dyn_props
            .iter()
            .map(|c| 17 + c.record.value.encoded_size())
            .sum();
        writer.write_u32(dyn_total);
        for child in &data.dyn_props {
            writer.write_u32(child.type_prefix);
            writer.write_u32(child.record.hash);
            writer.write_u32(child.record.class_id);
            writer.write_u32(child.record.type_id);
            writer.write_u8(child.record.packed_info);
            write_value(&mut writer, &child.record.value);
        }
    }

    Ok(writer.into_bytes())
}

fn property_from_record(record: &Record) -> Property {
    let mut prop = Property::new(record.hash);
    prop.flags = record.packed_info;
    prop.set_type_ids(record.class_id, record.type_id);
    prop.value = match &record.value {
        Value::Bool(v) => PropertyValue::Bool(*v),
        Value::Numeric(v) => PropertyValue::UInt32(*v),
        Value::String(s) => PropertyValue::String(s.clone()),
    };
    prop
}

/// Build the display tree: the root record with the child records beneath.
pub fn build_property_tree(data: &SaveGameData) -> Property {
    let mut root = property_from_record(&data.root);
    for child in &data.children {
        root.add_child(property_from_record(&child.record));
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SaveGameData {
        SaveGameData {
            info: ObjectInfo {
                nb_class_versions: 0,
                object_name: String::new(),
                object_id: 0x0042_0042,
                instancing_mode: 0,
                father_id: None,
            },
            ps3_header: None,
            type_hash: crate::format::types::section_hash::SAVE_GAME,
            root: Record {
                hash: 0xBF4C_2013,
                class_id: 0x1111_1111,
                type_id: 0x0007_0000,
                packed_info: 0x0B,
                value: Value::Numeric(7),
            },
            children: vec![
                ChildRecord {
                    type_prefix: TYPE_PREFIX_BOOL,
                    record: Record {
                        hash: 0x0000_0001,
                        class_id: 0,
                        type_id: 0x0000_0000,
                        packed_info: 0x0B,
                        value: Value::Bool(true),
                    },
                },
                ChildRecord {
                    type_prefix: TYPE_PREFIX_STRING,
                    record: Record {
                        hash: 0x0000_0002,
                        class_id: 0,
                        type_id: 0x001A_0000,
                        packed_info: 0x0B,
                        value: Value::String("Ezio".to_string()),
                    },
                },
                ChildRecord {
                    type_prefix: TYPE_PREFIX_NUMERIC,
                    record: Record {
                        hash: 0x0000_0003,
                        class_id: 0,
                        type_id: 0x0007_0000,
                        packed_info: 0x0B,
                        value: Value::Numeric(0xCAFE_F00D),
                    },
                },
            ],
            dyn_props: Vec::new(),
        }
    }

    #[test]
    fn pc_payload_round_trips() {
        let data = sample();
        let bytes = serialize(&data).unwrap();
        let parsed = parse(&bytes, 0xC5, data.type_hash).unwrap();
        assert_eq!(parsed, data);
        assert_eq!(serialize(&parsed).unwrap(), bytes);
    }

    #[test]
    fn ps3_payload_round_trips() {
        let mut data = sample();
        data.info = ObjectInfo {
            nb_class_versions: 0,
            ..ObjectInfo::default()
        };
        data.ps3_header = Some(vec![0u8; 15]);
        let bytes = serialize(&data).unwrap();
        let parsed = parse(&bytes, 0xC6, data.type_hash).unwrap();
        assert_eq!(parsed, data);
        assert_eq!(serialize(&parsed).unwrap(), bytes);
    }

    #[test]
    fn dynamic_properties_round_trip() {
        let mut data = sample();
        data.dyn_props.push(ChildRecord {
            type_prefix: TYPE_PREFIX_NUMERIC,
            record: Record {
                hash: 0x0000_0009,
                class_id: 0,
                type_id: 0x0007_0000,
                packed_info: 0x0B,
                value: Value::Numeric(99),
            },
        });
        let bytes = serialize(&data).unwrap();
        let parsed = parse(&bytes, 0xC5, data.type_hash).unwrap();
        assert_eq!(parsed, data);
    }

    #[test]
    fn block_sizes_cover_records() {
        let data = sample();
        let bytes = serialize(&data).unwrap();
        let mut reader = BinaryReader::new(&bytes);
        // Skip the PC ObjectInfo (count + empty name + id + mode) and hash.
        reader.skip(1 + 4 + 4 + 1 + 4);
        let object_block = reader.read_u32().unwrap();
        let properties_block = reader.read_u32().unwrap();
        let root_block = reader.read_u32().unwrap();
        assert_eq!(root_block, 13 + 4);
        assert_eq!(
            properties_block,
            4 + root_block + (17 + 1) + (17 + 4 + 4 + 1) + (17 + 4)
        );
        assert_eq!(object_block, 4 + properties_block + 4);
    }

    #[test]
    fn tree_mirrors_records() {
        let data = sample();
        let tree = build_property_tree(&data);
        assert_eq!(tree.hash, data.root.hash);
        assert_eq!(tree.children.len(), 3);
        assert_eq!(tree.children[0].value, PropertyValue::Bool(true));
        assert_eq!(
            tree.children[1].value,
            PropertyValue::String("Ezio".to_string())
        );
    }
}

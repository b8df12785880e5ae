//! Section 3 payload: `AssassinSingleProfileData`
//!
//! ObjectInfo and type hash, three reserved block sizes (object, properties
//! and base-class, regenerated through LIFO blocks on emit), a fixed
//! 17-byte base-class record with no size prefix, size-prefixed scalar
//! property records, and a sized dynamic-properties block.
//!
//! The stream has no explicit record count, so the reader decides per
//! 32-bit word whether it is looking at a property size or at the dynamic
//! properties size: 0 ends the list, and a value that is too small to hold
//! a record header or too large for the remaining bytes is taken as the
//! dynprops size. That heuristic comes from the game and must not change,
//! or re-encoded payloads stop matching.

use tracing::warn;

use crate::binio::{BinaryReader, BinaryWriter};
use crate::error::Result;
use crate::format::property::{Property, PropertyValue};
use crate::format::read_prefixed_string;
use crate::format::types::TypeCode;
use crate::format::ObjectInfo;

/// Minimum record payload: hash (4) + type info (8) + flags (1).
const RECORD_HEADER_SIZE: usize = 13;

/// Parsed `AssassinSingleProfileData` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleProfileData {
    pub info: ObjectInfo,
    pub type_hash: u32,
    pub base_class: BaseClass,
    pub properties: Vec<Record>,
    pub dyn_props: Vec<Record>,
}

/// The fixed base-class record: hash, descriptor, flags and one word.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaseClass {
    pub hash: u32,
    pub type_info: [u8; 8],
    pub flags: u8,
    pub value: u32,
}

/// A size-prefixed property record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub hash: u32,
    pub type_info: [u8; 8],
    pub flags: u8,
    pub value: Value,
}

/// Scalar value, typed by descriptor byte 6. Records whose size does not
/// match the dictionary width keep their bytes verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Empty,
    Bool(bool),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Quat([f32; 4]),
    Mat3x3([f32; 9]),
    Mat4x4([f32; 16]),
    Raw(Vec<u8>),
}

fn parse_typed_value(reader: &mut BinaryReader, code: TypeCode) -> Result<Value> {
    Ok(match code {
        TypeCode::Bool => Value::Bool(reader.read_u8()? != 0),
        TypeCode::Int8 => Value::Int8(reader.read_i8()?),
        TypeCode::UInt8 => Value::UInt8(reader.read_u8()?),
        TypeCode::Int16 => Value::Int16(reader.read_i16()?),
        TypeCode::UInt16 => Value::UInt16(reader.read_u16()?),
        TypeCode::Int32 => Value::Int32(reader.read_i32()?),
        TypeCode::UInt32 => Value::UInt32(reader.read_u32()?),
        TypeCode::Int64 => Value::Int64(reader.read_i64()?),
        TypeCode::UInt64 => Value::UInt64(reader.read_u64()?),
        TypeCode::Float32 => Value::Float32(reader.read_f32()?),
        TypeCode::Float64 => Value::Float64(reader.read_f64()?),
        TypeCode::Vec2 => Value::Vec2([reader.read_f32()?, reader.read_f32()?]),
        TypeCode::Vec3 => Value::Vec3([
            reader.read_f32()?,
            reader.read_f32()?,
            reader.read_f32()?,
        ]),
        TypeCode::Vec4 | TypeCode::Quat => {
            let v = [
                reader.read_f32()?,
                reader.read_f32()?,
                reader.read_f32()?,
                reader.read_f32()?,
            ];
            if code == TypeCode::Quat {
                Value::Quat(v)
            } else {
                Value::Vec4(v)
            }
        }
        TypeCode::Mat3x3 => {
            let mut m = [0f32; 9];
            for slot in &mut m {
                *slot = reader.read_f32()?;
            }
            Value::Mat3x3(m)
        }
        TypeCode::Mat4x4 => {
            let mut m = [0f32; 16];
            for slot in &mut m {
                *slot = reader.read_f32()?;
            }
            Value::Mat4x4(m)
        }
        _ => Value::Empty,
    })
}

fn write_value(writer: &mut BinaryWriter, value: &Value) {
    match value {
        Value::Empty => {}
        Value::Bool(v) => writer.write_u8(u8::from(*v)),
        Value::Int8(v) => writer.write_i8(*v),
        Value::UInt8(v) => writer.write_u8(*v),
        Value::Int16(v) => writer.write_i16(*v),
        Value::UInt16(v) => writer.write_u16(*v),
        Value::Int32(v) => writer.write_i32(*v),
        Value::UInt32(v) => writer.write_u32(*v),
        Value::Int64(v) => writer.write_i64(*v),
        Value::UInt64(v) => writer.write_u64(*v),
        Value::Float32(v) => writer.write_f32(*v),
        Value::Float64(v) => writer.write_f64(*v),
        Value::Vec2(v) => {
            for f in v {
                writer.write_f32(*f);
            }
        }
        Value::Vec3(v) => {
            for f in v {
                writer.write_f32(*f);
            }
        }
        Value::Vec4(v) | Value::Quat(v) => {
            for f in v {
                writer.write_f32(*f);
            }
        }
        Value::Mat3x3(v) => {
            for f in v {
                writer.write_f32(*f);
            }
        }
        Value::Mat4x4(v) => {
            for f in v {
                writer.write_f32(*f);
            }
        }
        Value::Raw(bytes) => writer.write_bytes(bytes),
    }
}

/// Record body shared by regular and dynamic properties: everything after
/// the size field.
fn parse_record_body(reader: &mut BinaryReader, record_size: usize) -> Result<Record> {
    let hash = reader.read_u32()?;
    let type_info: [u8; 8] = reader.read_array()?;
    let flags = reader.read_u8()?;

    let code = TypeCode::from_type_info(&type_info);
    let value_size = record_size - RECORD_HEADER_SIZE;

    let value = match code.size_bytes() {
        Some(expected) if value_size == expected => parse_typed_value(reader, code)?,
        _ if value_size > 0 => Value::Raw(reader.read_bytes(value_size)?),
        _ => Value::Empty,
    };

    Ok(Record {
        hash,
        type_info,
        flags,
        value,
    })
}

/// Parse a decompressed section-3 payload.
pub fn parse(data: &[u8]) -> Result<SingleProfileData> {
    let mut reader = BinaryReader::new(data);

    let nb_class_versions = reader.read_u8()?;
    let object_name = read_prefixed_string(&mut reader)?;
    let object_id = reader.read_u32()?;
    let instancing_mode = reader.read_u8()?;
    let info = ObjectInfo {
        nb_class_versions,
        object_name,
        object_id,
        instancing_mode,
        father_id: None,
    };

    let type_hash = reader.read_u32()?;

    reader.read_u32()?; // object block size
    reader.read_u32()?; // properties block size
    reader.read_u32()?; // base-class block size

    let base_class = BaseClass {
        hash: reader.read_u32()?,
        type_info: reader.read_array()?,
        flags: reader.read_u8()?,
        value: reader.read_u32()?,
    };

    let mut properties = Vec::new();
    let mut dyn_props = Vec::new();

    while reader.remaining() >= 4 {
        let word = reader.read_u32()? as usize;

        // Zero ends the property list: an empty dynprops block.
        if word == 0 {
            break;
        }

        // Too small for a record or larger than what is left: this word is
        // the dynamic-properties block size.
        if word < RECORD_HEADER_SIZE || word > reader.remaining() {
            if word <= reader.remaining() {
                let end = reader.position() + word;
                while reader.position() < end && reader.remaining() >= 17 {
                    let size = reader.read_u32()? as usize;
                    if size < RECORD_HEADER_SIZE || size > reader.remaining() {
                        warn!("section 3 dynamic property with invalid size {size}");
                        break;
                    }
                    match parse_record_body(&mut reader, size) {
                        Ok(record) => dyn_props.push(record),
                        Err(e) => {
                            warn!("section 3 dynamic property parse failed: {e}");
                            break;
                        }
                    }
                }
                reader.seek(end);
            }
            break;
        }

        properties.push(parse_record_body(&mut reader, word)?);
    }

    Ok(SingleProfileData {
        info,
        type_hash,
        base_class,
        properties,
        dyn_props,
    })
}

/// Re-emit a section-3 payload through the writer's LIFO blocks.
pub fn serialize(data: &SingleProfileData) -> Result<Vec<u8>> {
    let mut writer = BinaryWriter::new();

    writer.write_u8(data.info.nb_class_versions);
    writer.write_u32(data.info.object_name.len() as u32);
    writer.write_bytes(data.info.object_name.as_bytes());
    writer.write_u32(data.info.object_id);
    writer.write_u8(data.info.instancing_mode);
    writer.write_u32(data.type_hash);

    writer.open_block(); // object
    writer.open_block(); // properties
    writer.open_block(); // base class

    writer.write_u32(data.base_class.hash);
    writer.write_bytes(&data.base_class.type_info);
    writer.write_u8(data.base_class.flags);
    writer.write_u32(data.base_class.value);
    writer.close_block()?; // base class

    for record in &data.properties {
        writer.open_block();
        writer.write_u32(record.hash);
        writer.write_bytes(&record.type_info);
        writer.write_u8(record.flags);
        write_value(&mut writer, &record.value);
        writer.close_block()?;
    }
    writer.close_block()?; // properties

    writer.open_block(); // dynamic properties
    for record in &data.dyn_props {
        writer.open_block();
        writer.write_u32(record.hash);
        writer.write_bytes(&record.type_info);
        writer.write_u8(record.flags);
        write_value(&mut writer, &record.value);
        writer.close_block()?;
    }
    writer.close_block()?; // dynamic properties

    writer.close_block()?; // object
    Ok(writer.into_bytes())
}

fn property_value(value: &Value) -> PropertyValue {
    match value {
        Value::Empty => PropertyValue::None,
        Value::Bool(v) => PropertyValue::Bool(*v),
        Value::Int8(v) => PropertyValue::Int8(*v),
        Value::UInt8(v) => PropertyValue::UInt8(*v),
        Value::Int16(v) => PropertyValue::Int16(*v),
        Value::UInt16(v) => PropertyValue::UInt16(*v),
        Value::Int32(v) => PropertyValue::Int32(*v),
        Value::UInt32(v) => PropertyValue::UInt32(*v),
        Value::Int64(v) => PropertyValue::Int64(*v),
        Value::UInt64(v) => PropertyValue::UInt64(*v),
        Value::Float32(v) => PropertyValue::Float32(*v),
        Value::Float64(v) => PropertyValue::Float64(*v),
        Value::Vec2(v) => PropertyValue::Vec2(*v),
        Value::Vec3(v) => PropertyValue::Vec3(*v),
        Value::Vec4(v) => PropertyValue::Vec4(*v),
        Value::Quat(v) => PropertyValue::Quat(*v),
        Value::Mat3x3(v) => PropertyValue::Mat3x3(*v),
        Value::Mat4x4(v) => PropertyValue::Mat4x4(*v),
        Value::Raw(bytes) => PropertyValue::Raw(bytes.clone()),
    }
}

/// Build the display tree: base class first, then the property records.
pub fn build_property_tree(data: &SingleProfileData) -> Property {
    let mut root = Property::with_value(data.type_hash, PropertyValue::Container);

    let mut base = Property::with_value(
        data.base_class.hash,
        PropertyValue::UInt32(data.base_class.value),
    );
    base.type_info = data.base_class.type_info;
    base.flags = data.base_class.flags;
    root.add_child(base);

    for record in &data.properties {
        let mut child = Property::with_value(record.hash, property_value(&record.value));
        child.type_info = record.type_info;
        child.flags = record.flags;
        root.add_child(child);
    }

    root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed_record(hash: u32, code: u8, value: Value) -> Record {
        let mut type_info = [0u8; 8];
        type_info[6] = code;
        Record {
            hash,
            type_info,
            flags: 0x0B,
            value,
        }
    }

    fn sample() -> SingleProfileData {
        SingleProfileData {
            info: ObjectInfo {
                nb_class_versions: 0,
                object_name: String::new(),
                object_id: 3,
                instancing_mode: 0,
                father_id: None,
            },
            type_hash: crate::format::types::section_hash::SINGLE_PROFILE,
            base_class: BaseClass {
                hash: 0xBF4C_2013,
                type_info: [0, 0, 0, 0, 0, 0, 0x07, 0],
                flags: 0x0B,
                value: 0xAB,
            },
            properties: vec![
                typed_record(0x01, 0x00, Value::Bool(true)),
                typed_record(0x02, 0x05, Value::Int32(-12)),
                typed_record(0x03, 0x0A, Value::Float32(3.5)),
                typed_record(0x04, 0x0B, Value::Float64(-0.25)),
                typed_record(0x05, 0x0D, Value::Vec3([1.0, 2.0, 3.0])),
                typed_record(0x06, 0x09, Value::UInt64(0x0102_0304_0506_0708)),
            ],
            dyn_props: Vec::new(),
        }
    }

    #[test]
    fn payload_round_trips() {
        let data = sample();
        let bytes = serialize(&data).unwrap();
        let parsed = parse(&bytes).unwrap();
        assert_eq!(parsed, data);
        assert_eq!(serialize(&parsed).unwrap(), bytes);
    }

    #[test]
    fn small_trailing_word_is_taken_as_dynprops_size() {
        // A word below the record-header minimum is the dynprops size; its
        // content is skipped and the properties stay intact.
        let data = sample();
        let mut bytes = serialize(&data).unwrap();
        let len = bytes.len();
        bytes[len - 4..].copy_from_slice(&8u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 8]);

        let parsed = parse(&bytes).unwrap();
        assert_eq!(parsed.properties, data.properties);
        assert!(parsed.dyn_props.is_empty());
    }

    #[test]
    fn size_mismatch_keeps_raw_bytes() {
        // A "uint32" record carrying 6 bytes is preserved verbatim.
        let mut data = sample();
        data.properties = vec![typed_record(
            0x50,
            0x07,
            Value::Raw(vec![1, 2, 3, 4, 5, 6]),
        )];
        let bytes = serialize(&data).unwrap();
        let parsed = parse(&bytes).unwrap();
        assert_eq!(parsed, data);
    }

    #[test]
    fn reserved_sizes_nest() {
        let data = sample();
        let bytes = serialize(&data).unwrap();
        let mut reader = BinaryReader::new(&bytes);
        reader.skip(1 + 4 + 4 + 1 + 4); // ObjectInfo + type hash
        let object_block = reader.read_u32().unwrap() as usize;
        assert_eq!(reader.position() + object_block, bytes.len());
        let properties_block = reader.read_u32().unwrap() as usize;
        let base_block = reader.read_u32().unwrap() as usize;
        assert_eq!(base_block, 17);
        assert!(properties_block > base_block);
        assert!(object_block > properties_block);
    }

    #[test]
    fn tree_has_base_class_first() {
        let data = sample();
        let tree = build_property_tree(&data);
        assert_eq!(tree.children.len(), 7);
        assert_eq!(tree.children[0].hash, 0xBF4C_2013);
        assert_eq!(tree.children[0].value, PropertyValue::UInt32(0xAB));
        assert_eq!(tree.children[3].value, PropertyValue::Float32(3.5));
    }
}

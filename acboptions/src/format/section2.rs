//! Section 2 payload: `PlayerOptionsSaveData`
//!
//! The richest dialect: a recursive ObjectStructure. Every object is an
//! ObjectInfo, a type hash, and two sized sub-blocks (properties, then
//! dynamic properties) wrapped in a sized object block. Property records
//! are themselves sized blocks with a 13-byte header; container-typed
//! records embed whole ObjectStructures, array and vector records carry
//! counted element runs.
//!
//! Block sizes are thrown away on parse and regenerated through the
//! writer's LIFO blocks on emit.

use tracing::warn;

use crate::binio::{BinaryReader, BinaryWriter};
use crate::error::{Error, Result};
use crate::format::property::{Property, PropertyValue};
use crate::format::read_prefixed_string;
use crate::format::ObjectInfo;

// Type codes from the dialect's dispatcher, bits 16-21 of type_id.
pub const T_BOOLEAN: u8 = 0x00;
pub const T_BYTE: u8 = 0x03;
pub const T_FLOAT: u8 = 0x06;
pub const T_COMPLEX: u8 = 0x07;
pub const T_FLOAT_ALT: u8 = 0x0A;
pub const T_NUMERIC: u8 = 0x11;
pub const T_CLASS_ID: u8 = 0x12;
pub const T_CONTAINER: u8 = 0x13;
pub const T_ENUM_SMALL: u8 = 0x15;
pub const T_NESTED_OBJECT: u8 = 0x16;
pub const T_VECTOR: u8 = 0x17;
pub const T_ARRAY_ALT: u8 = 0x18;
pub const T_ENUM_VARIANT: u8 = 0x19;
pub const T_ARRAY: u8 = 0x1D;
pub const T_CLASS_ID_ALT: u8 = 0x1E;

/// Element width for array/vector content, 0 when unknown (raw bytes).
fn element_size(type_code: u8) -> usize {
    match type_code {
        T_BOOLEAN | T_BYTE => 1,
        T_FLOAT | T_COMPLEX | T_FLOAT_ALT | T_NUMERIC | T_CLASS_ID | T_ENUM_SMALL
        | T_CLASS_ID_ALT => 4,
        T_ENUM_VARIANT => 8,
        _ => 0,
    }
}

fn is_float_type(type_code: u8) -> bool {
    type_code == T_FLOAT || type_code == T_FLOAT_ALT
}

/// A recursive object: header, type hash and two property blocks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectStructure {
    pub info: ObjectInfo,
    pub t_hash: u32,
    pub properties: Vec<Record>,
    pub dyn_props: Vec<Record>,
}

/// One sized property record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub property_id: u32,
    pub class_id: u32,
    pub type_id: u32,
    pub packed_info: u8,
    pub value: Value,
}

impl Record {
    /// Type code from bits 16-21 of the type id.
    pub fn type_code(&self) -> u8 {
        ((self.type_id >> 16) & 0x3F) as u8
    }

    /// Element type code from bits 23-28 of the type id.
    pub fn element_type(&self) -> u8 {
        ((self.type_id >> 23) & 0x3F) as u8
    }
}

/// Typed record value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Zero-length value.
    Empty,
    Bool(bool),
    UInt8(u8),
    UInt32(u32),
    Float32(f32),
    EnumVariant { value: u32, class_id: u32 },
    /// Nested ObjectStructure (container / nested-object codes).
    Object(Box<ObjectStructure>),
    Array {
        content_code: u8,
        count: u32,
        elements: Elements,
    },
    Vector {
        count: u32,
        elements: Elements,
    },
    /// Value bytes of an unrecognized shape, preserved verbatim.
    Raw(Vec<u8>),
}

/// Element storage for arrays and vectors.
#[derive(Debug, Clone, PartialEq)]
pub enum Elements {
    /// Empty or zero-count run.
    None,
    UInt8(Vec<u8>),
    UInt32(Vec<u32>),
    Float32(Vec<f32>),
    EnumVariant(Vec<(u32, u32)>),
    /// Unknown element type: the run preserved as bytes.
    Raw(Vec<u8>),
}

fn parse_object_info(reader: &mut BinaryReader) -> Result<ObjectInfo> {
    let nb_class_versions = reader.read_u8()?;
    // Class-version entries (4-byte id + 2-byte version) are skipped; the
    // game only uses the count to step over them.
    for _ in 0..nb_class_versions {
        reader.read_u32()?;
        reader.read_u16()?;
    }

    let object_name = read_prefixed_string(reader)?;
    let object_id = reader.read_u32()?;
    let instancing_mode = reader.read_u8()?;
    let father_id = if instancing_mode == 1 {
        Some(reader.read_u32()?)
    } else {
        None
    };

    Ok(ObjectInfo {
        nb_class_versions,
        object_name,
        object_id,
        instancing_mode,
        father_id,
    })
}

fn write_object_info(writer: &mut BinaryWriter, info: &ObjectInfo) {
    // The skipped class-version entries cannot be reproduced, so the count
    // is written as 0 to keep the stream consistent.
    writer.write_u8(0);
    writer.write_u32(info.object_name.len() as u32);
    writer.write_bytes(info.object_name.as_bytes());
    writer.write_u32(info.object_id);
    writer.write_u8(info.instancing_mode);
    if info.instancing_mode == 1 {
        writer.write_u32(info.father_id.unwrap_or(0));
    }
}

fn parse_object_structure(reader: &mut BinaryReader) -> Result<ObjectStructure> {
    let info = parse_object_info(reader)?;
    let t_hash = reader.read_u32()?;

    reader.read_u32()?; // object block size, regenerated on emit
    let properties_size = reader.read_u32()? as usize;
    let properties_end = reader.position() + properties_size;
    let properties = parse_records(reader, properties_end);

    let dyn_size = reader.read_u32()? as usize;
    let dyn_props = if dyn_size > 0 {
        let dyn_end = reader.position() + dyn_size;
        parse_records(reader, dyn_end)
    } else {
        Vec::new()
    };

    Ok(ObjectStructure {
        info,
        t_hash,
        properties,
        dyn_props,
    })
}

/// Parse records until `end`. A malformed record abandons the rest of the
/// block; either way the reader finishes exactly at `end`.
fn parse_records(reader: &mut BinaryReader, end: usize) -> Vec<Record> {
    let mut records = Vec::new();
    while reader.position() < end && reader.remaining() >= 17 {
        match parse_record(reader) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!("section 2 property record parse failed: {e}");
                break;
            }
        }
    }
    reader.seek(end);
    records
}

fn parse_record(reader: &mut BinaryReader) -> Result<Record> {
    let start = reader.position();
    let block_size = reader.read_u32()? as usize;
    if block_size == 0 || block_size > reader.remaining() + 4 {
        return Err(Error::malformed(start, "invalid property block size"));
    }
    let record_end = reader.position() + block_size;

    let property_id = reader.read_u32()?;
    let class_id = reader.read_u32()?;
    let type_id = reader.read_u32()?;
    let packed_info = reader.read_u8()?;

    let type_code = ((type_id >> 16) & 0x3F) as u8;
    let element_type = ((type_id >> 23) & 0x3F) as u8;
    let value_size = block_size.saturating_sub(13);

    let value = if value_size == 0 {
        Value::Empty
    } else if type_code == T_CONTAINER || type_code == T_NESTED_OBJECT {
        Value::Object(Box::new(parse_object_structure(reader)?))
    } else if type_code == T_ARRAY || type_code == T_ARRAY_ALT {
        let content_code = reader.read_u8()?;
        let count = reader.read_u32()?;
        let elements = parse_elements(reader, count, element_type, value_size - 5)?;
        Value::Array {
            content_code,
            count,
            elements,
        }
    } else if type_code == T_VECTOR {
        let count = reader.read_u32()?;
        let elements = parse_elements(reader, count, element_type, value_size - 4)?;
        Value::Vector { count, elements }
    } else {
        parse_simple_value(reader, type_code, value_size)?
    };

    reader.seek(record_end);
    Ok(Record {
        property_id,
        class_id,
        type_id,
        packed_info,
        value,
    })
}

fn parse_elements(
    reader: &mut BinaryReader,
    count: u32,
    element_type: u8,
    elements_size: usize,
) -> Result<Elements> {
    if elements_size == 0 || count == 0 {
        return Ok(Elements::None);
    }

    match element_size(element_type) {
        1 => {
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                values.push(reader.read_u8()?);
            }
            Ok(Elements::UInt8(values))
        }
        4 if is_float_type(element_type) => {
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                values.push(reader.read_f32()?);
            }
            Ok(Elements::Float32(values))
        }
        4 => {
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                values.push(reader.read_u32()?);
            }
            Ok(Elements::UInt32(values))
        }
        8 => {
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let value = reader.read_u32()?;
                let class_id = reader.read_u32()?;
                values.push((value, class_id));
            }
            Ok(Elements::EnumVariant(values))
        }
        _ => Ok(Elements::Raw(reader.read_bytes(elements_size)?)),
    }
}

fn parse_simple_value(reader: &mut BinaryReader, type_code: u8, value_size: usize) -> Result<Value> {
    match value_size {
        1 => {
            let byte = reader.read_u8()?;
            if type_code == T_BOOLEAN {
                Ok(Value::Bool(byte != 0))
            } else {
                Ok(Value::UInt8(byte))
            }
        }
        4 => {
            if is_float_type(type_code) {
                Ok(Value::Float32(reader.read_f32()?))
            } else {
                Ok(Value::UInt32(reader.read_u32()?))
            }
        }
        8 => {
            let value = reader.read_u32()?;
            let class_id = reader.read_u32()?;
            Ok(Value::EnumVariant { value, class_id })
        }
        _ => Ok(Value::Raw(reader.read_bytes(value_size)?)),
    }
}

/// Parse a decompressed section-2 payload into its root object.
pub fn parse(data: &[u8]) -> Result<ObjectStructure> {
    let mut reader = BinaryReader::new(data);
    parse_object_structure(&mut reader)
}

/// Re-emit a section-2 payload, regenerating every sized block.
pub fn serialize(root: &ObjectStructure) -> Result<Vec<u8>> {
    let mut writer = BinaryWriter::new();
    write_object_structure(&mut writer, root)?;
    Ok(writer.into_bytes())
}

fn write_object_structure(writer: &mut BinaryWriter, obj: &ObjectStructure) -> Result<()> {
    write_object_info(writer, &obj.info);
    writer.write_u32(obj.t_hash);

    writer.open_block(); // object
    writer.open_block(); // properties
    for record in &obj.properties {
        write_record(writer, record)?;
    }
    writer.close_block()?;

    writer.open_block(); // dynamic properties
    for record in &obj.dyn_props {
        write_record(writer, record)?;
    }
    writer.close_block()?;

    writer.close_block()?; // object
    Ok(())
}

fn write_record(writer: &mut BinaryWriter, record: &Record) -> Result<()> {
    writer.open_block();
    writer.write_u32(record.property_id);
    writer.write_u32(record.class_id);
    writer.write_u32(record.type_id);
    writer.write_u8(record.packed_info);

    match &record.value {
        Value::Empty => {}
        Value::Bool(v) => writer.write_u8(u8::from(*v)),
        Value::UInt8(v) => writer.write_u8(*v),
        Value::UInt32(v) => writer.write_u32(*v),
        Value::Float32(v) => writer.write_f32(*v),
        Value::EnumVariant { value, class_id } => {
            writer.write_u32(*value);
            writer.write_u32(*class_id);
        }
        Value::Object(obj) => write_object_structure(writer, obj)?,
        Value::Array {
            content_code,
            count,
            elements,
        } => {
            writer.write_u8(*content_code);
            writer.write_u32(*count);
            write_elements(writer, elements);
        }
        Value::Vector { count, elements } => {
            writer.write_u32(*count);
            write_elements(writer, elements);
        }
        Value::Raw(bytes) => writer.write_bytes(bytes),
    }

    writer.close_block()?;
    Ok(())
}

fn write_elements(writer: &mut BinaryWriter, elements: &Elements) {
    match elements {
        Elements::None => {}
        Elements::UInt8(values) => {
            for v in values {
                writer.write_u8(*v);
            }
        }
        Elements::UInt32(values) => {
            for v in values {
                writer.write_u32(*v);
            }
        }
        Elements::Float32(values) => {
            for v in values {
                writer.write_f32(*v);
            }
        }
        Elements::EnumVariant(values) => {
            for (value, class_id) in values {
                writer.write_u32(*value);
                writer.write_u32(*class_id);
            }
        }
        Elements::Raw(bytes) => writer.write_bytes(bytes),
    }
}

/// Build the display tree from the root object.
pub fn build_property_tree(root: &ObjectStructure) -> Property {
    let mut prop = Property::with_value(root.t_hash, PropertyValue::Container);
    for record in &root.properties {
        prop.add_child(property_from_record(record));
    }
    prop
}

fn property_from_record(record: &Record) -> Property {
    let mut prop = Property::new(record.property_id);
    prop.flags = record.packed_info;
    prop.set_type_ids(record.class_id, record.type_id);

    match &record.value {
        Value::Empty => prop.value = PropertyValue::None,
        Value::Bool(v) => prop.value = PropertyValue::Bool(*v),
        Value::UInt8(v) => prop.value = PropertyValue::UInt8(*v),
        Value::UInt32(v) => prop.value = PropertyValue::UInt32(*v),
        Value::Float32(v) => prop.value = PropertyValue::Float32(*v),
        Value::EnumVariant { value, class_id } => {
            prop.value = PropertyValue::EnumVariant {
                value: *value,
                class_id: *class_id,
            };
        }
        Value::Object(obj) => {
            prop.value = PropertyValue::Container;
            for child in &obj.properties {
                prop.add_child(property_from_record(child));
            }
        }
        Value::Array { elements, .. } | Value::Vector { elements, .. } => {
            prop.value = PropertyValue::Array;
            add_element_children(&mut prop, elements, record.element_type());
        }
        Value::Raw(bytes) => prop.value = PropertyValue::Raw(bytes.clone()),
    }

    prop
}

fn add_element_children(prop: &mut Property, elements: &Elements, element_type: u8) {
    let mut elem_type_info = [0u8; 8];
    elem_type_info[6] = element_type & 0x3F;

    let mut push = |index: usize, value: PropertyValue| {
        let mut child = Property::with_value(index as u32, value);
        child.type_info = elem_type_info;
        prop.add_child(child);
    };

    match elements {
        Elements::None => {}
        Elements::UInt8(values) => {
            for (i, v) in values.iter().enumerate() {
                if element_type == T_BOOLEAN {
                    push(i, PropertyValue::Bool(*v != 0));
                } else {
                    push(i, PropertyValue::UInt8(*v));
                }
            }
        }
        Elements::UInt32(values) => {
            for (i, v) in values.iter().enumerate() {
                push(i, PropertyValue::UInt32(*v));
            }
        }
        Elements::Float32(values) => {
            for (i, v) in values.iter().enumerate() {
                push(i, PropertyValue::Float32(*v));
            }
        }
        Elements::EnumVariant(values) => {
            for (i, (value, class_id)) in values.iter().enumerate() {
                push(
                    i,
                    PropertyValue::EnumVariant {
                        value: *value,
                        class_id: *class_id,
                    },
                );
            }
        }
        Elements::Raw(bytes) => {
            push(0, PropertyValue::Raw(bytes.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(property_id: u32, type_code: u8, value: Value) -> Record {
        Record {
            property_id,
            class_id: 0x2222_0000 | u32::from(type_code),
            type_id: u32::from(type_code) << 16,
            packed_info: 0x0B,
            value,
        }
    }

    fn array_record(property_id: u32, type_code: u8, element_type: u8, value: Value) -> Record {
        Record {
            property_id,
            class_id: 0,
            type_id: (u32::from(type_code) << 16) | (u32::from(element_type) << 23),
            packed_info: 0x0B,
            value,
        }
    }

    fn sample() -> ObjectStructure {
        let nested = ObjectStructure {
            info: ObjectInfo {
                nb_class_versions: 0,
                object_name: "Audio".to_string(),
                object_id: 5,
                instancing_mode: 0,
                father_id: None,
            },
            t_hash: 0x3333_3333,
            properties: vec![
                record(0x10, T_FLOAT, Value::Float32(0.75)),
                record(0x11, T_BOOLEAN, Value::Bool(false)),
            ],
            dyn_props: Vec::new(),
        };

        ObjectStructure {
            info: ObjectInfo {
                nb_class_versions: 0,
                object_name: String::new(),
                object_id: 1,
                instancing_mode: 1,
                father_id: Some(0x9999_9999),
            },
            t_hash: crate::format::types::section_hash::PLAYER_OPTIONS,
            properties: vec![
                record(0x01, T_BOOLEAN, Value::Bool(true)),
                record(0x02, T_NUMERIC, Value::UInt32(1280)),
                record(
                    0x03,
                    T_ENUM_VARIANT,
                    Value::EnumVariant {
                        value: 2,
                        class_id: 0x4444_4444,
                    },
                ),
                record(0x04, T_CONTAINER, Value::Object(Box::new(nested))),
                array_record(
                    0x05,
                    T_ARRAY,
                    T_NUMERIC,
                    Value::Array {
                        content_code: 1,
                        count: 3,
                        elements: Elements::UInt32(vec![7, 8, 9]),
                    },
                ),
                array_record(
                    0x06,
                    T_VECTOR,
                    T_FLOAT,
                    Value::Vector {
                        count: 2,
                        elements: Elements::Float32(vec![0.5, 1.5]),
                    },
                ),
            ],
            dyn_props: vec![record(0x07, T_NUMERIC, Value::UInt32(42))],
        }
    }

    #[test]
    fn payload_round_trips() {
        let root = sample();
        let bytes = serialize(&root).unwrap();
        let parsed = parse(&bytes).unwrap();
        assert_eq!(parsed, root);
        assert_eq!(serialize(&parsed).unwrap(), bytes);
    }

    #[test]
    fn block_sizes_are_backpatched() {
        let root = sample();
        let bytes = serialize(&root).unwrap();
        let mut reader = BinaryReader::new(&bytes);

        // count byte + empty name + object id + instancing + father + hash
        reader.skip(1 + 4 + 4 + 1 + 4 + 4);
        let object_block = reader.read_u32().unwrap() as usize;
        // Object block runs to the end of the payload.
        assert_eq!(reader.position() + object_block, bytes.len());
        let properties_block = reader.read_u32().unwrap() as usize;
        assert!(properties_block < object_block);
    }

    #[test]
    fn unknown_element_type_preserved_as_raw() {
        let root = ObjectStructure {
            info: ObjectInfo::default(),
            t_hash: 1,
            properties: vec![array_record(
                0x01,
                T_ARRAY,
                0x3F,
                Value::Array {
                    content_code: 0,
                    count: 2,
                    elements: Elements::Raw(vec![0xAA, 0xBB, 0xCC]),
                },
            )],
            dyn_props: Vec::new(),
        };
        let bytes = serialize(&root).unwrap();
        let parsed = parse(&bytes).unwrap();
        assert_eq!(parsed, root);
    }

    #[test]
    fn odd_sized_value_preserved_as_raw() {
        let root = ObjectStructure {
            info: ObjectInfo::default(),
            t_hash: 1,
            properties: vec![record(0x01, T_NUMERIC, Value::Raw(vec![1, 2, 3, 4, 5, 6]))],
            dyn_props: Vec::new(),
        };
        let bytes = serialize(&root).unwrap();
        let parsed = parse(&bytes).unwrap();
        assert_eq!(parsed, root);
    }

    #[test]
    fn malformed_record_skips_to_block_end() {
        let root = sample();
        let mut bytes = serialize(&root).unwrap();
        // Corrupt the first record's block size (offset: info 14 + hash 4 +
        // object block 4 + properties block 4).
        let first_record = 14 + 4 + 4 + 4;
        bytes[first_record] = 0xFF;
        bytes[first_record + 1] = 0xFF;
        bytes[first_record + 2] = 0xFF;
        bytes[first_record + 3] = 0xFF;
        // Parsing still succeeds; the damaged properties block is dropped.
        let parsed = parse(&bytes).unwrap();
        assert!(parsed.properties.is_empty());
        assert_eq!(parsed.dyn_props.len(), 1);
    }

    #[test]
    fn tree_exposes_nested_children() {
        let root = sample();
        let tree = build_property_tree(&root);
        assert_eq!(tree.children.len(), 6);
        let container = &tree.children[3];
        assert_eq!(container.value, PropertyValue::Container);
        assert_eq!(container.children.len(), 2);
        let array = &tree.children[4];
        assert_eq!(array.children.len(), 3);
        assert_eq!(array.children[1].value, PropertyValue::UInt32(8));
    }
}

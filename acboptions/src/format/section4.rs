//! Section 4 payload: `AssassinMultiProfileData` (Mode 3)
//!
//! Same ObjectStructure skeleton as section 2, with three twists:
//!
//! - property headers are 12 bytes (id + 8-byte descriptor) with no flags
//!   byte;
//! - a 0x0B marker byte precedes every fixed-size scalar value and every
//!   length-prefixed aggregate header (strings, arrays, maps). Parsers
//!   tolerate a missing marker by rewinding one byte; emitters always
//!   write it;
//! - the ObjectInfo carries a 4-byte name hash instead of a string.
//!
//! Maps hold CLASS entries, each a full ObjectInfo + type hash + sized
//! object block of nested property records. Arrays hold scalar runs, or
//! CLASS entries when their element type is the class code.

use tracing::warn;

use crate::binio::{BinaryReader, BinaryWriter};
use crate::error::Result;
use crate::format::property::{Property, PropertyValue};
use crate::format::types::element_type_raw;

// Type codes for the Mode-3 dispatcher, bits 0-5 of descriptor byte 6.
pub const T_BOOL: u8 = 0x00;
pub const T_BOOL_ALT: u8 = 0x01;
pub const T_UINT8: u8 = 0x02;
pub const T_INT8: u8 = 0x03;
pub const T_UINT16: u8 = 0x04;
pub const T_INT16: u8 = 0x05;
pub const T_INT32_V2: u8 = 0x06;
pub const T_UINT32: u8 = 0x07;
pub const T_INT32: u8 = 0x08;
pub const T_UINT64: u8 = 0x09;
pub const T_FLOAT32: u8 = 0x0A;
pub const T_FLOAT64: u8 = 0x0B;
pub const T_VEC2: u8 = 0x0C;
pub const T_VEC3: u8 = 0x0D;
pub const T_VEC4: u8 = 0x0E;
pub const T_MAT3X3: u8 = 0x0F;
pub const T_MAT4X4: u8 = 0x10;
pub const T_STRING: u8 = 0x11;
pub const T_CLASS: u8 = 0x16;
pub const T_ARRAY: u8 = 0x17;
pub const T_MAP: u8 = 0x18;
pub const T_ENUM: u8 = 0x19;
pub const T_VAR_STRING: u8 = 0x1B;
pub const T_MAP_ALT: u8 = 0x1D;

/// Marker byte written before values in Mode 3.
pub const VALUE_MARKER: u8 = 0x0B;

/// Fixed widths for this dialect's scalar codes, `None` for variable.
fn type_size(code: u8) -> Option<usize> {
    match code {
        T_BOOL | T_BOOL_ALT | T_UINT8 | T_INT8 => Some(1),
        T_UINT16 | T_INT16 => Some(2),
        T_INT32_V2 | T_UINT32 | T_INT32 | T_FLOAT32 => Some(4),
        T_UINT64 | T_FLOAT64 | T_VEC2 | T_ENUM => Some(8),
        T_VEC3 => Some(12),
        T_VEC4 => Some(16),
        T_MAT3X3 => Some(36),
        T_MAT4X4 => Some(64),
        _ => None,
    }
}

/// Mode-3 ObjectInfo: 10 bytes, with a name hash instead of a string.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Mode3ObjectInfo {
    pub nb_class_versions: u8,
    pub object_name: u32,
    pub object_id: u32,
    pub instancing_mode: u8,
}

/// Parsed `AssassinMultiProfileData` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiProfileData {
    pub info: Mode3ObjectInfo,
    pub type_hash: u32,
    pub properties: Vec<Record>,
    pub dyn_props: Vec<Record>,
}

/// A property record: 12-byte header, no flags byte.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub property_id: u32,
    pub type_descriptor: [u8; 8],
    pub value: Value,
}

impl Record {
    /// Type code from descriptor byte 6.
    pub fn type_code(&self) -> u8 {
        self.type_descriptor[6] & 0x3F
    }

    /// Element type packed across descriptor bytes 6 and 7.
    pub fn element_type(&self) -> u8 {
        element_type_raw(&self.type_descriptor)
    }
}

/// A CLASS entry inside a map or class-typed value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassEntry {
    pub info: Mode3ObjectInfo,
    pub type_hash: u32,
    pub properties: Vec<Record>,
    /// Bytes of the entry's dynamic-properties block, preserved verbatim.
    pub dyn_props_raw: Vec<u8>,
}

/// Typed record value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Empty,
    Bool(bool),
    UInt8(u8),
    Int8(i8),
    UInt16(u16),
    Int16(i16),
    Int32(i32),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat3x3([f32; 9]),
    Mat4x4([f32; 16]),
    Enum { value: u32, class_id: u32 },
    String(String),
    Array { count: u32, elements: Elements },
    Map {
        count: u32,
        entries: Vec<ClassEntry>,
        /// Leftover map content when the element type is not a class.
        tail: Vec<u8>,
    },
    Class(Box<ClassEntry>),
    Raw(Vec<u8>),
}

/// Element storage for arrays.
#[derive(Debug, Clone, PartialEq)]
pub enum Elements {
    None,
    UInt8(Vec<u8>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Classes(Vec<ClassEntry>),
    /// Elements of an unsupported width, preserved as bytes.
    Raw(Vec<u8>),
}

fn parse_object_info(reader: &mut BinaryReader) -> Result<Mode3ObjectInfo> {
    Ok(Mode3ObjectInfo {
        nb_class_versions: reader.read_u8()?,
        object_name: reader.read_u32()?,
        object_id: reader.read_u32()?,
        instancing_mode: reader.read_u8()?,
    })
}

fn write_object_info(writer: &mut BinaryWriter, info: &Mode3ObjectInfo) {
    writer.write_u8(info.nb_class_versions);
    writer.write_u32(info.object_name);
    writer.write_u32(info.object_id);
    writer.write_u8(info.instancing_mode);
}

/// Consume the 0x0B value marker, rewinding when it is absent.
fn read_value_marker(reader: &mut BinaryReader) -> Result<()> {
    let pos = reader.position();
    let marker = reader.read_u8()?;
    if marker != VALUE_MARKER {
        warn!("section 4: expected 0x0B value marker, found {marker:#04x}");
        reader.seek(pos);
    }
    Ok(())
}

fn parse_marked_string(reader: &mut BinaryReader) -> Result<Value> {
    read_value_marker(reader)?;
    let len = reader.read_u32()? as usize;
    let bytes = reader.read_bytes(len)?;
    reader.read_u8()?; // NUL terminator
    Ok(Value::String(String::from_utf8_lossy(&bytes).into_owned()))
}

fn write_marked_string(writer: &mut BinaryWriter, value: &str) {
    writer.write_u8(VALUE_MARKER);
    writer.write_u32(value.len() as u32);
    writer.write_bytes(value.as_bytes());
    writer.write_u8(0);
}

fn parse_class_entry(reader: &mut BinaryReader) -> Result<ClassEntry> {
    let info = parse_object_info(reader)?;
    let type_hash = reader.read_u32()?;

    let object_size = reader.read_u32()? as usize;
    let object_end = reader.position() + object_size;
    let properties_size = reader.read_u32()? as usize;
    let properties_end = reader.position() + properties_size;

    let mut properties = Vec::new();
    while reader.position() < properties_end && reader.remaining() >= 12 {
        let prop_size = reader.read_u32()? as usize;
        if prop_size == 0 {
            break;
        }
        let prop_end = reader.position() + prop_size;
        match parse_record_body(reader, prop_end) {
            Ok(record) => properties.push(record),
            Err(e) => {
                warn!("section 4 class-entry property parse failed: {e}");
                break;
            }
        }
    }
    reader.seek(properties_end);

    let _dyn_size = reader.read_u32()?;
    let tail_len = object_end
        .saturating_sub(reader.position())
        .min(reader.remaining());
    let dyn_props_raw = reader.read_bytes(tail_len)?;
    reader.seek(object_end);

    Ok(ClassEntry {
        info,
        type_hash,
        properties,
        dyn_props_raw,
    })
}

fn write_class_entry(writer: &mut BinaryWriter, entry: &ClassEntry) -> Result<()> {
    write_object_info(writer, &entry.info);
    writer.write_u32(entry.type_hash);

    writer.open_block(); // object
    writer.open_block(); // properties
    for record in &entry.properties {
        write_record(writer, record)?;
    }
    writer.close_block()?;

    writer.write_u32(entry.dyn_props_raw.len() as u32);
    writer.write_bytes(&entry.dyn_props_raw);
    writer.close_block()?; // object
    Ok(())
}

fn parse_class_entries(reader: &mut BinaryReader, count: u32) -> Result<Vec<ClassEntry>> {
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        entries.push(parse_class_entry(reader)?);
    }
    Ok(entries)
}

/// Record body after the size field: id, descriptor, value. Always leaves
/// the reader at `end`.
fn parse_record_body(reader: &mut BinaryReader, end: usize) -> Result<Record> {
    let property_id = reader.read_u32()?;
    let type_descriptor: [u8; 8] = reader.read_array()?;
    let type_code = type_descriptor[6] & 0x3F;
    let element_type = element_type_raw(&type_descriptor);

    let value = parse_value(reader, type_code, element_type, end)?;
    reader.seek(end);

    Ok(Record {
        property_id,
        type_descriptor,
        value,
    })
}

fn parse_value(
    reader: &mut BinaryReader,
    type_code: u8,
    element_type: u8,
    end: usize,
) -> Result<Value> {
    let bytes_remaining = end.saturating_sub(reader.position());

    if type_size(type_code).is_some() && bytes_remaining > 0 {
        read_value_marker(reader)?;
    }

    match type_code {
        T_BOOL | T_BOOL_ALT => Ok(Value::Bool(reader.read_u8()? != 0)),
        T_UINT8 => Ok(Value::UInt8(reader.read_u8()?)),
        T_INT8 => Ok(Value::Int8(reader.read_i8()?)),
        T_UINT16 => Ok(Value::UInt16(reader.read_u16()?)),
        T_INT16 => Ok(Value::Int16(reader.read_i16()?)),
        T_INT32 | T_INT32_V2 => Ok(Value::Int32(reader.read_i32()?)),
        T_UINT32 => Ok(Value::UInt32(reader.read_u32()?)),
        T_UINT64 => Ok(Value::UInt64(reader.read_u64()?)),
        T_FLOAT32 => Ok(Value::Float32(reader.read_f32()?)),
        T_FLOAT64 => Ok(Value::Float64(reader.read_f64()?)),
        T_VEC2 => Ok(Value::Vec2([reader.read_f32()?, reader.read_f32()?])),
        T_VEC3 => Ok(Value::Vec3([
            reader.read_f32()?,
            reader.read_f32()?,
            reader.read_f32()?,
        ])),
        T_VEC4 => Ok(Value::Vec4([
            reader.read_f32()?,
            reader.read_f32()?,
            reader.read_f32()?,
            reader.read_f32()?,
        ])),
        T_MAT3X3 => {
            let mut m = [0f32; 9];
            for slot in &mut m {
                *slot = reader.read_f32()?;
            }
            Ok(Value::Mat3x3(m))
        }
        T_MAT4X4 => {
            let mut m = [0f32; 16];
            for slot in &mut m {
                *slot = reader.read_f32()?;
            }
            Ok(Value::Mat4x4(m))
        }
        T_ENUM => {
            let value = reader.read_u32()?;
            let class_id = reader.read_u32()?;
            Ok(Value::Enum { value, class_id })
        }
        T_STRING | T_VAR_STRING => parse_marked_string(reader),
        T_MAP | T_MAP_ALT => {
            read_value_marker(reader)?;
            let count = reader.read_u32()?;
            if count > 0 && element_type == T_CLASS {
                let entries = parse_class_entries(reader, count)?;
                Ok(Value::Map {
                    count,
                    entries,
                    tail: Vec::new(),
                })
            } else {
                let tail_len = end.saturating_sub(reader.position());
                Ok(Value::Map {
                    count,
                    entries: Vec::new(),
                    tail: reader.read_bytes(tail_len)?,
                })
            }
        }
        T_ARRAY => {
            read_value_marker(reader)?;
            let count = reader.read_u32()?;
            if element_type == T_CLASS {
                let entries = parse_class_entries(reader, count)?;
                return Ok(Value::Array {
                    count,
                    elements: Elements::Classes(entries),
                });
            }
            let elements = if count == 0 {
                Elements::None
            } else {
                match type_size(element_type) {
                    Some(1) => {
                        let mut values = Vec::with_capacity(count as usize);
                        for _ in 0..count {
                            values.push(reader.read_u8()?);
                        }
                        Elements::UInt8(values)
                    }
                    Some(4) => {
                        let mut values = Vec::with_capacity(count as usize);
                        for _ in 0..count {
                            values.push(reader.read_u32()?);
                        }
                        Elements::UInt32(values)
                    }
                    Some(8) => {
                        let mut values = Vec::with_capacity(count as usize);
                        for _ in 0..count {
                            values.push(reader.read_u64()?);
                        }
                        Elements::UInt64(values)
                    }
                    _ => {
                        let tail_len = end.saturating_sub(reader.position());
                        Elements::Raw(reader.read_bytes(tail_len)?)
                    }
                }
            };
            Ok(Value::Array { count, elements })
        }
        T_CLASS => Ok(Value::Class(Box::new(parse_class_entry(reader)?))),
        _ => {
            if bytes_remaining > 0 {
                let tail_len = end.saturating_sub(reader.position());
                Ok(Value::Raw(reader.read_bytes(tail_len)?))
            } else {
                Ok(Value::Empty)
            }
        }
    }
}

fn write_value(writer: &mut BinaryWriter, value: &Value) -> Result<()> {
    // Fixed-size scalars get the marker here; aggregates write their own.
    match value {
        Value::Bool(_)
        | Value::UInt8(_)
        | Value::Int8(_)
        | Value::UInt16(_)
        | Value::Int16(_)
        | Value::Int32(_)
        | Value::UInt32(_)
        | Value::UInt64(_)
        | Value::Float32(_)
        | Value::Float64(_)
        | Value::Vec2(_)
        | Value::Vec3(_)
        | Value::Vec4(_)
        | Value::Mat3x3(_)
        | Value::Mat4x4(_)
        | Value::Enum { .. } => writer.write_u8(VALUE_MARKER),
        _ => {}
    }

    match value {
        Value::Empty => {}
        Value::Bool(v) => writer.write_u8(u8::from(*v)),
        Value::UInt8(v) => writer.write_u8(*v),
        Value::Int8(v) => writer.write_i8(*v),
        Value::UInt16(v) => writer.write_u16(*v),
        Value::Int16(v) => writer.write_i16(*v),
        Value::Int32(v) => writer.write_i32(*v),
        Value::UInt32(v) => writer.write_u32(*v),
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
        Value::Vec4(v) => {
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
        Value::Enum { value, class_id } => {
            writer.write_u32(*value);
            writer.write_u32(*class_id);
        }
        Value::String(s) => write_marked_string(writer, s),
        Value::Map {
            count,
            entries,
            tail,
        } => {
            writer.write_u8(VALUE_MARKER);
            writer.write_u32(*count);
            for entry in entries {
                write_class_entry(writer, entry)?;
            }
            writer.write_bytes(tail);
        }
        Value::Array { count, elements } => {
            writer.write_u8(VALUE_MARKER);
            writer.write_u32(*count);
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
                Elements::UInt64(values) => {
                    for v in values {
                        writer.write_u64(*v);
                    }
                }
                Elements::Classes(entries) => {
                    for entry in entries {
                        write_class_entry(writer, entry)?;
                    }
                }
                Elements::Raw(bytes) => writer.write_bytes(bytes),
            }
        }
        Value::Class(entry) => write_class_entry(writer, entry)?,
        Value::Raw(bytes) => writer.write_bytes(bytes),
    }

    Ok(())
}

fn write_record(writer: &mut BinaryWriter, record: &Record) -> Result<()> {
    writer.open_block();
    writer.write_u32(record.property_id);
    writer.write_bytes(&record.type_descriptor);
    write_value(writer, &record.value)?;
    writer.close_block()?;
    Ok(())
}

fn parse_records(reader: &mut BinaryReader, end: usize) -> Vec<Record> {
    let mut records = Vec::new();
    while reader.position() < end && reader.remaining() >= 16 {
        let result = reader.read_u32().and_then(|size| {
            let prop_end = reader.position() + size as usize;
            parse_record_body(reader, prop_end)
        });
        match result {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!("section 4 property record parse failed: {e}");
                break;
            }
        }
    }
    reader.seek(end);
    records
}

/// Parse a decompressed section-4 payload.
pub fn parse(data: &[u8]) -> Result<MultiProfileData> {
    let mut reader = BinaryReader::new(data);

    let info = parse_object_info(&mut reader)?;
    let type_hash = reader.read_u32()?;

    reader.read_u32()?; // object block size, regenerated on emit
    let properties_size = reader.read_u32()? as usize;
    let properties_end = reader.position() + properties_size;
    let properties = parse_records(&mut reader, properties_end);

    let dyn_size = reader.read_u32()? as usize;
    let dyn_props = if dyn_size > 0 {
        let dyn_end = reader.position() + dyn_size;
        parse_records(&mut reader, dyn_end)
    } else {
        Vec::new()
    };

    Ok(MultiProfileData {
        info,
        type_hash,
        properties,
        dyn_props,
    })
}

/// Re-emit a section-4 payload.
pub fn serialize(data: &MultiProfileData) -> Result<Vec<u8>> {
    let mut writer = BinaryWriter::new();

    write_object_info(&mut writer, &data.info);
    writer.write_u32(data.type_hash);

    writer.open_block(); // object
    writer.open_block(); // properties
    for record in &data.properties {
        write_record(&mut writer, record)?;
    }
    writer.close_block()?;

    writer.open_block(); // dynamic properties
    for record in &data.dyn_props {
        write_record(&mut writer, record)?;
    }
    writer.close_block()?;

    writer.close_block()?; // object
    Ok(writer.into_bytes())
}

fn property_from_class_entry(index: u32, entry: &ClassEntry) -> Property {
    let mut prop = Property::with_value(index, PropertyValue::Container);
    let mut type_info = [0u8; 8];
    type_info[6] = T_CLASS;
    prop.type_info = type_info;
    for record in &entry.properties {
        prop.add_child(property_from_record(record));
    }
    prop
}

fn property_from_record(record: &Record) -> Property {
    let mut prop = Property::new(record.property_id);
    prop.type_info = record.type_descriptor;

    match &record.value {
        Value::Empty => prop.value = PropertyValue::None,
        Value::Bool(v) => prop.value = PropertyValue::Bool(*v),
        Value::UInt8(v) => prop.value = PropertyValue::UInt8(*v),
        Value::Int8(v) => prop.value = PropertyValue::Int8(*v),
        Value::UInt16(v) => prop.value = PropertyValue::UInt16(*v),
        Value::Int16(v) => prop.value = PropertyValue::Int16(*v),
        Value::Int32(v) => prop.value = PropertyValue::Int32(*v),
        Value::UInt32(v) => prop.value = PropertyValue::UInt32(*v),
        Value::UInt64(v) => prop.value = PropertyValue::UInt64(*v),
        Value::Float32(v) => prop.value = PropertyValue::Float32(*v),
        Value::Float64(v) => prop.value = PropertyValue::Float64(*v),
        Value::Vec2(v) => prop.value = PropertyValue::Vec2(*v),
        Value::Vec3(v) => prop.value = PropertyValue::Vec3(*v),
        Value::Vec4(v) => prop.value = PropertyValue::Vec4(*v),
        Value::Mat3x3(v) => prop.value = PropertyValue::Mat3x3(*v),
        Value::Mat4x4(v) => prop.value = PropertyValue::Mat4x4(*v),
        Value::Enum { value, class_id } => {
            prop.value = PropertyValue::EnumVariant {
                value: *value,
                class_id: *class_id,
            };
        }
        Value::String(s) => prop.value = PropertyValue::String(s.clone()),
        Value::Map { entries, .. } => {
            prop.value = PropertyValue::Container;
            for (i, entry) in entries.iter().enumerate() {
                prop.add_child(property_from_class_entry(i as u32, entry));
            }
        }
        Value::Array { elements, .. } => {
            prop.value = PropertyValue::Array;
            let element_type = record.element_type();
            let mut elem_type_info = [0u8; 8];
            elem_type_info[6] = element_type & 0x3F;
            match elements {
                Elements::None => {}
                Elements::UInt8(values) => {
                    for (i, v) in values.iter().enumerate() {
                        let mut child =
                            Property::with_value(i as u32, PropertyValue::UInt8(*v));
                        child.type_info = elem_type_info;
                        prop.add_child(child);
                    }
                }
                Elements::UInt32(values) => {
                    for (i, v) in values.iter().enumerate() {
                        let mut child =
                            Property::with_value(i as u32, PropertyValue::UInt32(*v));
                        child.type_info = elem_type_info;
                        prop.add_child(child);
                    }
                }
                Elements::UInt64(values) => {
                    for (i, v) in values.iter().enumerate() {
                        let mut child =
                            Property::with_value(i as u32, PropertyValue::UInt64(*v));
                        child.type_info = elem_type_info;
                        prop.add_child(child);
                    }
                }
                Elements::Classes(entries) => {
                    for (i, entry) in entries.iter().enumerate() {
                        prop.add_child(property_from_class_entry(i as u32, entry));
                    }
                }
                Elements::Raw(bytes) => {
                    let mut child =
                        Property::with_value(0, PropertyValue::Raw(bytes.clone()));
                    child.type_info = elem_type_info;
                    prop.add_child(child);
                }
            }
        }
        Value::Class(entry) => {
            prop.value = PropertyValue::Container;
            for record in &entry.properties {
                prop.add_child(property_from_record(record));
            }
        }
        Value::Raw(bytes) => prop.value = PropertyValue::Raw(bytes.clone()),
    }

    prop
}

/// Build the display tree from the parsed payload.
pub fn build_property_tree(data: &MultiProfileData) -> Property {
    let mut root = Property::with_value(data.type_hash, PropertyValue::Container);
    for record in &data.properties {
        root.add_child(property_from_record(record));
    }
    root
}

//! In-memory property tree surfaced to the editor and exporter
//!
//! Each parsed section builds one of these trees from its own record types.
//! Properties own their children by value; parents are never back-linked,
//! so the tree is a plain acyclic value.

use crate::format::types::TypeCode;
use crate::names::NameTable;

/// Typed value held by a [`Property`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PropertyValue {
    /// No value (container headers, unparsed records).
    #[default]
    None,
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
    String(String),
    /// Two 32-bit words: the enum value and its class hash.
    EnumVariant { value: u32, class_id: u32 },
    /// Fixed array or vector; elements live in the property's children.
    Array,
    /// Class/object container; members live in the property's children.
    Container,
    /// Bytes of a value whose type code is not understood.
    Raw(Vec<u8>),
}

impl PropertyValue {
    /// Short human-readable rendering for list views.
    pub fn to_display_string(&self) -> String {
        match self {
            PropertyValue::None => String::new(),
            PropertyValue::Bool(v) => v.to_string(),
            PropertyValue::Int8(v) => v.to_string(),
            PropertyValue::UInt8(v) => v.to_string(),
            PropertyValue::Int16(v) => v.to_string(),
            PropertyValue::UInt16(v) => v.to_string(),
            PropertyValue::Int32(v) => v.to_string(),
            PropertyValue::UInt32(v) => v.to_string(),
            PropertyValue::Int64(v) => v.to_string(),
            PropertyValue::UInt64(v) => v.to_string(),
            PropertyValue::Float32(v) => v.to_string(),
            PropertyValue::Float64(v) => v.to_string(),
            PropertyValue::Vec2(v) => format!("({}, {})", v[0], v[1]),
            PropertyValue::Vec3(v) => format!("({}, {}, {})", v[0], v[1], v[2]),
            PropertyValue::Vec4(v) | PropertyValue::Quat(v) => {
                format!("({}, {}, {}, {})", v[0], v[1], v[2], v[3])
            }
            PropertyValue::Mat3x3(_) => "mat3x3".to_string(),
            PropertyValue::Mat4x4(_) => "mat4x4".to_string(),
            PropertyValue::String(v) => v.clone(),
            PropertyValue::EnumVariant { value, class_id } => {
                format!("{value} ({class_id:#010x})")
            }
            PropertyValue::Array => "[...]".to_string(),
            PropertyValue::Container => "{...}".to_string(),
            PropertyValue::Raw(bytes) => format!("{} raw bytes", bytes.len()),
        }
    }
}

/// One node of the property tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Property {
    /// 32-bit identity hash.
    pub hash: u32,
    /// The 8-byte type descriptor as stored on disk.
    pub type_info: [u8; 8],
    /// Flags byte (0 in the Mode-3 dialect, which has none).
    pub flags: u8,
    /// Typed value.
    pub value: PropertyValue,
    /// Ordered child properties.
    pub children: Vec<Property>,
}

impl Property {
    /// Create a property with a hash and no value.
    pub fn new(hash: u32) -> Self {
        Property {
            hash,
            ..Property::default()
        }
    }

    /// Create a property with a hash and value.
    pub fn with_value(hash: u32, value: PropertyValue) -> Self {
        Property {
            hash,
            value,
            ..Property::default()
        }
    }

    /// Type code decoded from the descriptor.
    pub fn type_code(&self) -> TypeCode {
        TypeCode::from_type_info(&self.type_info)
    }

    /// Build the descriptor from a (class hash, type id) pair, the way
    /// sections 1 and 2 pack it.
    pub fn set_type_ids(&mut self, class_id: u32, type_id: u32) {
        self.type_info[..4].copy_from_slice(&class_id.to_le_bytes());
        self.type_info[4..].copy_from_slice(&type_id.to_le_bytes());
    }

    /// Append a child property.
    pub fn add_child(&mut self, child: Property) {
        self.children.push(child);
    }

    /// Name for display, resolved through the external hash dictionary
    /// with a hex fallback.
    pub fn display_name(&self, names: &NameTable) -> String {
        names
            .lookup(self.hash)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("{:#010x}", self.hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_ids_round_trip_through_descriptor() {
        let mut prop = Property::new(0xDEAD_BEEF);
        prop.set_type_ids(0x1122_3344, 0x000A_0000);
        assert_eq!(prop.type_info[..4], 0x1122_3344u32.to_le_bytes());
        assert_eq!(prop.type_code(), TypeCode::Float32);
    }

    #[test]
    fn display_name_falls_back_to_hex() {
        let names = NameTable::new();
        let prop = Property::new(0x1234_5678);
        assert_eq!(prop.display_name(&names), "0x12345678");
    }

    #[test]
    fn children_preserve_order() {
        let mut root = Property::new(1);
        for hash in [10u32, 20, 30] {
            root.add_child(Property::new(hash));
        }
        let hashes: Vec<u32> = root.children.iter().map(|c| c.hash).collect();
        assert_eq!(hashes, vec![10, 20, 30]);
    }
}

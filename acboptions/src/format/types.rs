//! Type codes shared by the section dialects
//!
//! Every property record carries an 8-byte type descriptor (or a packed
//! 32-bit `type_id`); bits 0-5 of descriptor byte 6 (resp. bits 16-21 of
//! the id) select the value type. The dialects disagree on a few of the
//! container codes, which stay local to their section modules; the scalar
//! widths below are common to all of them.

/// Value type selected by a property's type descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    Vec2,
    Vec3,
    Vec4,
    Quat,
    Mat3x3,
    Mat4x4,
    String,
    Container,
    NestedObject,
    Vector,
    ArrayAlt,
    EnumVariant,
    Array,
    Unknown,
}

impl TypeCode {
    /// Decode a raw 6-bit type code.
    pub fn from_raw(code: u8) -> TypeCode {
        match code {
            0x00 => TypeCode::Bool,
            0x01 => TypeCode::Int8,
            0x02 => TypeCode::UInt8,
            0x03 => TypeCode::Int16,
            0x04 => TypeCode::UInt16,
            0x05 => TypeCode::Int32,
            0x07 => TypeCode::UInt32,
            0x08 => TypeCode::Int64,
            0x09 => TypeCode::UInt64,
            0x0A => TypeCode::Float32,
            0x0B => TypeCode::Float64,
            0x0C => TypeCode::Vec2,
            0x0D => TypeCode::Vec3,
            0x0E => TypeCode::Vec4,
            0x0F => TypeCode::Quat,
            0x10 => TypeCode::Mat3x3,
            0x11 => TypeCode::Mat4x4,
            0x12 => TypeCode::String,
            0x13 => TypeCode::Container,
            0x16 => TypeCode::NestedObject,
            0x17 => TypeCode::Vector,
            0x18 => TypeCode::ArrayAlt,
            0x19 => TypeCode::EnumVariant,
            0x1D => TypeCode::Array,
            _ => TypeCode::Unknown,
        }
    }

    /// Extract the type code from an 8-byte type descriptor.
    pub fn from_type_info(info: &[u8; 8]) -> TypeCode {
        TypeCode::from_raw(info[6] & 0x3F)
    }

    /// Extract the type code from a packed 32-bit `type_id`.
    pub fn from_type_id(type_id: u32) -> TypeCode {
        TypeCode::from_raw(((type_id >> 16) & 0x3F) as u8)
    }

    /// Value width in bytes for fixed-size types, `None` for variable.
    pub fn size_bytes(self) -> Option<usize> {
        match self {
            TypeCode::Bool | TypeCode::Int8 | TypeCode::UInt8 => Some(1),
            TypeCode::Int16 | TypeCode::UInt16 => Some(2),
            TypeCode::Int32 | TypeCode::UInt32 | TypeCode::Float32 => Some(4),
            TypeCode::Int64
            | TypeCode::UInt64
            | TypeCode::Float64
            | TypeCode::Vec2
            | TypeCode::EnumVariant => Some(8),
            TypeCode::Vec3 => Some(12),
            TypeCode::Vec4 | TypeCode::Quat => Some(16),
            TypeCode::Mat3x3 => Some(36),
            TypeCode::Mat4x4 => Some(64),
            _ => None,
        }
    }

    /// Whether values of this type own child properties.
    pub fn is_container(self) -> bool {
        matches!(
            self,
            TypeCode::Container
                | TypeCode::NestedObject
                | TypeCode::Vector
                | TypeCode::Array
                | TypeCode::ArrayAlt
        )
    }

    /// Display name for the editor layer.
    pub fn name(self) -> &'static str {
        match self {
            TypeCode::Bool => "bool",
            TypeCode::Int8 => "int8",
            TypeCode::UInt8 => "uint8",
            TypeCode::Int16 => "int16",
            TypeCode::UInt16 => "uint16",
            TypeCode::Int32 => "int32",
            TypeCode::UInt32 => "uint32",
            TypeCode::Int64 => "int64",
            TypeCode::UInt64 => "uint64",
            TypeCode::Float32 => "float32",
            TypeCode::Float64 => "float64",
            TypeCode::Vec2 => "vec2",
            TypeCode::Vec3 => "vec3",
            TypeCode::Vec4 => "vec4",
            TypeCode::Quat => "quat",
            TypeCode::Mat3x3 => "mat3x3",
            TypeCode::Mat4x4 => "mat4x4",
            TypeCode::String => "string",
            TypeCode::Container => "container",
            TypeCode::NestedObject => "object",
            TypeCode::Vector => "vector",
            TypeCode::ArrayAlt | TypeCode::Array => "array",
            TypeCode::EnumVariant => "enum",
            TypeCode::Unknown => "unknown",
        }
    }
}

/// Element type for container descriptors, packed across descriptor
/// bytes 6 and 7.
pub fn element_type_raw(info: &[u8; 8]) -> u8 {
    ((info[6] >> 6) | ((info[7] & 0x0F) << 2)) & 0x3F
}

/// Root type hashes identifying the four known dialects.
pub mod section_hash {
    /// Section 1: `SaveGame`.
    pub const SAVE_GAME: u32 = 0xBDBE_3B52;
    /// Section 2: `PlayerOptionsSaveData`.
    pub const PLAYER_OPTIONS: u32 = 0x11FA_CE11;
    /// Section 3: `AssassinSingleProfileData`.
    pub const SINGLE_PROFILE: u32 = 0xC987_6D66;
    /// Section 4: `AssassinMultiProfileData`.
    pub const MULTI_PROFILE: u32 = 0xB4B5_5039;
}

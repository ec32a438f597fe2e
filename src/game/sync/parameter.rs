//! Entity parameter types
//!
//! A parameter is one indexed, typed field of an entity's wire-visible
//! attribute state. Each parameter has a value type describing how it is
//! serialized, and an index that is stable for the lifetime of the process.
//!
//! Parameter sets are built by copying a parent's collection and appending
//! new types, so that a more specific entity kind shares every index of its
//! parent kind.

use std::fmt;
use std::sync::Arc;

use glam::{IVec3, Vec3};
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::net::buffer::PacketBuffer;

/// Serialized value kinds. Every id stays below the list terminator `0xFF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ParameterValueType {
    Byte = 0,
    VarInt = 1,
    Float = 2,
    String = 3,
    Text = 4,
    ItemStack = 5,
    Boolean = 6,
    VectorF = 7,
    VectorI = 8,
    OptionalVectorI = 9,
    Direction = 10,
    OptionalUuid = 11,
    OptionalBlockState = 12,
}

impl ParameterValueType {
    /// Get the wire id of this value type
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Look up a value type by its wire id
    pub fn from_id(id: u8) -> Result<Self, ProtocolError> {
        Ok(match id {
            0 => Self::Byte,
            1 => Self::VarInt,
            2 => Self::Float,
            3 => Self::String,
            4 => Self::Text,
            5 => Self::ItemStack,
            6 => Self::Boolean,
            7 => Self::VectorF,
            8 => Self::VectorI,
            9 => Self::OptionalVectorI,
            10 => Self::Direction,
            11 => Self::OptionalUuid,
            12 => Self::OptionalBlockState,
            _ => return Err(ProtocolError::UnknownValueType(id)),
        })
    }

    /// Human readable name, used in error messages
    pub fn name(self) -> &'static str {
        match self {
            Self::Byte => "byte",
            Self::VarInt => "varint",
            Self::Float => "float",
            Self::String => "string",
            Self::Text => "text",
            Self::ItemStack => "item stack",
            Self::Boolean => "boolean",
            Self::VectorF => "float vector",
            Self::VectorI => "int vector",
            Self::OptionalVectorI => "optional int vector",
            Self::Direction => "direction",
            Self::OptionalUuid => "optional uuid",
            Self::OptionalBlockState => "optional block state",
        }
    }
}

/// A stack of items as carried by item parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemStack {
    pub item_id: i16,
    pub count: u8,
    pub damage: i16,
}

/// Block face direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    Down = 0,
    Up = 1,
    North = 2,
    South = 3,
    West = 4,
    East = 5,
}

impl Direction {
    fn from_id(id: i32) -> Self {
        match id {
            0 => Self::Down,
            1 => Self::Up,
            2 => Self::North,
            3 => Self::South,
            4 => Self::West,
            _ => Self::East,
        }
    }
}

/// A concrete parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Byte(u8),
    VarInt(i32),
    Float(f32),
    String(String),
    /// A formatted text component, serialized as JSON
    Text(serde_json::Value),
    ItemStack(Option<ItemStack>),
    Boolean(bool),
    VectorF(Vec3),
    VectorI(IVec3),
    OptionalVectorI(Option<IVec3>),
    Direction(Direction),
    OptionalUuid(Option<Uuid>),
    /// Internal block state id; `None` is written as state 0
    OptionalBlockState(Option<u32>),
}

impl ParameterValue {
    /// Get the value type of this value
    pub fn value_type(&self) -> ParameterValueType {
        match self {
            Self::Byte(_) => ParameterValueType::Byte,
            Self::VarInt(_) => ParameterValueType::VarInt,
            Self::Float(_) => ParameterValueType::Float,
            Self::String(_) => ParameterValueType::String,
            Self::Text(_) => ParameterValueType::Text,
            Self::ItemStack(_) => ParameterValueType::ItemStack,
            Self::Boolean(_) => ParameterValueType::Boolean,
            Self::VectorF(_) => ParameterValueType::VectorF,
            Self::VectorI(_) => ParameterValueType::VectorI,
            Self::OptionalVectorI(_) => ParameterValueType::OptionalVectorI,
            Self::Direction(_) => ParameterValueType::Direction,
            Self::OptionalUuid(_) => ParameterValueType::OptionalUuid,
            Self::OptionalBlockState(_) => ParameterValueType::OptionalBlockState,
        }
    }

    /// Byte length of the encoded string, for string and text values
    pub fn string_length(&self) -> Option<usize> {
        match self {
            Self::String(value) => Some(value.len()),
            Self::Text(value) => Some(value.to_string().len()),
            _ => None,
        }
    }

    /// Serialize the value (without header) onto a buffer
    pub fn write(&self, buf: &mut PacketBuffer) {
        match self {
            Self::Byte(value) => buf.write_ubyte(*value),
            Self::VarInt(value) => buf.write_varint(*value),
            Self::Float(value) => buf.write_float(*value),
            Self::String(value) => buf.write_string(value),
            Self::Text(value) => buf.write_string(&value.to_string()),
            Self::ItemStack(None) => buf.write_short(-1),
            Self::ItemStack(Some(stack)) => {
                buf.write_short(stack.item_id);
                buf.write_ubyte(stack.count);
                buf.write_short(stack.damage);
                // Empty compound tag
                buf.write_ubyte(0);
            }
            Self::Boolean(value) => buf.write_bool(*value),
            Self::VectorF(value) => {
                buf.write_float(value.x);
                buf.write_float(value.y);
                buf.write_float(value.z);
            }
            Self::VectorI(value) => buf.write_position(*value),
            Self::OptionalVectorI(value) => {
                buf.write_bool(value.is_some());
                if let Some(position) = value {
                    buf.write_position(*position);
                }
            }
            Self::Direction(value) => buf.write_varint(*value as i32),
            Self::OptionalUuid(value) => {
                buf.write_bool(value.is_some());
                if let Some(uuid) = value {
                    buf.write_uuid(uuid);
                }
            }
            Self::OptionalBlockState(value) => buf.write_varint(value.unwrap_or(0) as i32),
        }
    }

    /// Deserialize a value of the given type from a buffer
    pub fn read(
        value_type: ParameterValueType,
        buf: &mut PacketBuffer,
    ) -> Result<Self, ProtocolError> {
        Ok(match value_type {
            ParameterValueType::Byte => Self::Byte(buf.read_ubyte()?),
            ParameterValueType::VarInt => Self::VarInt(buf.read_varint()?),
            ParameterValueType::Float => Self::Float(buf.read_float()?),
            ParameterValueType::String => Self::String(buf.read_string()?),
            ParameterValueType::Text => {
                let json = buf.read_string()?;
                let value = serde_json::from_str(&json)
                    .map_err(|e| ProtocolError::MalformedText(e.to_string()))?;
                Self::Text(value)
            }
            ParameterValueType::ItemStack => {
                let item_id = buf.read_short()?;
                if item_id < 0 {
                    Self::ItemStack(None)
                } else {
                    let count = buf.read_ubyte()?;
                    let damage = buf.read_short()?;
                    buf.read_ubyte()?;
                    Self::ItemStack(Some(ItemStack {
                        item_id,
                        count,
                        damage,
                    }))
                }
            }
            ParameterValueType::Boolean => Self::Boolean(buf.read_bool()?),
            ParameterValueType::VectorF => Self::VectorF(Vec3::new(
                buf.read_float()?,
                buf.read_float()?,
                buf.read_float()?,
            )),
            ParameterValueType::VectorI => Self::VectorI(buf.read_position()?),
            ParameterValueType::OptionalVectorI => {
                if buf.read_bool()? {
                    Self::OptionalVectorI(Some(buf.read_position()?))
                } else {
                    Self::OptionalVectorI(None)
                }
            }
            ParameterValueType::Direction => {
                Self::Direction(Direction::from_id(buf.read_varint()?))
            }
            ParameterValueType::OptionalUuid => {
                if buf.read_bool()? {
                    Self::OptionalUuid(Some(buf.read_uuid()?))
                } else {
                    Self::OptionalUuid(None)
                }
            }
            ParameterValueType::OptionalBlockState => {
                let state = buf.read_varint()? as u32;
                Self::OptionalBlockState((state != 0).then_some(state))
            }
        })
    }
}

/// One typed, indexed field of an entity's wire-visible state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParameterType {
    value_type: ParameterValueType,
    index: u8,
}

impl ParameterType {
    /// Get the value type of this parameter
    #[inline]
    pub fn value_type(&self) -> ParameterValueType {
        self.value_type
    }

    /// Get the index of this parameter
    #[inline]
    pub fn index(&self) -> u8 {
        self.index
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({})", self.index, self.value_type.name())
    }
}

/// An ordered, append-only collection of parameter types under construction
#[derive(Debug, Clone, Default)]
pub struct ParameterTypeCollection {
    types: Vec<ParameterType>,
}

impl ParameterTypeCollection {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next free index for a new parameter type.
    ///
    /// Collections are only built during static table resolution, so running
    /// out of indices is a programming error.
    pub fn new_parameter_type(&mut self, value_type: ParameterValueType) -> ParameterType {
        assert!(
            self.types.len() < u8::MAX as usize,
            "parameter index space exhausted"
        );
        let parameter_type = ParameterType {
            value_type,
            index: self.types.len() as u8,
        };
        self.types.push(parameter_type);
        parameter_type
    }

    /// Copy this collection; further allocations on the copy start after
    /// this collection's last index
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Get the number of parameter types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if the collection is empty
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Freeze this collection into an immutable table
    pub fn freeze(self) -> ParameterTable {
        ParameterTable {
            types: self.types.into(),
        }
    }
}

/// A resolved, immutable parameter table for one entity kind
#[derive(Debug, Clone)]
pub struct ParameterTable {
    types: Arc<[ParameterType]>,
}

impl ParameterTable {
    /// Start a new collection that extends this table
    pub fn extend(&self) -> ParameterTypeCollection {
        ParameterTypeCollection {
            types: self.types.to_vec(),
        }
    }

    /// Get a parameter type by index
    pub fn get(&self, index: u8) -> Option<ParameterType> {
        self.types.get(index as usize).copied()
    }

    /// Check whether a parameter type is valid in this table
    pub fn contains(&self, parameter_type: ParameterType) -> bool {
        self.get(parameter_type.index) == Some(parameter_type)
    }

    /// Iterate over the parameter types in index order
    pub fn iter(&self) -> impl Iterator<Item = ParameterType> + '_ {
        self.types.iter().copied()
    }

    /// Get the number of parameter types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_ids_below_terminator() {
        for id in 0..=u8::MAX {
            if let Ok(value_type) = ParameterValueType::from_id(id) {
                assert_eq!(value_type.id(), id);
                assert!(id < 0xff);
            }
        }
        assert_eq!(
            ParameterValueType::from_id(13),
            Err(ProtocolError::UnknownValueType(13))
        );
    }

    #[test]
    fn test_collection_allocates_sequential_indices() {
        let mut collection = ParameterTypeCollection::new();
        let a = collection.new_parameter_type(ParameterValueType::Byte);
        let b = collection.new_parameter_type(ParameterValueType::Float);

        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(b.value_type(), ParameterValueType::Float);
        assert_eq!(collection.len(), 2);
    }

    #[test]
    fn test_copy_preserves_parent_indices() {
        let mut parent = ParameterTypeCollection::new();
        let flags = parent.new_parameter_type(ParameterValueType::Byte);
        let parent = parent.freeze();

        let mut child = parent.extend();
        let health = child.new_parameter_type(ParameterValueType::Float);
        let child = child.freeze();

        assert_eq!(health.index(), 1);
        assert!(child.contains(flags));
        assert!(child.contains(health));
        assert!(!parent.contains(health));

        // Siblings copied from the same parent may reuse an index with a
        // different value type; they are never valid in each other's table
        let mut sibling = parent.extend();
        let score = sibling.new_parameter_type(ParameterValueType::VarInt);
        assert_eq!(score.index(), health.index());
        assert!(!child.contains(score));
    }

    #[test]
    fn test_value_read_write() {
        let values = vec![
            ParameterValue::Byte(0x21),
            ParameterValue::VarInt(300),
            ParameterValue::Float(15.0),
            ParameterValue::String("Grumm".to_string()),
            ParameterValue::Text(serde_json::json!({ "text": "Boss" })),
            ParameterValue::ItemStack(None),
            ParameterValue::ItemStack(Some(ItemStack {
                item_id: 276,
                count: 1,
                damage: 3,
            })),
            ParameterValue::Boolean(true),
            ParameterValue::VectorF(Vec3::new(1.0, -2.5, 0.0)),
            ParameterValue::VectorI(IVec3::new(10, 64, -10)),
            ParameterValue::OptionalVectorI(None),
            ParameterValue::Direction(Direction::West),
            ParameterValue::OptionalUuid(Some(Uuid::nil())),
            ParameterValue::OptionalBlockState(Some(17)),
            ParameterValue::OptionalBlockState(None),
        ];

        let mut buf = PacketBuffer::new();
        for value in &values {
            value.write(&mut buf);
        }
        buf.reset();
        for value in &values {
            assert_eq!(&ParameterValue::read(value.value_type(), &mut buf).unwrap(), value);
        }
        assert!(!buf.has_remaining());
    }
}

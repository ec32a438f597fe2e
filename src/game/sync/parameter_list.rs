//! Parameter lists
//!
//! A parameter list is the wire form of an entity's attribute state: a
//! sequence of `[value type id][index][value]` entries closed by a single
//! `0xFF` terminator byte.

use std::collections::BTreeSet;

use bytes::Bytes;

use super::parameter::{ParameterType, ParameterValue, ParameterValueType};
use crate::error::ProtocolError;
use crate::net::buffer::{PacketBuffer, MAX_STRING_LENGTH};

/// Terminator byte closing every parameter list
pub const LIST_TERMINATOR: u8 = 0xFF;

/// Append-only sink for parameters
pub trait ParameterList {
    /// Add a parameter. Every parameter type may be added at most once.
    fn add(
        &mut self,
        parameter_type: ParameterType,
        value: ParameterValue,
    ) -> Result<(), ProtocolError>;

    /// Check whether no parameter has been added yet
    fn is_empty(&self) -> bool;
}

/// A parameter list that serializes directly into a buffer
#[derive(Debug, Default)]
pub struct ByteBufParameterList {
    buf: PacketBuffer,
    written: BTreeSet<u8>,
}

impl ByteBufParameterList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of parameters written
    pub fn len(&self) -> usize {
        self.written.len()
    }

    /// Close the list and return its encoded bytes, terminator included
    pub fn finish(mut self) -> Bytes {
        self.buf.write_ubyte(LIST_TERMINATOR);
        self.buf.freeze()
    }
}

impl ParameterList for ByteBufParameterList {
    fn add(
        &mut self,
        parameter_type: ParameterType,
        value: ParameterValue,
    ) -> Result<(), ProtocolError> {
        let index = parameter_type.index();
        let expected = parameter_type.value_type();
        if value.value_type() != expected {
            return Err(ProtocolError::ValueTypeMismatch {
                index,
                expected: expected.name(),
                actual: value.value_type().name(),
            });
        }
        if let Some(length) = value.string_length() {
            if length > MAX_STRING_LENGTH {
                return Err(ProtocolError::StringTooLong {
                    length,
                    max: MAX_STRING_LENGTH,
                });
            }
        }
        if !self.written.insert(index) {
            return Err(ProtocolError::DuplicateParameter { index });
        }

        self.buf.write_ubyte(expected.id());
        self.buf.write_ubyte(index);
        value.write(&mut self.buf);
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.written.is_empty()
    }
}

/// One entry decoded from a parameter list
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedParameter {
    pub index: u8,
    pub value: ParameterValue,
}

/// Decode a terminated parameter list
pub fn read_parameters(buf: &mut PacketBuffer) -> Result<Vec<DecodedParameter>, ProtocolError> {
    let mut parameters = Vec::new();
    loop {
        if !buf.has_remaining() {
            return Err(ProtocolError::UnterminatedParameterList);
        }
        let type_id = buf.read_ubyte()?;
        if type_id == LIST_TERMINATOR {
            return Ok(parameters);
        }
        let value_type = ParameterValueType::from_id(type_id)?;
        let index = buf.read_ubyte()?;
        let value = ParameterValue::read(value_type, buf)?;
        parameters.push(DecodedParameter { index, value });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::sync::parameter::ParameterTypeCollection;
    use pretty_assertions::assert_eq;

    fn types() -> (ParameterType, ParameterType) {
        let mut collection = ParameterTypeCollection::new();
        let flags = collection.new_parameter_type(ParameterValueType::Byte);
        let health = collection.new_parameter_type(ParameterValueType::Float);
        (flags, health)
    }

    #[test]
    fn test_header_layout() {
        let (_, health) = types();
        let mut list = ByteBufParameterList::new();
        list.add(health, ParameterValue::Float(15.0)).unwrap();
        let bytes = list.finish();

        let mut expected = vec![2u8, 1];
        expected.extend_from_slice(&15.0f32.to_be_bytes());
        expected.push(0xFF);
        assert_eq!(bytes.as_ref(), expected.as_slice());
    }

    #[test]
    fn test_empty_list_is_only_terminator() {
        let list = ByteBufParameterList::new();
        assert!(list.is_empty());
        assert_eq!(list.finish().as_ref(), &[0xFF]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let (flags, _) = types();
        let mut list = ByteBufParameterList::new();
        list.add(flags, ParameterValue::Byte(1)).unwrap();
        assert_eq!(
            list.add(flags, ParameterValue::Byte(2)),
            Err(ProtocolError::DuplicateParameter { index: 0 })
        );
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_value_type_mismatch_rejected() {
        let (flags, _) = types();
        let mut list = ByteBufParameterList::new();
        let err = list.add(flags, ParameterValue::Float(1.0)).unwrap_err();
        assert!(matches!(err, ProtocolError::ValueTypeMismatch { index: 0, .. }));
        assert!(list.is_empty());
    }

    #[test]
    fn test_oversized_string_rejected() {
        let mut collection = ParameterTypeCollection::new();
        let name = collection.new_parameter_type(ParameterValueType::String);
        let title = collection.new_parameter_type(ParameterValueType::Text);
        let mut list = ByteBufParameterList::new();

        let long = "x".repeat(MAX_STRING_LENGTH + 1);
        assert_eq!(
            list.add(name, ParameterValue::String(long.clone())),
            Err(ProtocolError::StringTooLong {
                length: MAX_STRING_LENGTH + 1,
                max: MAX_STRING_LENGTH,
            })
        );
        let err = list
            .add(title, ParameterValue::Text(serde_json::json!({ "text": long })))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::StringTooLong { .. }));
        assert!(list.is_empty());

        // The index stays free for a valid value
        let exact = "y".repeat(MAX_STRING_LENGTH);
        list.add(name, ParameterValue::String(exact)).unwrap();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_read_back() {
        let (flags, health) = types();
        let mut list = ByteBufParameterList::new();
        list.add(flags, ParameterValue::Byte(0x20)).unwrap();
        list.add(health, ParameterValue::Float(7.5)).unwrap();

        let mut buf = PacketBuffer::from_bytes(&list.finish());
        let decoded = read_parameters(&mut buf).unwrap();
        assert_eq!(
            decoded,
            vec![
                DecodedParameter {
                    index: 0,
                    value: ParameterValue::Byte(0x20)
                },
                DecodedParameter {
                    index: 1,
                    value: ParameterValue::Float(7.5)
                },
            ]
        );
    }

    #[test]
    fn test_read_unterminated() {
        let mut buf = PacketBuffer::from_bytes(&[6, 3, 1]);
        assert_eq!(
            read_parameters(&mut buf),
            Err(ProtocolError::UnterminatedParameterList)
        );
    }
}

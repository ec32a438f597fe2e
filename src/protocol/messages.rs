//! Entity messages
//!
//! Every message the synchronization layer sends to a tracking client. A
//! message on the wire is its opcode byte followed by its body. Angles,
//! deltas and velocities are stored already converted to their wire form
//! (see [`codec`](super::codec)) so that encoding is exact.

use bytes::Bytes;
use glam::DVec3;
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::game::entity::EntityId;
use crate::game::sync::parameter_list::read_parameters;
use crate::net::buffer::PacketBuffer;

/// Global entity kind of a thunderbolt
pub const GLOBAL_ENTITY_THUNDERBOLT: u8 = 1;

/// Outgoing entity message
pub trait OutgoingMessage: Sized {
    /// The message opcode
    const OPCODE: u8;

    /// Encode the message body to a buffer
    fn encode(&self, buffer: &mut PacketBuffer);

    /// Decode the message body from a buffer
    fn decode(buffer: &mut PacketBuffer) -> Result<Self, ProtocolError>;

    /// Get the opcode for this message type
    fn opcode() -> u8 {
        Self::OPCODE
    }
}

fn write_entity_id(buffer: &mut PacketBuffer, entity_id: EntityId) {
    buffer.write_varint(entity_id);
}

fn write_vec3(buffer: &mut PacketBuffer, value: DVec3) {
    buffer.write_double(value.x);
    buffer.write_double(value.y);
    buffer.write_double(value.z);
}

fn read_vec3(buffer: &mut PacketBuffer) -> Result<DVec3, ProtocolError> {
    Ok(DVec3::new(
        buffer.read_double()?,
        buffer.read_double()?,
        buffer.read_double()?,
    ))
}

fn write_shorts(buffer: &mut PacketBuffer, value: [i16; 3]) {
    for component in value {
        buffer.write_short(component);
    }
}

fn read_shorts(buffer: &mut PacketBuffer) -> Result<[i16; 3], ProtocolError> {
    Ok([buffer.read_short()?, buffer.read_short()?, buffer.read_short()?])
}

/// Read a terminated parameter list, keeping it in its encoded form
fn read_parameter_bytes(buffer: &mut PacketBuffer) -> Result<Bytes, ProtocolError> {
    let start = buffer.read_offset();
    read_parameters(buffer)?;
    let end = buffer.read_offset();
    Ok(Bytes::copy_from_slice(&buffer.as_bytes()[start..end]))
}

// ============ Spawn Messages ============

/// Spawn a non-living object
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnObject {
    pub entity_id: EntityId,
    pub unique_id: Uuid,
    pub object_type: u8,
    pub position: DVec3,
    pub pitch: u8,
    pub yaw: u8,
    /// Object specific data
    pub data: i32,
    pub velocity: [i16; 3],
    /// Full parameter list, terminator included
    pub parameters: Bytes,
}

impl OutgoingMessage for SpawnObject {
    const OPCODE: u8 = 0x00;

    fn encode(&self, buffer: &mut PacketBuffer) {
        write_entity_id(buffer, self.entity_id);
        buffer.write_uuid(&self.unique_id);
        buffer.write_ubyte(self.object_type);
        write_vec3(buffer, self.position);
        buffer.write_ubyte(self.pitch);
        buffer.write_ubyte(self.yaw);
        buffer.write_int(self.data);
        write_shorts(buffer, self.velocity);
        buffer.write_bytes(&self.parameters);
    }

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            entity_id: buffer.read_varint()?,
            unique_id: buffer.read_uuid()?,
            object_type: buffer.read_ubyte()?,
            position: read_vec3(buffer)?,
            pitch: buffer.read_ubyte()?,
            yaw: buffer.read_ubyte()?,
            data: buffer.read_int()?,
            velocity: read_shorts(buffer)?,
            parameters: read_parameter_bytes(buffer)?,
        })
    }
}

/// Spawn a global entity (thunderbolt)
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnGlobalEntity {
    pub entity_id: EntityId,
    pub kind: u8,
    pub position: DVec3,
}

impl OutgoingMessage for SpawnGlobalEntity {
    const OPCODE: u8 = 0x02;

    fn encode(&self, buffer: &mut PacketBuffer) {
        write_entity_id(buffer, self.entity_id);
        buffer.write_ubyte(self.kind);
        write_vec3(buffer, self.position);
    }

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            entity_id: buffer.read_varint()?,
            kind: buffer.read_ubyte()?,
            position: read_vec3(buffer)?,
        })
    }
}

/// Spawn a living entity
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnMob {
    pub entity_id: EntityId,
    pub unique_id: Uuid,
    pub mob_type: i32,
    pub position: DVec3,
    pub yaw: u8,
    pub pitch: u8,
    pub head_yaw: u8,
    pub velocity: [i16; 3],
    /// Full parameter list, terminator included
    pub parameters: Bytes,
}

impl OutgoingMessage for SpawnMob {
    const OPCODE: u8 = 0x03;

    fn encode(&self, buffer: &mut PacketBuffer) {
        write_entity_id(buffer, self.entity_id);
        buffer.write_uuid(&self.unique_id);
        buffer.write_varint(self.mob_type);
        write_vec3(buffer, self.position);
        buffer.write_ubyte(self.yaw);
        buffer.write_ubyte(self.pitch);
        buffer.write_ubyte(self.head_yaw);
        write_shorts(buffer, self.velocity);
        buffer.write_bytes(&self.parameters);
    }

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            entity_id: buffer.read_varint()?,
            unique_id: buffer.read_uuid()?,
            mob_type: buffer.read_varint()?,
            position: read_vec3(buffer)?,
            yaw: buffer.read_ubyte()?,
            pitch: buffer.read_ubyte()?,
            head_yaw: buffer.read_ubyte()?,
            velocity: read_shorts(buffer)?,
            parameters: read_parameter_bytes(buffer)?,
        })
    }
}

/// Spawn a humanoid entity
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnPlayer {
    pub entity_id: EntityId,
    pub unique_id: Uuid,
    pub position: DVec3,
    pub yaw: u8,
    pub pitch: u8,
    /// Full parameter list, terminator included
    pub parameters: Bytes,
}

impl OutgoingMessage for SpawnPlayer {
    const OPCODE: u8 = 0x05;

    fn encode(&self, buffer: &mut PacketBuffer) {
        write_entity_id(buffer, self.entity_id);
        buffer.write_uuid(&self.unique_id);
        write_vec3(buffer, self.position);
        buffer.write_ubyte(self.yaw);
        buffer.write_ubyte(self.pitch);
        buffer.write_bytes(&self.parameters);
    }

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            entity_id: buffer.read_varint()?,
            unique_id: buffer.read_uuid()?,
            position: read_vec3(buffer)?,
            yaw: buffer.read_ubyte()?,
            pitch: buffer.read_ubyte()?,
            parameters: read_parameter_bytes(buffer)?,
        })
    }
}

// ============ Update Messages ============

/// Small position change as 1/4096 fixed-point deltas
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativeMove {
    pub entity_id: EntityId,
    pub delta: [i16; 3],
    pub on_ground: bool,
}

impl OutgoingMessage for RelativeMove {
    const OPCODE: u8 = 0x25;

    fn encode(&self, buffer: &mut PacketBuffer) {
        write_entity_id(buffer, self.entity_id);
        write_shorts(buffer, self.delta);
        buffer.write_bool(self.on_ground);
    }

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            entity_id: buffer.read_varint()?,
            delta: read_shorts(buffer)?,
            on_ground: buffer.read_bool()?,
        })
    }
}

/// Relative move combined with a body rotation change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookAndRelativeMove {
    pub entity_id: EntityId,
    pub delta: [i16; 3],
    pub yaw: u8,
    pub pitch: u8,
    pub on_ground: bool,
}

impl OutgoingMessage for LookAndRelativeMove {
    const OPCODE: u8 = 0x26;

    fn encode(&self, buffer: &mut PacketBuffer) {
        write_entity_id(buffer, self.entity_id);
        write_shorts(buffer, self.delta);
        buffer.write_ubyte(self.yaw);
        buffer.write_ubyte(self.pitch);
        buffer.write_bool(self.on_ground);
    }

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            entity_id: buffer.read_varint()?,
            delta: read_shorts(buffer)?,
            yaw: buffer.read_ubyte()?,
            pitch: buffer.read_ubyte()?,
            on_ground: buffer.read_bool()?,
        })
    }
}

/// Standalone body rotation change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Look {
    pub entity_id: EntityId,
    pub yaw: u8,
    pub pitch: u8,
    pub on_ground: bool,
}

impl OutgoingMessage for Look {
    const OPCODE: u8 = 0x27;

    fn encode(&self, buffer: &mut PacketBuffer) {
        write_entity_id(buffer, self.entity_id);
        buffer.write_ubyte(self.yaw);
        buffer.write_ubyte(self.pitch);
        buffer.write_bool(self.on_ground);
    }

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            entity_id: buffer.read_varint()?,
            yaw: buffer.read_ubyte()?,
            pitch: buffer.read_ubyte()?,
            on_ground: buffer.read_bool()?,
        })
    }
}

/// Batched removal of entities from a client's view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestroyEntities {
    pub entity_ids: Vec<EntityId>,
}

impl OutgoingMessage for DestroyEntities {
    const OPCODE: u8 = 0x30;

    fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_varint(self.entity_ids.len() as i32);
        for entity_id in &self.entity_ids {
            write_entity_id(buffer, *entity_id);
        }
    }

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, ProtocolError> {
        let count = buffer.read_varint()?.max(0) as usize;
        // Each id is at least one byte
        let mut entity_ids = Vec::with_capacity(count.min(buffer.remaining()));
        for _ in 0..count {
            entity_ids.push(buffer.read_varint()?);
        }
        Ok(Self { entity_ids })
    }
}

/// Head rotation change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadLook {
    pub entity_id: EntityId,
    pub head_yaw: u8,
}

impl OutgoingMessage for HeadLook {
    const OPCODE: u8 = 0x34;

    fn encode(&self, buffer: &mut PacketBuffer) {
        write_entity_id(buffer, self.entity_id);
        buffer.write_ubyte(self.head_yaw);
    }

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            entity_id: buffer.read_varint()?,
            head_yaw: buffer.read_ubyte()?,
        })
    }
}

/// Changed attribute parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub entity_id: EntityId,
    /// Changed parameters, terminator included
    pub parameters: Bytes,
}

impl OutgoingMessage for Metadata {
    const OPCODE: u8 = 0x39;

    fn encode(&self, buffer: &mut PacketBuffer) {
        write_entity_id(buffer, self.entity_id);
        buffer.write_bytes(&self.parameters);
    }

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            entity_id: buffer.read_varint()?,
            parameters: read_parameter_bytes(buffer)?,
        })
    }
}

/// Velocity change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Velocity {
    pub entity_id: EntityId,
    pub velocity: [i16; 3],
}

impl OutgoingMessage for Velocity {
    const OPCODE: u8 = 0x3B;

    fn encode(&self, buffer: &mut PacketBuffer) {
        write_entity_id(buffer, self.entity_id);
        write_shorts(buffer, self.velocity);
    }

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            entity_id: buffer.read_varint()?,
            velocity: read_shorts(buffer)?,
        })
    }
}

/// Absolute position and rotation
#[derive(Debug, Clone, PartialEq)]
pub struct Teleport {
    pub entity_id: EntityId,
    pub position: DVec3,
    pub yaw: u8,
    pub pitch: u8,
    pub on_ground: bool,
}

impl OutgoingMessage for Teleport {
    const OPCODE: u8 = 0x48;

    fn encode(&self, buffer: &mut PacketBuffer) {
        write_entity_id(buffer, self.entity_id);
        write_vec3(buffer, self.position);
        buffer.write_ubyte(self.yaw);
        buffer.write_ubyte(self.pitch);
        buffer.write_bool(self.on_ground);
    }

    fn decode(buffer: &mut PacketBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            entity_id: buffer.read_varint()?,
            position: read_vec3(buffer)?,
            yaw: buffer.read_ubyte()?,
            pitch: buffer.read_ubyte()?,
            on_ground: buffer.read_bool()?,
        })
    }
}

// ============ Message ============

/// Any entity message
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    SpawnObject(SpawnObject),
    SpawnGlobalEntity(SpawnGlobalEntity),
    SpawnMob(SpawnMob),
    SpawnPlayer(SpawnPlayer),
    RelativeMove(RelativeMove),
    LookAndRelativeMove(LookAndRelativeMove),
    Look(Look),
    DestroyEntities(DestroyEntities),
    HeadLook(HeadLook),
    Metadata(Metadata),
    Velocity(Velocity),
    Teleport(Teleport),
}

macro_rules! message_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Message {
                fn from(message: $variant) -> Self {
                    Message::$variant(message)
                }
            }
        )*
    };
}

message_from!(
    SpawnObject,
    SpawnGlobalEntity,
    SpawnMob,
    SpawnPlayer,
    RelativeMove,
    LookAndRelativeMove,
    Look,
    DestroyEntities,
    HeadLook,
    Metadata,
    Velocity,
    Teleport,
);

impl Message {
    /// Get the opcode of this message
    pub fn opcode(&self) -> u8 {
        match self {
            Message::SpawnObject(_) => SpawnObject::OPCODE,
            Message::SpawnGlobalEntity(_) => SpawnGlobalEntity::OPCODE,
            Message::SpawnMob(_) => SpawnMob::OPCODE,
            Message::SpawnPlayer(_) => SpawnPlayer::OPCODE,
            Message::RelativeMove(_) => RelativeMove::OPCODE,
            Message::LookAndRelativeMove(_) => LookAndRelativeMove::OPCODE,
            Message::Look(_) => Look::OPCODE,
            Message::DestroyEntities(_) => DestroyEntities::OPCODE,
            Message::HeadLook(_) => HeadLook::OPCODE,
            Message::Metadata(_) => Metadata::OPCODE,
            Message::Velocity(_) => Velocity::OPCODE,
            Message::Teleport(_) => Teleport::OPCODE,
        }
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Message::SpawnObject(_) => "spawn_object",
            Message::SpawnGlobalEntity(_) => "spawn_global_entity",
            Message::SpawnMob(_) => "spawn_mob",
            Message::SpawnPlayer(_) => "spawn_player",
            Message::RelativeMove(_) => "relative_move",
            Message::LookAndRelativeMove(_) => "look_and_relative_move",
            Message::Look(_) => "look",
            Message::DestroyEntities(_) => "destroy_entities",
            Message::HeadLook(_) => "head_look",
            Message::Metadata(_) => "metadata",
            Message::Velocity(_) => "velocity",
            Message::Teleport(_) => "teleport",
        }
    }

    /// Whether this message introduces an entity to a client
    pub fn is_spawn(&self) -> bool {
        matches!(
            self,
            Message::SpawnObject(_)
                | Message::SpawnGlobalEntity(_)
                | Message::SpawnMob(_)
                | Message::SpawnPlayer(_)
        )
    }

    /// Encode opcode and body
    pub fn encode(&self, buffer: &mut PacketBuffer) {
        buffer.write_ubyte(self.opcode());
        match self {
            Message::SpawnObject(m) => m.encode(buffer),
            Message::SpawnGlobalEntity(m) => m.encode(buffer),
            Message::SpawnMob(m) => m.encode(buffer),
            Message::SpawnPlayer(m) => m.encode(buffer),
            Message::RelativeMove(m) => m.encode(buffer),
            Message::LookAndRelativeMove(m) => m.encode(buffer),
            Message::Look(m) => m.encode(buffer),
            Message::DestroyEntities(m) => m.encode(buffer),
            Message::HeadLook(m) => m.encode(buffer),
            Message::Metadata(m) => m.encode(buffer),
            Message::Velocity(m) => m.encode(buffer),
            Message::Teleport(m) => m.encode(buffer),
        }
    }

    /// Encode to a new buffer
    pub fn to_bytes(&self) -> Bytes {
        let mut buffer = PacketBuffer::with_capacity(64);
        self.encode(&mut buffer);
        buffer.freeze()
    }

    /// Decode one message, opcode included
    pub fn decode(buffer: &mut PacketBuffer) -> Result<Self, ProtocolError> {
        let opcode = buffer.read_ubyte()?;
        Ok(match opcode {
            SpawnObject::OPCODE => SpawnObject::decode(buffer)?.into(),
            SpawnGlobalEntity::OPCODE => SpawnGlobalEntity::decode(buffer)?.into(),
            SpawnMob::OPCODE => SpawnMob::decode(buffer)?.into(),
            SpawnPlayer::OPCODE => SpawnPlayer::decode(buffer)?.into(),
            RelativeMove::OPCODE => RelativeMove::decode(buffer)?.into(),
            LookAndRelativeMove::OPCODE => LookAndRelativeMove::decode(buffer)?.into(),
            Look::OPCODE => Look::decode(buffer)?.into(),
            DestroyEntities::OPCODE => DestroyEntities::decode(buffer)?.into(),
            HeadLook::OPCODE => HeadLook::decode(buffer)?.into(),
            Metadata::OPCODE => Metadata::decode(buffer)?.into(),
            Velocity::OPCODE => Velocity::decode(buffer)?.into(),
            Teleport::OPCODE => Teleport::decode(buffer)?.into(),
            _ => return Err(ProtocolError::UnknownOpcode(opcode)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_relative_move_layout() {
        let message = Message::from(RelativeMove {
            entity_id: 5,
            delta: [8192, 0, -1],
            on_ground: true,
        });
        assert_eq!(
            message.to_bytes().as_ref(),
            &[0x25, 5, 0x20, 0x00, 0x00, 0x00, 0xFF, 0xFF, 1]
        );
    }

    #[test]
    fn test_destroy_layout() {
        let message = Message::from(DestroyEntities {
            entity_ids: vec![1, 300],
        });
        assert_eq!(
            message.to_bytes().as_ref(),
            &[0x30, 2, 1, 0xAC, 0x02]
        );
    }

    #[test]
    fn test_spawn_mob_decodes_with_parameters() {
        let message = Message::from(SpawnMob {
            entity_id: 42,
            unique_id: Uuid::from_u128(0x1234),
            mob_type: 54,
            position: DVec3::new(0.5, 64.0, -3.25),
            yaw: 64,
            pitch: 0,
            head_yaw: 64,
            velocity: [0, -628, 0],
            parameters: Bytes::from_static(&[6, 5, 1, 0xFF]),
        });

        let mut buffer = PacketBuffer::from_bytes(&message.to_bytes());
        let decoded = Message::decode(&mut buffer).unwrap();
        assert_eq!(decoded, message);
        assert!(!buffer.has_remaining());
        assert!(decoded.is_spawn());
    }

    #[test]
    fn test_unknown_opcode() {
        let mut buffer = PacketBuffer::from_bytes(&[0x7F, 0]);
        assert_eq!(
            Message::decode(&mut buffer),
            Err(ProtocolError::UnknownOpcode(0x7F))
        );
    }

    #[test]
    fn test_truncated_teleport() {
        let mut buffer = PacketBuffer::from_bytes(&[0x48, 1, 0, 0]);
        assert!(matches!(
            Message::decode(&mut buffer),
            Err(ProtocolError::BufferUnderflow { .. })
        ));
    }
}

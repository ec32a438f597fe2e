//! Entity protocols
//!
//! An entity protocol translates entity state into wire messages. The
//! protocol type is chosen once per entity when tracking starts and cached
//! on its tracker; each variant knows its spawn message shape and its
//! parameter table.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use glam::DVec3;
use tracing::error;

use super::parameter::{ParameterType, ParameterValue};
use super::parameter_list::{ByteBufParameterList, ParameterList};
use super::parameters::{ParameterKind, BASE, HUMANOID, INSENTIENT, LIVING, SLIME};
use super::tracker::EntityTracker;
use crate::error::{ConfigError, ProtocolError};
use crate::game::entity::{Entity, EntityAttributes, EntityId, EntityKind, Transform};
use crate::protocol::codec::{
    decode_delta, encode_delta, encode_velocity, fits_relative_move, wrap_angle,
};
use crate::protocol::messages::{
    DestroyEntities, HeadLook, Look, LookAndRelativeMove, Message, Metadata, RelativeMove,
    SpawnGlobalEntity, SpawnMob, SpawnObject, SpawnPlayer, Teleport, Velocity,
    GLOBAL_ENTITY_THUNDERBOLT,
};

/// Default tracking range in world units
pub const DEFAULT_TRACKING_RANGE: f64 = 64.0;

/// Default number of ticks between tracking passes
pub const DEFAULT_TRACKING_UPDATE_RATE: u32 = 4;

/// The protocol variant used to synchronize an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityProtocolType {
    Object,
    Living,
    Insentient,
    Slime,
    Humanoid,
    Lightning,
}

impl EntityProtocolType {
    /// Every protocol type
    pub const ALL: [EntityProtocolType; 6] = [
        Self::Object,
        Self::Living,
        Self::Insentient,
        Self::Slime,
        Self::Humanoid,
        Self::Lightning,
    ];

    /// Get the default protocol type of an entity kind
    pub fn for_kind(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Object { .. } => Self::Object,
            EntityKind::Living { .. } => Self::Living,
            EntityKind::Insentient { .. } => Self::Insentient,
            EntityKind::Slime => Self::Slime,
            EntityKind::Humanoid => Self::Humanoid,
            EntityKind::Lightning => Self::Lightning,
        }
    }

    /// Get the configuration name of this protocol type
    pub fn name(self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Living => "living",
            Self::Insentient => "insentient",
            Self::Slime => "slime",
            Self::Humanoid => "humanoid",
            Self::Lightning => "lightning",
        }
    }

    /// Whether entities of this protocol have a distinct head rotation
    pub fn has_head(self) -> bool {
        matches!(
            self,
            Self::Living | Self::Insentient | Self::Slime | Self::Humanoid
        )
    }

    /// Get the parameter table of this protocol, if it sends parameters
    pub fn parameter_kind(self) -> Option<ParameterKind> {
        match self {
            Self::Object => Some(ParameterKind::Base),
            Self::Living => Some(ParameterKind::Living),
            Self::Insentient => Some(ParameterKind::Insentient),
            Self::Slime => Some(ParameterKind::Slime),
            Self::Humanoid => Some(ParameterKind::Humanoid),
            Self::Lightning => None,
        }
    }

    /// Check that this protocol can synchronize an entity
    pub fn validate(self, entity: &Entity) -> Result<(), ConfigError> {
        let reject = |reason: &'static str| {
            Err(ConfigError::IncompatibleProtocol {
                protocol: self.name(),
                entity_id: entity.id,
                reason,
            })
        };

        let (living, insentient, humanoid, slime) = entity.read_attributes(|a| {
            (
                a.living.is_some(),
                a.insentient.is_some(),
                a.humanoid.is_some(),
                a.slime.is_some(),
            )
        });

        match self {
            Self::Object => {
                if !matches!(entity.kind, EntityKind::Object { .. }) {
                    return reject("entity is not an object");
                }
            }
            Self::Lightning => {
                if entity.kind != EntityKind::Lightning {
                    return reject("entity is not a lightning bolt");
                }
            }
            Self::Living | Self::Insentient | Self::Slime => {
                if entity.kind.mob_type().is_none() {
                    return reject("entity has no mob type");
                }
                if !living {
                    return reject("entity has no living attributes");
                }
                if self != Self::Living && !insentient {
                    return reject("entity has no insentient attributes");
                }
                if self == Self::Slime && !slime {
                    return reject("entity has no slime attributes");
                }
            }
            Self::Humanoid => {
                if !living || !humanoid {
                    return reject("entity has no humanoid attributes");
                }
            }
        }
        Ok(())
    }

    /// Collect every parameter this protocol sends, in index order
    pub fn collect_parameters(
        self,
        attributes: &EntityAttributes,
    ) -> Vec<(ParameterType, ParameterValue)> {
        let Some(kind) = self.parameter_kind() else {
            return Vec::new();
        };

        let base = &attributes.base;
        let mut parameters = vec![
            (BASE.flags, ParameterValue::Byte(base.flags.bits())),
            (BASE.air_level, ParameterValue::VarInt(base.air_level)),
            (
                BASE.custom_name,
                ParameterValue::String(base.custom_name.clone()),
            ),
            (
                BASE.custom_name_visible,
                ParameterValue::Boolean(base.custom_name_visible),
            ),
            (BASE.silent, ParameterValue::Boolean(base.silent)),
            (BASE.no_gravity, ParameterValue::Boolean(base.no_gravity)),
        ];
        if kind == ParameterKind::Base {
            return parameters;
        }

        if let Some(living) = &attributes.living {
            parameters.extend([
                (
                    LIVING.hand_data,
                    ParameterValue::Byte(living.hand_state.bits()),
                ),
                (LIVING.health, ParameterValue::Float(living.health)),
                (
                    LIVING.potion_effect_color,
                    ParameterValue::VarInt(living.potion_effect_color),
                ),
                (
                    LIVING.potion_effect_ambient,
                    ParameterValue::Boolean(living.potion_effect_ambient),
                ),
                (
                    LIVING.arrows_in_entity,
                    ParameterValue::VarInt(living.arrows_in_entity),
                ),
            ]);
        }

        match kind {
            ParameterKind::Insentient | ParameterKind::Slime => {
                if let Some(insentient) = &attributes.insentient {
                    parameters.push((
                        INSENTIENT.flags,
                        ParameterValue::Byte(insentient.flags.bits()),
                    ));
                }
                if kind == ParameterKind::Slime {
                    if let Some(slime) = &attributes.slime {
                        parameters.push((SLIME.size, ParameterValue::VarInt(slime.size)));
                    }
                }
            }
            ParameterKind::Humanoid => {
                if let Some(humanoid) = &attributes.humanoid {
                    parameters.extend([
                        (
                            HUMANOID.additional_hearts,
                            ParameterValue::Float(humanoid.additional_hearts),
                        ),
                        (HUMANOID.score, ParameterValue::VarInt(humanoid.score)),
                        (
                            HUMANOID.skin_parts,
                            ParameterValue::Byte(humanoid.skin_parts),
                        ),
                        (HUMANOID.main_hand, ParameterValue::Byte(humanoid.main_hand)),
                    ]);
                }
            }
            ParameterKind::Base | ParameterKind::Living => {}
        }
        parameters
    }

    /// Build the spawn message for a new tracker.
    ///
    /// The spawn message carries the full current state, so the snapshot is
    /// refreshed to match it.
    pub fn build_spawn_message(
        self,
        entity: &Entity,
        last_sent: &mut LastSent,
    ) -> Result<Message, ProtocolError> {
        let transform = entity.transform();
        let parameters = entity.read_attributes(|a| self.collect_parameters(a));

        let message = match self {
            Self::Lightning => SpawnGlobalEntity {
                entity_id: entity.id,
                kind: GLOBAL_ENTITY_THUNDERBOLT,
                position: transform.position,
            }
            .into(),
            Self::Object => {
                let object_type = match entity.kind {
                    EntityKind::Object { object_type } => object_type,
                    _ => 0,
                };
                SpawnObject {
                    entity_id: entity.id,
                    unique_id: entity.unique_id,
                    object_type,
                    position: transform.position,
                    pitch: wrap_angle(transform.pitch()),
                    yaw: wrap_angle(transform.yaw()),
                    data: 0,
                    velocity: velocity_to_wire(transform.velocity),
                    parameters: encode_parameters(&parameters)?,
                }
                .into()
            }
            Self::Living | Self::Insentient | Self::Slime => SpawnMob {
                entity_id: entity.id,
                unique_id: entity.unique_id,
                mob_type: entity.kind.mob_type().unwrap_or_default(),
                position: transform.position,
                yaw: wrap_angle(transform.yaw()),
                pitch: wrap_angle(transform.pitch()),
                head_yaw: wrap_angle(transform.head_yaw()),
                velocity: velocity_to_wire(transform.velocity),
                parameters: encode_parameters(&parameters)?,
            }
            .into(),
            Self::Humanoid => SpawnPlayer {
                entity_id: entity.id,
                unique_id: entity.unique_id,
                position: transform.position,
                yaw: wrap_angle(transform.yaw()),
                pitch: wrap_angle(transform.pitch()),
                parameters: encode_parameters(&parameters)?,
            }
            .into(),
        };

        *last_sent = LastSent::capture(&transform, parameters);
        Ok(message)
    }

    /// Build the messages describing what changed since `last_sent`, then
    /// advance `last_sent` to what the trackers now believe.
    ///
    /// After a relative move the snapshot advances by the quantized delta,
    /// not to the exact position.
    ///
    /// A metadata build failure is logged and skips only the metadata
    /// message; the parameter snapshot is left untouched so the change is
    /// retried on the next pass.
    pub fn build_update_messages(
        self,
        entity: &Entity,
        last_sent: &mut LastSent,
    ) -> Vec<UpdateMessage> {
        let mut messages = Vec::new();
        if self == Self::Lightning {
            return messages;
        }

        let transform = entity.transform();
        let entity_id = entity.id;
        let position = transform.position;
        let yaw = transform.yaw();
        let pitch = transform.pitch();
        let on_ground = transform.on_ground;

        let mut dirty_rotation = yaw != last_sent.yaw || pitch != last_sent.pitch;

        if position != last_sent.position {
            let delta = position - last_sent.position;
            if fits_relative_move(delta) {
                let delta = delta_to_wire(delta);
                // Below the wire resolution: hold until the steps add up
                if delta != [0; 3] {
                    if dirty_rotation {
                        messages.push(UpdateMessage::trackers(LookAndRelativeMove {
                            entity_id,
                            delta,
                            yaw: wrap_angle(yaw),
                            pitch: wrap_angle(pitch),
                            on_ground,
                        }));
                        dirty_rotation = false;
                        last_sent.yaw = yaw;
                        last_sent.pitch = pitch;
                    } else {
                        messages.push(UpdateMessage::trackers(RelativeMove {
                            entity_id,
                            delta,
                            on_ground,
                        }));
                    }
                    // Clients only apply the quantized delta
                    last_sent.position += delta_from_wire(delta);
                }
            } else {
                messages.push(UpdateMessage::trackers(Teleport {
                    entity_id,
                    position,
                    yaw: wrap_angle(yaw),
                    pitch: wrap_angle(pitch),
                    on_ground,
                }));
                dirty_rotation = false;
                last_sent.position = position;
                last_sent.yaw = yaw;
                last_sent.pitch = pitch;
            }
        }

        if dirty_rotation {
            messages.push(UpdateMessage::trackers(Look {
                entity_id,
                yaw: wrap_angle(yaw),
                pitch: wrap_angle(pitch),
                on_ground,
            }));
            last_sent.yaw = yaw;
            last_sent.pitch = pitch;
        }

        if self.has_head() {
            let head_yaw = transform.head_yaw();
            if head_yaw != last_sent.head_yaw {
                messages.push(UpdateMessage::trackers(HeadLook {
                    entity_id,
                    head_yaw: wrap_angle(head_yaw),
                }));
                last_sent.head_yaw = head_yaw;
            }
        }

        if transform.velocity != last_sent.velocity {
            messages.push(UpdateMessage::everyone(Velocity {
                entity_id,
                velocity: velocity_to_wire(transform.velocity),
            }));
            last_sent.velocity = transform.velocity;
        }

        let parameters = entity.read_attributes(|a| self.collect_parameters(a));
        let changed: Vec<_> = parameters
            .into_iter()
            .filter(|(parameter_type, value)| {
                last_sent.parameters.get(&parameter_type.index()) != Some(value)
            })
            .collect();
        if !changed.is_empty() {
            match encode_parameters(&changed) {
                Ok(bytes) => {
                    messages.push(UpdateMessage::everyone(Metadata {
                        entity_id,
                        parameters: bytes,
                    }));
                    for (parameter_type, value) in changed {
                        last_sent.parameters.insert(parameter_type.index(), value);
                    }
                }
                Err(e) => {
                    error!(
                        entity_id = entity_id,
                        protocol = self.name(),
                        error = %e,
                        "Failed to build metadata message"
                    );
                }
            }
        }

        messages
    }

    /// Build the message removing an entity from a client's view
    pub fn build_destroy_message(self, entity_id: EntityId) -> Message {
        DestroyEntities {
            entity_ids: vec![entity_id],
        }
        .into()
    }
}

fn delta_to_wire(delta: DVec3) -> [i16; 3] {
    [
        encode_delta(delta.x),
        encode_delta(delta.y),
        encode_delta(delta.z),
    ]
}

fn delta_from_wire(delta: [i16; 3]) -> DVec3 {
    DVec3::new(
        decode_delta(delta[0]),
        decode_delta(delta[1]),
        decode_delta(delta[2]),
    )
}

fn velocity_to_wire(velocity: DVec3) -> [i16; 3] {
    [
        encode_velocity(velocity.x),
        encode_velocity(velocity.y),
        encode_velocity(velocity.z),
    ]
}

fn encode_parameters(
    parameters: &[(ParameterType, ParameterValue)],
) -> Result<Bytes, ProtocolError> {
    let mut list = ByteBufParameterList::new();
    for (parameter_type, value) in parameters {
        list.add(*parameter_type, value.clone())?;
    }
    Ok(list.finish())
}

/// The state every current tracker was last told about
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LastSent {
    pub position: DVec3,
    pub yaw: f64,
    pub pitch: f64,
    pub head_yaw: f64,
    pub velocity: DVec3,
    /// Last sent value per parameter index
    pub parameters: HashMap<u8, ParameterValue>,
}

impl LastSent {
    /// Capture a full snapshot
    pub fn capture(
        transform: &Transform,
        parameters: Vec<(ParameterType, ParameterValue)>,
    ) -> Self {
        Self {
            position: transform.position,
            yaw: transform.yaw(),
            pitch: transform.pitch(),
            head_yaw: transform.head_yaw(),
            velocity: transform.velocity,
            parameters: parameters
                .into_iter()
                .map(|(parameter_type, value)| (parameter_type.index(), value))
                .collect(),
        }
    }
}

/// Who an update message is delivered to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Every tracker except the controlling client
    Trackers,
    /// Every tracker and the controlling client
    Everyone,
}

/// An update message with its audience
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateMessage {
    pub message: Message,
    pub audience: Audience,
}

impl UpdateMessage {
    fn trackers(message: impl Into<Message>) -> Self {
        Self {
            message: message.into(),
            audience: Audience::Trackers,
        }
    }

    fn everyone(message: impl Into<Message>) -> Self {
        Self {
            message: message.into(),
            audience: Audience::Everyone,
        }
    }
}

/// How an entity is tracked: protocol type, range and update cadence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityProtocolSpec {
    pub protocol: EntityProtocolType,
    pub tracking_range: f64,
    pub tracking_update_rate: u32,
}

impl EntityProtocolSpec {
    /// Create a spec with the default range and update rate
    pub fn new(protocol: EntityProtocolType) -> Self {
        Self {
            protocol,
            tracking_range: DEFAULT_TRACKING_RANGE,
            tracking_update_rate: DEFAULT_TRACKING_UPDATE_RATE,
        }
    }

    /// Set the tracking range
    pub fn with_range(mut self, tracking_range: f64) -> Self {
        self.tracking_range = tracking_range;
        self
    }

    /// Set the update rate
    pub fn with_update_rate(mut self, tracking_update_rate: u32) -> Self {
        self.tracking_update_rate = tracking_update_rate;
        self
    }

    /// Check the range and update rate
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tracking_range.is_finite() || self.tracking_range < 0.0 {
            return Err(ConfigError::InvalidTrackingRange(self.tracking_range));
        }
        if self.tracking_update_rate == 0 {
            return Err(ConfigError::InvalidTickRate(self.tracking_update_rate));
        }
        Ok(())
    }

    /// Construct a tracker for an entity, rejecting incompatible pairings
    pub fn construct(&self, entity: Arc<Entity>) -> Result<EntityTracker, ConfigError> {
        self.validate()?;
        self.protocol.validate(&entity)?;
        Ok(EntityTracker::new(
            entity,
            self.protocol,
            self.tracking_range,
            self.tracking_update_rate,
        ))
    }
}

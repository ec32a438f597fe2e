//! Entity module
//!
//! The authoritative state of a dynamic world object as seen by the
//! synchronization layer:
//! - Stable wire id and unique id
//! - Kinematic state (position, rotation, head rotation, velocity)
//! - Typed attribute groups, one per entity kind layer
//!
//! The simulation mutates entities; the synchronization layer only reads them.

use bitflags::bitflags;
use glam::DVec3;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::game::viewer::PlayerId;

/// Wire id of an entity
pub type EntityId = i32;

bitflags! {
    /// Base entity state flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EntityFlags: u8 {
        const ON_FIRE = 0x01;
        const CROUCHED = 0x02;
        const SPRINTING = 0x08;
        const USING_ITEM = 0x10;
        const INVISIBLE = 0x20;
        const GLOWING = 0x40;
        const ELYTRA_FLYING = 0x80;
    }
}

bitflags! {
    /// Hand usage state of a living entity
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HandState: u8 {
        const ACTIVE = 0x01;
        const OFF_HAND = 0x02;
    }
}

bitflags! {
    /// Flags of entities driven by an AI
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InsentientFlags: u8 {
        const NO_AI = 0x01;
        const LEFT_HANDED = 0x02;
    }
}

/// What kind of object an entity is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// A non-living object (item, arrow, minecart, ...)
    Object { object_type: u8 },
    /// A living entity without an AI
    Living { mob_type: i32 },
    /// A living entity driven by an AI
    Insentient { mob_type: i32 },
    /// A slime
    Slime,
    /// A humanoid (player-like) entity
    Humanoid,
    /// A lightning bolt
    Lightning,
}

impl EntityKind {
    /// Whether entities of this kind carry living attributes
    pub fn is_living(&self) -> bool {
        matches!(
            self,
            Self::Living { .. } | Self::Insentient { .. } | Self::Slime | Self::Humanoid
        )
    }

    /// Client mob type of living entities spawned as mobs
    pub fn mob_type(&self) -> Option<i32> {
        match self {
            Self::Living { mob_type } | Self::Insentient { mob_type } => Some(*mob_type),
            Self::Slime => Some(SLIME_MOB_TYPE),
            _ => None,
        }
    }
}

/// Client mob type of slimes
pub const SLIME_MOB_TYPE: i32 = 55;

/// Kinematic state of an entity
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transform {
    /// Position in world units
    pub position: DVec3,
    /// Rotation in degrees (x = pitch, y = yaw, z = roll)
    pub rotation: DVec3,
    /// Head rotation in degrees, for entities with a distinct head
    pub head_rotation: Option<DVec3>,
    /// Velocity in world units per tick
    pub velocity: DVec3,
    /// Whether the entity rests on the ground
    pub on_ground: bool,
}

impl Transform {
    /// Create a transform at a position
    pub fn at(position: DVec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Body yaw in degrees
    pub fn yaw(&self) -> f64 {
        self.rotation.y
    }

    /// Pitch in degrees. Entities with a head only pitch their head.
    pub fn pitch(&self) -> f64 {
        self.head_rotation.unwrap_or(self.rotation).x
    }

    /// Head yaw in degrees, falling back to the body yaw
    pub fn head_yaw(&self) -> f64 {
        self.head_rotation.map_or(self.rotation.y, |head| head.y)
    }
}

/// Attributes shared by every entity
#[derive(Debug, Clone, PartialEq)]
pub struct BaseAttributes {
    pub flags: EntityFlags,
    pub air_level: i32,
    pub custom_name: String,
    pub custom_name_visible: bool,
    pub silent: bool,
    pub no_gravity: bool,
}

impl Default for BaseAttributes {
    fn default() -> Self {
        Self {
            flags: EntityFlags::empty(),
            // Only players use air; everyone else shows a full bar
            air_level: 100,
            custom_name: String::new(),
            custom_name_visible: false,
            silent: false,
            // The server simulates physics, not the client
            no_gravity: true,
        }
    }
}

/// Attributes of living entities
#[derive(Debug, Clone, PartialEq)]
pub struct LivingAttributes {
    pub hand_state: HandState,
    pub health: f32,
    pub potion_effect_color: i32,
    pub potion_effect_ambient: bool,
    pub arrows_in_entity: i32,
}

impl Default for LivingAttributes {
    fn default() -> Self {
        Self {
            hand_state: HandState::empty(),
            health: 20.0,
            potion_effect_color: 0,
            potion_effect_ambient: false,
            arrows_in_entity: 0,
        }
    }
}

/// Attributes of AI-driven entities
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsentientAttributes {
    pub flags: InsentientFlags,
}

/// Attributes of humanoid entities
#[derive(Debug, Clone, PartialEq)]
pub struct HumanoidAttributes {
    pub additional_hearts: f32,
    pub score: i32,
    pub skin_parts: u8,
    /// 0 = left, 1 = right
    pub main_hand: u8,
}

impl Default for HumanoidAttributes {
    fn default() -> Self {
        Self {
            additional_hearts: 0.0,
            score: 0,
            skin_parts: 0x7f,
            main_hand: 1,
        }
    }
}

/// Attributes of slimes
#[derive(Debug, Clone, PartialEq)]
pub struct SlimeAttributes {
    pub size: i32,
}

impl Default for SlimeAttributes {
    fn default() -> Self {
        Self { size: 1 }
    }
}

/// The full attribute set of an entity. Groups are present exactly when the
/// entity's kind has them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityAttributes {
    pub base: BaseAttributes,
    pub living: Option<LivingAttributes>,
    pub insentient: Option<InsentientAttributes>,
    pub humanoid: Option<HumanoidAttributes>,
    pub slime: Option<SlimeAttributes>,
}

impl EntityAttributes {
    /// Create the default attribute set for an entity kind
    pub fn for_kind(kind: EntityKind) -> Self {
        let mut attributes = Self::default();
        if kind.is_living() {
            attributes.living = Some(LivingAttributes::default());
        }
        match kind {
            EntityKind::Insentient { .. } => {
                attributes.insentient = Some(InsentientAttributes::default());
            }
            EntityKind::Slime => {
                attributes.insentient = Some(InsentientAttributes::default());
                attributes.slime = Some(SlimeAttributes::default());
            }
            EntityKind::Humanoid => {
                attributes.humanoid = Some(HumanoidAttributes::default());
            }
            _ => {}
        }
        attributes
    }
}

/// A synchronized entity
pub struct Entity {
    /// Wire id
    pub id: EntityId,
    /// Globally unique id
    pub unique_id: Uuid,
    /// Entity kind
    pub kind: EntityKind,
    /// Player controlling this entity, if it is a player's own avatar
    controller: Option<PlayerId>,
    /// Kinematic state
    transform: RwLock<Transform>,
    /// Attribute state
    attributes: RwLock<EntityAttributes>,
}

impl Entity {
    /// Create a new entity with default attributes for its kind
    pub fn new(id: EntityId, kind: EntityKind, transform: Transform) -> Self {
        Self {
            id,
            unique_id: Uuid::new_v4(),
            kind,
            controller: None,
            transform: RwLock::new(transform),
            attributes: RwLock::new(EntityAttributes::for_kind(kind)),
        }
    }

    /// Set the unique id
    pub fn with_unique_id(mut self, unique_id: Uuid) -> Self {
        self.unique_id = unique_id;
        self
    }

    /// Mark this entity as the avatar of a player
    pub fn with_controller(mut self, player: PlayerId) -> Self {
        self.controller = Some(player);
        self
    }

    /// Replace the attribute set
    pub fn with_attributes(self, attributes: EntityAttributes) -> Self {
        *self.attributes.write() = attributes;
        self
    }

    /// Get the controlling player, if any
    pub fn controller(&self) -> Option<PlayerId> {
        self.controller
    }

    /// Get a copy of the current kinematic state
    pub fn transform(&self) -> Transform {
        *self.transform.read()
    }

    /// Get the current position
    pub fn position(&self) -> DVec3 {
        self.transform.read().position
    }

    /// Set the position
    pub fn set_position(&self, position: DVec3) {
        self.transform.write().position = position;
    }

    /// Set the body rotation (x = pitch, y = yaw)
    pub fn set_rotation(&self, rotation: DVec3) {
        self.transform.write().rotation = rotation;
    }

    /// Set the head rotation
    pub fn set_head_rotation(&self, head_rotation: DVec3) {
        self.transform.write().head_rotation = Some(head_rotation);
    }

    /// Set the velocity
    pub fn set_velocity(&self, velocity: DVec3) {
        self.transform.write().velocity = velocity;
    }

    /// Mutate the kinematic state
    pub fn update_transform<F>(&self, f: F)
    where
        F: FnOnce(&mut Transform),
    {
        f(&mut self.transform.write());
    }

    /// Read the attribute state
    pub fn read_attributes<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&EntityAttributes) -> R,
    {
        f(&self.attributes.read())
    }

    /// Mutate the attribute state
    pub fn update_attributes<F>(&self, f: F)
    where
        F: FnOnce(&mut EntityAttributes),
    {
        f(&mut self.attributes.write());
    }

    /// Set the health of a living entity. Returns false for non-living entities.
    pub fn set_health(&self, health: f32) -> bool {
        match self.attributes.write().living.as_mut() {
            Some(living) => {
                living.health = health;
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("unique_id", &self.unique_id)
            .field("kind", &self.kind)
            .field("controller", &self.controller)
            .field("position", &self.position())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_for_kind() {
        let object = EntityAttributes::for_kind(EntityKind::Object { object_type: 2 });
        assert!(object.living.is_none());
        assert!(object.base.no_gravity);
        assert_eq!(object.base.air_level, 100);

        let slime = EntityAttributes::for_kind(EntityKind::Slime);
        assert!(slime.living.is_some());
        assert!(slime.insentient.is_some());
        assert_eq!(slime.slime, Some(SlimeAttributes { size: 1 }));

        let humanoid = EntityAttributes::for_kind(EntityKind::Humanoid);
        assert!(humanoid.humanoid.is_some());
        assert!(humanoid.insentient.is_none());
    }

    #[test]
    fn test_transform_head_fallback() {
        let mut transform = Transform::at(DVec3::new(0.0, 64.0, 0.0));
        transform.rotation = DVec3::new(10.0, 90.0, 0.0);
        assert_eq!(transform.pitch(), 10.0);
        assert_eq!(transform.head_yaw(), 90.0);

        transform.head_rotation = Some(DVec3::new(-20.0, 45.0, 0.0));
        assert_eq!(transform.yaw(), 90.0);
        assert_eq!(transform.pitch(), -20.0);
        assert_eq!(transform.head_yaw(), 45.0);
    }

    #[test]
    fn test_entity_mutation() {
        let entity = Entity::new(
            7,
            EntityKind::Living { mob_type: 54 },
            Transform::at(DVec3::ZERO),
        );
        entity.set_position(DVec3::new(1.0, 2.0, 3.0));
        assert_eq!(entity.position(), DVec3::new(1.0, 2.0, 3.0));

        assert!(entity.set_health(15.0));
        let health = entity.read_attributes(|a| a.living.as_ref().map(|l| l.health));
        assert_eq!(health, Some(15.0));

        let object = Entity::new(8, EntityKind::Object { object_type: 1 }, Transform::default());
        assert!(!object.set_health(1.0));
    }
}

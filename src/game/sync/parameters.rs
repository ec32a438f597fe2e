//! Per-kind parameter tables
//!
//! Each entity kind layer declares its own parameters on top of its parent
//! layer's table. Tables are resolved lazily, once, and never mutated
//! afterwards; a child table always resolves its parent first.
//!
//! ```text
//! Base ── Living ─┬─ Insentient ── Slime
//!                 └─ Humanoid
//! ```

use once_cell::sync::Lazy;

use super::parameter::{ParameterTable, ParameterType, ParameterTypeCollection, ParameterValueType};

/// Parameters shared by every entity
#[derive(Debug)]
pub struct BaseParameters {
    /// Bitmask, see [`EntityFlags`](crate::game::entity::EntityFlags)
    pub flags: ParameterType,
    pub air_level: ParameterType,
    pub custom_name: ParameterType,
    pub custom_name_visible: ParameterType,
    pub silent: ParameterType,
    pub no_gravity: ParameterType,
    pub table: ParameterTable,
}

/// Parameters of living entities
#[derive(Debug)]
pub struct LivingParameters {
    /// Bitmask, see [`HandState`](crate::game::entity::HandState)
    pub hand_data: ParameterType,
    pub health: ParameterType,
    pub potion_effect_color: ParameterType,
    pub potion_effect_ambient: ParameterType,
    pub arrows_in_entity: ParameterType,
    pub table: ParameterTable,
}

/// Parameters of AI-driven entities
#[derive(Debug)]
pub struct InsentientParameters {
    /// Bitmask, see [`InsentientFlags`](crate::game::entity::InsentientFlags)
    pub flags: ParameterType,
    pub table: ParameterTable,
}

/// Parameters of humanoid entities
#[derive(Debug)]
pub struct HumanoidParameters {
    pub additional_hearts: ParameterType,
    /// Shown on the respawn screen
    pub score: ParameterType,
    pub skin_parts: ParameterType,
    pub main_hand: ParameterType,
    pub table: ParameterTable,
}

/// Parameters of slimes
#[derive(Debug)]
pub struct SlimeParameters {
    pub size: ParameterType,
    pub table: ParameterTable,
}

pub static BASE: Lazy<BaseParameters> = Lazy::new(|| {
    let mut types = ParameterTypeCollection::new();
    BaseParameters {
        flags: types.new_parameter_type(ParameterValueType::Byte),
        air_level: types.new_parameter_type(ParameterValueType::VarInt),
        custom_name: types.new_parameter_type(ParameterValueType::String),
        custom_name_visible: types.new_parameter_type(ParameterValueType::Boolean),
        silent: types.new_parameter_type(ParameterValueType::Boolean),
        no_gravity: types.new_parameter_type(ParameterValueType::Boolean),
        table: types.freeze(),
    }
});

pub static LIVING: Lazy<LivingParameters> = Lazy::new(|| {
    let mut types = BASE.table.extend();
    LivingParameters {
        hand_data: types.new_parameter_type(ParameterValueType::Byte),
        health: types.new_parameter_type(ParameterValueType::Float),
        potion_effect_color: types.new_parameter_type(ParameterValueType::VarInt),
        potion_effect_ambient: types.new_parameter_type(ParameterValueType::Boolean),
        arrows_in_entity: types.new_parameter_type(ParameterValueType::VarInt),
        table: types.freeze(),
    }
});

pub static INSENTIENT: Lazy<InsentientParameters> = Lazy::new(|| {
    let mut types = LIVING.table.extend();
    InsentientParameters {
        flags: types.new_parameter_type(ParameterValueType::Byte),
        table: types.freeze(),
    }
});

pub static HUMANOID: Lazy<HumanoidParameters> = Lazy::new(|| {
    let mut types = LIVING.table.extend();
    HumanoidParameters {
        additional_hearts: types.new_parameter_type(ParameterValueType::Float),
        score: types.new_parameter_type(ParameterValueType::VarInt),
        skin_parts: types.new_parameter_type(ParameterValueType::Byte),
        main_hand: types.new_parameter_type(ParameterValueType::Byte),
        table: types.freeze(),
    }
});

pub static SLIME: Lazy<SlimeParameters> = Lazy::new(|| {
    let mut types = INSENTIENT.table.extend();
    SlimeParameters {
        size: types.new_parameter_type(ParameterValueType::VarInt),
        table: types.freeze(),
    }
});

/// Registry key of a resolved parameter table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    Base,
    Living,
    Insentient,
    Humanoid,
    Slime,
}

impl ParameterKind {
    /// Get the kind this kind extends
    pub fn parent(self) -> Option<ParameterKind> {
        match self {
            Self::Base => None,
            Self::Living => Some(Self::Base),
            Self::Insentient | Self::Humanoid => Some(Self::Living),
            Self::Slime => Some(Self::Insentient),
        }
    }

    /// Get the flattened table of this kind
    pub fn table(self) -> &'static ParameterTable {
        match self {
            Self::Base => &BASE.table,
            Self::Living => &LIVING.table,
            Self::Insentient => &INSENTIENT.table,
            Self::Humanoid => &HUMANOID.table,
            Self::Slime => &SLIME.table,
        }
    }
}

/// Resolve every table up front, e.g. at server startup
pub fn init() {
    Lazy::force(&SLIME);
    Lazy::force(&HUMANOID);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_indices() {
        assert_eq!(BASE.flags.index(), 0);
        assert_eq!(BASE.air_level.index(), 1);
        assert_eq!(BASE.no_gravity.index(), 5);
        assert_eq!(BASE.table.len(), 6);
    }

    #[test]
    fn test_children_extend_parent_indices() {
        assert_eq!(LIVING.hand_data.index(), 6);
        assert_eq!(LIVING.health.index(), 7);
        assert_eq!(LIVING.health.value_type(), ParameterValueType::Float);
        assert_eq!(INSENTIENT.flags.index(), 11);
        assert_eq!(HUMANOID.additional_hearts.index(), 11);
        assert_eq!(SLIME.size.index(), 12);
    }

    #[test]
    fn test_parent_types_valid_in_every_child() {
        for kind in [
            ParameterKind::Living,
            ParameterKind::Insentient,
            ParameterKind::Humanoid,
            ParameterKind::Slime,
        ] {
            let parent = kind.parent().unwrap().table();
            let table = kind.table();
            assert!(table.len() > parent.len());
            for parameter_type in parent.iter() {
                assert!(table.contains(parameter_type), "{:?} lacks {}", kind, parameter_type);
            }
        }
    }

    #[test]
    fn test_sibling_types_not_interchangeable() {
        assert!(!HUMANOID.table.contains(INSENTIENT.flags));
        assert!(!INSENTIENT.table.contains(HUMANOID.additional_hearts));
        assert!(SLIME.table.contains(INSENTIENT.flags));
    }
}

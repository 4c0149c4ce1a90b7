use crate::store::SlotKey;

/// Relocation-safe reference to a level.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct LevelHandle {
    pub(crate) level: SlotKey,
}

/// Relocation-safe reference to a layer inside a level.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct LayerHandle {
    pub(crate) level: SlotKey,
    pub(crate) layer: SlotKey,
}

/// Relocation-safe reference to an entity. Carries the full owner chain
/// (level, layer, entity slot) so resolution is a fixed three-step walk,
/// never a search. Equality is structural and does not imply liveness.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct EntityHandle {
    pub(crate) level: SlotKey,
    pub(crate) layer: SlotKey,
    pub(crate) entity: SlotKey,
}

/// Relocation-safe reference to a component on an entity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct ComponentHandle {
    pub(crate) entity: EntityHandle,
    pub(crate) component: SlotKey,
}

impl LevelHandle {
    pub fn is_valid(&self) -> bool {
        self.level.is_valid()
    }
}

impl LayerHandle {
    pub fn is_valid(&self) -> bool {
        self.level.is_valid() && self.layer.is_valid()
    }

    pub fn level(&self) -> LevelHandle {
        LevelHandle { level: self.level }
    }
}

impl EntityHandle {
    pub fn is_valid(&self) -> bool {
        self.level.is_valid() && self.layer.is_valid() && self.entity.is_valid()
    }

    pub fn layer(&self) -> LayerHandle {
        LayerHandle {
            level: self.level,
            layer: self.layer,
        }
    }

    pub fn level(&self) -> LevelHandle {
        LevelHandle { level: self.level }
    }

    /// True when both handles point into the same layer scope.
    pub fn same_layer(&self, other: &EntityHandle) -> bool {
        self.level == other.level && self.layer == other.layer
    }
}

impl ComponentHandle {
    pub fn is_valid(&self) -> bool {
        self.entity.is_valid() && self.component.is_valid()
    }

    pub fn entity(&self) -> EntityHandle {
        self.entity
    }
}
